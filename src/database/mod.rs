mod table;

use mysql::{
    prelude::{FromRow, Queryable},
    Params, Pool, PooledConn, Transaction, TxOpts,
};
pub use table::Table;

use crate::Response;

pub struct Database;
impl Database {
    /// 主键已存在
    pub const DUPLICATE_KEY_ERROR_CODE: u16 = 1062;
    /// 外键无法匹配
    pub const FOREIGN_KEY_ERROR_CODE: u16 = 1452;
}

/// Failure of a single gateway call. "No rows" is never an error: reads
/// return `Ok(None)` / `Ok(vec![])` for that.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("duplicate entry: {0}")]
    Duplicate(String),
    #[error("referenced row does not exist: {0}")]
    MissingReference(String),
    #[error("database error: {0}")]
    Database(mysql::Error),
}

impl From<mysql::Error> for GatewayError {
    fn from(err: mysql::Error) -> Self {
        match err {
            mysql::Error::MySqlError(e) if e.code == Database::DUPLICATE_KEY_ERROR_CODE => {
                GatewayError::Duplicate(e.message)
            }
            mysql::Error::MySqlError(e) if e.code == Database::FOREIGN_KEY_ERROR_CODE => {
                GatewayError::MissingReference(e.message)
            }
            e => GatewayError::Database(e),
        }
    }
}

impl From<GatewayError> for Response {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::Duplicate(msg) => {
                tracing::debug!("duplicate key: {msg}");
                Response::already_exist("Record already exists.")
            }
            GatewayError::MissingReference(msg) => {
                tracing::debug!("foreign key: {msg}");
                Response::not_exist("Referenced record does not exist.")
            }
            GatewayError::Database(e) => {
                tracing::error!("database error: {e}");
                Response::internal_server_error("Database error, please retry.")
            }
        }
    }
}

/// Query gateway: every statement runs in its own transaction that commits on
/// success and rolls back when the closure fails or the transaction drops.
#[derive(Clone)]
pub struct Gateway {
    pool: Pool,
}

impl Gateway {
    /// 连接数据库
    pub fn connect(url: &str) -> Result<Self, GatewayError> {
        Ok(Self {
            pool: Pool::new(url)?,
        })
    }

    pub fn get_conn(&self) -> Result<PooledConn, GatewayError> {
        Ok(self.pool.get_conn()?)
    }

    /// 成功提交，失败回滚
    pub fn transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T, E>,
        E: From<GatewayError>,
    {
        let mut conn = self.get_conn()?;
        let mut tx = conn
            .start_transaction(TxOpts::default())
            .map_err(GatewayError::from)?;
        let value = f(&mut tx)?;
        tx.commit().map_err(GatewayError::from)?;
        Ok(value)
    }

    /// Single row (the first one) or `None`.
    pub fn fetch_one<T, P>(&self, stmt: &str, params: P) -> Result<Option<T>, GatewayError>
    where
        T: FromRow,
        P: Into<Params>,
    {
        self.transaction(|tx| Ok(tx.exec_first(stmt, params)?))
    }

    pub fn fetch_all<T, P>(&self, stmt: &str, params: P) -> Result<Vec<T>, GatewayError>
    where
        T: FromRow,
        P: Into<Params>,
    {
        self.transaction(|tx| Ok(tx.exec(stmt, params)?))
    }

    /// Runs a mutating statement and returns the affected-row count.
    pub fn execute<P>(&self, stmt: &str, params: P) -> Result<u64, GatewayError>
    where
        P: Into<Params>,
    {
        self.transaction(|tx| {
            tx.exec_drop(stmt, params)?;
            Ok(tx.affected_rows())
        })
    }

    pub fn create_tables(&self) -> Result<(), GatewayError> {
        let mut conn = self.get_conn()?;
        for stmt in Table::ALL {
            conn.query_drop(stmt)?;
        }
        Ok(())
    }
}

/// Affected-row helper for conditional writes made inside a transaction.
pub fn exec_affected<P: Into<Params>>(
    tx: &mut Transaction<'_>,
    stmt: &str,
    params: P,
) -> Result<u64, GatewayError> {
    tx.exec_drop(stmt, params)?;
    Ok(tx.affected_rows())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_maps_to_already_exist() {
        let response: Response = GatewayError::Duplicate("uq_open_jobcard".into()).into();
        assert_eq!(response.status(), 3);
    }

    #[test]
    fn database_error_is_generic_to_the_client() {
        let err = GatewayError::Database(mysql::Error::DriverError(
            mysql::DriverError::PacketOutOfSync,
        ));
        let response: Response = err.into();
        assert_eq!(response.status(), -1);
        assert_eq!(
            response.data(),
            &serde_json::json!("Database error, please retry.")
        );
    }
}
