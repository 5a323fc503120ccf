mod account;
pub mod admin;
pub mod attendance;
pub mod workorder;

use axum::Router;
use mysql::params;
use mysql_common::prelude::FromRow;

use crate::{database::{Gateway, GatewayError}, AppState};

pub fn pages_router() -> Router<AppState> {
    account::account_router()
        .merge(attendance::attendance_router())
        .merge(admin::admin_router())
        .merge(workorder::workorder_router())
}

#[derive(Debug, serde::Serialize, FromRow)]
pub struct Technician {
    pub employee_code: String,
    pub employee_name: String,
}

/// Technicians of a center that are not marked inactive, optionally leaving
/// out the caller.
pub fn center_technicians(
    gateway: &Gateway,
    center_code: &str,
    exclude: Option<&str>,
) -> Result<Vec<Technician>, GatewayError> {
    gateway.fetch_all(
        "SELECT employee_code, employee_name FROM employee_details
        WHERE center_code = :center
            AND LOWER(user_role) = 'technician'
            AND LOWER(COALESCE(employee_status, '')) NOT IN ('inactive', '0', 'false')
            AND employee_code != :exclude
        ORDER BY employee_name",
        params! { "center" => center_code, "exclude" => exclude.unwrap_or("") },
    )
}
