use axum::{extract::State, Json};
use mysql::params;
use mysql_common::prelude::FromRow;
use serde_json::{json, Value};

use super::{hash_password, verify_password, PasswordCheck};
use crate::{
    log,
    perm::{self, Role},
    token::gen_session_id,
    AppState, Response, ResponseResult,
};

#[derive(serde::Deserialize)]
struct LoginID {
    employee_code: String,
    password: String,
}

#[derive(FromRow)]
struct LoginRow {
    employee_code: String,
    employee_name: String,
    password: String,
    center_code: Option<String>,
    center_name: Option<String>,
    user_role: String,
    employee_status: String,
}

impl LoginRow {
    fn is_active(&self) -> bool {
        self.employee_status.trim().eq_ignore_ascii_case("active")
    }
}

/// Refuses wrong passwords and inactive accounts before anything is written.
/// `Ok(true)` asks the caller to rehash a legacy plain-text password.
fn admit(check: PasswordCheck, row: &LoginRow) -> Result<bool, Response> {
    if matches!(check, PasswordCheck::Invalid) {
        tracing::debug!("failed login for {}", row.employee_code);
        return Err(Response::wrong_password());
    }
    if !row.is_active() {
        return Err(Response::permission_denied_with(
            "Your account is inactive. Please contact the administrator.",
        ));
    }
    Ok(matches!(check, PasswordCheck::ValidLegacy))
}

pub async fn user_login(State(state): State<AppState>, Json(value): Json<Value>) -> ResponseResult {
    let login: LoginID = serde_json::from_value(value)?;
    let code = login.employee_code.trim();
    if code.is_empty() || login.password.is_empty() {
        return Err(Response::invalid_value("Employee code and password are required."));
    }
    let row: Option<LoginRow> = state.gateway.fetch_one(
        "SELECT employee_code, employee_name, password, center_code, center_name,
            user_role, employee_status
        FROM employee_details WHERE employee_code = :code",
        params! { "code" => code },
    )?;
    let row = op::some!(row; ret Err(Response::wrong_password()));

    if admit(verify_password(&login.password, &row.password), &row)? {
        let hash = hash_password(&login.password)?;
        state.gateway.execute(
            "UPDATE employee_details SET password = :password WHERE employee_code = :code",
            params! { "password" => hash, "code" => &row.employee_code },
        )?;
        log!("upgraded stored password of {}", row.employee_code);
    }
    let role: Role = row.user_role.parse().map_err(|e| {
        tracing::error!("employee {} has {e}", row.employee_code);
        Response::invalid_value(e)
    })?;

    let sid = gen_session_id();
    let claims = state.key.claims(
        &row.employee_code,
        &row.employee_name,
        role,
        row.center_code.clone(),
        &sid,
    );
    let token = state.key.sign(&claims)?;
    state.sessions.open(&sid, &row.employee_code, claims.exp);
    log!("{} logged in as {role}", row.employee_code);
    Ok(Response::ok(json!({
        "token": token,
        "user": {
            "employee_code": row.employee_code,
            "employee_name": row.employee_name,
            "center_code": row.center_code,
            "center_name": row.center_name,
            "user_role": role,
        },
        "menu": perm::menu_for(role),
    })))
}
