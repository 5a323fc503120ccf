mod login;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use mysql::params;
use mysql_common::prelude::FromRow;
use serde_json::{json, Value};

use crate::{
    log,
    perm::{self, Role},
    AppState, RequestContext, Response, ResponseResult,
};

pub fn account_router() -> Router<AppState> {
    Router::new()
        .route("/user/login", post(login::user_login))
        .route("/user/logout", post(user_logout))
        .route("/user/profile", get(user_profile))
        .route("/user/set/psw", post(set_user_password))
        .route("/user/menu", get(user_menu))
        .route("/time/now", get(time_now))
}

/// 员工资料，不含密码
#[derive(Debug, serde::Serialize, FromRow)]
pub struct Profile {
    employee_code: String,
    employee_name: String,
    center_code: Option<String>,
    center_name: Option<String>,
    center_location: Option<String>,
    center_type: Option<String>,
    user_role: String,
    user_details: Option<String>,
    employee_doj: Option<NaiveDate>,
    employee_status: String,
    last_working_day: Option<NaiveDate>,
}

pub fn hash_password(password: &str) -> Result<String, Response> {
    use argon2::password_hash::rand_core::OsRng;
    use argon2::password_hash::SaltString;
    use argon2::{Argon2, PasswordHasher};
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            tracing::error!("password hashing failed: {e}");
            Response::internal_server_error("Could not store the password.")
        })
}

/// Rows created before hashing was introduced still hold the plain text;
/// those are compared directly and reported so the caller can upgrade them.
pub enum PasswordCheck {
    Valid,
    ValidLegacy,
    Invalid,
}

pub fn verify_password(password: &str, stored: &str) -> PasswordCheck {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};
    match PasswordHash::new(stored) {
        Ok(parsed) => {
            if Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
            {
                PasswordCheck::Valid
            } else {
                PasswordCheck::Invalid
            }
        }
        Err(_) if !stored.is_empty() && stored == password => PasswordCheck::ValidLegacy,
        Err(_) => PasswordCheck::Invalid,
    }
}

async fn user_logout(State(state): State<AppState>, ctx: RequestContext) -> ResponseResult {
    state.sessions.close(&ctx.sid);
    log!("{} logged out", ctx.employee_code);
    Ok(Response::empty())
}

async fn user_profile(State(state): State<AppState>, ctx: RequestContext) -> ResponseResult {
    let profile: Option<Profile> = state.gateway.fetch_one(
        "SELECT employee_code, employee_name, center_code, center_name, center_location,
            center_type, user_role, user_details, employee_doj, employee_status, last_working_day
        FROM employee_details WHERE employee_code = :code",
        params! { "code" => &ctx.employee_code },
    )?;
    let profile = op::some!(profile; ret Err(Response::not_exist("No profile details found for this user.")));
    Ok(Response::ok(json!(profile)))
}

#[derive(serde::Deserialize)]
struct Password {
    password: String,
}

async fn set_user_password(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(value): Json<Value>,
) -> ResponseResult {
    let password: Password = serde_json::from_value(value)?;
    let password = password.password.trim();
    if password.is_empty() {
        return Err(Response::invalid_value("Password cannot be empty."));
    }
    let hash = hash_password(password)?;
    let changed = state.gateway.execute(
        "UPDATE employee_details SET password = :password, updated_by = :code
        WHERE employee_code = :code",
        params! { "password" => hash, "code" => &ctx.employee_code },
    )?;
    if changed == 0 {
        return Err(Response::not_exist("Your employee record was not found."));
    }
    let ended = state.sessions.close_others(&ctx.employee_code, &ctx.sid);
    log!("{} changed password, {ended} other sessions ended", ctx.employee_code);
    Ok(Response::empty())
}

fn menu_json(role: Role) -> Value {
    json!({
        "role": role,
        "menu": perm::menu_for(role),
    })
}

async fn user_menu(ctx: RequestContext) -> ResponseResult {
    Ok(Response::ok(menu_json(ctx.role)))
}

/// Which time source answered, next to the local clock, for checking drift.
async fn time_now(State(state): State<AppState>, _ctx: RequestContext) -> ResponseResult {
    let resolved = state.clock.resolve().await;
    Ok(Response::ok(json!({
        "now": resolved.now.format("%Y-%m-%d %H:%M:%S").to_string(),
        "source": resolved.source,
        "system": resolved.system.format("%Y-%m-%d %H:%M:%S").to_string(),
        "trusted": resolved.trusted,
        "zone": state.config.zone_name(),
        "warning": resolved.warning(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_passwords_verify() {
        let hash = hash_password("s3cret").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(matches!(verify_password("s3cret", &hash), PasswordCheck::Valid));
        assert!(matches!(verify_password("wrong", &hash), PasswordCheck::Invalid));
    }

    #[test]
    fn legacy_plain_text_is_recognised() {
        assert!(matches!(verify_password("1234", "1234"), PasswordCheck::ValidLegacy));
        assert!(matches!(verify_password("1235", "1234"), PasswordCheck::Invalid));
        assert!(matches!(verify_password("", ""), PasswordCheck::Invalid));
    }

    #[test]
    fn menu_carries_role_label() {
        let value = menu_json(Role::SuperAdmin);
        assert_eq!(value["role"], "Super Admin");
        assert_eq!(value["menu"][0], "Attendance");
    }
}
