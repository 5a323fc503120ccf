use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDate;
use mysql::{params, Row};
use mysql_common::prelude::FromRow;
use serde_json::{json, Value};

use super::{center_info, check_details, parse_status, CenterInfo, Status};
use crate::{
    database::GatewayError,
    libs::{csv, dser::*},
    log,
    pages::account::hash_password,
    perm::{Action, Role},
    response::BodyFile,
    AppState, RequestContext, Response, ResponseResult,
};

/// Every column except the password.
const EMPLOYEE_COLUMNS: &str = "employee_code, employee_name, center_code, center_name,
    center_location, center_type, user_role, user_details, employee_doj, employee_status,
    last_working_day, updated_by";

#[derive(Debug, serde::Serialize, FromRow)]
pub struct Employee {
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
    updated_by: Option<String>,
}

pub async fn list(State(state): State<AppState>, ctx: RequestContext) -> ResponseResult {
    ctx.require(Action::ManageEmployees)?;
    let employees: Vec<Employee> = state.gateway.fetch_all(
        &format!("SELECT {EMPLOYEE_COLUMNS} FROM employee_details ORDER BY employee_code"),
        (),
    )?;
    Ok(Response::ok(json!({
        "total": employees.len(),
        "employees": employees,
    })))
}

pub async fn list_csv(State(state): State<AppState>, ctx: RequestContext) -> Result<BodyFile, Response> {
    ctx.require(Action::ManageEmployees)?;
    let rows: Vec<Row> = state.gateway.fetch_all(
        &format!("SELECT {EMPLOYEE_COLUMNS} FROM employee_details ORDER BY employee_code"),
        (),
    )?;
    if rows.is_empty() {
        return Err(Response::not_exist("No employee records found."));
    }
    Ok(BodyFile::csv(csv::from_rows(&rows), "employee_details.csv"))
}

/// Admins may open their own record but no other admin's.
fn check_visible(ctx: &RequestContext, code: &str, role: &str) -> Result<(), Response> {
    let role: Role = role.parse().map_err(Response::invalid_value)?;
    if code == ctx.employee_code || ctx.role.can_view(role) {
        Ok(())
    } else {
        Err(Response::permission_denied_with(
            "Access restricted: Admins cannot view Admin or Super Admin records.",
        ))
    }
}

fn load(state: &AppState, code: &str) -> Result<Option<Employee>, GatewayError> {
    state.gateway.fetch_one(
        &format!("SELECT {EMPLOYEE_COLUMNS} FROM employee_details WHERE employee_code = :code"),
        params! { "code" => code },
    )
}

pub async fn detail(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(code): Path<String>,
) -> ResponseResult {
    ctx.require(Action::ManageEmployees)?;
    let employee = op::some!(load(&state, code.trim())?; ret Err(Response::not_exist("No such employee.")));
    check_visible(&ctx, &employee.employee_code, &employee.user_role)?;
    Ok(Response::ok(json!(employee)))
}

#[derive(serde::Deserialize, Default)]
struct NewEmployee {
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    employee_code: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    employee_name: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    password: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    center_code: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    user_role: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    user_details: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    employee_status: Option<String>,
}

struct ValidEmployee {
    code: String,
    name: String,
    password: String,
    center_code: Option<String>,
    role: Role,
    details: Option<String>,
    status: Status,
}

impl NewEmployee {
    fn validate(self, actor: Role) -> Result<ValidEmployee, Response> {
        let (Some(code), Some(name), Some(password)) =
            (self.employee_code, self.employee_name, self.password)
        else {
            return Err(Response::invalid_value(
                "Employee code, name and password are required.",
            ));
        };
        let role = assignable_role(actor, self.user_role.as_deref(), None)?;
        check_details(self.user_details.as_deref())?;
        let status = parse_status(self.employee_status.as_deref())?.unwrap_or_default();
        Ok(ValidEmployee {
            code,
            name,
            password,
            center_code: self.center_code,
            role,
            details: self.user_details,
            status,
        })
    }
}

/// The requested role when the actor may give it. Keeping `current`
/// unchanged is always allowed so an edit never silently demotes.
fn assignable_role(actor: Role, requested: Option<&str>, current: Option<Role>) -> Result<Role, Response> {
    let role = match (requested, current) {
        (Some(r), _) => r.parse::<Role>().map_err(Response::invalid_value)?,
        (None, Some(current)) => return Ok(current),
        (None, None) => return Err(Response::invalid_value("User role is required.")),
    };
    if Some(role) == current || actor.can_assign(role) {
        Ok(role)
    } else {
        Err(Response::permission_denied_with(format!(
            "{actor} cannot assign the {role} role."
        )))
    }
}

fn duplicate_code(e: GatewayError) -> Response {
    match e {
        GatewayError::Duplicate(_) => Response::already_exist("Employee code already exists."),
        e => e.into(),
    }
}

pub async fn add(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(value): Json<Value>,
) -> ResponseResult {
    ctx.require(Action::ManageEmployees)?;
    let form: NewEmployee = serde_json::from_value(value)?;
    let new = form.validate(ctx.role)?;
    let CenterInfo {
        center_name,
        center_location,
    } = center_info(&state.gateway, new.center_code.as_deref())?;
    let hash = hash_password(&new.password)?;
    state
        .gateway
        .execute(
            "INSERT INTO employee_details
            (employee_code, employee_name, password, center_code, center_name, center_location,
             center_type, user_role, user_details, employee_doj, employee_status,
             last_working_day, updated_by)
            VALUES
            (:code, :name, :password, :center_code, :center_name, :center_location,
             NULL, :role, :details, NULL, :status, NULL, :updated_by)",
            params! {
                "code" => &new.code,
                "name" => &new.name,
                "password" => hash,
                "center_code" => &new.center_code,
                "center_name" => center_name,
                "center_location" => center_location,
                "role" => new.role.as_str(),
                "details" => &new.details,
                "status" => new.status.as_str(),
                "updated_by" => &ctx.employee_code,
            },
        )
        .map_err(duplicate_code)?;
    log!("{} created employee {} ({})", ctx.employee_code, new.code, new.role);
    Ok(Response::ok(json!("User created successfully.")))
}

#[derive(serde::Deserialize, Default)]
struct EmployeeUpdate {
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    employee_code: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    employee_name: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    password: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    center_code: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    user_role: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    user_details: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    employee_status: Option<String>,
    #[serde(default, deserialize_with = "deser_optional_date")]
    last_working_day: Option<NaiveDate>,
}

/// Stored values overlaid with the non-blank fields of an update.
#[derive(Debug)]
struct Merged {
    code: String,
    name: String,
    center_code: Option<String>,
    role: Role,
    details: Option<String>,
    status: Status,
    last_working_day: Option<NaiveDate>,
}

impl EmployeeUpdate {
    fn merge(&self, current: &Employee, actor: Role, today: NaiveDate) -> Result<Merged, Response> {
        let current_role: Role = current.user_role.parse().map_err(Response::invalid_value)?;
        let role = assignable_role(actor, self.user_role.as_deref(), Some(current_role))?;
        check_details(self.user_details.as_deref())?;
        let status = match parse_status(self.employee_status.as_deref())? {
            Some(status) => status,
            None => current.employee_status.parse().unwrap_or_default(),
        };
        let last_working_day = match status {
            Status::Inactive => Some(
                self.last_working_day
                    .or(current.last_working_day)
                    .unwrap_or(today),
            ),
            Status::Active => None,
        };
        Ok(Merged {
            code: self
                .employee_code
                .clone()
                .unwrap_or_else(|| current.employee_code.clone()),
            name: self
                .employee_name
                .clone()
                .unwrap_or_else(|| current.employee_name.clone()),
            center_code: self.center_code.clone().or_else(|| current.center_code.clone()),
            role,
            details: self.user_details.clone().or_else(|| current.user_details.clone()),
            status,
            last_working_day,
        })
    }
}

pub async fn update(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(code): Path<String>,
    Json(value): Json<Value>,
) -> ResponseResult {
    ctx.require(Action::ManageEmployees)?;
    let form: EmployeeUpdate = serde_json::from_value(value)?;
    let current = op::some!(load(&state, code.trim())?; ret Err(Response::not_exist("No such employee.")));
    check_visible(&ctx, &current.employee_code, &current.user_role)?;
    let today = state.clock.now().await.date();
    let merged = form.merge(&current, ctx.role, today)?;

    let info = center_info(&state.gateway, merged.center_code.as_deref())?;
    let center_name = info.center_name.or_else(|| current.center_name.clone());
    let center_location = info.center_location.or_else(|| current.center_location.clone());
    let password = form.password.as_deref().map(hash_password).transpose()?;

    state
        .gateway
        .execute(
            "UPDATE employee_details SET
                employee_code = :new_code,
                employee_name = :name,
                password = COALESCE(:password, password),
                center_code = :center_code,
                center_name = :center_name,
                center_location = :center_location,
                user_role = :role,
                user_details = :details,
                employee_status = :status,
                last_working_day = :last_working_day,
                updated_by = :updated_by
            WHERE employee_code = :orig_code",
            params! {
                "new_code" => &merged.code,
                "name" => &merged.name,
                "password" => &password,
                "center_code" => &merged.center_code,
                "center_name" => center_name,
                "center_location" => center_location,
                "role" => merged.role.as_str(),
                "details" => &merged.details,
                "status" => merged.status.as_str(),
                "last_working_day" => merged.last_working_day,
                "updated_by" => &ctx.employee_code,
                "orig_code" => &current.employee_code,
            },
        )
        .map_err(duplicate_code)?;

    // Tokens carry code, role and center; anything they depend on ends the sessions.
    let credentials_changed = merged.code != current.employee_code
        || password.is_some()
        || merged.role.as_str() != current.user_role
        || merged.center_code != current.center_code
        || merged.status == Status::Inactive;
    if credentials_changed {
        let ended = state.sessions.close_others(&current.employee_code, &ctx.sid);
        tracing::debug!("ended {ended} sessions of {}", current.employee_code);
    }
    log!(
        "{} updated employee {} -> {}",
        ctx.employee_code,
        current.employee_code,
        merged.code
    );
    Ok(Response::ok(json!("User updated successfully.")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> Employee {
        Employee {
            employee_code: "AL0001".into(),
            employee_name: "Arun".into(),
            center_code: Some("C01".into()),
            center_name: Some("Chennai".into()),
            center_location: None,
            center_type: None,
            user_role: "Admin".into(),
            user_details: Some("Manager".into()),
            employee_doj: None,
            employee_status: "Active".into(),
            last_working_day: None,
            updated_by: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn create_requires_code_name_and_password() {
        let form: NewEmployee =
            serde_json::from_str(r#"{"employee_code": "AL0002", "employee_name": " ", "password": "x"}"#)
                .unwrap();
        let err = form.validate(Role::SuperAdmin).err().unwrap();
        assert_eq!(err.data(), &json!("Employee code, name and password are required."));
    }

    #[test]
    fn admin_cannot_create_admins() {
        let form = NewEmployee {
            employee_code: Some("AL0002".into()),
            employee_name: Some("Bala".into()),
            password: Some("pw".into()),
            user_role: Some("Super Admin".into()),
            ..Default::default()
        };
        assert_eq!(form.validate(Role::Admin).err().unwrap().status(), 4);

        let form = NewEmployee {
            employee_code: Some("AL0002".into()),
            employee_name: Some("Bala".into()),
            password: Some("pw".into()),
            user_role: Some("technician".into()),
            ..Default::default()
        };
        let valid = form.validate(Role::Admin).unwrap();
        assert_eq!(valid.role, Role::Technician);
        assert_eq!(valid.status, Status::Active);
    }

    #[test]
    fn blank_fields_keep_stored_values() {
        let update = EmployeeUpdate::default();
        let merged = update.merge(&stored(), Role::Admin, today()).unwrap();
        assert_eq!(merged.code, "AL0001");
        assert_eq!(merged.name, "Arun");
        assert_eq!(merged.role, Role::Admin);
        assert_eq!(merged.center_code.as_deref(), Some("C01"));
        assert_eq!(merged.last_working_day, None);
    }

    #[test]
    fn inactive_defaults_last_working_day_to_today() {
        let update = EmployeeUpdate {
            employee_status: Some("Inactive".into()),
            ..Default::default()
        };
        let merged = update.merge(&stored(), Role::SuperAdmin, today()).unwrap();
        assert_eq!(merged.status, Status::Inactive);
        assert_eq!(merged.last_working_day, Some(today()));

        let mut inactive = stored();
        inactive.employee_status = "Inactive".into();
        inactive.last_working_day = NaiveDate::from_ymd_opt(2024, 5, 1);
        let update = EmployeeUpdate {
            employee_status: Some("Active".into()),
            ..Default::default()
        };
        let merged = update.merge(&inactive, Role::SuperAdmin, today()).unwrap();
        assert_eq!(merged.last_working_day, None);
    }

    #[test]
    fn code_can_change() {
        let update = EmployeeUpdate {
            employee_code: Some("AL0099".into()),
            ..Default::default()
        };
        let merged = update.merge(&stored(), Role::SuperAdmin, today()).unwrap();
        assert_eq!(merged.code, "AL0099");
    }
}
