use axum::{
    extract::{Path, State},
    Json,
};
use mysql::params;
use mysql_common::prelude::FromRow;
use serde_json::{json, Value};

use super::{parse_status, Status};
use crate::{
    database::{exec_affected, GatewayError},
    libs::dser::deser_empty_to_none,
    log,
    perm::Action,
    AppState, RequestContext, Response, ResponseResult,
};

#[derive(Debug, Clone, serde::Serialize, FromRow)]
pub struct Center {
    center_code: String,
    center_name: String,
    center_location: Option<String>,
    center_type: Option<String>,
    status: Option<String>,
}

#[derive(serde::Deserialize, Default)]
struct CenterForm {
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    center_code: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    center_name: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    center_location: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    center_type: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    status: Option<String>,
}

impl CenterForm {
    fn into_new(self) -> Result<Center, Response> {
        let (Some(center_code), Some(center_name)) = (self.center_code, self.center_name) else {
            return Err(Response::invalid_value("Center code and name are required."));
        };
        let status = parse_status(self.status.as_deref())?.unwrap_or_default();
        Ok(Center {
            center_code,
            center_name,
            center_location: self.center_location,
            center_type: self.center_type,
            status: Some(status.to_string()),
        })
    }

    /// Blank fields keep what is stored.
    fn apply(self, current: &Center) -> Result<Center, Response> {
        let status = match parse_status(self.status.as_deref())? {
            Some(status) => Some(status.to_string()),
            None => current.status.clone(),
        };
        Ok(Center {
            center_code: self.center_code.unwrap_or_else(|| current.center_code.clone()),
            center_name: self.center_name.unwrap_or_else(|| current.center_name.clone()),
            center_location: self.center_location.or_else(|| current.center_location.clone()),
            center_type: self.center_type.or_else(|| current.center_type.clone()),
            status,
        })
    }
}

fn duplicate_code(e: GatewayError) -> Response {
    match e {
        GatewayError::Duplicate(_) => Response::already_exist("Center code already exists."),
        e => e.into(),
    }
}

pub async fn list(State(state): State<AppState>, ctx: RequestContext) -> ResponseResult {
    ctx.require(Action::ManageCenters)?;
    let centers: Vec<Center> = state.gateway.fetch_all(
        "SELECT center_code, center_name, center_location, center_type, status
        FROM center_details ORDER BY center_code",
        (),
    )?;
    Ok(Response::ok(json!(centers)))
}

pub async fn add(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(value): Json<Value>,
) -> ResponseResult {
    ctx.require(Action::ManageCenters)?;
    let form: CenterForm = serde_json::from_value(value)?;
    let center = form.into_new()?;
    state
        .gateway
        .execute(
            "INSERT INTO center_details (center_code, center_name, center_location, center_type, status)
            VALUES (:code, :name, :location, :ty, :status)",
            params! {
                "code" => &center.center_code,
                "name" => &center.center_name,
                "location" => &center.center_location,
                "ty" => &center.center_type,
                "status" => &center.status,
            },
        )
        .map_err(duplicate_code)?;
    log!("{} added center {}", ctx.employee_code, center.center_code);
    Ok(Response::ok(json!("Center added successfully.")))
}

pub async fn update(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(code): Path<String>,
    Json(value): Json<Value>,
) -> ResponseResult {
    ctx.require(Action::ManageCenters)?;
    let form: CenterForm = serde_json::from_value(value)?;
    let current: Option<Center> = state.gateway.fetch_one(
        "SELECT center_code, center_name, center_location, center_type, status
        FROM center_details WHERE center_code = :code",
        params! { "code" => code.trim() },
    )?;
    let current = op::some!(current; ret Err(Response::not_exist("No such center.")));
    let center = form.apply(&current)?;

    // Employees keep a copy of their center's code, name and location.
    let moved = state
        .gateway
        .transaction(|tx| {
            exec_affected(
                tx,
                "UPDATE center_details SET
                    center_code = :new_code,
                    center_name = :name,
                    center_location = :location,
                    center_type = :ty,
                    status = :status
                WHERE center_code = :orig_code",
                params! {
                    "new_code" => &center.center_code,
                    "name" => &center.center_name,
                    "location" => &center.center_location,
                    "ty" => &center.center_type,
                    "status" => &center.status,
                    "orig_code" => &current.center_code,
                },
            )?;
            exec_affected(
                tx,
                "UPDATE employee_details SET
                    center_code = :new_code,
                    center_name = :name,
                    center_location = :location
                WHERE center_code = :orig_code",
                params! {
                    "new_code" => &center.center_code,
                    "name" => &center.center_name,
                    "location" => &center.center_location,
                    "orig_code" => &current.center_code,
                },
            )
        })
        .map_err(duplicate_code)?;
    log!(
        "{} updated center {} -> {} ({moved} employees)",
        ctx.employee_code,
        current.center_code,
        center.center_code
    );
    Ok(Response::ok(json!("Center updated successfully.")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> Center {
        Center {
            center_code: "C01".into(),
            center_name: "Chennai".into(),
            center_location: Some("Guindy".into()),
            center_type: Some("Workshop".into()),
            status: Some("Active".into()),
        }
    }

    #[test]
    fn new_center_needs_code_and_name() {
        let form: CenterForm = serde_json::from_str(r#"{"center_code": "C02"}"#).unwrap();
        assert_eq!(
            form.into_new().unwrap_err().data(),
            &json!("Center code and name are required.")
        );
        let form: CenterForm =
            serde_json::from_str(r#"{"center_code": "C02", "center_name": "Madurai"}"#).unwrap();
        assert_eq!(form.into_new().unwrap().status.as_deref(), Some("Active"));
    }

    #[test]
    fn edit_keeps_blank_fields() {
        let form: CenterForm =
            serde_json::from_str(r#"{"center_code": "", "center_name": "Chennai South", "status": "Inactive"}"#)
                .unwrap();
        let center = form.apply(&stored()).unwrap();
        assert_eq!(center.center_code, "C01");
        assert_eq!(center.center_name, "Chennai South");
        assert_eq!(center.center_location.as_deref(), Some("Guindy"));
        assert_eq!(center.status.as_deref(), Some(Status::Inactive.as_str()));
    }
}
