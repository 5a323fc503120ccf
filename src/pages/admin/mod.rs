mod centers;
mod employees;

use std::{fmt::Display, str::FromStr};

use axum::{
    routing::{get, post},
    Router,
};
use mysql::params;
use mysql_common::prelude::FromRow;
use serde::{Deserialize, Serialize};

use crate::{database::{Gateway, GatewayError}, AppState, Response};

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/admin/employees", get(employees::list))
        .route("/admin/employees/csv", get(employees::list_csv))
        .route("/admin/employee/:code", get(employees::detail))
        .route("/admin/employee/add", post(employees::add))
        .route("/admin/employee/update/:code", post(employees::update))
        .route("/admin/centers", get(centers::list))
        .route("/admin/center/add", post(centers::add))
        .route("/admin/center/update/:code", post(centers::update))
}

/// 员工详情标签，固定可选项
pub const USER_DETAILS: [&str; 8] = [
    "Disc & Drum R",
    "Carbon Cl",
    "Brake Testing",
    "Wash-Cl & Poli",
    "Manager",
    "Admin",
    "Accounts",
    "Engineer",
];

/// Status of an employee or a center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Status {
    #[default]
    Active,
    Inactive,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "Active",
            Status::Inactive => "Inactive",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Response;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Status::Active),
            "inactive" => Ok(Status::Inactive),
            _ => Err(Response::invalid_value(format!(
                "Status must be Active or Inactive, got `{s}`."
            ))),
        }
    }
}

pub(crate) fn parse_status(value: Option<&str>) -> Result<Option<Status>, Response> {
    value.map(str::parse).transpose()
}

pub(crate) fn check_details(value: Option<&str>) -> Result<(), Response> {
    match value {
        Some(v) if !USER_DETAILS.contains(&v) => Err(Response::invalid_value(format!(
            "Unknown user detail `{v}`."
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Default, Clone, FromRow)]
pub struct CenterInfo {
    pub center_name: Option<String>,
    pub center_location: Option<String>,
}

/// Name and location of a center; both empty when the code is unknown.
pub fn center_info(gateway: &Gateway, center_code: Option<&str>) -> Result<CenterInfo, GatewayError> {
    let Some(code) = center_code else {
        return Ok(CenterInfo::default());
    };
    let info: Option<CenterInfo> = gateway.fetch_one(
        "SELECT center_name, center_location FROM center_details WHERE center_code = :cc LIMIT 1",
        params! { "cc" => code },
    )?;
    Ok(info.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_case_insensitive() {
        assert_eq!("active".parse::<Status>().unwrap(), Status::Active);
        assert_eq!(" Inactive ".parse::<Status>().unwrap(), Status::Inactive);
        assert_eq!("retired".parse::<Status>().unwrap_err().status(), 7);
        assert_eq!(parse_status(None).unwrap(), None);
    }

    #[test]
    fn details_come_from_the_catalog() {
        assert!(check_details(Some("Brake Testing")).is_ok());
        assert!(check_details(None).is_ok());
        assert!(check_details(Some("Painter")).is_err());
    }
}
