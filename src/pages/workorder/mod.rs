mod entry;
mod view;

use std::{fmt::Display, str::FromStr};

use axum::{
    routing::{delete, get, post},
    Router,
};
use chrono::{Duration, NaiveDate};
use mysql::{params, prelude::Queryable, Transaction};
use mysql_common::prelude::FromRow;
use serde::{Deserialize, Serialize};

use crate::{
    database::{Gateway, GatewayError},
    pages::{center_technicians, Technician},
    AppState, Response,
};

pub fn workorder_router() -> Router<AppState> {
    Router::new()
        .route("/workorder/technicians", get(entry::technicians))
        .route("/workorder/vehicle/manufacturers", get(entry::manufacturers))
        .route("/workorder/vehicle/models/:manufacturer", get(entry::models))
        .route("/workorder/create", post(entry::create))
        .route("/workorder/open", get(entry::open))
        .route("/workorder/closed", get(entry::closed))
        .route("/workorder/reassign", post(entry::reassign))
        .route("/workorder/close", post(entry::close))
        .route("/workorder/repeat", post(entry::repeat))
        .route("/workorder/query", post(view::query))
        .route("/workorder/query/csv", post(view::query_csv))
        .route("/workorder/photo/:id", get(view::jobcard_photo))
        .route("/workorder/detail/:id", get(view::detail))
        .route("/workorder/admin/update/:id", post(view::admin_update))
        .route("/workorder/delete/:id", delete(view::remove))
}

/// How far back a job may be assigned.
pub const ASSIGN_WINDOW_DAYS: i64 = 10;
/// How long a closed job stays eligible for repeat or revisit.
pub const REPEAT_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkorderStatus {
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Re-assigned", alias = "Re-Assigned")]
    Reassigned,
    Closed,
}

impl WorkorderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkorderStatus::InProgress => "In Progress",
            WorkorderStatus::Reassigned => "Re-assigned",
            WorkorderStatus::Closed => "Closed",
        }
    }

    /// `In Progress -> {Re-assigned, Closed}`; both targets are final for the row.
    pub fn can_become(self, next: WorkorderStatus) -> bool {
        use WorkorderStatus::*;
        matches!((self, next), (InProgress, Reassigned) | (InProgress, Closed))
    }

    pub fn transition(self, next: WorkorderStatus) -> Result<WorkorderStatus, TransitionError> {
        if self.can_become(next) {
            Ok(next)
        } else {
            Err(TransitionError::NotAllowed {
                from: self,
                to: next,
            })
        }
    }

    /// Status an administrator may leave on a row: the current one, or any
    /// table transition that is not reserved for the team leader.
    pub fn admin_edit(self, next: WorkorderStatus) -> Result<WorkorderStatus, TransitionError> {
        if next == self {
            return Ok(next);
        }
        if matches!(next, WorkorderStatus::Reassigned | WorkorderStatus::Closed) {
            return Err(TransitionError::TeamLeaderOnly(next));
        }
        self.transition(next)
    }
}

impl Display for WorkorderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkorderStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in progress" => Ok(WorkorderStatus::InProgress),
            "re-assigned" => Ok(WorkorderStatus::Reassigned),
            "closed" => Ok(WorkorderStatus::Closed),
            _ => Err(TransitionError::Unknown(s.to_owned())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("A workorder that is {from} cannot become {to}.")]
    NotAllowed {
        from: WorkorderStatus,
        to: WorkorderStatus,
    },
    #[error("Please ask the team leader to change this.")]
    TeamLeaderOnly(WorkorderStatus),
    #[error("Unknown job status `{0}`.")]
    Unknown(String),
}

impl From<TransitionError> for Response {
    fn from(value: TransitionError) -> Self {
        match value {
            TransitionError::NotAllowed { .. } => Response::conflict(value),
            TransitionError::TeamLeaderOnly(_) => Response::permission_denied_with(value),
            TransitionError::Unknown(_) => Response::invalid_value(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobcardType {
    #[serde(rename = "New Job", alias = "New workorder")]
    NewJob,
    #[serde(rename = "Repeat Repair")]
    RepeatRepair,
    #[serde(rename = "Re Visit")]
    ReVisit,
    #[serde(rename = "Re-assigned job")]
    Reassigned,
}

impl JobcardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobcardType::NewJob => "New Job",
            JobcardType::RepeatRepair => "Repeat Repair",
            JobcardType::ReVisit => "Re Visit",
            JobcardType::Reassigned => "Re-assigned job",
        }
    }
}

/// Units of each service done on the job, entered when it is closed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceCounts {
    pub wheel_alignment: u32,
    pub wheel_balancing: u32,
    pub tyre_fitting: u32,
    pub puncture_repair: u32,
    pub tpms: u32,
    pub disc_drum_cutting: u32,
    pub brake_testing: u32,
    pub carbon_cleaning: u32,
    pub washing_cleaning: u32,
    pub interior_cleaning: u32,
    pub exterior_polishing: u32,
    pub paint_protection_film: u32,
}

impl ServiceCounts {
    /// Widened so a full set of `INT UNSIGNED` counters cannot overflow.
    pub fn total(&self) -> u64 {
        [
            self.wheel_alignment,
            self.wheel_balancing,
            self.tyre_fitting,
            self.puncture_repair,
            self.tpms,
            self.disc_drum_cutting,
            self.brake_testing,
            self.carbon_cleaning,
            self.washing_cleaning,
            self.interior_cleaning,
            self.exterior_polishing,
            self.paint_protection_film,
        ]
        .into_iter()
        .map(u64::from)
        .sum()
    }
}

/// Jobcard date may not be in the future; the assign date must fall in the
/// trailing window ending today.
pub fn check_dates(jobcard_date: NaiveDate, assign_date: NaiveDate, today: NaiveDate) -> Result<(), Response> {
    if jobcard_date > today {
        return Err(Response::invalid_value("Jobcard Date cannot be a future date."));
    }
    let earliest = today - Duration::days(ASSIGN_WINDOW_DAYS);
    if assign_date > today || assign_date < earliest {
        return Err(Response::invalid_value(format!(
            "Job Assign Date must be between {earliest} and {today}."
        )));
    }
    Ok(())
}

/// Unique-index hit on the open-jobcard key.
pub(crate) fn already_open(jobcard_no: &str) -> impl Fn(GatewayError) -> Response + '_ {
    move |e| match e {
        GatewayError::Duplicate(_) => Response::already_exist(format!(
            "Jobcard {jobcard_no} is already in progress at this center."
        )),
        e => e.into(),
    }
}

/// The columns the status-changing flows lock and inspect.
#[derive(Debug, FromRow)]
pub struct WorkorderHead {
    pub id: u64,
    pub jobcard_no: String,
    pub technician_code: String,
    pub center_code: String,
    pub job_status: String,
    pub job_compleate_date: Option<NaiveDate>,
    pub delete_flag: i8,
}

impl WorkorderHead {
    pub const COLUMNS: &'static str =
        "id, jobcard_no, technician_code, center_code, job_status, job_compleate_date, delete_flag";

    pub fn status(&self) -> Result<WorkorderStatus, TransitionError> {
        self.job_status.parse()
    }

    /// Locks the row for the rest of the transaction. Deleted rows and rows
    /// of other centers read as missing.
    pub fn lock(tx: &mut Transaction<'_>, id: u64, center_code: &str) -> Result<Self, Response> {
        let head: Option<WorkorderHead> = tx
            .exec_first(
                format!("SELECT {} FROM workorder_entry WHERE id = :id FOR UPDATE", Self::COLUMNS),
                params! { "id" => id },
            )
            .map_err(GatewayError::from)?;
        head.filter(|h| h.delete_flag == 0 && h.center_code == center_code)
            .ok_or_else(|| Response::not_exist(format!("Workorder {id} was not found at your center.")))
    }
}

/// An active technician of `center_code`.
pub fn center_technician(
    gateway: &Gateway,
    center_code: &str,
    code: &str,
) -> Result<Technician, Response> {
    center_technicians(gateway, center_code, None)?
        .into_iter()
        .find(|t| t.employee_code == code)
        .ok_or_else(|| {
            Response::not_exist(format!(
                "Technician {code} is not an active technician of your center."
            ))
        })
}

#[derive(Debug, Clone, FromRow)]
pub struct CenterRow {
    pub center_code: String,
    pub center_name: Option<String>,
    pub center_location: Option<String>,
}

pub fn center_row(gateway: &Gateway, center_code: &str) -> Result<CenterRow, GatewayError> {
    let row: Option<CenterRow> = gateway.fetch_one(
        "SELECT center_code, center_name, center_location FROM center_details WHERE center_code = :cc",
        params! { "cc" => center_code },
    )?;
    Ok(row.unwrap_or(CenterRow {
        center_code: center_code.to_owned(),
        center_name: None,
        center_location: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn only_open_jobs_change_status() {
        use WorkorderStatus::*;
        assert_eq!(InProgress.transition(Closed).unwrap(), Closed);
        assert_eq!(InProgress.transition(Reassigned).unwrap(), Reassigned);
        assert!(Closed.transition(InProgress).is_err());
        assert!(Reassigned.transition(Closed).is_err());
        assert!(InProgress.transition(InProgress).is_err());
    }

    #[test]
    fn admin_cannot_close_or_reassign() {
        use WorkorderStatus::*;
        let err = InProgress.admin_edit(Closed).unwrap_err();
        assert!(matches!(err, TransitionError::TeamLeaderOnly(Closed)));
        let response: Response = err.into();
        assert_eq!(response.status(), 4);
        assert_eq!(
            response.data(),
            &serde_json::json!("Please ask the team leader to change this.")
        );
        assert!(InProgress.admin_edit(Reassigned).is_err());
        assert_eq!(Closed.admin_edit(Closed).unwrap(), Closed);
        assert!(Closed.admin_edit(InProgress).is_err());
    }

    #[test]
    fn status_text_round_trips_through_the_column() {
        for status in [
            WorkorderStatus::InProgress,
            WorkorderStatus::Reassigned,
            WorkorderStatus::Closed,
        ] {
            assert_eq!(status.as_str().parse::<WorkorderStatus>().unwrap(), status);
        }
        assert_eq!(
            "Re-Assigned".parse::<WorkorderStatus>().unwrap(),
            WorkorderStatus::Reassigned
        );
        assert!("Completed".parse::<WorkorderStatus>().is_err());
    }

    #[test]
    fn future_jobcard_dates_are_rejected() {
        let err = check_dates(day(11), day(10), day(10)).unwrap_err();
        assert_eq!(err.data(), &serde_json::json!("Jobcard Date cannot be a future date."));
    }

    #[test]
    fn assign_date_window_is_ten_days() {
        assert!(check_dates(day(1), day(1), day(11)).is_ok());
        assert!(check_dates(day(1), day(11), day(11)).is_ok());
        assert!(check_dates(day(1), day(1), day(12)).is_err());
        assert!(check_dates(day(1), day(12), day(11)).is_err());
    }

    #[test]
    fn counts_default_to_zero_and_reject_negatives() {
        let counts: ServiceCounts = serde_json::from_str(r#"{"tpms": 2, "wheel_alignment": 0}"#).unwrap();
        assert_eq!(counts.tpms, 2);
        assert_eq!(counts.total(), 2);
        assert!(serde_json::from_str::<ServiceCounts>(r#"{"tpms": -1}"#).is_err());
    }

    #[test]
    fn large_counts_total_without_overflow() {
        let counts = ServiceCounts {
            tpms: 3_000_000_000,
            wheel_alignment: 3_000_000_000,
            paint_protection_film: u32::MAX,
            ..Default::default()
        };
        assert_eq!(counts.total(), 6_000_000_000 + u64::from(u32::MAX));
    }

    #[test]
    fn duplicate_open_jobcard_reads_as_already_in_progress() {
        let response = already_open("JC-7")(GatewayError::Duplicate("uq_open_jobcard".into()));
        assert_eq!(response.status(), 3);
        assert_eq!(
            response.data(),
            &serde_json::json!("Jobcard JC-7 is already in progress at this center.")
        );
        let response = already_open("JC-7")(GatewayError::Database(mysql::Error::DriverError(
            mysql::DriverError::PacketOutOfSync,
        )));
        assert_eq!(response.status(), -1);
    }

    #[test]
    fn jobcard_type_labels() {
        let ty: JobcardType = serde_json::from_str(r#""Re Visit""#).unwrap();
        assert_eq!(ty, JobcardType::ReVisit);
        assert_eq!(JobcardType::Reassigned.as_str(), "Re-assigned job");
    }
}
