//! Attendance state tracker.
//!
//! One row per employee per day in `preamji_attendance`. Punches fill the four
//! (time, image) slots in the fixed order In, Break Out, Break In, Out; the
//! next punch is always the first empty slot. Totals are written together with
//! the Out punch and never before.

mod punch;
mod records;

use std::{fmt::Display, str::FromStr};

use axum::{
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, NaiveDateTime};
use mysql::{params, prelude::Queryable, Transaction};
use serde::{Deserialize, Serialize};

use crate::{
    database::{exec_affected, Gateway, GatewayError},
    AppState, Response,
};

pub fn attendance_router() -> Router<AppState> {
    Router::new()
        .route("/attendance/today", get(punch::today))
        .route("/attendance/punch", post(punch::punch))
        .route("/attendance/image/:punch", get(punch::image))
        .route("/attendance/image/:code/:punch", get(punch::image_for))
        .route("/attendance/technicians", get(punch::technicians))
        .route("/attendance/today/:code", get(punch::today_for))
        .route("/attendance/punch/:code", post(punch::punch_for))
        .merge(records::records_router())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Punch {
    In,
    BreakOut,
    BreakIn,
    Out,
}

impl Punch {
    pub const ORDER: [Punch; 4] = [Punch::In, Punch::BreakOut, Punch::BreakIn, Punch::Out];

    pub fn label(&self) -> &'static str {
        match self {
            Punch::In => "On Duty In",
            Punch::BreakOut => "Break Out",
            Punch::BreakIn => "Break In",
            Punch::Out => "On Duty Out",
        }
    }

    pub fn time_column(&self) -> &'static str {
        match self {
            Punch::In => "on_duty_in_time",
            Punch::BreakOut => "intermidiate_off_out_time",
            Punch::BreakIn => "intermidiate_off_in_time",
            Punch::Out => "on_duty_out_time",
        }
    }

    pub fn image_column(&self) -> &'static str {
        match self {
            Punch::In => "on_duty_in_image",
            Punch::BreakOut => "intermidiate_off_out_image",
            Punch::BreakIn => "intermidiate_off_in_image",
            Punch::Out => "on_duty_out_image",
        }
    }

    pub fn previous(&self) -> Option<Punch> {
        match self {
            Punch::In => None,
            Punch::BreakOut => Some(Punch::In),
            Punch::BreakIn => Some(Punch::BreakOut),
            Punch::Out => Some(Punch::BreakIn),
        }
    }
}

impl Display for Punch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Punch {
    type Err = Response;

    /// Accepts both the path form (`break_out`) and the label (`Break Out`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Punch::ORDER
            .into_iter()
            .find(|p| {
                p.label().eq_ignore_ascii_case(s)
                    || serde_json::to_value(p).is_ok_and(|v| v.as_str() == Some(s))
            })
            .ok_or_else(|| Response::invalid_value(format!("Unknown punch `{s}`.")))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PunchError {
    #[error("All attendance for today completed!")]
    DayComplete,
    #[error("Next punch is {expected}, not {requested}.")]
    OutOfOrder { expected: Punch, requested: Punch },
    #[error("{0} was just recorded by another request, please reload.")]
    Superseded(Punch),
    #[error("This photo was already submitted.")]
    RepeatCapture,
}

impl From<PunchError> for Response {
    fn from(value: PunchError) -> Self {
        match value {
            PunchError::DayComplete => Response::already_exist(value),
            PunchError::OutOfOrder { .. } => Response::invalid_value(value),
            PunchError::Superseded(_) | PunchError::RepeatCapture => Response::conflict(value),
        }
    }
}

/// The four punch instants of one attendance row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PunchTimes {
    #[serde(serialize_with = "crate::libs::dser::serialize_datetime")]
    pub on_duty_in: Option<NaiveDateTime>,
    #[serde(serialize_with = "crate::libs::dser::serialize_datetime")]
    pub break_out: Option<NaiveDateTime>,
    #[serde(serialize_with = "crate::libs::dser::serialize_datetime")]
    pub break_in: Option<NaiveDateTime>,
    #[serde(serialize_with = "crate::libs::dser::serialize_datetime")]
    pub on_duty_out: Option<NaiveDateTime>,
}

impl PunchTimes {
    pub fn get(&self, punch: Punch) -> Option<NaiveDateTime> {
        match punch {
            Punch::In => self.on_duty_in,
            Punch::BreakOut => self.break_out,
            Punch::BreakIn => self.break_in,
            Punch::Out => self.on_duty_out,
        }
    }

    pub fn with(mut self, punch: Punch, at: NaiveDateTime) -> Self {
        let slot = match punch {
            Punch::In => &mut self.on_duty_in,
            Punch::BreakOut => &mut self.break_out,
            Punch::BreakIn => &mut self.break_in,
            Punch::Out => &mut self.on_duty_out,
        };
        *slot = Some(at);
        self
    }

    /// First empty slot in the fixed order; `None` once the day is complete.
    pub fn next_punch(&self) -> Option<Punch> {
        Punch::ORDER.into_iter().find(|p| self.get(*p).is_none())
    }

    /// Validates a punch request against the current state. Without an
    /// explicit request the next slot is taken.
    pub fn accept(&self, requested: Option<Punch>) -> Result<Punch, PunchError> {
        let expected = self.next_punch().ok_or(PunchError::DayComplete)?;
        match requested {
            Some(requested) if requested != expected => {
                Err(PunchError::OutOfOrder { expected, requested })
            }
            _ => Ok(expected),
        }
    }
}

fn hours_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_milliseconds() as f64 / 3_600_000.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Derived hours stored with the Out punch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WorkTotals {
    pub total_working_hrs: f64,
    pub total_break_hrs: f64,
    pub effective_working_hrs: f64,
}

impl WorkTotals {
    /// Needs both In and Out; the break counts only when both break punches
    /// exist. Each figure is rounded to two decimals.
    pub fn compute(times: &PunchTimes) -> Option<Self> {
        let working = hours_between(times.on_duty_in?, times.on_duty_out?);
        let brk = match (times.break_out, times.break_in) {
            (Some(out), Some(back)) => hours_between(out, back),
            _ => 0.0,
        };
        Some(Self {
            total_working_hrs: round2(working),
            total_break_hrs: round2(brk),
            effective_working_hrs: round2(working - brk),
        })
    }
}

/// The employee a punch is recorded for.
#[derive(Debug, Clone, Serialize, mysql_common::prelude::FromRow)]
pub struct Subject {
    pub employee_code: String,
    pub employee_name: String,
    pub center_code: Option<String>,
    pub center_name: Option<String>,
    pub center_location: Option<String>,
    pub user_role: String,
    pub employee_status: Option<String>,
}

impl Subject {
    pub fn is_active(&self) -> bool {
        !matches!(
            self.employee_status
                .as_deref()
                .map(|s| s.trim().to_ascii_lowercase())
                .as_deref(),
            Some("inactive" | "0" | "false")
        )
    }

    pub fn load(gateway: &Gateway, code: &str) -> Result<Option<Self>, GatewayError> {
        gateway.fetch_one(
            "SELECT employee_code, employee_name, center_code, center_name, center_location,
                user_role, employee_status
            FROM employee_details WHERE employee_code = :code",
            params! { "code" => code },
        )
    }
}

type DayRow = (
    u64,
    Option<NaiveDateTime>,
    Option<NaiveDateTime>,
    Option<NaiveDateTime>,
    Option<NaiveDateTime>,
);

const DAY_TIMES: &str = "SELECT id, on_duty_in_time, intermidiate_off_out_time,
        intermidiate_off_in_time, on_duty_out_time
    FROM preamji_attendance
    WHERE emp_code_of_thetechnician = :code AND attendance_date = :day";

fn times_of(row: &DayRow) -> PunchTimes {
    PunchTimes {
        on_duty_in: row.1,
        break_out: row.2,
        break_in: row.3,
        on_duty_out: row.4,
    }
}

pub fn day_times(
    gateway: &Gateway,
    code: &str,
    day: NaiveDate,
) -> Result<Option<(u64, PunchTimes)>, GatewayError> {
    let row: Option<DayRow> =
        gateway.fetch_one(DAY_TIMES, params! { "code" => code, "day" => day })?;
    Ok(row.map(|r| (r.0, times_of(&r))))
}

#[derive(Debug, Serialize)]
pub struct PunchOutcome {
    pub punch: Punch,
    pub label: &'static str,
    #[serde(serialize_with = "crate::libs::dser::serialize_datetime")]
    pub at: Option<NaiveDateTime>,
    pub next: Option<Punch>,
    pub totals: Option<WorkTotals>,
}

/// Stores one punch for `subject` on `at`'s date.
///
/// The day row is locked first; the write itself is conditional on the slot
/// still being empty (and its predecessor filled), so a concurrent punch makes
/// this one fail with [`PunchError::Superseded`] instead of overwriting.
pub fn record_punch(
    gateway: &Gateway,
    subject: &Subject,
    requested: Option<Punch>,
    at: NaiveDateTime,
    photo: &[u8],
    marked_by: &str,
) -> Result<PunchOutcome, Response> {
    let day = at.date();
    gateway.transaction(|tx| {
        let row: Option<DayRow> = tx
            .exec_first(
                format!("{DAY_TIMES} FOR UPDATE"),
                params! { "code" => &subject.employee_code, "day" => day },
            )
            .map_err(GatewayError::from)?;
        let times = row.as_ref().map(times_of).unwrap_or_default();
        let punch = times.accept(requested)?;
        let after = times.with(punch, at);
        let totals = op::ternary!(punch == Punch::Out => WorkTotals::compute(&after); None);
        match row {
            None => insert_first(tx, subject, punch, at, photo, marked_by)?,
            Some((id, ..)) => update_slot(tx, id, punch, at, photo, marked_by, totals)?,
        }
        Ok::<_, Response>(PunchOutcome {
            punch,
            label: punch.label(),
            at: Some(at),
            next: after.next_punch(),
            totals,
        })
    })
}

fn insert_first(
    tx: &mut Transaction<'_>,
    subject: &Subject,
    punch: Punch,
    at: NaiveDateTime,
    photo: &[u8],
    marked_by: &str,
) -> Result<(), Response> {
    let stmt = format!(
        "INSERT INTO preamji_attendance (attendance_date, emp_code_of_thetechnician,
            name_of_technician, center_name, center_location, {}, {},
            all_innitial_time, last_edit_timestamp, marked_by)
        VALUES (:day, :code, :name, :center_name, :center_location, :at, :image,
            :at, :at, :marked_by)",
        punch.time_column(),
        punch.image_column()
    );
    let result = exec_affected(
        tx,
        &stmt,
        params! {
            "day" => at.date(),
            "code" => &subject.employee_code,
            "name" => &subject.employee_name,
            "center_name" => &subject.center_name,
            "center_location" => &subject.center_location,
            "at" => at,
            "image" => photo,
            "marked_by" => marked_by,
        },
    );
    match result {
        Ok(_) => Ok(()),
        // another request created today's row after our locking read
        Err(GatewayError::Duplicate(_)) => Err(PunchError::Superseded(punch).into()),
        Err(e) => Err(e.into()),
    }
}

fn update_slot(
    tx: &mut Transaction<'_>,
    id: u64,
    punch: Punch,
    at: NaiveDateTime,
    photo: &[u8],
    marked_by: &str,
    totals: Option<WorkTotals>,
) -> Result<(), Response> {
    let time_col = punch.time_column();
    let guard = match punch.previous() {
        Some(prev) => format!(" AND {} IS NOT NULL", prev.time_column()),
        None => String::new(),
    };
    let stmt = format!(
        "UPDATE preamji_attendance
        SET {time_col} = :at, {} = :image, last_edit_timestamp = :at, marked_by = :marked_by
        WHERE id = :id AND {time_col} IS NULL{guard}",
        punch.image_column()
    );
    let affected = exec_affected(
        tx,
        &stmt,
        params! {
            "id" => id,
            "at" => at,
            "image" => photo,
            "marked_by" => marked_by,
        },
    )?;
    if affected == 0 {
        return Err(PunchError::Superseded(punch).into());
    }
    if let Some(totals) = totals {
        exec_affected(
            tx,
            "UPDATE preamji_attendance
            SET total_working_hrs = :tw, total_break_hrs = :tb, effective_working_hrs = :ew
            WHERE id = :id",
            params! {
                "id" => id,
                "tw" => totals.total_working_hrs,
                "tb" => totals.total_break_hrs,
                "ew" => totals.effective_working_hrs,
            },
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn punches_follow_the_fixed_order() {
        let mut times = PunchTimes::default();
        let mut seen = vec![];
        while let Some(next) = times.next_punch() {
            seen.push(next);
            times = times.with(next, at(9, 0));
        }
        assert_eq!(seen, Punch::ORDER.to_vec());
        assert_eq!(times.accept(None), Err(PunchError::DayComplete));
    }

    #[test]
    fn out_of_order_request_is_rejected() {
        let times = PunchTimes::default().with(Punch::In, at(9, 0));
        assert_eq!(
            times.accept(Some(Punch::Out)),
            Err(PunchError::OutOfOrder {
                expected: Punch::BreakOut,
                requested: Punch::Out
            })
        );
        assert_eq!(times.accept(Some(Punch::BreakOut)), Ok(Punch::BreakOut));
        assert_eq!(times.accept(None), Ok(Punch::BreakOut));
    }

    #[test]
    fn repeated_punch_is_rejected() {
        let times = PunchTimes::default().with(Punch::In, at(9, 0));
        assert!(matches!(
            times.accept(Some(Punch::In)),
            Err(PunchError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn a_gap_is_filled_before_later_slots() {
        // a row written out of order by hand still yields the earliest gap
        let times = PunchTimes::default()
            .with(Punch::In, at(9, 0))
            .with(Punch::Out, at(18, 0));
        assert_eq!(times.next_punch(), Some(Punch::BreakOut));
    }

    #[test]
    fn full_day_totals() {
        let times = PunchTimes::default()
            .with(Punch::In, at(9, 0))
            .with(Punch::BreakOut, at(13, 0))
            .with(Punch::BreakIn, at(13, 30))
            .with(Punch::Out, at(18, 0));
        let totals = WorkTotals::compute(&times).unwrap();
        assert_eq!(totals.total_working_hrs, 9.0);
        assert_eq!(totals.total_break_hrs, 0.5);
        assert_eq!(totals.effective_working_hrs, 8.5);
    }

    #[test]
    fn totals_need_out_and_break_needs_both_ends() {
        let partial = PunchTimes::default()
            .with(Punch::In, at(9, 0))
            .with(Punch::BreakOut, at(13, 0));
        assert!(WorkTotals::compute(&partial).is_none());

        let no_break_back = partial.with(Punch::Out, at(17, 20));
        let totals = WorkTotals::compute(&no_break_back).unwrap();
        assert_eq!(totals.total_break_hrs, 0.0);
        assert_eq!(totals.total_working_hrs, 8.33);
        assert_eq!(totals.effective_working_hrs, 8.33);
    }

    #[test]
    fn punch_names_parse_from_path_and_label() {
        assert_eq!("break_out".parse::<Punch>().unwrap(), Punch::BreakOut);
        assert_eq!("On Duty Out".parse::<Punch>().unwrap(), Punch::Out);
        assert!("lunch".parse::<Punch>().is_err());
    }

    #[test]
    fn inactive_subjects_are_detected() {
        let mut subject = Subject {
            employee_code: "AL0002".into(),
            employee_name: "Arun".into(),
            center_code: Some("C01".into()),
            center_name: None,
            center_location: None,
            user_role: "Technician".into(),
            employee_status: Some("Active".into()),
        };
        assert!(subject.is_active());
        subject.employee_status = Some(" inactive ".into());
        assert!(!subject.is_active());
        subject.employee_status = None;
        assert!(subject.is_active());
    }

    #[test]
    fn errors_map_to_business_statuses() {
        assert_eq!(Response::from(PunchError::DayComplete).status(), 3);
        assert_eq!(Response::from(PunchError::Superseded(Punch::In)).status(), 8);
        assert_eq!(
            Response::from(PunchError::OutOfOrder {
                expected: Punch::In,
                requested: Punch::Out
            })
            .status(),
            7
        );
    }
}
