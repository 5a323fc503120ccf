use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, NaiveDate};
use mysql::{params, Row};
use serde_json::{json, Value};

use crate::{
    libs::{csv, dser::*, photo},
    log,
    perm::Action,
    response::BodyFile,
    AppState, RequestContext, Response, ResponseResult,
};

pub fn records_router() -> Router<AppState> {
    Router::new()
        .route("/attendance/records/latest", get(latest))
        .route("/attendance/records/search", post(search))
        .route("/attendance/records/latest/csv", get(latest_csv))
        .route("/attendance/records/search/csv", post(search_csv))
        .route("/attendance/records/file/:name", get(scratch_file))
}

const LATEST_LIMIT: usize = 100;
/// Default search window when no start date is given.
const SEARCH_DAYS: i64 = 30;

/// Columns shown in tables and exports; photos are served separately.
const RECORD_COLUMNS: &str = "id, attendance_date, emp_code_of_thetechnician, name_of_technician,
    center_name, center_location, on_duty_in_time, intermidiate_off_out_time,
    intermidiate_off_in_time, on_duty_out_time, total_working_hrs, total_break_hrs,
    effective_working_hrs, all_innitial_time, last_edit_timestamp, marked_by";

/// The photo shown for a row: first of In, Out, Break Out, Break In present.
const PHOTO_COLUMN: &str = "COALESCE(on_duty_in_image, on_duty_out_image,
    intermidiate_off_out_image, intermidiate_off_in_image) AS photo";

#[derive(serde::Deserialize, Default)]
struct SearchForm {
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    employee_code: Option<String>,
    #[serde(default, deserialize_with = "deser_optional_date")]
    start: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deser_optional_date")]
    end: Option<NaiveDate>,
}

#[derive(Debug)]
struct Search {
    employee_code: Option<String>,
    start: NaiveDate,
    end: NaiveDate,
}

impl SearchForm {
    fn resolve(self, today: NaiveDate) -> Result<Search, Response> {
        let end = self.end.unwrap_or(today);
        let start = self.start.unwrap_or(end - Duration::days(SEARCH_DAYS));
        if start > end {
            return Err(Response::invalid_value("Start date must not be after end date."));
        }
        Ok(Search {
            employee_code: self.employee_code,
            start,
            end,
        })
    }
}

impl Search {
    fn query(&self, extra: &str) -> (String, mysql::Params) {
        let mut stmt = format!("SELECT {RECORD_COLUMNS}{extra} FROM preamji_attendance
            WHERE attendance_date >= :start AND attendance_date <= :end");
        match &self.employee_code {
            Some(code) => {
                stmt.push_str(" AND emp_code_of_thetechnician = :code ORDER BY id DESC");
                (
                    stmt,
                    params! { "start" => self.start, "end" => self.end, "code" => code },
                )
            }
            None => {
                stmt.push_str(" ORDER BY id DESC");
                (stmt, params! { "start" => self.start, "end" => self.end })
            }
        }
    }
}

/// Table rows plus a data URL and a scratch-file link for each row's photo.
fn with_photos(state: &AppState, rows: Vec<Row>) -> Result<Vec<Value>, Response> {
    let mut out = Vec::with_capacity(rows.len());
    for mut row in rows {
        let blob: Option<Vec<u8>> = row.take::<Option<Vec<u8>>, _>("photo").flatten();
        let mut record = csv::record(&row, &["photo"]);
        let (data_url, file) = match blob.filter(|b| !b.is_empty()) {
            Some(bytes) => {
                let png = photo::to_png(&bytes);
                let id = record.get("id").and_then(Value::as_str).unwrap_or("row").to_owned();
                let file = state.scratch.save_png(&format!("att_{id}"), &png)?;
                (
                    Some(photo::data_url(&png, photo::OutputFormat::Png)),
                    Some(format!("/attendance/records/file/{file}")),
                )
            }
            None => (None, None),
        };
        record.insert("photo".into(), json!(data_url));
        record.insert("photo_file".into(), json!(file));
        out.push(Value::Object(record));
    }
    Ok(out)
}

fn purge_scratch(state: &AppState) {
    if let Err(e) = state.scratch.purge_expired() {
        tracing::warn!("scratch purge failed: {e}");
    }
}

async fn latest(State(state): State<AppState>, ctx: RequestContext) -> ResponseResult {
    ctx.require(Action::ViewAttendanceRecords)?;
    purge_scratch(&state);
    let rows: Vec<Row> = state.gateway.fetch_all(
        &format!("SELECT {RECORD_COLUMNS}, {PHOTO_COLUMN} FROM preamji_attendance
            ORDER BY id DESC LIMIT {LATEST_LIMIT}"),
        (),
    )?;
    let records = with_photos(&state, rows)?;
    Ok(Response::ok(json!({
        "count": records.len(),
        "records": records,
    })))
}

async fn search(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(value): Json<Value>,
) -> ResponseResult {
    ctx.require(Action::ViewAttendanceRecords)?;
    purge_scratch(&state);
    let form: SearchForm = serde_json::from_value(value)?;
    let search = form.resolve(state.clock.now().await.date())?;
    let (stmt, params) = search.query(&format!(", {PHOTO_COLUMN}"));
    let rows: Vec<Row> = state.gateway.fetch_all(&stmt, params)?;
    let records = with_photos(&state, rows)?;
    log!(
        "{} searched attendance {:?} {}..{}: {} rows",
        ctx.employee_code,
        search.employee_code,
        search.start,
        search.end,
        records.len()
    );
    Ok(Response::ok(json!({
        "count": records.len(),
        "records": records,
    })))
}

fn csv_file(rows: &[Row], filename: &str) -> Result<BodyFile, Response> {
    if rows.is_empty() {
        return Err(Response::not_exist("No attendance records found."));
    }
    Ok(BodyFile::csv(csv::from_rows(rows), filename))
}

async fn latest_csv(State(state): State<AppState>, ctx: RequestContext) -> Result<BodyFile, Response> {
    ctx.require(Action::ViewAttendanceRecords)?;
    let rows: Vec<Row> = state.gateway.fetch_all(
        &format!("SELECT {RECORD_COLUMNS} FROM preamji_attendance
            ORDER BY id DESC LIMIT {LATEST_LIMIT}"),
        (),
    )?;
    csv_file(&rows, "attendance_latest_100.csv")
}

async fn search_csv(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(value): Json<Value>,
) -> Result<BodyFile, Response> {
    ctx.require(Action::ViewAttendanceRecords)?;
    let form: SearchForm = serde_json::from_value(value)?;
    let search = form.resolve(state.clock.now().await.date())?;
    let (stmt, params) = search.query("");
    let rows: Vec<Row> = state.gateway.fetch_all(&stmt, params)?;
    csv_file(&rows, "attendance_results.csv")
}

async fn scratch_file(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(name): Path<String>,
) -> Result<BodyFile, Response> {
    ctx.require(Action::ViewAttendanceRecords)?;
    let path = state
        .scratch
        .resolve(&name)
        .ok_or_else(|| Response::not_exist("The image has expired, reload the records."))?;
    let bytes = tokio::fs::read(path).await?;
    Ok(BodyFile::new(bytes, "image/png"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn search_defaults_to_the_last_thirty_days() {
        let search = SearchForm::default().resolve(day(31)).unwrap();
        assert_eq!(search.end, day(31));
        assert_eq!(search.start, day(1));
        assert!(search.employee_code.is_none());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let form: SearchForm =
            serde_json::from_str(r#"{"start": "2024-05-10", "end": "2024-05-01"}"#).unwrap();
        assert_eq!(form.resolve(day(31)).unwrap_err().status(), 7);
    }

    #[test]
    fn employee_filter_adds_a_condition() {
        let form: SearchForm =
            serde_json::from_str(r#"{"employee_code": " AL0001 ", "start": "", "end": ""}"#)
                .unwrap();
        let search = form.resolve(day(31)).unwrap();
        let (stmt, _) = search.query("");
        assert!(stmt.contains("emp_code_of_thetechnician = :code"));
        assert_eq!(search.employee_code.as_deref(), Some("AL0001"));
    }
}
