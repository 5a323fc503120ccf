use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use chrono::{Duration, NaiveDate};
use mysql::{params, Row};
use serde_json::{json, Value};

use super::{already_open, center_technician, JobcardType, WorkorderHead, WorkorderStatus};
use crate::{
    libs::{csv, dser::*, parse_multipart, photo},
    log,
    perm::Action,
    response::BodyFile,
    AppState, RequestContext, Response, ResponseResult,
};

/// Default look-back of the query form.
const QUERY_DAYS: i64 = 7;

const QUERY_COLUMNS: &str = "id, jobcard_no, jobcard_type, technician_code, name_of_technician,
    previous_jobcard_no, job_status, job_assign_date, job_compleate_date, center_code";

/// Every column except the photo blob and the generated key.
const DETAIL_COLUMNS: &str = "id, jobcard_type, technician_code, name_of_technician,
    previous_jobcard_no, vehicle_registration_no, vehicle_manufacturer, vehicle_model,
    vehicle_variant, jobcard_no, jobcard_date, job_assign_date, kilometres,
    name_of_service_advisor, center_code, center_name, center_location, job_start_time,
    job_compleate_date, job_compleate_time, tl_id, tl_last_update, tl_remarks, admin_id,
    admin_remarks, admin_last_update_time, job_status, wheel_alignment, wheel_balancing,
    tyre_fitting, puncture_repair, tpms, disc_drum_cutting, brake_testing, carbon_cleaning,
    washing_cleaning, interior_cleaning, exterior_polishing, paint_protection_film";

/// Team leaders only see their own center.
fn scope(ctx: &RequestContext) -> Result<Option<&str>, Response> {
    if ctx.role.is_admin() {
        Ok(None)
    } else {
        ctx.center().map(Some)
    }
}

fn photo_link(id: &str) -> String {
    format!("/workorder/photo/{id}")
}

#[derive(serde::Deserialize, Default)]
struct QueryForm {
    #[serde(default, deserialize_with = "deser_optional_date")]
    from: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deser_optional_date")]
    to: Option<NaiveDate>,
}

#[derive(Debug, PartialEq)]
struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl QueryForm {
    fn resolve(&self, today: NaiveDate) -> Result<DateRange, Response> {
        let to = self.to.unwrap_or(today);
        let from = self.from.unwrap_or(to - Duration::days(QUERY_DAYS));
        if to > today {
            return Err(Response::invalid_value("To Date cannot be a future date."));
        }
        if from > to {
            return Err(Response::invalid_value("From Date cannot be greater than To Date."));
        }
        Ok(DateRange { from, to })
    }
}

impl DateRange {
    fn query(&self, extra: &str, center: Option<&str>) -> (String, mysql::Params) {
        let base = format!(
            "SELECT {QUERY_COLUMNS}{extra} FROM workorder_entry
            WHERE job_assign_date BETWEEN :from AND :to AND delete_flag = 0"
        );
        match center {
            Some(center) => (
                format!("{base} AND center_code = :cc ORDER BY job_assign_date DESC, id DESC"),
                params! { "from" => self.from, "to" => self.to, "cc" => center },
            ),
            None => (
                format!("{base} ORDER BY job_assign_date DESC, id DESC"),
                params! { "from" => self.from, "to" => self.to },
            ),
        }
    }
}

async fn query_rows(
    state: &AppState,
    ctx: &RequestContext,
    value: Value,
    extra: &str,
) -> Result<Vec<Row>, Response> {
    ctx.require(Action::QueryWorkorders)?;
    let form: QueryForm = serde_json::from_value(value)?;
    let range = form.resolve(state.clock.now().await.date())?;
    let (stmt, params) = range.query(extra, scope(ctx)?);
    Ok(state.gateway.fetch_all(&stmt, params)?)
}

pub async fn query(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(value): Json<Value>,
) -> ResponseResult {
    let rows = query_rows(&state, &ctx, value, ", jobcard_photo IS NOT NULL AS has_photo").await?;
    if rows.is_empty() {
        return Err(Response::not_exist("No workorders found for the selected date range."));
    }
    let list: Vec<Value> = rows
        .iter()
        .map(|row| {
            let mut record = csv::record(row, &["has_photo"]);
            let has_photo = row.get::<Option<i64>, _>("has_photo").flatten() == Some(1);
            let link = match record.get("id").and_then(Value::as_str) {
                Some(id) if has_photo => json!(photo_link(id)),
                _ => Value::Null,
            };
            record.insert("jobcard_photo".into(), link);
            Value::Object(record)
        })
        .collect();
    Ok(Response::ok(json!({
        "count": list.len(),
        "workorders": list,
    })))
}

pub async fn query_csv(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(value): Json<Value>,
) -> Result<BodyFile, Response> {
    let rows = query_rows(&state, &ctx, value, "").await?;
    if rows.is_empty() {
        return Err(Response::not_exist("No workorders found for the selected date range."));
    }
    Ok(BodyFile::csv(csv::from_rows(&rows), "workorders.csv"))
}

pub async fn jobcard_photo(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<u64>,
) -> Result<BodyFile, Response> {
    ctx.require(Action::QueryWorkorders)?;
    let row: Option<(Option<Vec<u8>>, String)> = state.gateway.fetch_one(
        "SELECT jobcard_photo, center_code FROM workorder_entry WHERE id = :id AND delete_flag = 0",
        params! { "id" => id },
    )?;
    let (blob, center_code) = op::some!(row; ret Err(Response::not_exist("No such workorder.")));
    if let Some(center) = scope(&ctx)? {
        if center != center_code {
            return Err(Response::permission_denied());
        }
    }
    match blob.filter(|b| !b.is_empty()) {
        Some(bytes) => {
            let mime = photo::sniff_mime(&bytes);
            Ok(BodyFile::new(bytes, mime))
        }
        None => Err(Response::not_exist("This workorder has no jobcard photo.")),
    }
}

pub async fn detail(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<u64>,
) -> ResponseResult {
    ctx.require(Action::EditWorkorder)?;
    let row: Option<Row> = state.gateway.fetch_one(
        &format!(
            "SELECT {DETAIL_COLUMNS}, jobcard_photo IS NOT NULL AS has_photo
            FROM workorder_entry WHERE id = :id AND delete_flag = 0"
        ),
        params! { "id" => id },
    )?;
    let row = op::some!(row; ret Err(Response::not_exist("Unable to load workorder details.")));
    let mut record = csv::record(&row, &["has_photo"]);
    let has_photo = row.get::<Option<i64>, _>("has_photo").flatten() == Some(1);
    record.insert(
        "jobcard_photo".into(),
        op::ternary!(has_photo => json!(photo_link(&id.to_string())); Value::Null),
    );
    Ok(Response::ok(Value::Object(record)))
}

#[derive(serde::Deserialize, Default)]
struct AdminUpdateForm {
    #[serde(default)]
    jobcard_type: Option<JobcardType>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    technician_code: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    vehicle_registration_no: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    vehicle_manufacturer: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    vehicle_model: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    vehicle_variant: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    jobcard_no: Option<String>,
    #[serde(default, deserialize_with = "deser_optional_date")]
    jobcard_date: Option<NaiveDate>,
    #[serde(default)]
    kilometres: Option<u32>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    name_of_service_advisor: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    job_status: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    admin_remarks: Option<String>,
}

impl AdminUpdateForm {
    /// The status the row ends with; blank keeps the current one.
    fn next_status(&self, current: WorkorderStatus, today: NaiveDate) -> Result<WorkorderStatus, Response> {
        if self.jobcard_date.is_some_and(|d| d > today) {
            return Err(Response::invalid_value("Jobcard Date cannot be a future date."));
        }
        let next = match self.job_status.as_deref() {
            Some(s) => s.parse::<WorkorderStatus>()?,
            None => current,
        };
        Ok(current.admin_edit(next)?)
    }
}

pub async fn admin_update(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<u64>,
    multipart: Multipart,
) -> ResponseResult {
    ctx.require(Action::EditWorkorder)?;
    let part = parse_multipart(multipart).await?;
    let form: AdminUpdateForm = part.data()?;
    let new_photo = part.first_file().map(|f| f.bytes.clone());

    let head: Option<WorkorderHead> = state.gateway.fetch_one(
        &format!(
            "SELECT {} FROM workorder_entry WHERE id = :id AND delete_flag = 0",
            WorkorderHead::COLUMNS
        ),
        params! { "id" => id },
    )?;
    let head = op::some!(head; ret Err(Response::not_exist("Unable to load workorder details.")));
    let current = head.status()?;
    let now = state.clock.now().await;
    let next = form.next_status(current, now.date())?;
    let tech = match form.technician_code.as_deref() {
        Some(code) => Some(center_technician(&state.gateway, &head.center_code, code)?),
        None => None,
    };
    let jobcard_no = form.jobcard_no.clone().unwrap_or_else(|| head.jobcard_no.clone());

    let changed = state
        .gateway
        .execute(
            "UPDATE workorder_entry SET
                jobcard_type = COALESCE(:jobcard_type, jobcard_type),
                technician_code = COALESCE(:technician_code, technician_code),
                name_of_technician = COALESCE(:name_of_technician, name_of_technician),
                jobcard_photo = COALESCE(:photo, jobcard_photo),
                vehicle_registration_no = COALESCE(:vehicle_registration_no, vehicle_registration_no),
                vehicle_manufacturer = COALESCE(:vehicle_manufacturer, vehicle_manufacturer),
                vehicle_model = COALESCE(:vehicle_model, vehicle_model),
                vehicle_variant = COALESCE(:vehicle_variant, vehicle_variant),
                jobcard_no = COALESCE(:jobcard_no, jobcard_no),
                jobcard_date = COALESCE(:jobcard_date, jobcard_date),
                kilometres = COALESCE(:kilometres, kilometres),
                name_of_service_advisor = COALESCE(:service_advisor, name_of_service_advisor),
                job_status = :next,
                admin_id = :admin_id,
                admin_remarks = COALESCE(:admin_remarks, admin_remarks),
                admin_last_update_time = :now
            WHERE id = :id AND job_status = :current AND delete_flag = 0",
            params! {
                "jobcard_type" => form.jobcard_type.map(|t| t.as_str()),
                "technician_code" => tech.as_ref().map(|t| t.employee_code.as_str()),
                "name_of_technician" => tech.as_ref().map(|t| t.employee_name.as_str()),
                "photo" => &new_photo,
                "vehicle_registration_no" => &form.vehicle_registration_no,
                "vehicle_manufacturer" => &form.vehicle_manufacturer,
                "vehicle_model" => &form.vehicle_model,
                "vehicle_variant" => &form.vehicle_variant,
                "jobcard_no" => &form.jobcard_no,
                "jobcard_date" => form.jobcard_date,
                "kilometres" => form.kilometres,
                "service_advisor" => &form.name_of_service_advisor,
                "next" => next.as_str(),
                "admin_id" => &ctx.employee_code,
                "admin_remarks" => &form.admin_remarks,
                "now" => now,
                "id" => id,
                "current" => current.as_str(),
            },
        )
        .map_err(already_open(&jobcard_no))?;
    if changed == 0 {
        return Err(Response::conflict("The workorder changed meanwhile, please reload."));
    }
    log!("{} edited workorder #{id} ({current} -> {next})", ctx.employee_code);
    Ok(Response::ok(json!("✅ Workorder updated successfully.")))
}

/// Soft delete; the row stays for reporting but leaves every list.
pub async fn remove(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<u64>,
) -> ResponseResult {
    ctx.require(Action::DeleteWorkorder)?;
    let now = state.clock.now().await;
    let changed = state.gateway.execute(
        "UPDATE workorder_entry
        SET delete_flag = 1, admin_id = :admin_id, admin_last_update_time = :now
        WHERE id = :id AND delete_flag = 0",
        params! { "admin_id" => &ctx.employee_code, "now" => now, "id" => id },
    )?;
    if changed == 0 {
        return Err(Response::not_exist("No such workorder."));
    }
    log!("{} deleted workorder #{id}", ctx.employee_code);
    Ok(Response::ok(json!("Record deleted successfully.")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn query_defaults_to_the_last_week() {
        let range = QueryForm::default().resolve(day(15)).unwrap();
        assert_eq!(range, DateRange { from: day(8), to: day(15) });
    }

    #[test]
    fn query_range_must_end_by_today() {
        let form = QueryForm {
            from: Some(day(1)),
            to: Some(day(16)),
        };
        assert!(form.resolve(day(15)).is_err());
        let form = QueryForm {
            from: Some(day(10)),
            to: Some(day(9)),
        };
        assert_eq!(
            form.resolve(day(15)).unwrap_err().data(),
            &json!("From Date cannot be greater than To Date.")
        );
    }

    #[test]
    fn team_leader_query_is_limited_to_center() {
        let range = DateRange { from: day(1), to: day(2) };
        let (stmt, _) = range.query("", Some("C01"));
        assert!(stmt.contains("center_code = :cc"));
        let (stmt, _) = range.query("", None);
        assert!(!stmt.contains(":cc"));
    }

    #[test]
    fn admin_edit_keeps_status_when_blank() {
        let form = AdminUpdateForm::default();
        assert_eq!(
            form.next_status(WorkorderStatus::Closed, day(15)).unwrap(),
            WorkorderStatus::Closed
        );
    }

    #[test]
    fn admin_edit_cannot_close() {
        let form = AdminUpdateForm {
            job_status: Some("Closed".into()),
            ..Default::default()
        };
        let err = form.next_status(WorkorderStatus::InProgress, day(15)).unwrap_err();
        assert_eq!(err.status(), 4);

        let form = AdminUpdateForm {
            job_status: Some("Re-Assigned".into()),
            ..Default::default()
        };
        assert!(form.next_status(WorkorderStatus::InProgress, day(15)).is_err());
    }

    #[test]
    fn admin_edit_rejects_future_jobcard_date() {
        let form = AdminUpdateForm {
            jobcard_date: Some(day(16)),
            ..Default::default()
        };
        assert_eq!(
            form.next_status(WorkorderStatus::InProgress, day(15)).unwrap_err().status(),
            7
        );
    }
}
