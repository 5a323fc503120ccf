use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use mysql::{params, prelude::Queryable, Row};
use serde_json::{json, Value};

use super::{
    already_open, center_row, center_technician, check_dates, JobcardType, ServiceCounts,
    WorkorderHead, WorkorderStatus, REPEAT_WINDOW_DAYS,
};
use crate::{
    database::{exec_affected, GatewayError},
    libs::{csv, dser::*, parse_multipart},
    log,
    pages::{center_technicians, Technician},
    perm::Action,
    AppState, RequestContext, Response, ResponseResult,
};

pub async fn technicians(State(state): State<AppState>, ctx: RequestContext) -> ResponseResult {
    ctx.require(Action::CreateWorkorder)?;
    let list = center_technicians(&state.gateway, ctx.center()?, None)?;
    if list.is_empty() {
        return Err(Response::not_exist("No technicians found for your center."));
    }
    Ok(Response::ok(json!(list)))
}

/// Lookups used by both the team-lead entry form and the admin edit form.
fn require_lookup(ctx: &RequestContext) -> Result<(), Response> {
    ctx.require(Action::CreateWorkorder)
        .or_else(|_| ctx.require(Action::EditWorkorder))
}

pub async fn manufacturers(State(state): State<AppState>, ctx: RequestContext) -> ResponseResult {
    require_lookup(&ctx)?;
    let list: Vec<String> = state.gateway.fetch_all(
        "SELECT DISTINCT vehicle_manufacturer FROM vehicle_model ORDER BY vehicle_manufacturer",
        (),
    )?;
    Ok(Response::ok(json!(list)))
}

pub async fn models(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(manufacturer): Path<String>,
) -> ResponseResult {
    require_lookup(&ctx)?;
    let list: Vec<String> = state.gateway.fetch_all(
        "SELECT vehicle_model FROM vehicle_model
        WHERE vehicle_manufacturer = :vm ORDER BY vehicle_model",
        params! { "vm" => manufacturer },
    )?;
    Ok(Response::ok(json!(list)))
}

#[derive(serde::Deserialize, Default)]
struct NewJobForm {
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
    #[serde(default, deserialize_with = "deser_optional_date")]
    job_assign_date: Option<NaiveDate>,
    #[serde(default)]
    kilometres: u32,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    name_of_service_advisor: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    tl_remarks: Option<String>,
}

#[derive(Debug)]
struct NewJob {
    technician_code: String,
    vehicle_registration_no: String,
    jobcard_no: String,
    jobcard_date: NaiveDate,
    job_assign_date: NaiveDate,
}

impl NewJobForm {
    /// Required fields and date bounds; missing dates default to today.
    fn validate(&self, today: NaiveDate) -> Result<NewJob, Response> {
        let vehicle_registration_no = self
            .vehicle_registration_no
            .clone()
            .ok_or_else(|| Response::invalid_value("Vehicle Registration No is mandatory."))?;
        let jobcard_no = self
            .jobcard_no
            .clone()
            .ok_or_else(|| Response::invalid_value("Jobcard No is mandatory."))?;
        let technician_code = self
            .technician_code
            .clone()
            .ok_or_else(|| Response::invalid_value("Please select a technician."))?;
        let jobcard_date = self.jobcard_date.unwrap_or(today);
        let job_assign_date = self.job_assign_date.unwrap_or(today);
        check_dates(jobcard_date, job_assign_date, today)?;
        Ok(NewJob {
            technician_code,
            vehicle_registration_no,
            jobcard_no,
            jobcard_date,
            job_assign_date,
        })
    }
}

pub async fn create(
    State(state): State<AppState>,
    ctx: RequestContext,
    multipart: Multipart,
) -> ResponseResult {
    ctx.require(Action::CreateWorkorder)?;
    let center_code = ctx.center()?;
    let part = parse_multipart(multipart).await?;
    let photo = part.first_file().ok_or_else(|| {
        Response::invalid_value("Jobcard photo is mandatory. Please capture the photo.")
    })?;
    let form: NewJobForm = part.data()?;
    let now = state.clock.now().await;
    let job = form.validate(now.date())?;
    let tech = center_technician(&state.gateway, center_code, &job.technician_code)?;
    let center = center_row(&state.gateway, center_code)?;

    state
        .gateway
        .execute(
            "INSERT INTO workorder_entry (
                jobcard_type, technician_code, name_of_technician, jobcard_photo,
                vehicle_registration_no, vehicle_manufacturer, vehicle_model, vehicle_variant,
                jobcard_no, jobcard_date, job_assign_date, kilometres, name_of_service_advisor,
                center_code, center_name, center_location, job_start_time,
                tl_id, tl_last_update, tl_remarks, job_status
            ) VALUES (
                :jobcard_type, :technician_code, :name_of_technician, :jobcard_photo,
                :vehicle_registration_no, :vehicle_manufacturer, :vehicle_model, :vehicle_variant,
                :jobcard_no, :jobcard_date, :job_assign_date, :kilometres, :service_advisor,
                :center_code, :center_name, :center_location, :now,
                :tl_id, :now, :tl_remarks, :status
            )",
            params! {
                "jobcard_type" => JobcardType::NewJob.as_str(),
                "technician_code" => &tech.employee_code,
                "name_of_technician" => &tech.employee_name,
                "jobcard_photo" => &photo.bytes,
                "vehicle_registration_no" => &job.vehicle_registration_no,
                "vehicle_manufacturer" => &form.vehicle_manufacturer,
                "vehicle_model" => &form.vehicle_model,
                "vehicle_variant" => &form.vehicle_variant,
                "jobcard_no" => &job.jobcard_no,
                "jobcard_date" => job.jobcard_date,
                "job_assign_date" => job.job_assign_date,
                "kilometres" => form.kilometres,
                "service_advisor" => &form.name_of_service_advisor,
                "center_code" => &center.center_code,
                "center_name" => &center.center_name,
                "center_location" => &center.center_location,
                "now" => now,
                "tl_id" => &ctx.employee_code,
                "tl_remarks" => &form.tl_remarks,
                "status" => WorkorderStatus::InProgress.as_str(),
            },
        )
        .map_err(already_open(&job.jobcard_no))?;
    log!(
        "{} created jobcard {} for {} at {}",
        ctx.employee_code,
        job.jobcard_no,
        tech.employee_code,
        center_code
    );
    Ok(Response::ok(json!("🎉 New workorder created successfully!")))
}

const LIST_COLUMNS: &str = "id, jobcard_no, jobcard_type, technician_code, name_of_technician,
    vehicle_registration_no, vehicle_manufacturer, vehicle_model, previous_jobcard_no,
    job_assign_date, job_start_time, job_compleate_date, job_status";

fn records(rows: Vec<Row>) -> Value {
    Value::Array(
        rows.iter()
            .map(|row| Value::Object(csv::record(row, &[])))
            .collect(),
    )
}

/// Candidates for re-assignment and closing.
pub async fn open(State(state): State<AppState>, ctx: RequestContext) -> ResponseResult {
    ctx.require(Action::ReassignWorkorder)?;
    let rows: Vec<Row> = state.gateway.fetch_all(
        &format!(
            "SELECT {LIST_COLUMNS} FROM workorder_entry
            WHERE center_code = :cc AND job_status = :status AND delete_flag = 0
            ORDER BY id DESC"
        ),
        params! { "cc" => ctx.center()?, "status" => WorkorderStatus::InProgress.as_str() },
    )?;
    Ok(Response::ok(records(rows)))
}

/// Candidates for repeat repair and revisit.
pub async fn closed(State(state): State<AppState>, ctx: RequestContext) -> ResponseResult {
    ctx.require(Action::RepeatWorkorder)?;
    let since = state.clock.now().await.date() - Duration::days(REPEAT_WINDOW_DAYS);
    let rows: Vec<Row> = state.gateway.fetch_all(
        &format!(
            "SELECT {LIST_COLUMNS} FROM workorder_entry
            WHERE center_code = :cc AND job_status = :status AND delete_flag = 0
                AND job_compleate_date >= :since
            ORDER BY job_compleate_date DESC, id DESC"
        ),
        params! {
            "cc" => ctx.center()?,
            "status" => WorkorderStatus::Closed.as_str(),
            "since" => since,
        },
    )?;
    Ok(Response::ok(records(rows)))
}

#[derive(serde::Deserialize)]
struct ReassignForm {
    id: u64,
    technician_code: String,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    tl_remarks: Option<String>,
}

/// Copies an existing row as a new open job; `photo` replaces the stored one when given.
const COPY_AS_OPEN: &str = "INSERT INTO workorder_entry (
        jobcard_type, technician_code, name_of_technician, jobcard_photo, previous_jobcard_no,
        vehicle_registration_no, vehicle_manufacturer, vehicle_model, vehicle_variant,
        jobcard_no, jobcard_date, job_assign_date, kilometres, name_of_service_advisor,
        center_code, center_name, center_location, job_start_time,
        tl_id, tl_last_update, tl_remarks, job_status
    )
    SELECT :jobcard_type, :technician_code, :name_of_technician,
        COALESCE(:photo, jobcard_photo), jobcard_no,
        vehicle_registration_no, vehicle_manufacturer, vehicle_model, vehicle_variant,
        COALESCE(:jobcard_no, jobcard_no), COALESCE(:jobcard_date, jobcard_date), :assign_date,
        COALESCE(:kilometres, kilometres), name_of_service_advisor,
        center_code, center_name, center_location, :now,
        :tl_id, :now, :tl_remarks, :status
    FROM workorder_entry WHERE id = :id";

/// The re-assigned copy keeps jobcard, dates, kilometres and photo of `id`.
fn reassign_params(
    form: &ReassignForm,
    tech: &Technician,
    tl_id: &str,
    now: NaiveDateTime,
    id: u64,
) -> mysql::Params {
    params! {
        "jobcard_type" => JobcardType::Reassigned.as_str(),
        "technician_code" => &tech.employee_code,
        "name_of_technician" => &tech.employee_name,
        "photo" => None::<Vec<u8>>,
        "jobcard_no" => None::<String>,
        "jobcard_date" => None::<NaiveDate>,
        "assign_date" => now.date(),
        "kilometres" => None::<u32>,
        "now" => now,
        "tl_id" => tl_id,
        "tl_remarks" => &form.tl_remarks,
        "status" => WorkorderStatus::InProgress.as_str(),
        "id" => id,
    }
}

pub async fn reassign(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(value): Json<Value>,
) -> ResponseResult {
    ctx.require(Action::ReassignWorkorder)?;
    let center_code = ctx.center()?;
    let form: ReassignForm = serde_json::from_value(value)?;
    let tech = center_technician(&state.gateway, center_code, form.technician_code.trim())?;
    let now = state.clock.now().await;

    let jobcard_no = state.gateway.transaction(|tx| {
        let head = WorkorderHead::lock(tx, form.id, center_code)?;
        head.status()?.transition(WorkorderStatus::Reassigned)?;
        if head.technician_code == tech.employee_code {
            return Err(Response::invalid_value(
                "Please select a different technician to re-assign this job.",
            ));
        }
        let changed = exec_affected(
            tx,
            "UPDATE workorder_entry
            SET job_status = :next, tl_id = :tl_id, tl_last_update = :now,
                tl_remarks = COALESCE(:tl_remarks, tl_remarks)
            WHERE id = :id AND job_status = :current AND delete_flag = 0",
            params! {
                "next" => WorkorderStatus::Reassigned.as_str(),
                "tl_id" => &ctx.employee_code,
                "now" => now,
                "tl_remarks" => &form.tl_remarks,
                "id" => head.id,
                "current" => WorkorderStatus::InProgress.as_str(),
            },
        )?;
        if changed == 0 {
            return Err(Response::conflict("The workorder changed meanwhile, please reload."));
        }
        exec_affected(
            tx,
            COPY_AS_OPEN,
            reassign_params(&form, &tech, &ctx.employee_code, now, head.id),
        )
        .map_err(already_open(&head.jobcard_no))?;
        Ok::<_, Response>(head.jobcard_no)
    })?;
    log!(
        "{} re-assigned jobcard {jobcard_no} (#{}) to {}",
        ctx.employee_code,
        form.id,
        tech.employee_code
    );
    Ok(Response::ok(json!("Workorder re-assigned successfully.")))
}

#[derive(serde::Deserialize)]
struct CloseForm {
    id: u64,
    #[serde(default)]
    services: ServiceCounts,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    tl_remarks: Option<String>,
}

fn close_params(form: &CloseForm, now: NaiveDateTime, tl_id: &str) -> mysql::Params {
    let s = &form.services;
    params! {
        "next" => WorkorderStatus::Closed.as_str(),
        "date" => now.date(),
        "time" => now.time(),
        "tl_id" => tl_id,
        "now" => now,
        "tl_remarks" => &form.tl_remarks,
        "wheel_alignment" => s.wheel_alignment,
        "wheel_balancing" => s.wheel_balancing,
        "tyre_fitting" => s.tyre_fitting,
        "puncture_repair" => s.puncture_repair,
        "tpms" => s.tpms,
        "disc_drum_cutting" => s.disc_drum_cutting,
        "brake_testing" => s.brake_testing,
        "carbon_cleaning" => s.carbon_cleaning,
        "washing_cleaning" => s.washing_cleaning,
        "interior_cleaning" => s.interior_cleaning,
        "exterior_polishing" => s.exterior_polishing,
        "paint_protection_film" => s.paint_protection_film,
        "id" => form.id,
        "current" => WorkorderStatus::InProgress.as_str(),
    }
}

pub async fn close(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(value): Json<Value>,
) -> ResponseResult {
    ctx.require(Action::CloseWorkorder)?;
    let center_code = ctx.center()?;
    let form: CloseForm = serde_json::from_value(value)?;
    let now = state.clock.now().await;

    let jobcard_no = state.gateway.transaction(|tx| {
        let head = WorkorderHead::lock(tx, form.id, center_code)?;
        head.status()?.transition(WorkorderStatus::Closed)?;
        let changed = exec_affected(
            tx,
            "UPDATE workorder_entry SET
                job_status = :next,
                job_compleate_date = :date,
                job_compleate_time = :time,
                tl_id = :tl_id,
                tl_last_update = :now,
                tl_remarks = COALESCE(:tl_remarks, tl_remarks),
                wheel_alignment = :wheel_alignment,
                wheel_balancing = :wheel_balancing,
                tyre_fitting = :tyre_fitting,
                puncture_repair = :puncture_repair,
                tpms = :tpms,
                disc_drum_cutting = :disc_drum_cutting,
                brake_testing = :brake_testing,
                carbon_cleaning = :carbon_cleaning,
                washing_cleaning = :washing_cleaning,
                interior_cleaning = :interior_cleaning,
                exterior_polishing = :exterior_polishing,
                paint_protection_film = :paint_protection_film
            WHERE id = :id AND job_status = :current AND delete_flag = 0",
            close_params(&form, now, &ctx.employee_code),
        )?;
        if changed == 0 {
            return Err(Response::conflict("The workorder changed meanwhile, please reload."));
        }
        Ok::<_, Response>(head.jobcard_no)
    })?;
    log!(
        "{} closed jobcard {jobcard_no} (#{}), {} service units",
        ctx.employee_code,
        form.id,
        form.services.total()
    );
    Ok(Response::ok(json!("Workorder closed successfully.")))
}

#[derive(serde::Deserialize)]
struct RepeatForm {
    id: u64,
    jobcard_type: JobcardType,
    technician_code: String,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    jobcard_no: Option<String>,
    #[serde(default, deserialize_with = "deser_optional_date")]
    jobcard_date: Option<NaiveDate>,
    #[serde(default)]
    kilometres: Option<u32>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    tl_remarks: Option<String>,
}

impl RepeatForm {
    fn check(&self, today: NaiveDate) -> Result<(), Response> {
        if !matches!(self.jobcard_type, JobcardType::RepeatRepair | JobcardType::ReVisit) {
            return Err(Response::invalid_value(
                "Jobcard type must be Repeat Repair or Re Visit.",
            ));
        }
        if let Some(date) = self.jobcard_date {
            check_dates(date, today, today)?;
        }
        Ok(())
    }
}

/// A closed job qualifies while its completion date is inside the window.
fn within_repeat_window(completed: Option<NaiveDate>, today: NaiveDate) -> bool {
    completed.is_some_and(|d| d >= today - Duration::days(REPEAT_WINDOW_DAYS) && d <= today)
}

pub async fn repeat(
    State(state): State<AppState>,
    ctx: RequestContext,
    multipart: Multipart,
) -> ResponseResult {
    ctx.require(Action::RepeatWorkorder)?;
    let center_code = ctx.center()?;
    let part = parse_multipart(multipart).await?;
    let form: RepeatForm = part.data()?;
    let photo = part.first_file().map(|f| f.bytes.clone());
    let now = state.clock.now().await;
    let today = now.date();
    form.check(today)?;
    let tech = center_technician(&state.gateway, center_code, form.technician_code.trim())?;

    let previous = state.gateway.transaction(|tx| {
        let head = WorkorderHead::lock(tx, form.id, center_code)?;
        if head.status()? != WorkorderStatus::Closed {
            return Err(Response::conflict(
                "Only closed workorders can be repeated or revisited.",
            ));
        }
        if !within_repeat_window(head.job_compleate_date, today) {
            return Err(Response::invalid_value(format!(
                "Only jobs closed in the last {REPEAT_WINDOW_DAYS} days can be repeated or revisited."
            )));
        }
        let open: Option<u64> = tx
            .exec_first(
                "SELECT id FROM workorder_entry WHERE open_jobcard_key = :key LIMIT 1",
                params! { "key" => format!("{}/{}", head.center_code, head.jobcard_no) },
            )
            .map_err(GatewayError::from)?;
        if open.is_some() {
            return Err(Response::already_exist(format!(
                "Jobcard {} still has a workorder in progress.",
                head.jobcard_no
            )));
        }
        let jobcard_no = form.jobcard_no.clone().unwrap_or_else(|| head.jobcard_no.clone());
        exec_affected(
            tx,
            COPY_AS_OPEN,
            params! {
                "jobcard_type" => form.jobcard_type.as_str(),
                "technician_code" => &tech.employee_code,
                "name_of_technician" => &tech.employee_name,
                "photo" => &photo,
                "jobcard_no" => &form.jobcard_no,
                "jobcard_date" => form.jobcard_date.unwrap_or(today),
                "assign_date" => today,
                "kilometres" => form.kilometres,
                "now" => now,
                "tl_id" => &ctx.employee_code,
                "tl_remarks" => &form.tl_remarks,
                "status" => WorkorderStatus::InProgress.as_str(),
                "id" => head.id,
            },
        )
        .map_err(already_open(&jobcard_no))?;
        Ok::<_, Response>(head.jobcard_no)
    })?;
    log!(
        "{} opened {} for jobcard {previous} with {}",
        ctx.employee_code,
        form.jobcard_type.as_str(),
        tech.employee_code
    );
    Ok(Response::ok(json!(format!(
        "{} workorder created successfully.",
        form.jobcard_type.as_str()
    ))))
}
