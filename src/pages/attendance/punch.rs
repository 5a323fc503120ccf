use axum::extract::{Multipart, Path, State};
use chrono::{NaiveDate, NaiveDateTime};
use mysql::params;
use mysql_common::prelude::FromRow;
use serde_json::json;

use super::{record_punch, Punch, PunchError, PunchTimes, Subject, WorkTotals};
use crate::{
    libs::{
        content_hash, parse_multipart,
        photo::{self, THUMBNAIL_EDGE},
        time::Resolved,
    },
    log,
    pages::center_technicians,
    perm::Action,
    response::BodyFile,
    AppState, RequestContext, Response, ResponseResult,
};

#[derive(FromRow)]
struct TodayRow {
    on_duty_in_time: Option<NaiveDateTime>,
    intermidiate_off_out_time: Option<NaiveDateTime>,
    intermidiate_off_in_time: Option<NaiveDateTime>,
    on_duty_out_time: Option<NaiveDateTime>,
    on_duty_in_image: Option<Vec<u8>>,
    intermidiate_off_out_image: Option<Vec<u8>>,
    intermidiate_off_in_image: Option<Vec<u8>>,
    on_duty_out_image: Option<Vec<u8>>,
    total_working_hrs: Option<f64>,
    total_break_hrs: Option<f64>,
    effective_working_hrs: Option<f64>,
    marked_by: Option<String>,
}

impl TodayRow {
    fn times(&self) -> PunchTimes {
        PunchTimes {
            on_duty_in: self.on_duty_in_time,
            break_out: self.intermidiate_off_out_time,
            break_in: self.intermidiate_off_in_time,
            on_duty_out: self.on_duty_out_time,
        }
    }

    fn image(&self, punch: Punch) -> Option<&[u8]> {
        match punch {
            Punch::In => self.on_duty_in_image.as_deref(),
            Punch::BreakOut => self.intermidiate_off_out_image.as_deref(),
            Punch::BreakIn => self.intermidiate_off_in_image.as_deref(),
            Punch::Out => self.on_duty_out_image.as_deref(),
        }
        .filter(|b| !b.is_empty())
    }

    fn totals(&self) -> Option<WorkTotals> {
        Some(WorkTotals {
            total_working_hrs: self.total_working_hrs?,
            total_break_hrs: self.total_break_hrs.unwrap_or_default(),
            effective_working_hrs: self.effective_working_hrs?,
        })
    }
}

fn today_row(
    state: &AppState,
    code: &str,
    day: NaiveDate,
) -> Result<Option<TodayRow>, Response> {
    Ok(state.gateway.fetch_one(
        "SELECT on_duty_in_time, intermidiate_off_out_time, intermidiate_off_in_time,
            on_duty_out_time, on_duty_in_image, intermidiate_off_out_image,
            intermidiate_off_in_image, on_duty_out_image, total_working_hrs,
            total_break_hrs, effective_working_hrs, marked_by
        FROM preamji_attendance
        WHERE emp_code_of_thetechnician = :code AND attendance_date = :day",
        params! { "code" => code, "day" => day },
    )?)
}

fn fmt_time(t: Option<NaiveDateTime>) -> String {
    t.map(|t| t.format("%H:%M:%S").to_string()).unwrap_or_default()
}

/// Today's summary for `subject`: punch times, next punch, totals and a
/// thumbnail per captured slot.
fn summary(state: &AppState, subject: &Subject, resolved: &Resolved) -> ResponseResult {
    let row = today_row(state, &subject.employee_code, resolved.today())?;
    let times = row.as_ref().map(TodayRow::times).unwrap_or_default();
    let next = times.next_punch();
    let punches: Vec<_> = Punch::ORDER
        .iter()
        .map(|p| {
            let thumbnail = row
                .as_ref()
                .and_then(|r| r.image(*p))
                .and_then(|b| photo::thumbnail_data_url(b, THUMBNAIL_EDGE));
            json!({
                "punch": p,
                "label": p.label(),
                "time": fmt_time(times.get(*p)),
                "thumbnail": thumbnail,
            })
        })
        .collect();
    Ok(Response::ok(json!({
        "employee_code": subject.employee_code,
        "employee_name": subject.employee_name,
        "date": resolved.today().to_string(),
        "now": resolved.now.format("%H:%M:%S").to_string(),
        "time_source": resolved.source,
        "warning": resolved.warning(),
        "next": next,
        "next_label": next.map(|p| p.label()),
        "complete": next.is_none(),
        "punches": punches,
        "totals": row.as_ref().and_then(TodayRow::totals),
        "marked_by": row.as_ref().and_then(|r| r.marked_by.clone()),
    })))
}

fn own_subject(state: &AppState, ctx: &RequestContext) -> Result<Subject, Response> {
    Subject::load(&state.gateway, &ctx.employee_code)?
        .ok_or_else(|| Response::not_exist("Your employee record was not found."))
}

/// A technician of the team leader's own center, still active.
fn team_subject(state: &AppState, ctx: &RequestContext, code: &str) -> Result<Subject, Response> {
    let center = ctx.center()?;
    let subject = Subject::load(&state.gateway, code)?
        .ok_or_else(|| Response::not_exist(format!("Employee {code} does not exist.")))?;
    let same_center = subject.center_code.as_deref() == Some(center);
    let is_technician = subject.user_role.eq_ignore_ascii_case("technician");
    if !same_center || !is_technician || code == ctx.employee_code {
        return Err(Response::permission_denied_with(
            "You can only mark attendance for technicians of your center.",
        ));
    }
    Ok(subject)
}

#[derive(serde::Deserialize, Default)]
struct PunchData {
    #[serde(default, deserialize_with = "crate::libs::dser::deser_empty_to_none")]
    punch: Option<String>,
}

async fn take_punch(
    state: &AppState,
    ctx: &RequestContext,
    subject: &Subject,
    multipart: Multipart,
) -> ResponseResult {
    if !subject.is_active() {
        return Err(Response::permission_denied_with(
            "Inactive employees cannot mark attendance.",
        ));
    }
    let part = parse_multipart(multipart).await?;
    let data: PunchData = part.data()?;
    let requested = data.punch.as_deref().map(str::parse::<Punch>).transpose()?;
    let file = part
        .first_file()
        .ok_or_else(|| Response::invalid_value("Please capture a photo to mark attendance."))?;

    let hash = content_hash(&file.bytes);
    if state.sessions.is_repeat_capture(&ctx.sid, &hash) {
        return Err(PunchError::RepeatCapture.into());
    }
    let resolved = state.clock.resolve().await;
    let compressed = photo::compress_capture(&file.bytes);
    let outcome = record_punch(
        &state.gateway,
        subject,
        requested,
        resolved.now,
        &compressed,
        &ctx.employee_code,
    )?;
    state.sessions.record_capture(&ctx.sid, hash);
    log!(
        "{} recorded {} for {} at {} ({})",
        ctx.employee_code,
        outcome.punch,
        subject.employee_code,
        resolved.now,
        resolved.source
    );
    Ok(Response::ok(json!({
        "message": format!("{} recorded!", outcome.label),
        "outcome": outcome,
        "warning": resolved.warning(),
    })))
}

pub async fn today(State(state): State<AppState>, ctx: RequestContext) -> ResponseResult {
    ctx.require(Action::MarkOwnAttendance)?;
    let subject = own_subject(&state, &ctx)?;
    let resolved = state.clock.resolve().await;
    summary(&state, &subject, &resolved)
}

pub async fn punch(
    State(state): State<AppState>,
    ctx: RequestContext,
    multipart: Multipart,
) -> ResponseResult {
    ctx.require(Action::MarkOwnAttendance)?;
    let subject = own_subject(&state, &ctx)?;
    take_punch(&state, &ctx, &subject, multipart).await
}

fn full_size(blob: Option<Vec<u8>>, punch: Punch) -> Result<BodyFile, Response> {
    match blob.filter(|b| !b.is_empty()) {
        Some(bytes) => {
            let mime = photo::sniff_mime(&bytes);
            Ok(BodyFile::new(bytes, mime))
        }
        None => Err(Response::not_exist(format!("No {} photo today.", punch.label()))),
    }
}

async fn today_image(state: &AppState, code: &str, punch: &str) -> Result<BodyFile, Response> {
    let punch: Punch = punch.parse()?;
    let today = state.clock.now().await.date();
    let blob: Option<Option<Vec<u8>>> = state.gateway.fetch_one(
        format!(
            "SELECT {} FROM preamji_attendance
            WHERE emp_code_of_thetechnician = :code AND attendance_date = :day",
            punch.image_column()
        )
        .as_str(),
        params! { "code" => code, "day" => today },
    )?;
    full_size(blob.flatten(), punch)
}

/// Full-size photo of one of today's punches.
pub async fn image(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(punch): Path<String>,
) -> Result<BodyFile, Response> {
    ctx.require(Action::MarkOwnAttendance)?;
    today_image(&state, &ctx.employee_code, &punch).await
}

/// Same as [`image`], for a technician of the team leader's center.
pub async fn image_for(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((code, punch)): Path<(String, String)>,
) -> Result<BodyFile, Response> {
    ctx.require(Action::MarkTeamAttendance)?;
    let subject = team_subject(&state, &ctx, &code)?;
    today_image(&state, &subject.employee_code, &punch).await
}

pub async fn technicians(State(state): State<AppState>, ctx: RequestContext) -> ResponseResult {
    ctx.require(Action::MarkTeamAttendance)?;
    let center = ctx.center()?;
    let list = center_technicians(&state.gateway, center, Some(&ctx.employee_code))?;
    if list.is_empty() {
        return Err(Response::not_exist(
            "No technicians found under your supervision.",
        ));
    }
    Ok(Response::ok(json!(list)))
}

pub async fn today_for(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(code): Path<String>,
) -> ResponseResult {
    ctx.require(Action::MarkTeamAttendance)?;
    let subject = team_subject(&state, &ctx, &code)?;
    let resolved = state.clock.resolve().await;
    summary(&state, &subject, &resolved)
}

pub async fn punch_for(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(code): Path<String>,
    multipart: Multipart,
) -> ResponseResult {
    ctx.require(Action::MarkTeamAttendance)?;
    let subject = team_subject(&state, &ctx, &code)?;
    take_punch(&state, &ctx, &subject, multipart).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_photo_names_the_punch() {
        let err = full_size(None, Punch::In).unwrap_err();
        assert_eq!(err.status(), 2);
        let err = full_size(Some(vec![]), Punch::Out).unwrap_err();
        assert_eq!(
            err.data(),
            &json!(format!("No {} photo today.", Punch::Out.label()))
        );
        assert!(full_size(Some(vec![0xFF, 0xD8, 0xFF]), Punch::In).is_ok());
    }

    #[test]
    fn team_leader_image_route_sits_beside_own_route() {
        let _router = super::super::attendance_router();
    }
}
