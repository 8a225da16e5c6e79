//! Substitution endpoints: records, free-teacher lookups and the CSV export.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::respond;
use crate::availability::{self, SlotAvailability};
use crate::export::{self, ExportContext, ExportError};
use crate::models::{
    ScheduleEntry, ScheduleFilter, SubstitutionDraft, SubstitutionId, Teacher, TeacherId,
    TimeSlotId, Weekday,
};
use crate::server::types::ApiErrorType;
use crate::service::{ServiceError, ServiceResult};
use crate::types::AppState;

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: NaiveDate,
    /// Defaults to the configured term
    pub academic_year: Option<i32>,
    pub semester: Option<u8>,
}

/// Body of POST /substitutions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubstitutionRequest {
    pub substitution: SubstitutionDraft,
    #[serde(default)]
    pub replace_id: Option<SubstitutionId>,
}

#[derive(Debug, Deserialize)]
pub struct FreeTeachersQuery {
    pub date: NaiveDate,
    pub academic_year: Option<i32>,
    pub semester: Option<u8>,
    /// Comma-separated teacher ids, e.g. `1,4,7`
    #[serde(default)]
    pub candidates: String,
}

#[derive(Debug, Deserialize)]
pub struct AvailableQuery {
    pub date: NaiveDate,
    pub academic_year: Option<i32>,
    pub semester: Option<u8>,
    pub time_slot_id: TimeSlotId,
    pub absent_teacher_id: TeacherId,
    /// The substitution being replaced, whose teacher may be offered again
    pub replace_id: Option<SubstitutionId>,
}

#[derive(Debug, Deserialize)]
pub struct AbsentQuery {
    pub date: NaiveDate,
    pub academic_year: Option<i32>,
    pub semester: Option<u8>,
    pub teacher_id: TeacherId,
}

/// Parses `"1, 2,3"` into a set of ids. Blank input is an empty set.
fn parse_candidates(raw: &str) -> ServiceResult<BTreeSet<TeacherId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<TeacherId>()
                .map_err(|_| ServiceError::validation(format!("Invalid teacher id: {part}")))
        })
        .collect()
}

/// The entries scheduled on the weekday of `date`. The term defaults to the
/// configured one.
fn day_entries(
    s: &AppState,
    date: NaiveDate,
    academic_year: Option<i32>,
    semester: Option<u8>,
) -> ServiceResult<Vec<ScheduleEntry>> {
    let filter = ScheduleFilter::day(Weekday::from_date(date)).with_term(
        academic_year.unwrap_or(s.config.academic_year),
        semester.unwrap_or(s.config.semester),
    );
    s.db.list_entries(&filter)
}

fn free_teachers(s: &AppState, q: &FreeTeachersQuery) -> ServiceResult<Vec<SlotAvailability>> {
    let candidates = parse_candidates(&q.candidates)?;
    let time_slots = s.db.list_time_slots()?;
    if candidates.is_empty() {
        return Ok(availability::free_teachers_per_slot(
            &time_slots,
            &[],
            &[],
            &candidates,
            &[],
        ));
    }

    Ok(availability::free_teachers_per_slot(
        &time_slots,
        &day_entries(s, q.date, q.academic_year, q.semester)?,
        &s.db.list_teachers()?,
        &candidates,
        &s.db.substitutions_on(q.date)?,
    ))
}

fn available_substitutes(s: &AppState, q: &AvailableQuery) -> ServiceResult<Vec<Teacher>> {
    Ok(availability::available_substitutes(
        &day_entries(s, q.date, q.academic_year, q.semester)?,
        &s.db.list_teachers()?,
        q.time_slot_id,
        q.absent_teacher_id,
        &s.db.substitutions_on(q.date)?,
        q.replace_id,
    ))
}

fn absent_entries(s: &AppState, q: &AbsentQuery) -> ServiceResult<Vec<ScheduleEntry>> {
    Ok(availability::absent_teacher_entries(
        &day_entries(s, q.date, q.academic_year, q.semester)?,
        &s.db.list_time_slots()?,
        q.teacher_id,
    ))
}

fn export_csv(s: &AppState, q: &DateQuery) -> ServiceResult<Result<String, ExportError>> {
    let substitutions = s.db.substitutions_on(q.date)?;
    let time_slots = s.db.list_time_slots()?;
    let entries = day_entries(s, q.date, q.academic_year, q.semester)?;
    let teachers = s.db.list_teachers()?;
    let subjects = s.db.list_subjects()?;
    let locations = s.db.list_locations()?;

    let ctx = ExportContext {
        time_slots: &time_slots,
        entries: &entries,
        teachers: &teachers,
        subjects: &subjects,
        locations: &locations,
    };
    Ok(export::substitutions_csv(&substitutions, &ctx))
}

/// GET /substitutions?date=
pub async fn get_substitutions(
    State(s): State<Arc<AppState>>,
    Query(q): Query<DateQuery>,
) -> Response {
    info!("GET /substitutions?date={}", q.date);
    respond(StatusCode::OK, s.db.substitutions_on(q.date))
}

/// POST /substitutions
/// Answers 409 with the existing substitution when the entry is already covered
pub async fn post_substitution(
    State(s): State<Arc<AppState>>,
    Json(body): Json<NewSubstitutionRequest>,
) -> Response {
    info!(
        date = %body.substitution.date,
        entry_id = body.substitution.schedule_entry_id,
        replace_id = ?body.replace_id,
        "POST /substitutions"
    );
    respond(
        StatusCode::CREATED,
        s.db.insert_substitution(&body.substitution, body.replace_id),
    )
}

/// DELETE /substitutions/:id
pub async fn delete_substitution(
    Path(id): Path<SubstitutionId>,
    State(s): State<Arc<AppState>>,
) -> Response {
    info!("DELETE /substitutions/{}", id);

    match s.db.delete_substitution(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            warn!(substitution_id = id, error = %e, "Failed to delete substitution");
            ApiErrorType::from(e).into_response()
        }
    }
}

/// GET /substitutions/free_teachers?date=&candidates=
/// One row per time slot with the candidates that are free in it
pub async fn get_free_teachers(
    State(s): State<Arc<AppState>>,
    Query(q): Query<FreeTeachersQuery>,
) -> Response {
    info!(date = %q.date, candidates = %q.candidates, "GET /substitutions/free_teachers");

    respond(StatusCode::OK, free_teachers(&s, &q))
}

/// GET /substitutions/available?date=&time_slot_id=&absent_teacher_id=
/// Substitute choices for one period of an absent teacher
pub async fn get_available_substitutes(
    State(s): State<Arc<AppState>>,
    Query(q): Query<AvailableQuery>,
) -> Response {
    info!(
        date = %q.date,
        time_slot_id = q.time_slot_id,
        absent_teacher_id = q.absent_teacher_id,
        "GET /substitutions/available"
    );

    respond(StatusCode::OK, available_substitutes(&s, &q))
}

/// GET /substitutions/absent_entries?date=&teacher_id=
/// The periods an absent teacher would have taught that day
pub async fn get_absent_entries(
    State(s): State<Arc<AppState>>,
    Query(q): Query<AbsentQuery>,
) -> Response {
    info!(date = %q.date, teacher_id = q.teacher_id, "GET /substitutions/absent_entries");

    respond(StatusCode::OK, absent_entries(&s, &q))
}

/// GET /substitutions/export?date=
/// The day's substitutions as a CSV download
pub async fn get_export(State(s): State<Arc<AppState>>, Query(q): Query<DateQuery>) -> Response {
    info!("GET /substitutions/export?date={}", q.date);

    match export_csv(&s, &q) {
        Err(e) => ApiErrorType::from(e).into_response(),
        Ok(Ok(csv)) => {
            let disposition = format!("attachment; filename=\"substitutions_{}.csv\"", q.date);
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                csv,
            )
                .into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, "Failed to build substitution export");
            ApiErrorType::from((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to build export",
                Some(e.to_string()),
            ))
            .into_response()
        }
    }
}
