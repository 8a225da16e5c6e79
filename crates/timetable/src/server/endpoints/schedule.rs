use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};

use super::respond;
use crate::conflict::OverwriteRequest;
use crate::models::{EntryDraft, EntryId, ScheduleFilter};
use crate::server::types::ApiErrorType;
use crate::types::AppState;

/// GET /schedule
/// Returns schedule entries, optionally narrowed by `day`, `academic_year` and `semester`
pub async fn get_entries(
    State(s): State<Arc<AppState>>,
    Query(filter): Query<ScheduleFilter>,
) -> Response {
    info!(?filter, "GET /schedule");
    respond(StatusCode::OK, s.db.list_entries(&filter))
}

/// POST /schedule
/// Adds an entry; answers 409 with the conflicting entry on a clash
pub async fn post_entry(State(s): State<Arc<AppState>>, Json(draft): Json<EntryDraft>) -> Response {
    info!(day = %draft.day, time_slot_id = draft.time_slot_id, "POST /schedule");
    respond(StatusCode::CREATED, s.db.insert_entry(&draft))
}

/// PUT /schedule/:id
pub async fn put_entry(
    Path(id): Path<EntryId>,
    State(s): State<Arc<AppState>>,
    Json(draft): Json<EntryDraft>,
) -> Response {
    info!("PUT /schedule/{}", id);
    respond(StatusCode::OK, s.db.update_entry(id, &draft))
}

/// DELETE /schedule/:id
pub async fn delete_entry(Path(id): Path<EntryId>, State(s): State<Arc<AppState>>) -> Response {
    info!("DELETE /schedule/{}", id);

    match s.db.delete_entry(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            warn!(entry_id = id, error = %e, "Failed to delete schedule entry");
            ApiErrorType::from(e).into_response()
        }
    }
}

/// POST /schedule/overwrite
/// Deletes the conflicting entry (and the superseded one, if given) and saves the new entry
pub async fn post_overwrite(
    State(s): State<Arc<AppState>>,
    Json(request): Json<OverwriteRequest>,
) -> Response {
    info!(
        conflicting_entry_id = request.conflicting_entry_id(),
        supersedes = ?request.supersedes(),
        "POST /schedule/overwrite"
    );
    respond(StatusCode::CREATED, s.db.overwrite_entry(&request))
}
