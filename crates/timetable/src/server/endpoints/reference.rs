//! Reference data: teachers, subjects, class groups, locations and time slots.

use axum::{extract::State, http::StatusCode, response::Response, Json};
use std::sync::Arc;
use tracing::info;

use super::respond;
use crate::models::{NewClassGroup, NewLocation, NewTeacher, NewTimeSlot, Subject};
use crate::types::AppState;

/// GET /teachers
pub async fn get_teachers(State(s): State<Arc<AppState>>) -> Response {
    info!("GET /teachers");
    respond(StatusCode::OK, s.db.list_teachers())
}

/// POST /teachers
pub async fn post_teacher(
    State(s): State<Arc<AppState>>,
    Json(body): Json<NewTeacher>,
) -> Response {
    info!(name = %body.name, "POST /teachers");
    respond(StatusCode::CREATED, s.db.insert_teacher(&body))
}

/// GET /subjects
pub async fn get_subjects(State(s): State<Arc<AppState>>) -> Response {
    info!("GET /subjects");
    respond(StatusCode::OK, s.db.list_subjects())
}

/// POST /subjects
pub async fn post_subject(State(s): State<Arc<AppState>>, Json(body): Json<Subject>) -> Response {
    info!(code = %body.code, "POST /subjects");
    respond(StatusCode::CREATED, s.db.insert_subject(&body))
}

/// GET /class_groups
pub async fn get_class_groups(State(s): State<Arc<AppState>>) -> Response {
    info!("GET /class_groups");
    respond(StatusCode::OK, s.db.list_class_groups())
}

/// POST /class_groups
pub async fn post_class_group(
    State(s): State<Arc<AppState>>,
    Json(body): Json<NewClassGroup>,
) -> Response {
    info!(name = %body.name, "POST /class_groups");
    respond(StatusCode::CREATED, s.db.insert_class_group(&body))
}

/// GET /locations
pub async fn get_locations(State(s): State<Arc<AppState>>) -> Response {
    info!("GET /locations");
    respond(StatusCode::OK, s.db.list_locations())
}

/// POST /locations
pub async fn post_location(
    State(s): State<Arc<AppState>>,
    Json(body): Json<NewLocation>,
) -> Response {
    info!(name = %body.name, "POST /locations");
    respond(StatusCode::CREATED, s.db.insert_location(&body))
}

/// GET /time_slots
pub async fn get_time_slots(State(s): State<Arc<AppState>>) -> Response {
    info!("GET /time_slots");
    respond(StatusCode::OK, s.db.list_time_slots())
}

/// POST /time_slots
pub async fn post_time_slot(
    State(s): State<Arc<AppState>>,
    Json(body): Json<NewTimeSlot>,
) -> Response {
    info!(period = body.period, "POST /time_slots");
    respond(StatusCode::CREATED, s.db.insert_time_slot(&body))
}
