use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::server::types::ApiErrorType;
use crate::service::ServiceResult;

pub mod reference;
pub mod schedule;
pub mod status;
pub mod substitutions;

/// Serializes a successful result with `status`, or maps the error.
fn respond<T: Serialize>(status: StatusCode, result: ServiceResult<T>) -> Response {
    match result {
        Ok(data) => (status, Json(data)).into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}
