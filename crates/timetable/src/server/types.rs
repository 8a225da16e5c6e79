use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::conflict::ScheduleConflict;
use crate::models::Substitution;
use crate::service::ServiceError;

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// The entry that blocked a schedule write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ScheduleConflict>,
    /// The substitution already covering the requested entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing: Option<Substitution>,
}

pub struct ApiErrorType {
    status: StatusCode,
    body: ApiErrorBody,
}

impl From<(StatusCode, &str, Option<String>)> for ApiErrorType {
    fn from((status, error, details): (StatusCode, &str, Option<String>)) -> Self {
        Self {
            status,
            body: ApiErrorBody {
                error: error.to_string(),
                details,
                conflict: None,
                existing: None,
            },
        }
    }
}

impl From<ServiceError> for ApiErrorType {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        let status = match &err {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::ScheduleConflict(_)
            | ServiceError::SubstitutionConflict { .. }
            | ServiceError::InProgress { .. } => StatusCode::CONFLICT,
            ServiceError::Transport { .. } => StatusCode::BAD_GATEWAY,
            ServiceError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut api_err = ApiErrorType::from((status, message.as_str(), None));
        match err {
            ServiceError::ScheduleConflict(conflict) => api_err.body.conflict = Some(*conflict),
            ServiceError::SubstitutionConflict { existing, .. } => {
                api_err.body.existing = Some(*existing)
            }
            _ => {}
        }
        api_err
    }
}

impl IntoResponse for ApiErrorType {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
