//! Error types shared by every timetable service implementation.

use thiserror::Error;

use crate::conflict::ScheduleConflict;
use crate::models::Substitution;

/// Errors surfaced by schedule and substitute services.
///
/// Messages are shown to the user as-is, so variants carrying a message keep
/// the text the service produced.
#[derive(Debug, Error, Clone)]
pub enum ServiceError {
    /// A required selection is missing or inconsistent; nothing was sent.
    #[error("{0}")]
    Validation(String),

    /// Another entry already occupies the destination for the same teacher or location.
    #[error("{}", .0.message)]
    ScheduleConflict(Box<ScheduleConflict>),

    /// The schedule entry already has an active substitution on that date.
    #[error("{message}")]
    SubstitutionConflict {
        existing: Box<Substitution>,
        message: String,
    },

    #[error("{message}")]
    NotFound { message: String },

    /// The same operation is already being submitted.
    #[error("Operation already in progress: {key}")]
    InProgress { key: String },

    /// Network failure or an unexpected response from the service.
    #[error("{message}")]
    Transport { message: String },

    /// The backing store failed.
    #[error("Storage error: {message}")]
    Store { message: String },
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        ServiceError::NotFound {
            message: format!("{what} {id} not found"),
        }
    }

    /// Returns true if the failure is recoverable by user choice (edit or overwrite).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ServiceError::ScheduleConflict(_) | ServiceError::SubstitutionConflict { .. }
        )
    }
}

impl From<ScheduleConflict> for ServiceError {
    fn from(conflict: ScheduleConflict) -> Self {
        ServiceError::ScheduleConflict(Box::new(conflict))
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::Transport {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for ServiceError {
    fn from(err: url::ParseError) -> Self {
        ServiceError::Transport {
            message: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(err: rusqlite::Error) -> Self {
        ServiceError::Store {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Store {
            message: err.to_string(),
        }
    }
}
