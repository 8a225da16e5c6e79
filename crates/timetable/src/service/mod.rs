//! Request/response contracts for the timetable service.
//!
//! The workflows in [`crate::planner`] and [`crate::substitution`] only talk to
//! these traits. The SQLite store implements them in-process and
//! [`crate::client::TimetableClient`] implements them over HTTP.

mod error;

pub use error::ServiceError;

use chrono::NaiveDate;
use std::future::Future;

use crate::conflict::OverwriteRequest;
use crate::models::{
    EntryDraft, EntryId, ScheduleEntry, ScheduleFilter, Substitution, SubstitutionDraft,
    SubstitutionId,
};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Schedule grid persistence. The implementation is the source of truth for
/// conflict detection and reports clashes as [`ServiceError::ScheduleConflict`].
pub trait ScheduleService {
    fn list_entries(
        &self,
        filter: &ScheduleFilter,
    ) -> impl Future<Output = ServiceResult<Vec<ScheduleEntry>>> + Send;

    fn add_entry(
        &self,
        draft: &EntryDraft,
    ) -> impl Future<Output = ServiceResult<ScheduleEntry>> + Send;

    fn update_entry(
        &self,
        id: EntryId,
        draft: &EntryDraft,
    ) -> impl Future<Output = ServiceResult<ScheduleEntry>> + Send;

    fn delete_entry(&self, id: EntryId) -> impl Future<Output = ServiceResult<()>> + Send;

    /// Deletes the conflicting entry (and the superseded one, if any) and saves
    /// the new entry atomically.
    fn overwrite_entry(
        &self,
        request: &OverwriteRequest,
    ) -> impl Future<Output = ServiceResult<ScheduleEntry>> + Send;
}

/// Substitution persistence.
pub trait SubstituteService {
    fn substitutions_on(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = ServiceResult<Vec<Substitution>>> + Send;

    /// Adds a substitution. With `replace_id`, the referenced substitution is
    /// removed in the same operation. Without it, an existing substitution for
    /// the same (date, entry) is reported as [`ServiceError::SubstitutionConflict`].
    fn add_substitution(
        &self,
        draft: &SubstitutionDraft,
        replace_id: Option<SubstitutionId>,
    ) -> impl Future<Output = ServiceResult<Substitution>> + Send;

    fn delete_substitution(
        &self,
        id: SubstitutionId,
    ) -> impl Future<Output = ServiceResult<()>> + Send;
}
