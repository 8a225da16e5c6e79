use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{EntryId, SubstitutionId, TeacherId};
use crate::service::ServiceError;

/// A replacement teacher covering one schedule entry on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    pub id: SubstitutionId,
    pub date: NaiveDate,
    pub absent_teacher_id: TeacherId,
    pub substitute_teacher_id: TeacherId,
    pub schedule_entry_id: EntryId,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Substitution {
    pub fn draft(&self) -> SubstitutionDraft {
        SubstitutionDraft {
            date: self.date,
            absent_teacher_id: self.absent_teacher_id,
            substitute_teacher_id: self.substitute_teacher_id,
            schedule_entry_id: self.schedule_entry_id,
            reason: self.reason.clone(),
            notes: self.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstitutionDraft {
    pub date: NaiveDate,
    pub absent_teacher_id: TeacherId,
    pub substitute_teacher_id: TeacherId,
    pub schedule_entry_id: EntryId,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SubstitutionDraft {
    pub fn into_substitution(self, id: SubstitutionId) -> Substitution {
        Substitution {
            id,
            date: self.date,
            absent_teacher_id: self.absent_teacher_id,
            substitute_teacher_id: self.substitute_teacher_id,
            schedule_entry_id: self.schedule_entry_id,
            reason: self.reason,
            notes: self.notes,
        }
    }
}

/// The user's in-progress selections before a substitution can be submitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubstitutionForm {
    pub date: Option<NaiveDate>,
    pub absent_teacher_id: Option<TeacherId>,
    pub substitute_teacher_id: Option<TeacherId>,
    pub schedule_entry_id: Option<EntryId>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SubstitutionForm {
    /// Checks that every required selection was made.
    pub fn validate(&self) -> Result<SubstitutionDraft, ServiceError> {
        let date = self
            .date
            .ok_or_else(|| ServiceError::validation("Please select a date"))?;
        let absent_teacher_id = self
            .absent_teacher_id
            .ok_or_else(|| ServiceError::validation("Please select the absent teacher"))?;
        let schedule_entry_id = self
            .schedule_entry_id
            .ok_or_else(|| ServiceError::validation("Please select the period to cover"))?;
        let substitute_teacher_id = self
            .substitute_teacher_id
            .ok_or_else(|| ServiceError::validation("Please select a substitute teacher"))?;

        if substitute_teacher_id == absent_teacher_id {
            return Err(ServiceError::validation(
                "The substitute must be a different teacher",
            ));
        }

        let notes = self
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        Ok(SubstitutionDraft {
            date,
            absent_teacher_id,
            substitute_teacher_id,
            schedule_entry_id,
            reason: self.reason.trim().to_string(),
            notes,
        })
    }
}
