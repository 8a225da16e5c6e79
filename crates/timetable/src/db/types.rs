/// Raw database rows that need decoding before they become models

use crate::models::{EntryContent, ScheduleEntry, Weekday};
use crate::service::ServiceError;

#[derive(Debug, Clone)]
pub struct DbEntryRow {
    pub entry_id: i64,
    pub day: String,
    pub time_slot_id: i64,
    pub class_group: Option<String>,
    pub subject_code: Option<String>,
    pub custom_activity: Option<String>,
    pub teacher_ids: String, // JSON array
    pub location_id: Option<i64>,
    pub academic_year: i32,
    pub semester: u8,
}

impl TryFrom<DbEntryRow> for ScheduleEntry {
    type Error = ServiceError;

    fn try_from(row: DbEntryRow) -> Result<Self, Self::Error> {
        let day: Weekday = row.day.parse().map_err(|message| ServiceError::Store { message })?;

        let content = match (row.subject_code, row.custom_activity) {
            (Some(code), None) => EntryContent::Subject { code },
            (None, Some(name)) => EntryContent::Activity { name },
            _ => {
                return Err(ServiceError::Store {
                    message: format!(
                        "Entry {} must have exactly one of subject code or activity",
                        row.entry_id
                    ),
                })
            }
        };

        Ok(ScheduleEntry {
            id: row.entry_id,
            day,
            time_slot_id: row.time_slot_id,
            class_group: row.class_group,
            content,
            teacher_ids: serde_json::from_str(&row.teacher_ids)?,
            location_id: row.location_id,
            academic_year: row.academic_year,
            semester: row.semester,
        })
    }
}
