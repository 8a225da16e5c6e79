//! CSV export of a day's substitutions.
//!
//! The document starts with a UTF-8 byte-order mark so spreadsheet programs
//! pick the right encoding, and every field is quoted.

use csv::{QuoteStyle, WriterBuilder};
use std::collections::HashMap;
use thiserror::Error;

use crate::models::{
    EntryContent, Location, ScheduleEntry, Subject, Substitution, Teacher, TimeSlot,
};

pub const CSV_HEADERS: [&str; 10] = [
    "Period",
    "Time",
    "Absent teacher",
    "Reason",
    "Substitute teacher",
    "Subject code",
    "Subject",
    "Class group",
    "Location",
    "Notes",
];

const BOM: &str = "\u{feff}";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV output was not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Reference data used to turn ids into display names.
pub struct ExportContext<'a> {
    pub time_slots: &'a [TimeSlot],
    pub entries: &'a [ScheduleEntry],
    pub teachers: &'a [Teacher],
    pub subjects: &'a [Subject],
    pub locations: &'a [Location],
}

/// Builds one row per substitution, ordered by period.
///
/// Fields: period, time range, absent name, reason, substitute name, subject
/// code, subject name, class group, location, notes. Unknown references
/// render as empty fields.
pub fn substitution_rows(substitutions: &[Substitution], ctx: &ExportContext) -> Vec<[String; 10]> {
    let slots: HashMap<_, _> = ctx.time_slots.iter().map(|s| (s.id, s)).collect();
    let entries: HashMap<_, _> = ctx.entries.iter().map(|e| (e.id, e)).collect();
    let teachers: HashMap<_, _> = ctx.teachers.iter().map(|t| (t.id, t.name.as_str())).collect();
    let subjects: HashMap<_, _> = ctx
        .subjects
        .iter()
        .map(|s| (s.code.as_str(), s.name.as_str()))
        .collect();
    let locations: HashMap<_, _> = ctx
        .locations
        .iter()
        .map(|l| (l.id, l.name.as_str()))
        .collect();

    let mut keyed: Vec<(Option<u32>, i64, [String; 10])> = substitutions
        .iter()
        .map(|sub| {
            let entry = entries.get(&sub.schedule_entry_id);
            let slot = entry.and_then(|e| slots.get(&e.time_slot_id));

            let (subject_code, subject_name) = match entry.map(|e| &e.content) {
                Some(EntryContent::Subject { code }) => (
                    code.clone(),
                    subjects.get(code.as_str()).copied().unwrap_or_default().to_string(),
                ),
                Some(EntryContent::Activity { name }) => (String::new(), name.clone()),
                None => (String::new(), String::new()),
            };

            let row = [
                slot.map(|s| s.period.to_string()).unwrap_or_default(),
                slot.map(|s| s.time_range()).unwrap_or_default(),
                name_of(&teachers, sub.absent_teacher_id),
                sub.reason.clone(),
                name_of(&teachers, sub.substitute_teacher_id),
                subject_code,
                subject_name,
                entry
                    .and_then(|e| e.class_group.clone())
                    .unwrap_or_default(),
                entry
                    .and_then(|e| e.location_id)
                    .and_then(|id| locations.get(&id).copied())
                    .unwrap_or_default()
                    .to_string(),
                sub.notes.clone().unwrap_or_default(),
            ];

            (slot.map(|s| s.period), sub.id, row)
        })
        .collect();

    keyed.sort_by(|a, b| (a.0.is_none(), a.0, a.1).cmp(&(b.0.is_none(), b.0, b.1)));
    keyed.into_iter().map(|(_, _, row)| row).collect()
}

/// Renders the substitutions as a BOM-prefixed, fully quoted CSV document.
pub fn substitutions_csv(
    substitutions: &[Substitution],
    ctx: &ExportContext,
) -> Result<String, ExportError> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(BOM.as_bytes().to_vec());

    writer.write_record(CSV_HEADERS)?;
    for row in substitution_rows(substitutions, ctx) {
        writer.write_record(&row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}

fn name_of(teachers: &HashMap<i64, &str>, id: i64) -> String {
    teachers.get(&id).copied().unwrap_or_default().to_string()
}
