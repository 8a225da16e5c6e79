use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{EntryId, LocationId, TeacherId, TimeSlotId};

/// Day of the school week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    /// The weekday whose schedule applies on `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        match date.weekday() {
            chrono::Weekday::Mon => Weekday::Monday,
            chrono::Weekday::Tue => Weekday::Tuesday,
            chrono::Weekday::Wed => Weekday::Wednesday,
            chrono::Weekday::Thu => Weekday::Thursday,
            chrono::Weekday::Fri => Weekday::Friday,
            chrono::Weekday::Sat => Weekday::Saturday,
            chrono::Weekday::Sun => Weekday::Sunday,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Monday => "monday",
            Weekday::Tuesday => "tuesday",
            Weekday::Wednesday => "wednesday",
            Weekday::Thursday => "thursday",
            Weekday::Friday => "friday",
            Weekday::Saturday => "saturday",
            Weekday::Sunday => "sunday",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Weekday {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Weekday::ALL
            .into_iter()
            .find(|d| d.as_str() == lowered || d.as_str()[..3] == lowered)
            .ok_or_else(|| format!("Unknown weekday: {s}"))
    }
}

/// What occupies a cell: either a catalog subject or a free-text activity
/// (assembly, homeroom, club hour, ...). Exactly one is ever present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryContent {
    Subject { code: String },
    Activity { name: String },
}

impl EntryContent {
    pub fn subject_code(&self) -> Option<&str> {
        match self {
            EntryContent::Subject { code } => Some(code),
            EntryContent::Activity { .. } => None,
        }
    }

    pub fn activity_name(&self) -> Option<&str> {
        match self {
            EntryContent::Subject { .. } => None,
            EntryContent::Activity { name } => Some(name),
        }
    }
}

/// A schedule entry that has not been saved yet (or the editable part of one).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub day: Weekday,
    pub time_slot_id: TimeSlotId,
    /// Class group name, or free text for non-class activities.
    #[serde(default)]
    pub class_group: Option<String>,
    pub content: EntryContent,
    #[serde(default)]
    pub teacher_ids: Vec<TeacherId>,
    #[serde(default)]
    pub location_id: Option<LocationId>,
    pub academic_year: i32,
    pub semester: u8,
}

impl EntryDraft {
    /// Same draft placed in a different grid cell.
    pub fn at(mut self, day: Weekday, time_slot_id: TimeSlotId) -> Self {
        self.day = day;
        self.time_slot_id = time_slot_id;
        self
    }

    pub fn into_entry(self, id: EntryId) -> ScheduleEntry {
        ScheduleEntry {
            id,
            day: self.day,
            time_slot_id: self.time_slot_id,
            class_group: self.class_group,
            content: self.content,
            teacher_ids: self.teacher_ids,
            location_id: self.location_id,
            academic_year: self.academic_year,
            semester: self.semester,
        }
    }
}

/// One occupied (day, time slot) cell in the master timetable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: EntryId,
    pub day: Weekday,
    pub time_slot_id: TimeSlotId,
    #[serde(default)]
    pub class_group: Option<String>,
    pub content: EntryContent,
    #[serde(default)]
    pub teacher_ids: Vec<TeacherId>,
    #[serde(default)]
    pub location_id: Option<LocationId>,
    pub academic_year: i32,
    pub semester: u8,
}

impl ScheduleEntry {
    pub fn draft(&self) -> EntryDraft {
        EntryDraft {
            day: self.day,
            time_slot_id: self.time_slot_id,
            class_group: self.class_group.clone(),
            content: self.content.clone(),
            teacher_ids: self.teacher_ids.clone(),
            location_id: self.location_id,
            academic_year: self.academic_year,
            semester: self.semester,
        }
    }

    pub fn has_teacher(&self, teacher_id: TeacherId) -> bool {
        self.teacher_ids.contains(&teacher_id)
    }

    /// True when both occupy the same grid cell of the same term.
    pub fn same_cell(&self, draft: &EntryDraft) -> bool {
        self.day == draft.day
            && self.time_slot_id == draft.time_slot_id
            && self.academic_year == draft.academic_year
            && self.semester == draft.semester
    }
}

/// Optional narrowing for schedule listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleFilter {
    #[serde(default)]
    pub day: Option<Weekday>,
    #[serde(default)]
    pub academic_year: Option<i32>,
    #[serde(default)]
    pub semester: Option<u8>,
}

impl ScheduleFilter {
    pub fn day(day: Weekday) -> Self {
        Self {
            day: Some(day),
            ..Self::default()
        }
    }

    pub fn with_term(mut self, academic_year: i32, semester: u8) -> Self {
        self.academic_year = Some(academic_year);
        self.semester = Some(semester);
        self
    }

    pub fn matches(&self, entry: &ScheduleEntry) -> bool {
        self.day.map_or(true, |d| d == entry.day)
            && self.academic_year.map_or(true, |y| y == entry.academic_year)
            && self.semester.map_or(true, |s| s == entry.semester)
    }
}
