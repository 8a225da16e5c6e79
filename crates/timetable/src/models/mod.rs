//! Timetable domain models.
//!
//! Reference records (teachers, subjects, class groups, locations, time slots)
//! are flat and have no lifecycle of their own. Schedule entries occupy one
//! (day, time slot) cell of the weekly grid; substitutions pair an absent
//! teacher's entry with a replacement teacher for a single date.

mod reference;
mod schedule;
mod substitution;

pub use reference::{
    ClassGroup, Location, NewClassGroup, NewLocation, NewTeacher, NewTimeSlot, Subject, Teacher,
    TimeSlot,
};
pub use schedule::{EntryContent, EntryDraft, ScheduleEntry, ScheduleFilter, Weekday};
pub use substitution::{Substitution, SubstitutionDraft, SubstitutionForm};

pub type TeacherId = i64;
pub type ClassGroupId = i64;
pub type LocationId = i64;
pub type TimeSlotId = i64;
pub type EntryId = i64;
pub type SubstitutionId = i64;
