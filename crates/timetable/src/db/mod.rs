//! SQLite-backed timetable store.
//!
//! This is the authoritative side of the service contracts: it validates
//! writes, detects schedule conflicts, and performs overwrite and replace
//! operations inside a single transaction.

mod schedule;
mod substitutions;
mod types;

pub use types::DbEntryRow;

use chrono::NaiveDate;
use rusqlite::{params, Connection, ErrorCode};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::conflict::OverwriteRequest;
use crate::models::{
    ClassGroup, EntryDraft, EntryId, Location, NewClassGroup, NewLocation, NewTeacher,
    NewTimeSlot, ScheduleEntry, ScheduleFilter, Subject, Substitution, SubstitutionDraft,
    SubstitutionId, Teacher, TimeSlot,
};
use crate::service::{ScheduleService, ServiceError, ServiceResult, SubstituteService};

const SCHEMA_SQL: &str = include_str!("../../sql/init_timetable.sql");

pub struct TimetableDb {
    db: Mutex<Connection>,
}

impl TimetableDb {
    /// Opens (or creates) the database file and initializes the schema.
    pub fn new(db_path: &str) -> ServiceResult<Self> {
        info!(path = %db_path, "Opening timetable database");
        Self::init(Connection::open(db_path)?)
    }

    /// An empty in-memory store.
    pub fn open_in_memory() -> ServiceResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> ServiceResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> ServiceResult<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| ServiceError::Store {
            message: "Database lock poisoned".to_string(),
        })
    }

    pub fn list_teachers(&self) -> ServiceResult<Vec<Teacher>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT teacher_id, name, department, phone FROM teachers ORDER BY teacher_id",
        )?;
        let teachers = stmt.query_map([], |row| {
            Ok(Teacher {
                id: row.get(0)?,
                name: row.get(1)?,
                department: row.get(2)?,
                phone: row.get(3)?,
            })
        })?;
        Ok(teachers.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn insert_teacher(&self, teacher: &NewTeacher) -> ServiceResult<Teacher> {
        require_name(&teacher.name, "Teacher")?;
        let db = self.conn()?;
        db.execute(
            "INSERT INTO teachers (name, department, phone) VALUES (?1, ?2, ?3)",
            params![teacher.name.trim(), teacher.department, teacher.phone],
        )?;
        Ok(Teacher {
            id: db.last_insert_rowid(),
            name: teacher.name.trim().to_string(),
            department: teacher.department.clone(),
            phone: teacher.phone.clone(),
        })
    }

    pub fn list_subjects(&self) -> ServiceResult<Vec<Subject>> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT code, name, subject_group FROM subjects ORDER BY code")?;
        let subjects = stmt.query_map([], |row| {
            Ok(Subject {
                code: row.get(0)?,
                name: row.get(1)?,
                group: row.get(2)?,
            })
        })?;
        Ok(subjects.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn insert_subject(&self, subject: &Subject) -> ServiceResult<Subject> {
        require_name(&subject.code, "Subject code")?;
        require_name(&subject.name, "Subject")?;
        let db = self.conn()?;
        db.execute(
            "INSERT INTO subjects (code, name, subject_group) VALUES (?1, ?2, ?3)",
            params![subject.code.trim(), subject.name.trim(), subject.group],
        )
        .map_err(|e| {
            constraint_as_validation(e, format!("Subject code {} already exists", subject.code))
        })?;
        Ok(Subject {
            code: subject.code.trim().to_string(),
            name: subject.name.trim().to_string(),
            group: subject.group.clone(),
        })
    }

    pub fn list_class_groups(&self) -> ServiceResult<Vec<ClassGroup>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT class_group_id, name, grade_level FROM class_groups ORDER BY name",
        )?;
        let groups = stmt.query_map([], |row| {
            Ok(ClassGroup {
                id: row.get(0)?,
                name: row.get(1)?,
                grade_level: row.get(2)?,
            })
        })?;
        Ok(groups.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn insert_class_group(&self, group: &NewClassGroup) -> ServiceResult<ClassGroup> {
        require_name(&group.name, "Class group")?;
        let db = self.conn()?;
        db.execute(
            "INSERT INTO class_groups (name, grade_level) VALUES (?1, ?2)",
            params![group.name.trim(), group.grade_level],
        )
        .map_err(|e| {
            constraint_as_validation(e, format!("Class group {} already exists", group.name))
        })?;
        Ok(ClassGroup {
            id: db.last_insert_rowid(),
            name: group.name.trim().to_string(),
            grade_level: group.grade_level.clone(),
        })
    }

    pub fn list_locations(&self) -> ServiceResult<Vec<Location>> {
        let db = self.conn()?;
        let mut stmt =
            db.prepare("SELECT location_id, name, building FROM locations ORDER BY location_id")?;
        let locations = stmt.query_map([], |row| {
            Ok(Location {
                id: row.get(0)?,
                name: row.get(1)?,
                building: row.get(2)?,
            })
        })?;
        Ok(locations.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn insert_location(&self, location: &NewLocation) -> ServiceResult<Location> {
        require_name(&location.name, "Location")?;
        let db = self.conn()?;
        db.execute(
            "INSERT INTO locations (name, building) VALUES (?1, ?2)",
            params![location.name.trim(), location.building],
        )?;
        Ok(Location {
            id: db.last_insert_rowid(),
            name: location.name.trim().to_string(),
            building: location.building.clone(),
        })
    }

    pub fn list_time_slots(&self) -> ServiceResult<Vec<TimeSlot>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT time_slot_id, period, start_time, end_time FROM time_slots ORDER BY period",
        )?;
        let slots = stmt.query_map([], |row| {
            Ok(TimeSlot {
                id: row.get(0)?,
                period: row.get(1)?,
                start_time: row.get(2)?,
                end_time: row.get(3)?,
            })
        })?;
        Ok(slots.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn insert_time_slot(&self, slot: &NewTimeSlot) -> ServiceResult<TimeSlot> {
        if slot.end_time <= slot.start_time {
            return Err(ServiceError::validation(format!(
                "Period {} must end after it starts",
                slot.period
            )));
        }
        let db = self.conn()?;
        db.execute(
            "INSERT INTO time_slots (period, start_time, end_time) VALUES (?1, ?2, ?3)",
            params![slot.period, slot.start_time, slot.end_time],
        )
        .map_err(|e| constraint_as_validation(e, format!("Period {} already exists", slot.period)))?;
        Ok(TimeSlot {
            id: db.last_insert_rowid(),
            period: slot.period,
            start_time: slot.start_time,
            end_time: slot.end_time,
        })
    }
}

impl ScheduleService for TimetableDb {
    async fn list_entries(&self, filter: &ScheduleFilter) -> ServiceResult<Vec<ScheduleEntry>> {
        TimetableDb::list_entries(self, filter)
    }

    async fn add_entry(&self, draft: &EntryDraft) -> ServiceResult<ScheduleEntry> {
        self.insert_entry(draft)
    }

    async fn update_entry(&self, id: EntryId, draft: &EntryDraft) -> ServiceResult<ScheduleEntry> {
        TimetableDb::update_entry(self, id, draft)
    }

    async fn delete_entry(&self, id: EntryId) -> ServiceResult<()> {
        TimetableDb::delete_entry(self, id)
    }

    async fn overwrite_entry(&self, request: &OverwriteRequest) -> ServiceResult<ScheduleEntry> {
        TimetableDb::overwrite_entry(self, request)
    }
}

impl SubstituteService for TimetableDb {
    async fn substitutions_on(&self, date: NaiveDate) -> ServiceResult<Vec<Substitution>> {
        TimetableDb::substitutions_on(self, date)
    }

    async fn add_substitution(
        &self,
        draft: &SubstitutionDraft,
        replace_id: Option<SubstitutionId>,
    ) -> ServiceResult<Substitution> {
        self.insert_substitution(draft, replace_id)
    }

    async fn delete_substitution(&self, id: SubstitutionId) -> ServiceResult<()> {
        TimetableDb::delete_substitution(self, id)
    }
}

fn require_name(value: &str, what: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        Err(ServiceError::validation(format!("{what} name is required")))
    } else {
        Ok(())
    }
}

/// Maps a UNIQUE/CHECK violation to a user-facing validation error.
fn constraint_as_validation(err: rusqlite::Error, message: String) -> ServiceError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => ServiceError::Validation(message),
        _ => err.into(),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::seeded_db;
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn test_reference_data_round_trip() {
        let db = seeded_db();
        assert_eq!(db.list_time_slots().unwrap().len(), 3);
        assert_eq!(db.list_teachers().unwrap()[1].name, "Boonmee");
        assert_eq!(db.list_locations().unwrap().len(), 2);

        db.insert_subject(&Subject {
            code: "SCI".to_string(),
            name: "Science".to_string(),
            group: Some("Science & Technology".to_string()),
        })
        .unwrap();
        db.insert_class_group(&NewClassGroup {
            name: "M.1/1".to_string(),
            grade_level: Some("M.1".to_string()),
        })
        .unwrap();

        let codes: Vec<String> = db.list_subjects().unwrap().into_iter().map(|s| s.code).collect();
        assert_eq!(codes, vec!["ENG", "MATH101", "PHY", "SCI"]);
        assert_eq!(db.list_class_groups().unwrap()[0].name, "M.1/1");
    }

    #[test]
    fn test_duplicate_subject_is_validation_error() {
        let db = seeded_db();
        let subject = Subject {
            code: "ART".to_string(),
            name: "Art".to_string(),
            group: None,
        };
        db.insert_subject(&subject).unwrap();
        assert!(matches!(
            db.insert_subject(&subject).unwrap_err(),
            ServiceError::Validation(_)
        ));
    }

    #[test]
    fn test_time_slot_validation() {
        let db = seeded_db();
        let err = db
            .insert_time_slot(&NewTimeSlot {
                period: 9,
                start_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let duplicate = db
            .insert_time_slot(&NewTimeSlot {
                period: 1,
                start_time: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(13, 50, 0).unwrap(),
            })
            .unwrap_err();
        assert!(matches!(duplicate, ServiceError::Validation(_)));
    }

    #[test]
    fn test_blank_teacher_name_rejected() {
        let db = seeded_db();
        let err = db
            .insert_teacher(&NewTeacher {
                name: "  ".to_string(),
                department: None,
                phone: None,
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}
