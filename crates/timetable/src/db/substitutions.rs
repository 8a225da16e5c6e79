//! Substitution persistence.
//!
//! At most one substitution exists per (date, schedule entry). Adding a second
//! one without naming the substitution it replaces is rejected with the
//! existing record so the caller can ask for confirmation.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use super::schedule::{cell_entries, get_entry_in, teacher_exists};
use super::TimetableDb;
use crate::conflict::find_conflict;
use crate::models::{
    EntryDraft, Substitution, SubstitutionDraft, SubstitutionId, TeacherId, Weekday,
};
use crate::service::{ServiceError, ServiceResult};

const SUBSTITUTION_COLUMNS: &str = "substitution_id, substitution_date, absent_teacher_id, \
     substitute_teacher_id, entry_id, reason, notes";

fn read_substitution(row: &Row) -> rusqlite::Result<Substitution> {
    Ok(Substitution {
        id: row.get(0)?,
        date: row.get(1)?,
        absent_teacher_id: row.get(2)?,
        substitute_teacher_id: row.get(3)?,
        schedule_entry_id: row.get(4)?,
        reason: row.get(5)?,
        notes: row.get(6)?,
    })
}

fn get_substitution_in(conn: &Connection, id: SubstitutionId) -> ServiceResult<Option<Substitution>> {
    Ok(conn
        .query_row(
            &format!("SELECT {SUBSTITUTION_COLUMNS} FROM substitutions WHERE substitution_id = ?1"),
            [id],
            read_substitution,
        )
        .optional()?)
}

fn substitutions_on_in(conn: &Connection, date: NaiveDate) -> ServiceResult<Vec<Substitution>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SUBSTITUTION_COLUMNS} FROM substitutions
         WHERE substitution_date = ?1 ORDER BY substitution_id"
    ))?;
    let subs = stmt
        .query_map([date], read_substitution)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(subs)
}

/// Is `teacher` already covering another entry in the same slot on `date`?
fn is_covering_slot(
    conn: &Connection,
    date: NaiveDate,
    cell: &EntryDraft,
    teacher: TeacherId,
) -> ServiceResult<bool> {
    let covering: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM substitutions s
            JOIN schedule_entries e ON e.entry_id = s.entry_id
            WHERE s.substitution_date = ?1
              AND s.substitute_teacher_id = ?2
              AND e.time_slot_id = ?3
              AND e.day = ?4
              AND e.academic_year = ?5
              AND e.semester = ?6
        )",
        params![
            date,
            teacher,
            cell.time_slot_id,
            cell.day.as_str(),
            cell.academic_year,
            cell.semester
        ],
        |row| row.get(0),
    )?;
    Ok(covering)
}

impl TimetableDb {
    pub fn substitutions_on(&self, date: NaiveDate) -> ServiceResult<Vec<Substitution>> {
        let db = self.conn()?;
        substitutions_on_in(&db, date)
    }

    pub fn get_substitution(&self, id: SubstitutionId) -> ServiceResult<Option<Substitution>> {
        let db = self.conn()?;
        get_substitution_in(&db, id)
    }

    /// Records a substitution, optionally replacing `replace_id` in the same
    /// transaction.
    pub fn insert_substitution(
        &self,
        draft: &SubstitutionDraft,
        replace_id: Option<SubstitutionId>,
    ) -> ServiceResult<Substitution> {
        if draft.substitute_teacher_id == draft.absent_teacher_id {
            return Err(ServiceError::validation(
                "The substitute must be a different teacher",
            ));
        }

        let mut db = self.conn()?;
        let tx = db.transaction()?;

        let entry = get_entry_in(&tx, draft.schedule_entry_id)?
            .ok_or_else(|| ServiceError::not_found("Schedule entry", draft.schedule_entry_id))?;

        if !teacher_exists(&tx, draft.substitute_teacher_id)? {
            return Err(ServiceError::validation(format!(
                "Unknown teacher {}",
                draft.substitute_teacher_id
            )));
        }

        let weekday = Weekday::from_date(draft.date);
        if entry.day != weekday {
            return Err(ServiceError::validation(format!(
                "Entry {} is scheduled on {}, but {} is a {}",
                entry.id, entry.day, draft.date, weekday
            )));
        }
        if !entry.has_teacher(draft.absent_teacher_id) {
            return Err(ServiceError::validation(format!(
                "Teacher {} does not teach entry {}",
                draft.absent_teacher_id, entry.id
            )));
        }

        match replace_id {
            Some(id) => {
                let replaced = get_substitution_in(&tx, id)?
                    .ok_or_else(|| ServiceError::not_found("Substitution", id))?;
                if replaced.date != draft.date || replaced.schedule_entry_id != draft.schedule_entry_id {
                    return Err(ServiceError::validation(format!(
                        "Substitution {id} does not cover the same period"
                    )));
                }
                tx.execute("DELETE FROM substitutions WHERE substitution_id = ?1", [id])?;
            }
            None => {
                let existing = substitutions_on_in(&tx, draft.date)?
                    .into_iter()
                    .find(|s| s.schedule_entry_id == draft.schedule_entry_id);
                if let Some(existing) = existing {
                    let message = format!(
                        "Entry {} already has a substitute (teacher {}) on {}",
                        existing.schedule_entry_id, existing.substitute_teacher_id, existing.date
                    );
                    return Err(ServiceError::SubstitutionConflict {
                        existing: Box::new(existing),
                        message,
                    });
                }
            }
        }

        // The substitute must not be teaching in that cell already.
        let mut cell = entry.draft();
        cell.teacher_ids = vec![draft.substitute_teacher_id];
        cell.location_id = None;
        if let Some(conflict) = find_conflict(&cell_entries(&tx, &cell)?, &cell, None) {
            return Err(conflict.into());
        }

        if is_covering_slot(&tx, draft.date, &cell, draft.substitute_teacher_id)? {
            return Err(ServiceError::validation(format!(
                "Teacher {} is already covering another class in this period",
                draft.substitute_teacher_id
            )));
        }

        tx.execute(
            "INSERT INTO substitutions (
                substitution_date, absent_teacher_id, substitute_teacher_id,
                entry_id, reason, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                draft.date,
                draft.absent_teacher_id,
                draft.substitute_teacher_id,
                draft.schedule_entry_id,
                draft.reason,
                draft.notes,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!(
            substitution_id = id,
            date = %draft.date,
            entry_id = draft.schedule_entry_id,
            replaced = ?replace_id,
            "Recorded substitution"
        );
        Ok(draft.clone().into_substitution(id))
    }

    pub fn delete_substitution(&self, id: SubstitutionId) -> ServiceResult<()> {
        let db = self.conn()?;
        let removed = db.execute("DELETE FROM substitutions WHERE substitution_id = ?1", [id])?;
        if removed == 0 {
            return Err(ServiceError::not_found("Substitution", id));
        }
        info!(substitution_id = id, "Deleted substitution");
        Ok(())
    }
}
