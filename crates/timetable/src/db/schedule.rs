//! Schedule entry persistence and server-side conflict checks.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use tracing::info;

use super::types::DbEntryRow;
use super::TimetableDb;
use crate::conflict::{find_conflict, OverwriteRequest};
use crate::models::{EntryContent, EntryDraft, EntryId, ScheduleEntry, ScheduleFilter, TeacherId};
use crate::service::{ServiceError, ServiceResult};

const ENTRY_COLUMNS: &str = "entry_id, day, time_slot_id, class_group, subject_code, \
     custom_activity, teacher_ids, location_id, academic_year, semester";

fn read_entry_row(row: &Row) -> rusqlite::Result<DbEntryRow> {
    Ok(DbEntryRow {
        entry_id: row.get(0)?,
        day: row.get(1)?,
        time_slot_id: row.get(2)?,
        class_group: row.get(3)?,
        subject_code: row.get(4)?,
        custom_activity: row.get(5)?,
        teacher_ids: row.get(6)?,
        location_id: row.get(7)?,
        academic_year: row.get(8)?,
        semester: row.get(9)?,
    })
}

pub(super) fn get_entry_in(conn: &Connection, id: EntryId) -> ServiceResult<Option<ScheduleEntry>> {
    let row = conn
        .query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM schedule_entries WHERE entry_id = ?1"),
            [id],
            read_entry_row,
        )
        .optional()?;
    row.map(ScheduleEntry::try_from).transpose()
}

/// Entries of the same term occupying the draft's (day, slot) cell.
pub(super) fn cell_entries(conn: &Connection, draft: &EntryDraft) -> ServiceResult<Vec<ScheduleEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM schedule_entries
         WHERE academic_year = ?1 AND semester = ?2 AND day = ?3 AND time_slot_id = ?4"
    ))?;
    let rows = stmt
        .query_map(
            params![
                draft.academic_year,
                draft.semester,
                draft.day.as_str(),
                draft.time_slot_id
            ],
            read_entry_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(ScheduleEntry::try_from).collect()
}

fn check_conflict(conn: &Connection, draft: &EntryDraft, ignore: Option<EntryId>) -> ServiceResult<()> {
    match find_conflict(&cell_entries(conn, draft)?, draft, ignore) {
        Some(conflict) => {
            info!(
                kind = %conflict.kind,
                conflicting_entry = conflict.conflicting_entry.id,
                "Rejecting schedule write due to conflict"
            );
            Err(conflict.into())
        }
        None => Ok(()),
    }
}

fn validate_draft(conn: &Connection, draft: &EntryDraft) -> ServiceResult<()> {
    match &draft.content {
        EntryContent::Subject { code } if code.trim().is_empty() => {
            return Err(ServiceError::validation("Please select a subject"));
        }
        EntryContent::Activity { name } if name.trim().is_empty() => {
            return Err(ServiceError::validation("Please enter an activity name"));
        }
        _ => {}
    }

    if !row_exists(
        conn,
        "SELECT EXISTS(SELECT 1 FROM time_slots WHERE time_slot_id = ?1)",
        [draft.time_slot_id],
    )? {
        return Err(ServiceError::validation(format!(
            "Unknown time slot {}",
            draft.time_slot_id
        )));
    }

    if let Some(code) = draft.content.subject_code() {
        if !row_exists(conn, "SELECT EXISTS(SELECT 1 FROM subjects WHERE code = ?1)", [code])? {
            return Err(ServiceError::validation(format!("Unknown subject {code}")));
        }
    }

    for &teacher_id in &draft.teacher_ids {
        if !teacher_exists(conn, teacher_id)? {
            return Err(ServiceError::validation(format!("Unknown teacher {teacher_id}")));
        }
    }

    if let Some(location_id) = draft.location_id {
        if !row_exists(
            conn,
            "SELECT EXISTS(SELECT 1 FROM locations WHERE location_id = ?1)",
            [location_id],
        )? {
            return Err(ServiceError::validation(format!(
                "Unknown location {location_id}"
            )));
        }
    }

    Ok(())
}

fn row_exists<P: Params>(conn: &Connection, sql: &str, params: P) -> ServiceResult<bool> {
    Ok(conn.query_row(sql, params, |row| row.get(0))?)
}

pub(super) fn teacher_exists(conn: &Connection, id: TeacherId) -> ServiceResult<bool> {
    row_exists(
        conn,
        "SELECT EXISTS(SELECT 1 FROM teachers WHERE teacher_id = ?1)",
        [id],
    )
}

/// Drops repeated teacher ids, keeping first-listed order.
fn unique_teachers(ids: &[i64]) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn insert_entry_in(conn: &Connection, draft: &EntryDraft) -> ServiceResult<ScheduleEntry> {
    let teacher_ids = unique_teachers(&draft.teacher_ids);
    conn.execute(
        "INSERT INTO schedule_entries (
            day, time_slot_id, class_group, subject_code, custom_activity,
            teacher_ids, location_id, academic_year, semester, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            draft.day.as_str(),
            draft.time_slot_id,
            draft.class_group,
            draft.content.subject_code(),
            draft.content.activity_name(),
            serde_json::to_string(&teacher_ids)?,
            draft.location_id,
            draft.academic_year,
            draft.semester,
            Utc::now().to_rfc3339(),
        ],
    )?;

    let mut saved = draft.clone();
    saved.teacher_ids = teacher_ids;
    Ok(saved.into_entry(conn.last_insert_rowid()))
}

/// Rewrites `previous` in place, keeping its id. Substitutions are dated, so
/// they no longer apply once the entry moves to another weekday.
fn update_entry_in(
    conn: &Connection,
    previous: &ScheduleEntry,
    draft: &EntryDraft,
) -> ServiceResult<ScheduleEntry> {
    let teacher_ids = unique_teachers(&draft.teacher_ids);
    conn.execute(
        "UPDATE schedule_entries
         SET day = ?1, time_slot_id = ?2, class_group = ?3, subject_code = ?4,
             custom_activity = ?5, teacher_ids = ?6, location_id = ?7,
             academic_year = ?8, semester = ?9
         WHERE entry_id = ?10",
        params![
            draft.day.as_str(),
            draft.time_slot_id,
            draft.class_group,
            draft.content.subject_code(),
            draft.content.activity_name(),
            serde_json::to_string(&teacher_ids)?,
            draft.location_id,
            draft.academic_year,
            draft.semester,
            previous.id,
        ],
    )?;

    if previous.day != draft.day {
        let dropped = conn.execute("DELETE FROM substitutions WHERE entry_id = ?1", [previous.id])?;
        if dropped > 0 {
            info!(entry_id = previous.id, dropped, "Dropped substitutions of moved entry");
        }
    }

    let mut saved = draft.clone();
    saved.teacher_ids = teacher_ids;
    Ok(saved.into_entry(previous.id))
}

impl TimetableDb {
    /// Lists entries ordered by day, time slot and id.
    pub fn list_entries(&self, filter: &ScheduleFilter) -> ServiceResult<Vec<ScheduleEntry>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM schedule_entries
             WHERE (?1 IS NULL OR day = ?1)
               AND (?2 IS NULL OR academic_year = ?2)
               AND (?3 IS NULL OR semester = ?3)"
        ))?;
        let rows = stmt
            .query_map(
                params![
                    filter.day.map(|d| d.as_str()),
                    filter.academic_year,
                    filter.semester
                ],
                read_entry_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut entries = rows
            .into_iter()
            .map(ScheduleEntry::try_from)
            .collect::<ServiceResult<Vec<_>>>()?;
        entries.sort_by_key(|e| (e.day, e.time_slot_id, e.id));
        Ok(entries)
    }

    pub fn get_entry(&self, id: EntryId) -> ServiceResult<Option<ScheduleEntry>> {
        let db = self.conn()?;
        get_entry_in(&db, id)
    }

    /// Saves a new entry, rejecting it if the cell already holds a clashing one.
    pub fn insert_entry(&self, draft: &EntryDraft) -> ServiceResult<ScheduleEntry> {
        let db = self.conn()?;
        validate_draft(&db, draft)?;
        check_conflict(&db, draft, None)?;
        let entry = insert_entry_in(&db, draft)?;
        info!(entry_id = entry.id, day = %entry.day, time_slot_id = entry.time_slot_id, "Added schedule entry");
        Ok(entry)
    }

    /// Replaces an entry's fields. Moving it to another cell is a plain update,
    /// so relocation through this method is atomic.
    pub fn update_entry(&self, id: EntryId, draft: &EntryDraft) -> ServiceResult<ScheduleEntry> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;
        let previous =
            get_entry_in(&tx, id)?.ok_or_else(|| ServiceError::not_found("Schedule entry", id))?;
        validate_draft(&tx, draft)?;
        check_conflict(&tx, draft, Some(id))?;

        let entry = update_entry_in(&tx, &previous, draft)?;
        tx.commit()?;

        info!(entry_id = id, day = %draft.day, time_slot_id = draft.time_slot_id, "Updated schedule entry");
        Ok(entry)
    }

    /// Deletes an entry; its substitutions go with it.
    pub fn delete_entry(&self, id: EntryId) -> ServiceResult<()> {
        let db = self.conn()?;
        let removed = db.execute("DELETE FROM schedule_entries WHERE entry_id = ?1", [id])?;
        if removed == 0 {
            return Err(ServiceError::not_found("Schedule entry", id));
        }
        info!(entry_id = id, "Deleted schedule entry");
        Ok(())
    }

    /// Removes the conflicting entry and saves the proposed one in one
    /// transaction. The conflicting entry must actually clash with the
    /// proposal. A superseded entry is rewritten in place so it keeps its id
    /// and substitutions. Any remaining clash aborts the whole operation.
    pub fn overwrite_entry(&self, request: &OverwriteRequest) -> ServiceResult<ScheduleEntry> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;
        let draft = request.entry();
        validate_draft(&tx, draft)?;

        let conflicting_id = request.conflicting_entry_id();
        let conflicting = get_entry_in(&tx, conflicting_id)?
            .ok_or_else(|| ServiceError::not_found("Schedule entry", conflicting_id))?;
        if find_conflict(std::slice::from_ref(&conflicting), draft, request.supersedes()).is_none() {
            return Err(ServiceError::validation(format!(
                "Entry {conflicting_id} does not clash with the proposed entry"
            )));
        }
        tx.execute("DELETE FROM schedule_entries WHERE entry_id = ?1", [conflicting_id])?;

        let entry = match request.supersedes() {
            Some(id) => {
                let previous = get_entry_in(&tx, id)?
                    .ok_or_else(|| ServiceError::not_found("Schedule entry", id))?;
                check_conflict(&tx, draft, Some(id))?;
                update_entry_in(&tx, &previous, draft)?
            }
            None => {
                check_conflict(&tx, draft, None)?;
                insert_entry_in(&tx, draft)?
            }
        };
        tx.commit()?;

        info!(
            entry_id = entry.id,
            replaced = conflicting_id,
            "Overwrote schedule entry"
        );
        Ok(entry)
    }
}
