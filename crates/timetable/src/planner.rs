//! Schedule grid editing: drops, moves, edits and confirmed overwrites.
//!
//! The planner keeps a local snapshot of the grid and only changes it after
//! the service accepted a write. A failed write leaves the snapshot exactly as
//! it was and hands the service's message back unchanged.

use tracing::{info, warn};

use crate::conflict::PendingOverwrite;
use crate::drag::DragPayload;
use crate::models::{
    EntryContent, EntryDraft, EntryId, ScheduleEntry, ScheduleFilter, TimeSlotId, Weekday,
};
use crate::service::{ScheduleService, ServiceError, ServiceResult};

/// Result of a placement that went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub entry: ScheduleEntry,
    /// Set when the write succeeded but a follow-up step did not (e.g. the
    /// source of a move could not be removed).
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// Nothing to do: malformed payload, or dropped onto its own cell.
    Unchanged,
    Placed(Placement),
    /// The service reported a clash; the user must confirm or go back.
    NeedsConfirmation(PendingOverwrite),
}

pub struct Planner<S> {
    service: S,
    academic_year: i32,
    semester: u8,
    entries: Vec<ScheduleEntry>,
}

impl<S: ScheduleService> Planner<S> {
    pub fn new(service: S, academic_year: i32, semester: u8, entries: Vec<ScheduleEntry>) -> Self {
        Self {
            service,
            academic_year,
            semester,
            entries,
        }
    }

    /// Builds a planner from the service's current entries for the term.
    pub async fn load(service: S, academic_year: i32, semester: u8) -> ServiceResult<Self> {
        let entries = service
            .list_entries(&ScheduleFilter::default().with_term(academic_year, semester))
            .await?;
        Ok(Self::new(service, academic_year, semester, entries))
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn entry(&self, id: EntryId) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Handles a raw drop onto (day, slot).
    pub async fn drop_payload(
        &mut self,
        raw: &str,
        day: Weekday,
        time_slot_id: TimeSlotId,
    ) -> ServiceResult<DropOutcome> {
        match DragPayload::parse(raw) {
            None => Ok(DropOutcome::Unchanged),
            Some(DragPayload::Move { entry_id }) => self.move_entry(entry_id, day, time_slot_id).await,
            Some(DragPayload::NewFromCatalog {
                subject_code,
                template_entry_id,
            }) => {
                self.place_new(&subject_code, template_entry_id, day, time_slot_id)
                    .await
            }
        }
    }

    /// Moves an entry by creating it at the destination and then deleting the
    /// original.
    ///
    /// If the delete fails the new entry stays and the outcome carries a
    /// warning; the creation is not undone. Use [`Planner::relocate_entry`] for
    /// a single atomic request.
    pub async fn move_entry(
        &mut self,
        id: EntryId,
        day: Weekday,
        time_slot_id: TimeSlotId,
    ) -> ServiceResult<DropOutcome> {
        let source = self
            .entry(id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("Schedule entry", id))?;
        if source.day == day && source.time_slot_id == time_slot_id {
            return Ok(DropOutcome::Unchanged);
        }

        let proposed = source.draft().at(day, time_slot_id);
        let created = match self.service.add_entry(&proposed).await {
            Ok(entry) => entry,
            Err(ServiceError::ScheduleConflict(conflict)) => {
                return Ok(DropOutcome::NeedsConfirmation(PendingOverwrite::new(
                    proposed,
                    Some(id),
                    *conflict,
                )))
            }
            Err(e) => return Err(e),
        };
        self.entries.push(created.clone());

        let warning = match self.service.delete_entry(id).await {
            Ok(()) => {
                self.entries.retain(|e| e.id != id);
                None
            }
            Err(e) => {
                warn!(
                    entry_id = id,
                    new_entry_id = created.id,
                    error = %e,
                    "Moved entry was created but the original could not be deleted"
                );
                Some(format!(
                    "The entry was copied to {} but the original could not be removed: {}",
                    day, e
                ))
            }
        };

        info!(from = id, to = created.id, day = %day, time_slot_id, "Moved schedule entry");
        Ok(DropOutcome::Placed(Placement {
            entry: created,
            warning,
        }))
    }

    /// Moves an entry with a single update request.
    pub async fn relocate_entry(
        &mut self,
        id: EntryId,
        day: Weekday,
        time_slot_id: TimeSlotId,
    ) -> ServiceResult<DropOutcome> {
        let source = self
            .entry(id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("Schedule entry", id))?;
        if source.day == day && source.time_slot_id == time_slot_id {
            return Ok(DropOutcome::Unchanged);
        }
        self.update_entry(id, source.draft().at(day, time_slot_id))
            .await
    }

    /// Creates a new entry for `subject_code`, copying class group, teachers
    /// and location from the template entry when given.
    pub async fn place_new(
        &mut self,
        subject_code: &str,
        template_entry_id: Option<EntryId>,
        day: Weekday,
        time_slot_id: TimeSlotId,
    ) -> ServiceResult<DropOutcome> {
        let content = EntryContent::Subject {
            code: subject_code.to_string(),
        };
        let proposed = match template_entry_id.and_then(|id| self.entry(id)) {
            Some(template) => EntryDraft {
                content,
                ..template.draft().at(day, time_slot_id)
            },
            None => {
                if let Some(id) = template_entry_id {
                    warn!(template_entry_id = id, "Template entry not in view, placing bare subject");
                }
                EntryDraft {
                    day,
                    time_slot_id,
                    class_group: None,
                    content,
                    teacher_ids: Vec::new(),
                    location_id: None,
                    academic_year: self.academic_year,
                    semester: self.semester,
                }
            }
        };

        self.add_entry(proposed).await
    }

    pub async fn add_entry(&mut self, draft: EntryDraft) -> ServiceResult<DropOutcome> {
        match self.service.add_entry(&draft).await {
            Ok(entry) => {
                self.entries.push(entry.clone());
                Ok(DropOutcome::Placed(Placement {
                    entry,
                    warning: None,
                }))
            }
            Err(ServiceError::ScheduleConflict(conflict)) => Ok(DropOutcome::NeedsConfirmation(
                PendingOverwrite::new(draft, None, *conflict),
            )),
            Err(e) => Err(e),
        }
    }

    pub async fn update_entry(&mut self, id: EntryId, draft: EntryDraft) -> ServiceResult<DropOutcome> {
        match self.service.update_entry(id, &draft).await {
            Ok(entry) => {
                if let Some(slot) = self.entries.iter_mut().find(|e| e.id == id) {
                    *slot = entry.clone();
                }
                Ok(DropOutcome::Placed(Placement {
                    entry,
                    warning: None,
                }))
            }
            Err(ServiceError::ScheduleConflict(conflict)) => Ok(DropOutcome::NeedsConfirmation(
                PendingOverwrite::new(draft, Some(id), *conflict),
            )),
            Err(e) => Err(e),
        }
    }

    pub async fn delete_entry(&mut self, id: EntryId) -> ServiceResult<()> {
        self.service.delete_entry(id).await?;
        self.entries.retain(|e| e.id != id);
        Ok(())
    }

    /// Sends the overwrite the user confirmed.
    pub async fn confirm_overwrite(&mut self, pending: PendingOverwrite) -> ServiceResult<Placement> {
        let request = pending.confirm();
        let entry = self.service.overwrite_entry(&request).await?;

        let conflicting = request.conflicting_entry_id();
        let superseded = request.supersedes();
        self.entries
            .retain(|e| e.id != conflicting && Some(e.id) != superseded);
        self.entries.push(entry.clone());

        info!(entry_id = entry.id, replaced = conflicting, "Overwrite confirmed");
        Ok(Placement {
            entry,
            warning: None,
        })
    }

    /// Re-reads the term's entries from the service.
    pub async fn refresh(&mut self) -> ServiceResult<()> {
        self.entries = self
            .service
            .list_entries(&ScheduleFilter::default().with_term(self.academic_year, self.semester))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{ConflictKind, OverwriteRequest};
    use crate::db::test_support::{draft, seeded_db};
    use crate::db::TimetableDb;
    use std::sync::Mutex;

    /// Wraps the store and can be told to fail deletes.
    struct FlakyDeletes {
        db: TimetableDb,
        fail_deletes: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FlakyDeletes {
        fn new(db: TimetableDb, fail_deletes: bool) -> Self {
            Self {
                db,
                fail_deletes,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl ScheduleService for FlakyDeletes {
        async fn list_entries(&self, filter: &ScheduleFilter) -> ServiceResult<Vec<ScheduleEntry>> {
            self.db.list_entries(filter)
        }

        async fn add_entry(&self, draft: &EntryDraft) -> ServiceResult<ScheduleEntry> {
            let result = self.db.insert_entry(draft);
            if let Ok(entry) = &result {
                self.record(format!("add {}", entry.id));
            }
            result
        }

        async fn update_entry(&self, id: EntryId, draft: &EntryDraft) -> ServiceResult<ScheduleEntry> {
            self.record(format!("update {id}"));
            self.db.update_entry(id, draft)
        }

        async fn delete_entry(&self, id: EntryId) -> ServiceResult<()> {
            self.record(format!("delete {id}"));
            if self.fail_deletes {
                return Err(ServiceError::Transport {
                    message: "connection reset".to_string(),
                });
            }
            self.db.delete_entry(id)
        }

        async fn overwrite_entry(&self, request: &OverwriteRequest) -> ServiceResult<ScheduleEntry> {
            self.record(format!("overwrite {}", request.conflicting_entry_id()));
            self.db.overwrite_entry(request)
        }
    }

    async fn planner_with(fail_deletes: bool, drafts: Vec<EntryDraft>) -> Planner<FlakyDeletes> {
        let db = seeded_db();
        for d in &drafts {
            db.insert_entry(d).unwrap();
        }
        Planner::load(FlakyDeletes::new(db, fail_deletes), 2024, 1)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_move_creates_then_deletes_original() {
        let mut planner = planner_with(false, vec![draft(Weekday::Monday, 1, vec![1], Some(1))]).await;
        let original = planner.entries()[0].id;

        let outcome = planner
            .drop_payload(&format!(r#"{{"type":"move","entryId":{original}}}"#), Weekday::Tuesday, 2)
            .await
            .unwrap();

        let placement = match outcome {
            DropOutcome::Placed(p) => p,
            other => panic!("expected placement, got {other:?}"),
        };
        assert_eq!(placement.warning, None);
        assert_eq!(placement.entry.day, Weekday::Tuesday);
        assert_eq!(placement.entry.time_slot_id, 2);

        let calls = planner.service().calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![format!("add {}", placement.entry.id), format!("delete {original}")]
        );
        assert_eq!(planner.entries(), &[placement.entry.clone()]);
        assert!(planner.service().db.get_entry(original).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_delete_after_move_keeps_copy_and_warns() {
        let mut planner = planner_with(true, vec![draft(Weekday::Monday, 1, vec![1], None)]).await;
        let original = planner.entries()[0].id;

        let outcome = planner.move_entry(original, Weekday::Tuesday, 2).await.unwrap();
        let placement = match outcome {
            DropOutcome::Placed(p) => p,
            other => panic!("expected placement, got {other:?}"),
        };

        assert!(placement.warning.unwrap().contains("connection reset"));
        // Both the original and the copy exist
        assert!(planner.service().db.get_entry(original).unwrap().is_some());
        assert!(planner.service().db.get_entry(placement.entry.id).unwrap().is_some());
        assert_eq!(planner.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_drop_on_own_cell_is_noop() {
        let mut planner = planner_with(false, vec![draft(Weekday::Monday, 1, vec![1], None)]).await;
        let id = planner.entries()[0].id;

        let outcome = planner.move_entry(id, Weekday::Monday, 1).await.unwrap();
        assert_eq!(outcome, DropOutcome::Unchanged);
        assert!(planner.service().calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_ignored() {
        let mut planner = planner_with(false, vec![]).await;
        let outcome = planner.drop_payload("{oops", Weekday::Monday, 1).await.unwrap();
        assert_eq!(outcome, DropOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_conflicting_move_waits_for_confirmation() {
        let mut planner = planner_with(
            false,
            vec![
                draft(Weekday::Monday, 1, vec![1], None),
                draft(Weekday::Tuesday, 2, vec![1], None),
            ],
        )
        .await;
        let source = planner.entries()[0].id;
        let occupant = planner.entries()[1].id;
        let before = planner.entries().to_vec();

        let pending = match planner.move_entry(source, Weekday::Tuesday, 2).await.unwrap() {
            DropOutcome::NeedsConfirmation(p) => p,
            other => panic!("expected confirmation, got {other:?}"),
        };
        assert_eq!(pending.conflict().kind, ConflictKind::Teacher);
        assert_eq!(pending.conflict().conflicting_entry.id, occupant);

        // No write was made and the snapshot is untouched
        assert!(planner.service().calls.lock().unwrap().is_empty());
        assert_eq!(planner.entries(), before.as_slice());

        let placement = planner.confirm_overwrite(pending).await.unwrap();
        assert_eq!(planner.entries(), &[placement.entry.clone()]);
        assert_eq!(
            planner.service().db.list_entries(&ScheduleFilter::default()).unwrap(),
            vec![placement.entry]
        );
    }

    #[tokio::test]
    async fn test_cancelled_overwrite_sends_nothing() {
        let mut planner = planner_with(false, vec![draft(Weekday::Monday, 1, vec![1], None)]).await;

        let pending = match planner
            .add_entry(draft(Weekday::Monday, 1, vec![1], None))
            .await
            .unwrap()
        {
            DropOutcome::NeedsConfirmation(p) => p,
            other => panic!("expected confirmation, got {other:?}"),
        };
        let returned = pending.cancel();
        assert_eq!(returned.time_slot_id, 1);
        assert!(planner.service().calls.lock().unwrap().is_empty());
        assert_eq!(planner.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_place_new_copies_template() {
        let mut template = draft(Weekday::Monday, 1, vec![2, 3], Some(2));
        template.class_group = Some("M.4/1".to_string());
        let mut planner = planner_with(false, vec![template]).await;
        let template_id = planner.entries()[0].id;

        let raw = format!(
            r#"{{"type":"new_from_catalog","subjectCode":"PHY","templateEntryId":{template_id}}}"#
        );
        let placed = match planner.drop_payload(&raw, Weekday::Thursday, 3).await.unwrap() {
            DropOutcome::Placed(p) => p.entry,
            other => panic!("expected placement, got {other:?}"),
        };

        assert_eq!(placed.content.subject_code(), Some("PHY"));
        assert_eq!(placed.teacher_ids, vec![2, 3]);
        assert_eq!(placed.location_id, Some(2));
        assert_eq!(placed.class_group.as_deref(), Some("M.4/1"));
        assert_eq!(planner.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_place_new_without_template_uses_term() {
        let mut planner = planner_with(false, vec![]).await;
        let placed = match planner.place_new("ENG", None, Weekday::Friday, 2).await.unwrap() {
            DropOutcome::Placed(p) => p.entry,
            other => panic!("expected placement, got {other:?}"),
        };
        assert_eq!(placed.academic_year, 2024);
        assert_eq!(placed.semester, 1);
        assert!(placed.teacher_ids.is_empty());
    }

    #[tokio::test]
    async fn test_relocate_is_single_update() {
        let mut planner = planner_with(false, vec![draft(Weekday::Monday, 1, vec![1], None)]).await;
        let id = planner.entries()[0].id;

        planner.relocate_entry(id, Weekday::Friday, 3).await.unwrap();
        assert_eq!(
            planner.service().calls.lock().unwrap().clone(),
            vec![format!("update {id}")]
        );
        assert_eq!(planner.entry(id).unwrap().day, Weekday::Friday);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_snapshot_and_message() {
        let mut planner = planner_with(true, vec![draft(Weekday::Monday, 1, vec![1], None)]).await;
        let id = planner.entries()[0].id;

        let err = planner.delete_entry(id).await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
        assert_eq!(planner.entries().len(), 1);
    }
}
