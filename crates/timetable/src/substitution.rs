//! Replace-substitution confirmation flow.
//!
//! ```text
//! Idle --submit (entry already covered)--> PendingReplaceConfirmation
//! Idle --submit (entry free)-------------> Committed
//! PendingReplaceConfirmation --confirm---> Committed
//! PendingReplaceConfirmation --cancel----> Idle
//! ```
//!
//! No write is sent while a replacement is pending.

use tracing::{info, warn};

use crate::models::{Substitution, SubstitutionDraft, SubstitutionForm};
use crate::service::{ServiceError, ServiceResult, SubstituteService};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FlowState {
    #[default]
    Idle,
    PendingReplaceConfirmation {
        existing: Substitution,
        proposed: SubstitutionDraft,
    },
    Committed(Substitution),
}

pub struct ReplaceFlow<S> {
    service: S,
    state: FlowState,
}

impl<S: SubstituteService> ReplaceFlow<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            state: FlowState::Idle,
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, FlowState::PendingReplaceConfirmation { .. })
    }

    /// Submits a new substitution.
    ///
    /// `active` holds the substitutions already loaded for the form's date. If
    /// one of them covers the same entry, the flow waits for confirmation
    /// instead of writing.
    pub async fn submit(
        &mut self,
        form: &SubstitutionForm,
        active: &[Substitution],
    ) -> ServiceResult<&FlowState> {
        if self.is_pending() {
            return Err(ServiceError::validation(
                "Confirm or cancel the pending replacement first",
            ));
        }
        let proposed = form.validate()?;

        if let Some(existing) = active
            .iter()
            .find(|s| s.date == proposed.date && s.schedule_entry_id == proposed.schedule_entry_id)
        {
            info!(
                existing_id = existing.id,
                entry_id = proposed.schedule_entry_id,
                "Entry already covered, waiting for replace confirmation"
            );
            self.state = FlowState::PendingReplaceConfirmation {
                existing: existing.clone(),
                proposed,
            };
            return Ok(&self.state);
        }

        match self.service.add_substitution(&proposed, None).await {
            Ok(saved) => {
                self.state = FlowState::Committed(saved);
            }
            // Someone else covered the entry after our list was loaded.
            Err(ServiceError::SubstitutionConflict { existing, .. })
                if existing.schedule_entry_id == proposed.schedule_entry_id =>
            {
                self.state = FlowState::PendingReplaceConfirmation {
                    existing: *existing,
                    proposed,
                };
            }
            Err(e) => {
                self.state = FlowState::Idle;
                return Err(e);
            }
        }
        Ok(&self.state)
    }

    /// Replaces the existing substitution with the proposed one.
    ///
    /// On failure the flow stays pending so the user can retry or cancel.
    pub async fn confirm(&mut self) -> ServiceResult<Substitution> {
        let (existing, proposed) = match &self.state {
            FlowState::PendingReplaceConfirmation { existing, proposed } => (existing, proposed),
            _ => {
                return Err(ServiceError::validation(
                    "There is no pending replacement to confirm",
                ))
            }
        };

        let saved = match self.service.add_substitution(proposed, Some(existing.id)).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(existing_id = existing.id, error = %e, "Replacing substitution failed");
                return Err(e);
            }
        };
        info!(
            replaced = existing.id,
            substitution_id = saved.id,
            "Substitution replaced"
        );

        self.state = FlowState::Committed(saved.clone());
        Ok(saved)
    }

    /// Drops the pending proposal. Returns it so the form can be refilled.
    pub fn cancel(&mut self) -> Option<SubstitutionDraft> {
        match std::mem::take(&mut self.state) {
            FlowState::PendingReplaceConfirmation { proposed, .. } => Some(proposed),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Returns to Idle after a commit.
    pub fn reset(&mut self) {
        if matches!(self.state, FlowState::Committed(_)) {
            self.state = FlowState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{draft, seeded_db};
    use crate::db::TimetableDb;
    use crate::models::{SubstitutionId, Weekday};
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts writes on top of the SQLite store.
    struct CountingStore {
        db: TimetableDb,
        writes: AtomicUsize,
    }

    impl CountingStore {
        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    impl SubstituteService for CountingStore {
        async fn substitutions_on(&self, date: NaiveDate) -> ServiceResult<Vec<Substitution>> {
            self.db.substitutions_on(date)
        }

        async fn add_substitution(
            &self,
            draft: &SubstitutionDraft,
            replace_id: Option<SubstitutionId>,
        ) -> ServiceResult<Substitution> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.db.insert_substitution(draft, replace_id)
        }

        async fn delete_substitution(&self, id: SubstitutionId) -> ServiceResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.db.delete_substitution(id)
        }
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 2).unwrap()
    }

    fn form(entry: i64, substitute: i64) -> SubstitutionForm {
        SubstitutionForm {
            date: Some(monday()),
            absent_teacher_id: Some(1),
            substitute_teacher_id: Some(substitute),
            schedule_entry_id: Some(entry),
            reason: "Training".to_string(),
            notes: None,
        }
    }

    /// A flow over a store with one Monday entry taught by teacher 1, already
    /// covered by teacher 2.
    fn covered_flow() -> (ReplaceFlow<CountingStore>, Substitution) {
        let db = seeded_db();
        let entry = db.insert_entry(&draft(Weekday::Monday, 1, vec![1], None)).unwrap();
        let existing = db
            .insert_substitution(&form(entry.id, 2).validate().unwrap(), None)
            .unwrap();
        let flow = ReplaceFlow::new(CountingStore {
            db,
            writes: AtomicUsize::new(0),
        });
        (flow, existing)
    }

    #[tokio::test]
    async fn test_free_entry_commits_directly() {
        let db = seeded_db();
        let entry = db.insert_entry(&draft(Weekday::Monday, 1, vec![1], None)).unwrap();
        let mut flow = ReplaceFlow::new(CountingStore {
            db,
            writes: AtomicUsize::new(0),
        });

        let state = flow.submit(&form(entry.id, 3), &[]).await.unwrap().clone();
        match state {
            FlowState::Committed(saved) => assert_eq!(saved.substitute_teacher_id, 3),
            other => panic!("expected commit, got {other:?}"),
        }
        assert_eq!(flow.service().writes(), 1);

        flow.reset();
        assert_eq!(flow.state(), &FlowState::Idle);
    }

    #[tokio::test]
    async fn test_covered_entry_waits_without_writing() {
        let (mut flow, existing) = covered_flow();
        let active = vec![existing.clone()];

        let state = flow
            .submit(&form(existing.schedule_entry_id, 3), &active)
            .await
            .unwrap()
            .clone();
        match state {
            FlowState::PendingReplaceConfirmation {
                existing: shown,
                proposed,
            } => {
                assert_eq!(shown, existing);
                assert_eq!(proposed.substitute_teacher_id, 3);
            }
            other => panic!("expected pending, got {other:?}"),
        }
        assert_eq!(flow.service().writes(), 0);

        // A second submit is refused until the pending one is resolved
        assert!(flow
            .submit(&form(existing.schedule_entry_id, 4), &active)
            .await
            .is_err());
        assert_eq!(flow.service().writes(), 0);
    }

    #[tokio::test]
    async fn test_cancel_keeps_original() {
        let (mut flow, existing) = covered_flow();

        flow.submit(&form(existing.schedule_entry_id, 3), &[existing.clone()])
            .await
            .unwrap();
        let dropped = flow.cancel().unwrap();
        assert_eq!(dropped.substitute_teacher_id, 3);
        assert_eq!(flow.state(), &FlowState::Idle);

        assert_eq!(flow.service().writes(), 0);
        assert_eq!(
            flow.service().substitutions_on(monday()).await.unwrap(),
            vec![existing]
        );
    }

    #[tokio::test]
    async fn test_confirm_replaces_by_id() {
        let (mut flow, existing) = covered_flow();

        flow.submit(&form(existing.schedule_entry_id, 3), &[existing.clone()])
            .await
            .unwrap();
        let saved = flow.confirm().await.unwrap();

        assert_eq!(flow.service().writes(), 1);
        assert_eq!(
            flow.service().substitutions_on(monday()).await.unwrap(),
            vec![saved.clone()]
        );
        assert_eq!(flow.state(), &FlowState::Committed(saved));
    }

    #[tokio::test]
    async fn test_stale_list_still_reaches_confirmation() {
        let (mut flow, existing) = covered_flow();

        // The caller's list predates the existing substitution
        let state = flow
            .submit(&form(existing.schedule_entry_id, 3), &[])
            .await
            .unwrap()
            .clone();
        assert!(matches!(
            state,
            FlowState::PendingReplaceConfirmation { existing: ref e, .. } if *e == existing
        ));
        assert_eq!(
            flow.service().substitutions_on(monday()).await.unwrap(),
            vec![existing]
        );
    }

    #[tokio::test]
    async fn test_invalid_form_sends_nothing() {
        let (mut flow, _) = covered_flow();
        let mut incomplete = form(1, 3);
        incomplete.substitute_teacher_id = None;

        let err = flow.submit(&incomplete, &[]).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(flow.service().writes(), 0);
        assert_eq!(flow.state(), &FlowState::Idle);
    }

    #[tokio::test]
    async fn test_confirm_without_pending_is_rejected() {
        let (mut flow, _) = covered_flow();
        assert!(flow.confirm().await.is_err());
        assert!(flow.cancel().is_none());
    }
}
