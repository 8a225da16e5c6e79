//! Conflict detection for schedule cells and the overwrite confirmation gate.
//!
//! Two entries conflict when they sit in the same (day, time slot) cell of the
//! same term and share a teacher or a location. Teacher clashes are reported
//! before location clashes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{EntryDraft, EntryId, ScheduleEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    Teacher,
    Location,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::Teacher => f.write_str("teacher"),
            ConflictKind::Location => f.write_str("location"),
        }
    }
}

/// A destination cell already holds an entry that clashes with the proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConflict {
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    pub conflicting_entry: ScheduleEntry,
    pub message: String,
}

/// Finds the first entry in `existing` that clashes with `candidate`.
///
/// `ignore` excludes the entry being edited so it never conflicts with itself.
pub fn find_conflict(
    existing: &[ScheduleEntry],
    candidate: &EntryDraft,
    ignore: Option<EntryId>,
) -> Option<ScheduleConflict> {
    let same_cell: Vec<&ScheduleEntry> = existing
        .iter()
        .filter(|e| Some(e.id) != ignore && e.same_cell(candidate))
        .collect();

    for entry in &same_cell {
        if let Some(teacher_id) = candidate
            .teacher_ids
            .iter()
            .find(|t| entry.has_teacher(**t))
        {
            return Some(ScheduleConflict {
                kind: ConflictKind::Teacher,
                conflicting_entry: (*entry).clone(),
                message: format!(
                    "Teacher {} is already scheduled on {} in time slot {} (entry {})",
                    teacher_id, entry.day, entry.time_slot_id, entry.id
                ),
            });
        }
    }

    let location_id = candidate.location_id?;
    same_cell
        .into_iter()
        .find(|e| e.location_id == Some(location_id))
        .map(|entry| ScheduleConflict {
            kind: ConflictKind::Location,
            conflicting_entry: entry.clone(),
            message: format!(
                "Location {} is already in use on {} in time slot {} (entry {})",
                location_id, entry.day, entry.time_slot_id, entry.id
            ),
        })
}

/// A proposal that was rejected with a conflict and is waiting for the user
/// to choose between editing it and overwriting the conflicting entry.
///
/// The only way to obtain an [`OverwriteRequest`] is [`PendingOverwrite::confirm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOverwrite {
    proposed: EntryDraft,
    supersedes: Option<EntryId>,
    conflict: ScheduleConflict,
}

impl PendingOverwrite {
    /// `supersedes` names an entry that the proposal replaces (the source of a
    /// move, or the entry being edited); it is removed together with the
    /// conflicting one.
    pub fn new(proposed: EntryDraft, supersedes: Option<EntryId>, conflict: ScheduleConflict) -> Self {
        Self {
            proposed,
            supersedes,
            conflict,
        }
    }

    pub fn proposed(&self) -> &EntryDraft {
        &self.proposed
    }

    pub fn supersedes(&self) -> Option<EntryId> {
        self.supersedes
    }

    pub fn conflict(&self) -> &ScheduleConflict {
        &self.conflict
    }

    /// The user explicitly chose to overwrite.
    pub fn confirm(self) -> OverwriteRequest {
        OverwriteRequest {
            conflicting_entry_id: self.conflict.conflicting_entry.id,
            supersedes: self.supersedes,
            entry: self.proposed,
        }
    }

    /// The user chose to go back and edit; returns the proposal for editing.
    pub fn cancel(self) -> EntryDraft {
        self.proposed
    }
}

/// Force-delete the conflicting entry and save the new one atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverwriteRequest {
    conflicting_entry_id: EntryId,
    #[serde(default)]
    supersedes: Option<EntryId>,
    entry: EntryDraft,
}

impl OverwriteRequest {
    pub fn conflicting_entry_id(&self) -> EntryId {
        self.conflicting_entry_id
    }

    pub fn supersedes(&self) -> Option<EntryId> {
        self.supersedes
    }

    pub fn entry(&self) -> &EntryDraft {
        &self.entry
    }
}
