//! Drag-and-drop payloads for the schedule grid.
//!
//! A payload either moves an existing entry or drops a subject from the
//! catalog, optionally copying teachers/location/class from a template entry.
//! Payloads are validated here, before any schedule request is built.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::EntryId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DragPayload {
    #[serde(rename_all = "camelCase")]
    Move { entry_id: EntryId },
    #[serde(rename_all = "camelCase")]
    NewFromCatalog {
        subject_code: String,
        #[serde(default)]
        template_entry_id: Option<EntryId>,
    },
}

impl DragPayload {
    /// Parses and validates a raw payload.
    ///
    /// Malformed payloads are logged and dropped; the drop simply does nothing.
    pub fn parse(raw: &str) -> Option<Self> {
        let payload: DragPayload = match serde_json::from_str(raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed drag payload");
                return None;
            }
        };

        match &payload {
            DragPayload::NewFromCatalog { subject_code, .. } if subject_code.trim().is_empty() => {
                warn!("Ignoring catalog drag payload without a subject code");
                None
            }
            _ => Some(payload),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
