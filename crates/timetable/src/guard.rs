//! In-flight submission tracking.
//!
//! A submit control stays disabled while its request is outstanding. Here the
//! "control" is a key; holding a [`SubmitTicket`] marks the key busy and
//! dropping it releases the key.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone, Default)]
pub struct SubmitGuard {
    in_flight: Arc<DashMap<String, Instant>>,
}

impl SubmitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key`, or returns `None` if a submission for it is outstanding.
    pub fn try_begin(&self, key: impl Into<String>) -> Option<SubmitTicket> {
        let key = key.into();
        match self.in_flight.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Some(SubmitTicket {
                    key,
                    in_flight: Arc::clone(&self.in_flight),
                })
            }
        }
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}

/// Releases its key when dropped.
pub struct SubmitTicket {
    key: String,
    in_flight: Arc<DashMap<String, Instant>>,
}

impl SubmitTicket {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for SubmitTicket {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}
