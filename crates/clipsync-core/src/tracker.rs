//! Echo suppression gate shared by every sync direction
//!
//! The tracker holds the last value known to be synchronized. Both the local
//! clipboard poll and every remote update pass through [`ChangeTracker::observe`];
//! a value is only propagated when it is new to the tracker. Because a pushed
//! value is recorded before it leaves, the same value arriving back from the
//! remote side is reported as `Unchanged` and never re-applied.

use parking_lot::Mutex;

use crate::types::{ClipboardValue, Observation};

#[derive(Debug)]
struct SyncState {
    last_known: ClipboardValue,
    /// Value `last_known` replaced in the most recent transition
    previous: ClipboardValue,
}

/// Last known synchronized value, guarded by a single mutex.
#[derive(Debug)]
pub struct ChangeTracker {
    state: Mutex<SyncState>,
}

impl ChangeTracker {
    /// Tracker whose last known value is the empty string
    pub fn new() -> Self {
        Self::with_value(ClipboardValue::empty())
    }

    /// Tracker seeded with an already-synchronized value
    pub fn with_value(value: ClipboardValue) -> Self {
        Self {
            state: Mutex::new(SyncState {
                previous: value.clone(),
                last_known: value,
            }),
        }
    }

    /// Compare `candidate` with the last known value and record it if new.
    ///
    /// The comparison and the update happen under one lock, so concurrent
    /// callers offering the same new value see exactly one `Changed`.
    pub fn observe(&self, candidate: &ClipboardValue) -> Observation {
        let mut state = self.state.lock();
        if state.last_known == *candidate {
            Observation::Unchanged
        } else {
            state.previous = std::mem::replace(&mut state.last_known, candidate.clone());
            Observation::Changed
        }
    }

    /// Undo the transition to `value` if it is still the last known value.
    ///
    /// Called when a value that `observe` accepted could not be propagated.
    /// The value it replaced becomes the last known one again, so a retry
    /// of `value` is reported as `Changed` while the old, still synchronized
    /// value keeps being recognized. Returns whether anything was restored;
    /// a newer value recorded in the meantime is left alone.
    pub fn revert(&self, value: &ClipboardValue) -> bool {
        let mut state = self.state.lock();
        if state.last_known == *value && state.previous != *value {
            state.last_known = state.previous.clone();
            true
        } else {
            false
        }
    }

    /// Snapshot of the last known value
    pub fn last_known(&self) -> ClipboardValue {
        self.state.lock().last_known.clone()
    }
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}
