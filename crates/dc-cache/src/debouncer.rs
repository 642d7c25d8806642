//! Per-page coalescing of change events.
//!
//! Editors often emit several write events for one save. Each event pushes
//! the page's deadline forward; the page is released once its deadline has
//! passed without further events.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Thread-safe page name debouncer.
pub(crate) struct EventDebouncer {
    pending: Mutex<HashMap<String, Instant>>,
    debounce_duration: Duration,
}

impl EventDebouncer {
    pub(crate) fn new(debounce_duration: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            debounce_duration,
        }
    }

    /// Record a change to `name`.
    ///
    /// Called from the notify callback thread.
    pub(crate) fn record(&self, name: String) {
        let deadline = Instant::now() + self.debounce_duration;
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, deadline);
    }

    /// Remove and return pages whose deadline has passed.
    pub(crate) fn drain_ready(&self) -> Vec<String> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        let ready: Vec<String> = pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &ready {
            pending.remove(name);
        }
        ready
    }

    /// Earliest pending deadline.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .min()
            .copied()
    }
}
