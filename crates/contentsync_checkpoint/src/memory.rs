//! In-memory checkpoint backend for testing.

use crate::backend::CheckpointBackend;
use crate::error::{CheckpointError, CheckpointResult};
use contentsync_model::CheckpointSet;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// An in-memory checkpoint backend.
///
/// Keeps the last saved set in memory. Suitable for:
/// - Unit tests
/// - Dry runs that must not persist anything
///
/// Saves can be made to fail on demand to exercise error paths.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: RwLock<CheckpointSet>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the stored state.
    #[must_use]
    pub fn state(&self) -> CheckpointSet {
        self.state.read().clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Makes every subsequent save fail with a retryable error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl CheckpointBackend for InMemoryBackend {
    fn retrieve(&self) -> CheckpointResult<CheckpointSet> {
        Ok(self.state.read().clone())
    }

    fn save(&self, state: &CheckpointSet) -> CheckpointResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CheckpointError::remote_retryable("in-memory backend set to fail"));
        }
        *self.state.write() = state.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contentsync_model::Watermark;

    #[test]
    fn save_replaces_state() {
        let backend = InMemoryBackend::new();
        let mut state = CheckpointSet::new();
        state.insert("a".into(), Watermark::new("1"));

        backend.save(&state).unwrap();
        assert_eq!(backend.retrieve().unwrap(), state);
        assert_eq!(backend.save_count(), 1);
    }

    #[test]
    fn failing_save_keeps_previous_state() {
        let backend = InMemoryBackend::new();
        backend.set_failing(true);

        let mut state = CheckpointSet::new();
        state.insert("a".into(), Watermark::new("1"));

        let err = backend.save(&state).unwrap_err();
        assert!(err.is_retryable());
        assert!(backend.state().is_empty());
        assert_eq!(backend.save_count(), 0);
    }
}
