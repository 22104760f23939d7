//! Checkpoint backend trait definition.

use crate::error::CheckpointResult;
use contentsync_model::{CheckpointSet, Watermark};

/// Persistence for a checkpoint set.
///
/// Backends store and return the whole set; they do not interpret
/// watermarks or enforce monotonicity. That is the job of
/// [`crate::CheckpointStore`].
///
/// # Invariants
///
/// - `save` and `save_entry` are durable when they return `Ok`
/// - `retrieve` after a successful save returns the saved mapping
/// - Backends must be `Send + Sync`
///
/// # Implementors
///
/// - [`super::FileBackend`] - rewrites one JSON document per update
/// - [`super::RemoteBackend`] - one key per stream, no cross-key atomicity
/// - [`super::InMemoryBackend`] - for testing
pub trait CheckpointBackend: Send + Sync {
    /// Reads the full checkpoint set.
    ///
    /// A missing or unreadable state yields an empty set where the backend
    /// can tell the difference from a connectivity failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    fn retrieve(&self) -> CheckpointResult<CheckpointSet>;

    /// Persists the full checkpoint set.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be encoded or written.
    fn save(&self, state: &CheckpointSet) -> CheckpointResult<()>;

    /// Persists a single updated entry.
    ///
    /// `state` already contains the new entry. Whole-state backends rewrite
    /// everything; per-key backends write only `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be encoded or written.
    fn save_entry(
        &self,
        key: &str,
        watermark: &Watermark,
        state: &CheckpointSet,
    ) -> CheckpointResult<()> {
        let _ = (key, watermark);
        self.save(state)
    }

    /// Removes a single entry.
    ///
    /// `state` no longer contains `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be persisted.
    fn remove_entry(&self, key: &str, state: &CheckpointSet) -> CheckpointResult<()> {
        let _ = key;
        self.save(state)
    }
}

impl CheckpointBackend for Box<dyn CheckpointBackend> {
    fn retrieve(&self) -> CheckpointResult<CheckpointSet> {
        (**self).retrieve()
    }

    fn save(&self, state: &CheckpointSet) -> CheckpointResult<()> {
        (**self).save(state)
    }

    fn save_entry(
        &self,
        key: &str,
        watermark: &Watermark,
        state: &CheckpointSet,
    ) -> CheckpointResult<()> {
        (**self).save_entry(key, watermark, state)
    }

    fn remove_entry(&self, key: &str, state: &CheckpointSet) -> CheckpointResult<()> {
        (**self).remove_entry(key, state)
    }
}
