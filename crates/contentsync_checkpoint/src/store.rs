//! Write-through checkpoint store.

use crate::backend::CheckpointBackend;
use crate::error::CheckpointResult;
use contentsync_model::{CheckpointSet, Watermark};
use parking_lot::RwLock;
use tracing::debug;

/// Process-local view of the checkpoint set, backed by a durable backend.
///
/// The set is read once in [`CheckpointStore::open`]. Every mutation is
/// persisted first and only then applied to the in-memory copy, so `get`
/// never returns a watermark that is not durable.
///
/// The store has a single writer (the cycle orchestrator); the lock only
/// makes it shareable behind `&self`.
pub struct CheckpointStore {
    backend: Box<dyn CheckpointBackend>,
    state: RwLock<CheckpointSet>,
}

impl CheckpointStore {
    /// Loads the checkpoint set from `backend`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached. A missing or
    /// corrupt state is not an error.
    pub fn open(backend: impl CheckpointBackend + 'static) -> CheckpointResult<Self> {
        Self::open_boxed(Box::new(backend))
    }

    /// Loads the checkpoint set from a boxed backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    pub fn open_boxed(backend: Box<dyn CheckpointBackend>) -> CheckpointResult<Self> {
        let state = backend.retrieve()?;
        debug!(entries = state.len(), "checkpoint store opened");
        Ok(Self {
            backend,
            state: RwLock::new(state),
        })
    }

    /// Returns the watermark stored under `key`.
    pub fn get(&self, key: &str) -> Option<Watermark> {
        self.state.read().get(key).cloned()
    }

    /// Stores `watermark` under `key`, durably, before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails; the in-memory state is
    /// left unchanged in that case.
    pub fn set(&self, key: &str, watermark: Watermark) -> CheckpointResult<()> {
        let mut next = self.state.read().clone();
        next.insert(key.to_string(), watermark.clone());

        self.backend.save_entry(key, &watermark, &next)?;
        *self.state.write() = next;

        debug!(key, watermark = %watermark, "checkpoint stored");
        Ok(())
    }

    /// Stores `watermark` only if it is later than the current value.
    ///
    /// Returns true if the checkpoint moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    pub fn advance(&self, key: &str, watermark: Watermark) -> CheckpointResult<bool> {
        if let Some(current) = self.get(key) {
            if !watermark.is_after(&current) {
                return Ok(false);
            }
        }
        self.set(key, watermark)?;
        Ok(true)
    }

    /// Removes the entry under `key`.
    ///
    /// Returns true if an entry existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    pub fn remove(&self, key: &str) -> CheckpointResult<bool> {
        let mut next = self.state.read().clone();
        if next.remove(key).is_none() {
            return Ok(false);
        }

        self.backend.remove_entry(key, &next)?;
        *self.state.write() = next;
        Ok(true)
    }

    /// Returns a copy of the whole checkpoint set.
    pub fn snapshot(&self) -> CheckpointSet {
        self.state.read().clone()
    }
}
