//! Document sink abstraction.

use crate::error::{SyncError, SyncResult};
use contentsync_model::AggregateDocument;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A document the sink rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDocument {
    /// Document id.
    pub id: String,
    /// Rejection reason reported by the sink.
    pub reason: String,
}

/// Result of a bulk write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    /// Number of documents written.
    pub indexed: usize,
    /// Documents that were rejected.
    pub failed: Vec<FailedDocument>,
}

impl BulkOutcome {
    /// Returns true if every document was written.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of documents in the batch.
    pub fn total(&self) -> usize {
        self.indexed + self.failed.len()
    }
}

/// Destination of documents.
///
/// Writes must be idempotent per document id: writing the same document
/// twice leaves the index as if it was written once.
pub trait DocumentSink: Send + Sync {
    /// Writes a batch of documents to `index`.
    ///
    /// Per-document rejections are reported in the outcome; an `Err` means
    /// the batch as a whole could not be delivered.
    fn bulk_index(&self, index: &str, documents: &[AggregateDocument]) -> SyncResult<BulkOutcome>;
}

/// An in-memory sink for testing.
///
/// Stores the latest version of every document per index, can be told to
/// reject chosen ids, or to fail whole batches as if unreachable.
#[derive(Debug, Default)]
pub struct MemorySink {
    indices: RwLock<HashMap<String, BTreeMap<String, AggregateDocument>>>,
    rejected: RwLock<HashSet<String>>,
    unavailable: AtomicBool,
    batches: AtomicUsize,
    writes: AtomicUsize,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every future write of document `id`.
    pub fn reject(&self, id: impl Into<String>) {
        self.rejected.write().insert(id.into());
    }

    /// Makes every batch fail with a retryable transport error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns a stored document.
    pub fn document(&self, index: &str, id: &str) -> Option<AggregateDocument> {
        self.indices.read().get(index)?.get(id).cloned()
    }

    /// Number of distinct documents stored in `index`.
    pub fn count(&self, index: &str) -> usize {
        self.indices.read().get(index).map_or(0, BTreeMap::len)
    }

    /// Ids stored in `index`, sorted.
    pub fn ids(&self, index: &str) -> Vec<String> {
        self.indices
            .read()
            .get(index)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of batches received, including failed ones.
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// Number of document writes accepted, counting re-deliveries.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl DocumentSink for MemorySink {
    fn bulk_index(&self, index: &str, documents: &[AggregateDocument]) -> SyncResult<BulkOutcome> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("sink unavailable"));
        }

        let rejected = self.rejected.read();
        let mut indices = self.indices.write();
        let stored = indices.entry(index.to_string()).or_default();
        let mut outcome = BulkOutcome::default();

        for document in documents {
            if rejected.contains(&document.id) {
                outcome.failed.push(FailedDocument {
                    id: document.id.clone(),
                    reason: "rejected".to_string(),
                });
            } else {
                stored.insert(document.id.clone(), document.clone());
                outcome.indexed += 1;
            }
        }
        self.writes.fetch_add(outcome.indexed, Ordering::SeqCst);
        Ok(outcome)
    }
}
