//! Change records and the per-cycle unit id set.

use crate::watermark::Watermark;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A changed row: entity id plus its modification timestamp.
///
/// Records are ordered by `updated_at`; ties keep the order the source
/// returned them in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Entity id.
    pub id: String,
    /// Modification timestamp.
    pub updated_at: Watermark,
}

impl ChangeRecord {
    /// Creates a change record.
    pub fn new(id: impl Into<String>, updated_at: impl Into<Watermark>) -> Self {
        Self {
            id: id.into(),
            updated_at: updated_at.into(),
        }
    }
}

/// Insertion-ordered, deduplicated set of unit ids.
///
/// Collects the ids of direct unit changes and of units surfaced by
/// widening. An id is kept once, at the position it was first inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitIdSet {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl UnitIdSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an id. Returns false if it was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.seen.contains(&id) {
            return false;
        }
        self.seen.insert(id.clone());
        self.order.push(id);
        true
    }

    /// Inserts the ids of the given change records.
    pub fn extend_records<'a>(&mut self, records: impl IntoIterator<Item = &'a ChangeRecord>) {
        for record in records {
            self.insert(record.id.as_str());
        }
    }

    /// Returns true if the id is present.
    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Number of distinct ids.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if no id was inserted.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in first-insertion order.
    pub fn as_slice(&self) -> &[String] {
        &self.order
    }

    /// Iterates ids in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }
}

impl<S: Into<String>> FromIterator<S> for UnitIdSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = UnitIdSet::new();
        set.extend(iter);
        set
    }
}

impl<S: Into<String>> Extend<S> for UnitIdSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for id in iter {
            self.insert(id);
        }
    }
}
