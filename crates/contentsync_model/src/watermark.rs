//! Per-stream watermarks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lower bound used in change queries when a stream has no watermark yet.
pub const MIN_TIMESTAMP: &str = "1970-01-01 00:00:00+00";

/// Mapping from checkpoint key to the last delivered watermark.
pub type CheckpointSet = BTreeMap<String, Watermark>;

/// The last confirmed modification timestamp of a stream.
///
/// Watermarks are opaque to the engine. They are compared by their string
/// encoding, which matches temporal order only while the source renders
/// every timestamp with the same UTC offset; the source session is pinned to
/// UTC for that reason.
///
/// # Invariants
///
/// - A stream's watermark never moves backwards
/// - A watermark is only stored after its batch reached the sink
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(String);

impl Watermark {
    /// Creates a watermark from its encoded timestamp.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the sentinel watermark that precedes every real timestamp.
    pub fn min() -> Self {
        Self(MIN_TIMESTAMP.to_string())
    }

    /// Returns the encoded timestamp.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if `self` is strictly later than `other`.
    pub fn is_after(&self, other: &Watermark) -> bool {
        self > other
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Watermark {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Watermark {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
