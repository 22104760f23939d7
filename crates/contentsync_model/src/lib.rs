//! # contentsync model
//!
//! Data model shared by every contentsync crate.
//!
//! This crate provides:
//! - [`Watermark`] for per-stream checkpoints
//! - [`ChangeRecord`] and [`UnitIdSet`] for change detection
//! - [`FlattenedJoinRow`] for the unit-to-related-entity join
//! - [`AggregateDocument`] for the documents written to the index
//!
//! This is a pure crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod document;
mod row;
mod watermark;

pub use change::{ChangeRecord, UnitIdSet};
pub use document::{AggregateDocument, NamedRef};
pub use row::{FlattenedJoinRow, Role};
pub use watermark::{CheckpointSet, Watermark, MIN_TIMESTAMP};
