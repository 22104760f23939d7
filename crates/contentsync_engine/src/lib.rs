//! # contentsync engine
//!
//! Incremental sync from a relational content store into a search index.
//!
//! This crate provides:
//! - Cycle state machine (idle → fetching → widening → aggregating →
//!   transforming → writing → checkpointing)
//! - Change fetching per stream from a watermark
//! - One-hop widening from dependent streams to the units referencing them
//! - Aggregation of the flattened unit join and folding into documents
//! - Bulk sink abstraction with an HTTP implementation
//! - Reconnect with bounded exponential backoff, and an unbounded backoff
//!   decorator for everything else
//!
//! ## Architecture
//!
//! One cycle runs to completion before the next starts:
//! 1. Fetch a page of changes for every stream
//! 2. Widen dependent-stream changes to the units referencing them
//! 3. Aggregate and fold the affected units into documents
//! 4. Write the documents to the sink
//! 5. Advance the watermark of every stream that had changes
//!
//! ## Key Invariants
//!
//! - A watermark only moves after its batch was written successfully
//! - Watermarks never move backwards
//! - A unit id is processed at most once per cycle
//! - Writes are idempotent per document id, so re-delivery is safe

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod aggregator;
mod backoff;
mod catalog;
mod config;
mod error;
mod fetcher;
mod http;
mod signal;
mod sink;
mod source;
mod state;
mod transform;
mod widener;

pub use aggregator::aggregate;
pub use backoff::Backoff;
pub use catalog::{Catalog, ColumnSource, JoinColumn, StreamRole, StreamSpec};
pub use config::{RetryConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use fetcher::{fetch_changes, ChangePage};
pub use http::{BulkHttpSink, HttpClient, HttpResponse};
pub use signal::StopSignal;
pub use sink::{BulkOutcome, DocumentSink, FailedDocument, MemorySink};
pub use source::{
    decode_rows, ConnectionManager, MockSource, QueryKind, QueryParam, Row, SourceConnection,
    SourceConnector, SqlQuery,
};
pub use state::{CycleReport, CycleState, StreamReport, SyncEngine, SyncStats};
pub use transform::{build_documents, DocumentBuilder};
pub use widener::widen;
