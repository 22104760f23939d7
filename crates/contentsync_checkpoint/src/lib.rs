//! # contentsync checkpoint
//!
//! Durable mapping from stream key to [`Watermark`].
//!
//! The store is read fully once at startup and written through on every
//! update, before the in-memory copy changes. Backends are swappable:
//!
//! - [`FileBackend`] - whole-state JSON document on the local file system
//! - [`RemoteBackend`] - one value per key in a remote key-value store
//! - [`InMemoryBackend`] - for testing and dry runs
//!
//! A missing or corrupt state is read as "no watermark", which only means a
//! stream is re-scanned from the beginning.
//!
//! ## Example
//!
//! ```rust
//! use contentsync_checkpoint::{CheckpointStore, InMemoryBackend};
//! use contentsync_model::Watermark;
//!
//! let store = CheckpointStore::open(InMemoryBackend::new()).unwrap();
//! store.set("film_work_last_modified", Watermark::new("2021-06-16 20:14:09+00")).unwrap();
//! assert!(store.get("film_work_last_modified").is_some());
//! ```
//!
//! [`Watermark`]: contentsync_model::Watermark

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod remote;
mod store;

pub use backend::CheckpointBackend;
pub use error::{CheckpointError, CheckpointResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use remote::{KeyValueClient, MemoryKv, RemoteBackend};
pub use store::CheckpointStore;
