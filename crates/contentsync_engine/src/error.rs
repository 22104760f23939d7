//! Error types for the sync engine.

use contentsync_checkpoint::CheckpointError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during a sync cycle.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error talking to the source or the sink.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Not connected.
    #[error("not connected to source")]
    NotConnected,

    /// The source did not answer in time.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// All reconnect attempts failed.
    #[error("gave up after {attempts} connection attempts: {last_error}")]
    ReconnectExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Message of the last failure.
        last_error: String,
    },

    /// The source rejected a query (malformed query, constraint violation).
    #[error("query failed: {0}")]
    Query(String),

    /// A result row did not match the expected record shape.
    #[error("row decode error: {0}")]
    Decode(String),

    /// The sink returned an unusable response.
    #[error("sink error: {0}")]
    Sink(String),

    /// The sink rejected some documents of a batch.
    #[error("sink rejected {failed} of {total} documents")]
    PartialWrite {
        /// Number of rejected documents.
        failed: usize,
        /// Batch size.
        total: usize,
    },

    /// Checkpoint persistence failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::NotConnected | SyncError::Timeout(_) => true,
            SyncError::Checkpoint(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns true if the sync loop must stop instead of retrying the
    /// cycle later.
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Config(_) => true,
            SyncError::Checkpoint(e) => !e.is_retryable(),
            _ => false,
        }
    }
}
