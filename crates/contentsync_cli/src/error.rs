//! CLI error type.

use contentsync_checkpoint::CheckpointError;
use contentsync_engine::SyncError;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by the `contentsync` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// Checkpoint store failure.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Sync failure.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// An external client could not be set up.
    #[error("{service} client error: {message}")]
    Client {
        /// Service the client talks to.
        service: &'static str,
        /// Error message.
        message: String,
    },
}

impl CliError {
    /// Creates a client setup error.
    pub fn client(service: &'static str, message: impl ToString) -> Self {
        Self::Client {
            service,
            message: message.to_string(),
        }
    }
}
