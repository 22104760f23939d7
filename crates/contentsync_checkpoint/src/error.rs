//! Error types for checkpoint operations.

use std::io;
use thiserror::Error;

/// Result type for checkpoint operations.
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Errors that can occur while persisting checkpoints.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The checkpoint set could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The remote key-value store failed.
    #[error("remote store error: {message}")]
    Remote {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },
}

impl CheckpointError {
    /// Creates a retryable remote store error.
    pub fn remote_retryable(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: true,
        }
    }

    /// Returns true if the operation can be retried.
    ///
    /// Only transient I/O failures qualify; a denied permission fails the
    /// same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckpointError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            CheckpointError::Remote { retryable, .. } => *retryable,
            CheckpointError::Serialization(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(CheckpointError::remote_retryable("connection reset").is_retryable());
        let interrupted = io::Error::new(io::ErrorKind::Interrupted, "signal");
        assert!(CheckpointError::Io(interrupted).is_retryable());

        let encode = serde_json::from_str::<u8>("x").unwrap_err();
        assert!(!CheckpointError::Serialization(encode).is_retryable());
    }

    #[test]
    fn permanent_io_errors_are_not_retried() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "read-only");
        assert!(!CheckpointError::Io(denied).is_retryable());
        assert!(!CheckpointError::Io(io::Error::other("disk")).is_retryable());

        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"").unwrap();
        let err = std::fs::write(blocker.join("state.json"), b"{}").unwrap_err();
        assert!(!CheckpointError::Io(err).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = CheckpointError::remote_retryable("refused");
        assert_eq!(err.to_string(), "remote store error: refused");
    }
}
