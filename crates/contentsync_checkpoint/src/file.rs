//! File-based checkpoint backend.

use crate::backend::CheckpointBackend;
use crate::error::CheckpointResult;
use contentsync_model::CheckpointSet;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A checkpoint backend storing the whole set as one JSON object.
///
/// # Layout
///
/// ```json
/// {"film_work_last_modified": "2021-06-16 20:14:09.221838+00"}
/// ```
///
/// # Durability
///
/// Every save writes a sibling `*.tmp` file, calls `File::sync_all()` and
/// renames it over the target, so a crash leaves either the old or the new
/// document in place.
///
/// # Example
///
/// ```no_run
/// use contentsync_checkpoint::{CheckpointBackend, FileBackend};
///
/// let backend = FileBackend::new("state/state.json");
/// let state = backend.retrieve().unwrap();
/// backend.save(&state).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Creates a backend for the given file. Nothing is touched until the
    /// first read or write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path to the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("state"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CheckpointBackend for FileBackend {
    fn retrieve(&self) -> CheckpointResult<CheckpointSet> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    path = %self.path.display(),
                    "state file does not exist, starting from scratch"
                );
                return Ok(CheckpointSet::new());
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to read state file, starting from scratch"
                );
                return Ok(CheckpointSet::new());
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "state file is empty or corrupt, starting from scratch"
                );
                Ok(CheckpointSet::new())
            }
        }
    }

    fn save(&self, state: &CheckpointSet) -> CheckpointResult<()> {
        let body = serde_json::to_vec_pretty(state)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp = self.temp_path();
        {
            let mut file = File::create(&temp)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;

        debug!(path = %self.path.display(), entries = state.len(), "state file written");
        Ok(())
    }
}
