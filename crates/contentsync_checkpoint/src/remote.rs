//! Remote key-value checkpoint backend.
//!
//! The actual client is abstracted via [`KeyValueClient`] so the backend
//! works with any string key-value store (Redis, memcached, etcd, ...).

use crate::backend::CheckpointBackend;
use crate::error::{CheckpointError, CheckpointResult};
use contentsync_model::{CheckpointSet, Watermark};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Key-value client abstraction.
///
/// Implement this trait to plug in the actual store.
pub trait KeyValueClient: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> Result<Option<String>, String>;

    /// Writes a value.
    fn set(&self, key: &str, value: &str) -> Result<(), String>;

    /// Deletes a value. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), String>;

    /// Lists keys matching a glob pattern such as `prefix*`.
    fn keys(&self, pattern: &str) -> Result<Vec<String>, String>;
}

/// A checkpoint backend storing each entry under its own key.
///
/// Values are JSON-encoded watermarks. Keys are namespaced with an optional
/// prefix so several pipelines can share one store. There is no atomicity
/// across keys: each entry is written independently.
pub struct RemoteBackend<C: KeyValueClient> {
    client: C,
    prefix: String,
}

impl<C: KeyValueClient> RemoteBackend<C> {
    /// Creates a backend without key prefix.
    pub fn new(client: C) -> Self {
        Self::with_prefix(client, "")
    }

    /// Creates a backend storing keys under `prefix`.
    pub fn with_prefix(client: C, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    /// Returns the key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn remote_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn write(&self, key: &str, watermark: &Watermark) -> CheckpointResult<()> {
        let value = serde_json::to_string(watermark)?;
        self.client
            .set(&self.remote_key(key), &value)
            .map_err(CheckpointError::remote_retryable)
    }
}

impl<C: KeyValueClient> CheckpointBackend for RemoteBackend<C> {
    fn retrieve(&self) -> CheckpointResult<CheckpointSet> {
        let pattern = format!("{}*", self.prefix);
        let keys = self
            .client
            .keys(&pattern)
            .map_err(CheckpointError::remote_retryable)?;

        let mut state = CheckpointSet::new();
        for remote_key in keys {
            let Some(key) = remote_key.strip_prefix(self.prefix.as_str()) else {
                continue;
            };
            let Some(raw) = self
                .client
                .get(&remote_key)
                .map_err(CheckpointError::remote_retryable)?
            else {
                continue;
            };
            match serde_json::from_str::<Watermark>(&raw) {
                Ok(watermark) => {
                    state.insert(key.to_string(), watermark);
                }
                Err(e) => {
                    warn!(key = %remote_key, error = %e, "ignoring corrupt checkpoint value");
                }
            }
        }

        debug!(entries = state.len(), "checkpoints loaded from remote store");
        Ok(state)
    }

    fn save(&self, state: &CheckpointSet) -> CheckpointResult<()> {
        for (key, watermark) in state {
            self.write(key, watermark)?;
        }
        Ok(())
    }

    fn save_entry(
        &self,
        key: &str,
        watermark: &Watermark,
        _state: &CheckpointSet,
    ) -> CheckpointResult<()> {
        self.write(key, watermark)
    }

    fn remove_entry(&self, key: &str, _state: &CheckpointSet) -> CheckpointResult<()> {
        self.client
            .delete(&self.remote_key(key))
            .map_err(CheckpointError::remote_retryable)
    }
}

/// An in-memory [`KeyValueClient`] for testing.
///
/// Supports exact keys and trailing-`*` patterns.
#[derive(Debug)]
pub struct MemoryKv {
    values: RwLock<BTreeMap<String, String>>,
    available: RwLock<bool>,
}

impl MemoryKv {
    /// Creates an empty, reachable store.
    pub fn new() -> Self {
        Self {
            values: RwLock::new(BTreeMap::new()),
            available: RwLock::new(true),
        }
    }

    /// Makes the store reachable or unreachable.
    pub fn set_available(&self, available: bool) {
        *self.available.write() = available;
    }

    /// Writes a raw value, bypassing any encoding.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(key.into(), value.into());
    }

    /// Reads a raw value.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn check(&self) -> Result<(), String> {
        if *self.available.read() {
            Ok(())
        } else {
            Err("connection refused".into())
        }
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueClient for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        self.check()?;
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.check()?;
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), String> {
        self.check()?;
        self.values.write().remove(key);
        Ok(())
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>, String> {
        self.check()?;
        let values = self.values.read();
        let keys = match pattern.strip_suffix('*') {
            Some(prefix) => values
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect(),
            None => values.keys().filter(|k| *k == pattern).cloned().collect(),
        };
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> CheckpointSet {
        let mut state = CheckpointSet::new();
        state.insert("genre_last_modified".into(), Watermark::new("2021-01-01 00:00:00+00"));
        state.insert("person_last_modified".into(), Watermark::new("2021-02-01 00:00:00+00"));
        state
    }

    #[test]
    fn save_writes_one_key_per_entry() {
        let backend = RemoteBackend::with_prefix(MemoryKv::new(), "etl:");
        backend.save(&state()).unwrap();

        assert_eq!(
            backend.client().raw("etl:genre_last_modified").as_deref(),
            Some("\"2021-01-01 00:00:00+00\"")
        );
        assert_eq!(backend.retrieve().unwrap(), state());
    }

    #[test]
    fn save_entry_touches_only_that_key() {
        let backend = RemoteBackend::new(MemoryKv::new());
        let wm = Watermark::new("2021-03-01 00:00:00+00");
        backend.save_entry("person_last_modified", &wm, &state()).unwrap();

        let loaded = backend.retrieve().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("person_last_modified"), Some(&wm));
    }

    #[test]
    fn retrieve_skips_foreign_and_corrupt_keys() {
        let kv = MemoryKv::new();
        kv.insert_raw("etl:person_last_modified", "\"2021-02-01 00:00:00+00\"");
        kv.insert_raw("etl:genre_last_modified", "not-json");
        kv.insert_raw("other:person_last_modified", "\"2030-01-01 00:00:00+00\"");

        let backend = RemoteBackend::with_prefix(kv, "etl:");
        let loaded = backend.retrieve().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("person_last_modified"));
    }

    #[test]
    fn unreachable_store_is_retryable_error() {
        let kv = MemoryKv::new();
        kv.set_available(false);
        let backend = RemoteBackend::new(kv);

        let err = backend.retrieve().unwrap_err();
        assert!(err.is_retryable());
        assert!(backend.save(&state()).unwrap_err().is_retryable());
    }

    #[test]
    fn remove_entry_deletes_key() {
        let backend = RemoteBackend::new(MemoryKv::new());
        backend.save(&state()).unwrap();
        backend
            .remove_entry("genre_last_modified", &CheckpointSet::new())
            .unwrap();

        let loaded = backend.retrieve().unwrap();
        assert!(!loaded.contains_key("genre_last_modified"));
        assert!(loaded.contains_key("person_last_modified"));
    }
}
