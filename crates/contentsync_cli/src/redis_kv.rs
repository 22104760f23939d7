//! Redis key-value client for remote checkpoints.

use crate::error::{CliError, CliResult};
use contentsync_checkpoint::KeyValueClient;
use redis::Commands;

/// [`KeyValueClient`] backed by Redis.
///
/// A connection is opened per call; checkpoint traffic is a handful of
/// commands per cycle.
pub struct RedisKv {
    client: redis::Client,
}

impl RedisKv {
    /// Creates a client for `url`. Does not connect yet.
    pub fn open(url: &str) -> CliResult<Self> {
        let client = redis::Client::open(url).map_err(|e| CliError::client("redis", e))?;
        Ok(Self { client })
    }

    fn connection(&self) -> Result<redis::Connection, String> {
        self.client.get_connection().map_err(|e| e.to_string())
    }
}

impl KeyValueClient for RedisKv {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        self.connection()?.get(key).map_err(|e| e.to_string())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.connection()?.set(key, value).map_err(|e| e.to_string())
    }

    fn delete(&self, key: &str) -> Result<(), String> {
        self.connection()?.del(key).map_err(|e| e.to_string())
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>, String> {
        self.connection()?.keys(pattern).map_err(|e| e.to_string())
    }
}
