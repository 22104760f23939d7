//! Process settings from flags and environment.

use crate::error::{CliError, CliResult};
use crate::redis_kv::RedisKv;
use clap::{Args, ValueEnum};
use contentsync_checkpoint::{
    CheckpointBackend, CheckpointStore, FileBackend, InMemoryBackend, RemoteBackend,
};
use contentsync_engine::{Backoff, SyncConfig};
use sqlx::postgres::PgConnectOptions;
use std::path::PathBuf;
use std::time::Duration;

/// Where checkpoints are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StateStorage {
    /// JSON file on the local file system.
    Json,
    /// One key per stream in Redis.
    Redis,
    /// Nothing is persisted.
    Memory,
}

/// Connection and pipeline settings.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// PostgreSQL host
    #[arg(long, env = "PG_HOST", default_value = "localhost")]
    pub pg_host: String,

    /// PostgreSQL port
    #[arg(long, env = "PG_PORT", default_value_t = 5432)]
    pub pg_port: u16,

    /// PostgreSQL user
    #[arg(long, env = "PG_USER", default_value = "postgres")]
    pub pg_user: String,

    /// PostgreSQL password
    #[arg(long, env = "PG_PASSWORD", default_value = "", hide_env_values = true)]
    pub pg_password: String,

    /// PostgreSQL database
    #[arg(long, env = "PG_DBNAME", default_value = "movies_database")]
    pub pg_dbname: String,

    /// Search engine host
    #[arg(long, env = "ES_HOST", default_value = "localhost")]
    pub es_host: String,

    /// Search engine port
    #[arg(long, env = "ES_PORT", default_value_t = 9200)]
    pub es_port: u16,

    /// Search engine scheme (http, https)
    #[arg(long, env = "ES_SCHEME", default_value = "http")]
    pub es_scheme: String,

    /// Index documents are written to
    #[arg(long, env = "ES_INDEX", default_value = "movies")]
    pub es_index: String,

    /// Checkpoint storage
    #[arg(long, env = "STATE_STORAGE", value_enum, default_value_t = StateStorage::Json)]
    pub state_storage: StateStorage,

    /// Checkpoint file for json storage
    #[arg(long, env = "STATE_PATH", default_value = "state.json")]
    pub state_path: PathBuf,

    /// Redis URL for redis storage
    #[arg(long, env = "STATE_REDIS_URL", default_value = "redis://localhost:6379/0")]
    pub state_redis_url: String,

    /// Key prefix for redis storage
    #[arg(long, env = "STATE_REDIS_PREFIX", default_value = "")]
    pub state_redis_prefix: String,

    /// Changed rows fetched per stream and cycle
    #[arg(long, env = "BATCH_SIZE", default_value_t = 100)]
    pub batch_size: u32,

    /// Units surfaced per dependent stream and cycle
    #[arg(long, env = "WIDEN_BATCH_SIZE", default_value_t = 1000)]
    pub widen_batch_size: u32,

    /// Seconds to wait after an empty or failed cycle
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 10)]
    pub poll_interval_secs: u64,

    /// Stop after this many failed cycles in a row
    #[arg(long, env = "MAX_CONSECUTIVE_FAILURES")]
    pub max_consecutive_failures: Option<u32>,

    /// Log filter (trace, debug, info, warn, error, or a directive list)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Settings {
    /// PostgreSQL connection options.
    pub fn pg_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.pg_host)
            .port(self.pg_port)
            .username(&self.pg_user)
            .database(&self.pg_dbname);
        if self.pg_password.is_empty() {
            options
        } else {
            options.password(&self.pg_password)
        }
    }

    /// Search engine base URL.
    pub fn es_url(&self) -> String {
        format!("{}://{}:{}", self.es_scheme, self.es_host, self.es_port)
    }

    /// Engine configuration.
    pub fn sync_config(&self) -> CliResult<SyncConfig> {
        if self.batch_size == 0 || self.widen_batch_size == 0 {
            return Err(CliError::Config("batch sizes must be positive".into()));
        }
        let mut config = SyncConfig::new(&self.es_index)
            .with_page_size(self.batch_size)
            .with_widen_page_size(self.widen_batch_size)
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs));
        if let Some(max) = self.max_consecutive_failures {
            config = config.with_max_consecutive_failures(max);
        }
        Ok(config)
    }

    fn checkpoint_backend(&self) -> CliResult<Box<dyn CheckpointBackend>> {
        Ok(match self.state_storage {
            StateStorage::Json => Box::new(FileBackend::new(&self.state_path)),
            StateStorage::Redis => Box::new(RemoteBackend::with_prefix(
                RedisKv::open(&self.state_redis_url)?,
                &self.state_redis_prefix,
            )),
            StateStorage::Memory => Box::new(InMemoryBackend::new()),
        })
    }

    /// Opens the checkpoint store, retrying while the backend is unreachable.
    pub fn checkpoint_store(&self) -> CliResult<CheckpointStore> {
        let backoff = Backoff::default();
        let store = backoff.retry(
            || match self.checkpoint_backend() {
                Ok(backend) => CheckpointStore::open_boxed(backend).map_err(CliError::from),
                Err(e) => Err(e),
            },
            |e| matches!(e, CliError::Checkpoint(inner) if inner.is_retryable()),
        )?;
        Ok(store)
    }
}
