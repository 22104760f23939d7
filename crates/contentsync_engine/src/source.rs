//! Source query abstraction and connection management.
//!
//! The relational store is reached through [`SourceConnector`] and
//! [`SourceConnection`]; the engine never talks to a database driver
//! directly. Result rows are named-field maps decoded into typed records.

use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// A result row: column name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// What a query is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Per-connection session setup.
    Session,
    /// Changed rows of one stream after a watermark.
    Changes,
    /// Units referencing changed rows of a dependent stream.
    Widen,
    /// Flattened join of a set of units.
    Aggregate,
}

/// A positional query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParam {
    /// A timestamp, compared with `>`.
    Timestamp(String),
    /// A set of ids, matched with `= ANY(...)`.
    Ids(Vec<String>),
    /// A row limit.
    Limit(u32),
}

/// A parameterized query.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    /// What the query is for.
    pub kind: QueryKind,
    /// Stream the query belongs to; empty for session setup.
    pub stream: String,
    /// Query text with `$1`, `$2`, ... placeholders.
    pub text: String,
    /// Parameters bound to the placeholders, in order.
    pub params: Vec<QueryParam>,
}

impl SqlQuery {
    /// Returns the timestamp parameter, if any.
    pub fn timestamp(&self) -> Option<&str> {
        self.params.iter().find_map(|p| match p {
            QueryParam::Timestamp(ts) => Some(ts.as_str()),
            _ => None,
        })
    }

    /// Returns the id-set parameter, if any.
    pub fn ids(&self) -> Option<&[String]> {
        self.params.iter().find_map(|p| match p {
            QueryParam::Ids(ids) => Some(ids.as_slice()),
            _ => None,
        })
    }

    /// Returns the limit parameter, if any.
    pub fn limit(&self) -> Option<u32> {
        self.params.iter().find_map(|p| match p {
            QueryParam::Limit(limit) => Some(*limit),
            _ => None,
        })
    }
}

/// An open connection to the source.
pub trait SourceConnection: Send {
    /// Executes a query and returns its rows in result order.
    ///
    /// Connectivity failures are reported as retryable
    /// [`SyncError::Transport`]; rejected queries as [`SyncError::Query`].
    fn execute(&mut self, query: &SqlQuery) -> SyncResult<Vec<Row>>;

    /// Closes the connection.
    fn close(&mut self) -> SyncResult<()> {
        Ok(())
    }
}

/// Opens connections to the source.
pub trait SourceConnector: Send + Sync {
    /// Opens a new connection.
    fn connect(&self) -> SyncResult<Box<dyn SourceConnection>>;
}

/// Decodes rows into typed records by column name.
///
/// # Errors
///
/// Returns [`SyncError::Decode`] if a row misses a required column or has
/// a column of the wrong type.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> SyncResult<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(serde_json::Value::Object(row))
                .map_err(|e| SyncError::Decode(e.to_string()))
        })
        .collect()
}

/// Opens source connections, reconnecting with exponential backoff.
///
/// Connections are owned by one cycle and never shared. A cycle that loses
/// its connection aborts; the next cycle opens a fresh one.
pub struct ConnectionManager<C: SourceConnector> {
    connector: C,
    retry: RetryConfig,
}

impl<C: SourceConnector> ConnectionManager<C> {
    /// Creates a manager.
    pub fn new(connector: C, retry: RetryConfig) -> Self {
        Self { connector, retry }
    }

    /// Returns the connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Opens a connection.
    ///
    /// Retryable failures are retried up to `max_attempts` times, sleeping
    /// [`RetryConfig::delay_for_attempt`] before each retry.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ReconnectExhausted`] when every attempt failed,
    /// or the first non-retryable error.
    pub fn open(&self) -> SyncResult<Box<dyn SourceConnection>> {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.retry.delay_for_attempt(attempt);
                warn!(
                    attempt,
                    "connection attempt failed, reconnecting in {:.2} seconds",
                    delay.as_secs_f64()
                );
                std::thread::sleep(delay);
            }

            match self.connector.connect() {
                Ok(connection) => {
                    debug!(attempt, "connected to source");
                    return Ok(connection);
                }
                Err(e) if e.is_retryable() => {
                    last_error = e.to_string();
                }
                Err(e) => return Err(e),
            }
        }

        Err(SyncError::ReconnectExhausted {
            attempts,
            last_error,
        })
    }
}

#[derive(Debug, Default)]
struct MockState {
    responses: HashMap<(QueryKind, String), VecDeque<Result<Vec<Row>, String>>>,
    log: Vec<SqlQuery>,
    connect_failures: u32,
    connections: usize,
    closed: usize,
}

/// A scripted source for testing.
///
/// Responses are queued per (query kind, stream) and consumed in order;
/// a query with nothing queued returns no rows. Every executed query is
/// logged. Clones share the same script and log.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    state: Arc<Mutex<MockState>>,
}

impl MockSource {
    /// Creates a mock source with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues rows for the next query of `kind` on `stream`.
    pub fn push_rows(&self, kind: QueryKind, stream: &str, rows: Vec<Row>) {
        self.state
            .lock()
            .responses
            .entry((kind, stream.to_string()))
            .or_default()
            .push_back(Ok(rows));
    }

    /// Queues a query failure for the next query of `kind` on `stream`.
    pub fn push_failure(&self, kind: QueryKind, stream: &str, message: &str) {
        self.state
            .lock()
            .responses
            .entry((kind, stream.to_string()))
            .or_default()
            .push_back(Err(message.to_string()));
    }

    /// Makes the next `count` connection attempts fail with a retryable
    /// transport error.
    pub fn fail_connects(&self, count: u32) {
        self.state.lock().connect_failures = count;
    }

    /// Returns all executed queries.
    pub fn queries(&self) -> Vec<SqlQuery> {
        self.state.lock().log.clone()
    }

    /// Returns the executed queries of one kind.
    pub fn queries_of(&self, kind: QueryKind) -> Vec<SqlQuery> {
        self.state
            .lock()
            .log
            .iter()
            .filter(|q| q.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of successful connects.
    pub fn connection_count(&self) -> usize {
        self.state.lock().connections
    }

    /// Number of closed connections.
    pub fn closed_count(&self) -> usize {
        self.state.lock().closed
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl SourceConnection for MockConnection {
    fn execute(&mut self, query: &SqlQuery) -> SyncResult<Vec<Row>> {
        let mut state = self.state.lock();
        state.log.push(query.clone());
        let next = state
            .responses
            .get_mut(&(query.kind, query.stream.clone()))
            .and_then(|queue| queue.pop_front());
        match next {
            Some(Ok(rows)) => Ok(rows),
            Some(Err(message)) => Err(SyncError::Query(message)),
            None => Ok(Vec::new()),
        }
    }

    fn close(&mut self) -> SyncResult<()> {
        self.state.lock().closed += 1;
        Ok(())
    }
}

impl SourceConnector for MockSource {
    fn connect(&self) -> SyncResult<Box<dyn SourceConnection>> {
        let mut state = self.state.lock();
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(SyncError::transport_retryable("connection refused"));
        }
        state.connections += 1;
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }
}
