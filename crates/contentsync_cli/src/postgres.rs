//! PostgreSQL source over `sqlx`.
//!
//! The engine is synchronous; every call is driven to completion on a
//! current-thread Tokio runtime owned by the connector.

use crate::error::{CliError, CliResult};
use contentsync_engine::{
    QueryParam, Row, SourceConnection, SourceConnector, SqlQuery, SyncError, SyncResult,
};
use serde_json::{Number, Value};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow, Postgres};
use sqlx::{Column, ConnectOptions, Connection, Row as _, TypeInfo};
use std::io;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::debug;

/// Opens one PostgreSQL connection per cycle.
pub struct PgConnector {
    options: PgConnectOptions,
    runtime: Arc<Runtime>,
}

impl PgConnector {
    /// Creates a connector. Does not connect yet.
    pub fn new(options: PgConnectOptions) -> CliResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CliError::client("postgres", e))?;
        Ok(Self {
            options,
            runtime: Arc::new(runtime),
        })
    }
}

impl SourceConnector for PgConnector {
    fn connect(&self) -> SyncResult<Box<dyn SourceConnection>> {
        let conn = self
            .runtime
            .block_on(self.options.connect())
            .map_err(classify)?;
        Ok(Box::new(PgSource {
            conn: Some(conn),
            runtime: Arc::clone(&self.runtime),
        }))
    }
}

struct PgSource {
    conn: Option<PgConnection>,
    runtime: Arc<Runtime>,
}

impl SourceConnection for PgSource {
    fn execute(&mut self, query: &SqlQuery) -> SyncResult<Vec<Row>> {
        let conn = self.conn.as_mut().ok_or(SyncError::NotConnected)?;

        let mut statement = sqlx::query::<Postgres>(&query.text);
        for param in &query.params {
            statement = match param {
                QueryParam::Timestamp(ts) => statement.bind(ts.clone()),
                QueryParam::Ids(ids) => statement.bind(ids.clone()),
                QueryParam::Limit(limit) => statement.bind(i64::from(*limit)),
            };
        }

        debug!(kind = ?query.kind, stream = %query.stream, "executing query");
        let rows = self
            .runtime
            .block_on(statement.fetch_all(conn))
            .map_err(classify)?;
        rows.iter().map(to_row).collect()
    }

    fn close(&mut self) -> SyncResult<()> {
        match self.conn.take() {
            Some(conn) => self.runtime.block_on(conn.close()).map_err(classify),
            None => Ok(()),
        }
    }
}

/// Converts a result row into a named-field map.
///
/// Floating point and integer columns keep their numeric value; every other
/// column is read as text, so queries cast ids and timestamps to `text`.
fn to_row(row: &PgRow) -> SyncResult<Row> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "FLOAT4" | "FLOAT8" => row
                .try_get::<Option<f64>, _>(i)
                .map(|v| v.and_then(Number::from_f64).map_or(Value::Null, Value::Number)),
            "INT2" | "INT4" | "INT8" => row
                .try_get::<Option<i64>, _>(i)
                .map(|v| v.map_or(Value::Null, |n| Value::Number(n.into()))),
            "BOOL" => row
                .try_get::<Option<bool>, _>(i)
                .map(|v| v.map_or(Value::Null, Value::Bool)),
            _ => row
                .try_get::<Option<String>, _>(i)
                .map(|v| v.map_or(Value::Null, Value::String)),
        }
        .map_err(|e| SyncError::Decode(format!("column {}: {e}", column.name())))?;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

/// Maps driver errors onto the engine's retry classification.
fn classify(e: sqlx::Error) -> SyncError {
    match e {
        sqlx::Error::PoolTimedOut => SyncError::Timeout(e.to_string()),
        sqlx::Error::Io(ref source) if source.kind() == io::ErrorKind::TimedOut => {
            SyncError::Timeout(e.to_string())
        }
        sqlx::Error::Tls(_) => SyncError::Transport {
            message: e.to_string(),
            retryable: false,
        },
        sqlx::Error::Io(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => SyncError::transport_retryable(e.to_string()),
        sqlx::Error::Configuration(_) => SyncError::Config(e.to_string()),
        other => SyncError::Query(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_errors_are_retryable() {
        let err = classify(sqlx::Error::Io(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        assert!(err.is_retryable());
    }

    #[test]
    fn timeouts_are_retryable() {
        let err = classify(sqlx::Error::Io(io::Error::new(io::ErrorKind::TimedOut, "slow")));
        assert!(matches!(err, SyncError::Timeout(_)));
        assert!(err.is_retryable());
        assert!(matches!(classify(sqlx::Error::PoolTimedOut), SyncError::Timeout(_)));
    }

    #[test]
    fn tls_failures_are_not_retried() {
        let err = classify(sqlx::Error::Tls("unknown certificate authority".into()));
        assert!(matches!(err, SyncError::Transport { retryable: false, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn query_errors_are_not_retried() {
        let err = classify(sqlx::Error::RowNotFound);
        assert!(matches!(err, SyncError::Query(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn bad_configuration_is_fatal() {
        let err = classify(sqlx::Error::Configuration("bad url".into()));
        assert!(err.is_fatal());
    }

    #[test]
    fn connector_does_not_connect_eagerly() {
        let options = PgConnectOptions::new().host("localhost").port(1);
        assert!(PgConnector::new(options).is_ok());
    }
}
