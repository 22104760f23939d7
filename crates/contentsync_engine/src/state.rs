//! Sync cycle state machine.

use crate::aggregator::aggregate;
use crate::backoff::Backoff;
use crate::catalog::Catalog;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::fetcher::{fetch_changes, ChangePage};
use crate::signal::StopSignal;
use crate::sink::DocumentSink;
use crate::source::{ConnectionManager, SourceConnection, SourceConnector};
use crate::transform::build_documents;
use crate::widener::widen;
use contentsync_checkpoint::{CheckpointError, CheckpointStore};
use contentsync_model::{FlattenedJoinRow, UnitIdSet, Watermark};
use parking_lot::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// Between cycles.
    Idle,
    /// Fetching changed rows of every stream.
    Fetching,
    /// Widening dependent-stream changes to units.
    Widening,
    /// Querying the flattened join of the affected units.
    Aggregating,
    /// Folding join rows into documents.
    Transforming,
    /// Writing documents to the sink.
    Writing,
    /// Advancing watermarks.
    Checkpointing,
    /// Waiting for the next cycle.
    Sleeping,
    /// The sync loop has ended.
    Stopped,
}

impl CycleState {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CycleState::Fetching
                | CycleState::Widening
                | CycleState::Aggregating
                | CycleState::Transforming
                | CycleState::Writing
                | CycleState::Checkpointing
        )
    }

    /// Returns true if a new cycle can start.
    pub fn can_start_cycle(&self) -> bool {
        !self.is_active()
    }
}

/// Statistics accumulated across cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Number of cycles that completed.
    pub cycles_completed: u64,
    /// Number of cycles that were aborted.
    pub cycles_failed: u64,
    /// Failed cycles since the last completed one.
    pub consecutive_failures: u32,
    /// Total number of documents written.
    pub documents_written: u64,
    /// Total number of watermark moves.
    pub checkpoints_advanced: u64,
    /// Completion time of the last successful cycle.
    pub last_cycle_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Per-stream outcome of a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamReport {
    /// Stream name.
    pub stream: String,
    /// Number of changed rows fetched.
    pub changes: usize,
    /// Watermark after the cycle.
    pub watermark: Option<Watermark>,
    /// Whether the checkpoint moved.
    pub advanced: bool,
}

/// Outcome of one completed cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Streams in processing order.
    pub streams: Vec<StreamReport>,
    /// Units surfaced by widening, before deduplication.
    pub widened: usize,
    /// Distinct units aggregated.
    pub units: usize,
    /// Documents written to the sink.
    pub documents: usize,
    /// Duration of the cycle.
    pub duration: Duration,
}

impl CycleReport {
    /// Returns true if no stream had changes.
    pub fn is_empty(&self) -> bool {
        self.streams.iter().all(|s| s.changes == 0)
    }

    /// Total number of changed rows across streams.
    pub fn changes(&self) -> usize {
        self.streams.iter().map(|s| s.changes).sum()
    }

    /// Names of the streams whose checkpoint moved.
    pub fn advanced_streams(&self) -> Vec<&str> {
        self.streams
            .iter()
            .filter(|s| s.advanced)
            .map(|s| s.stream.as_str())
            .collect()
    }
}

/// What one cycle read from the source.
struct Collected {
    pages: Vec<ChangePage>,
    widened: usize,
    units: UnitIdSet,
    rows: Vec<FlattenedJoinRow>,
}

/// The sync engine: runs cycles that carry source changes into the sink.
pub struct SyncEngine<C: SourceConnector, S: DocumentSink> {
    config: SyncConfig,
    catalog: Catalog,
    connections: ConnectionManager<C>,
    sink: S,
    checkpoints: CheckpointStore,
    checkpoint_backoff: Backoff,
    state: RwLock<CycleState>,
    stats: RwLock<SyncStats>,
}

impl<C: SourceConnector, S: DocumentSink> SyncEngine<C, S> {
    /// Creates a new sync engine.
    pub fn new(
        config: SyncConfig,
        catalog: Catalog,
        connector: C,
        sink: S,
        checkpoints: CheckpointStore,
    ) -> Self {
        let connections = ConnectionManager::new(connector, config.retry.clone());
        Self {
            config,
            catalog,
            connections,
            sink,
            checkpoints,
            checkpoint_backoff: Backoff::default(),
            state: RwLock::new(CycleState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Sets the backoff used to persist checkpoints.
    pub fn with_checkpoint_backoff(mut self, backoff: Backoff) -> Self {
        self.checkpoint_backoff = backoff;
        self
    }

    /// Gets the current state.
    pub fn state(&self) -> CycleState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the stream catalogue.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Returns the checkpoint store.
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Returns the sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Returns the source connector.
    pub fn connector(&self) -> &C {
        self.connections.connector()
    }

    fn set_state(&self, state: CycleState) {
        *self.state.write() = state;
    }

    /// Performs one cycle.
    ///
    /// A cycle that fails at any step is aborted without moving any
    /// checkpoint; the engine returns to [`CycleState::Idle`] either way.
    pub fn run_cycle(&self) -> SyncResult<CycleReport> {
        self.run_cycle_until(&StopSignal::new())
    }

    /// Performs one cycle, abandoning checkpoint retries once `stop` is
    /// raised.
    fn run_cycle_until(&self, stop: &StopSignal) -> SyncResult<CycleReport> {
        let state = self.state();
        if !state.can_start_cycle() {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{state:?}"),
                to: "Fetching".into(),
            });
        }

        let start = Instant::now();
        match self.cycle(start, stop) {
            Ok(report) => {
                self.set_state(CycleState::Idle);
                {
                    let mut stats = self.stats.write();
                    stats.cycles_completed += 1;
                    stats.consecutive_failures = 0;
                    stats.documents_written += report.documents as u64;
                    stats.checkpoints_advanced += report.advanced_streams().len() as u64;
                    stats.last_cycle_time = Some(Instant::now());
                    stats.last_error = None;
                }
                if report.is_empty() {
                    debug!("no changes");
                } else {
                    info!(
                        changes = report.changes(),
                        widened = report.widened,
                        units = report.units,
                        documents = report.documents,
                        advanced = ?report.advanced_streams(),
                        "sync cycle complete in {:.2?}",
                        report.duration
                    );
                }
                Ok(report)
            }
            Err(e) => {
                self.handle_error(&e);
                Err(e)
            }
        }
    }

    fn cycle(&self, start: Instant, stop: &StopSignal) -> SyncResult<CycleReport> {
        self.set_state(CycleState::Fetching);
        let mut conn = self.connections.open()?;
        let collected = self.collect(conn.as_mut());
        if let Err(e) = conn.close() {
            warn!(error = %e, "failed to close source connection");
        }
        let Collected {
            pages,
            widened,
            units,
            rows,
        } = collected?;

        self.set_state(CycleState::Transforming);
        let documents = build_documents(&rows);

        self.set_state(CycleState::Writing);
        if !documents.is_empty() {
            let outcome = self.sink.bulk_index(&self.config.index_name, &documents)?;
            if !outcome.is_success() {
                for failed in &outcome.failed {
                    warn!(id = %failed.id, reason = %failed.reason, "document rejected by sink");
                }
                return Err(SyncError::PartialWrite {
                    failed: outcome.failed.len(),
                    total: outcome.total(),
                });
            }
        }

        self.set_state(CycleState::Checkpointing);
        let mut streams = Vec::with_capacity(pages.len());
        for page in pages {
            let advanced = match &page.new_watermark {
                Some(watermark) if !page.is_empty() => {
                    self.advance_checkpoint(&page.stream, watermark, stop)?
                }
                _ => false,
            };
            streams.push(StreamReport {
                stream: page.stream,
                changes: page.records.len(),
                watermark: page.new_watermark,
                advanced,
            });
        }

        Ok(CycleReport {
            streams,
            widened,
            units: units.len(),
            documents: documents.len(),
            duration: start.elapsed(),
        })
    }

    /// Fetches, widens and aggregates over one connection.
    fn collect(&self, conn: &mut dyn SourceConnection) -> SyncResult<Collected> {
        conn.execute(&self.catalog.session_query())?;

        let mut pages = Vec::with_capacity(self.catalog.streams().len());
        for stream in self.catalog.streams() {
            let watermark = self.checkpoints.get(&stream.checkpoint_key());
            pages.push(fetch_changes(
                conn,
                &self.catalog,
                stream,
                watermark.as_ref(),
                self.config.page_size,
            )?);
        }

        self.set_state(CycleState::Widening);
        let primary = &self.catalog.primary().name;
        let mut units = UnitIdSet::new();
        if let Some(page) = pages.iter().find(|p| &p.stream == primary) {
            units.extend_records(&page.records);
        }

        let mut widened = 0;
        for page in pages.iter().filter(|p| &p.stream != primary && !p.is_empty()) {
            let Some(stream) = self.catalog.stream(&page.stream) else {
                continue;
            };
            let ids: Vec<String> = page.records.iter().map(|r| r.id.clone()).collect();
            let linked = widen(conn, &self.catalog, stream, &ids, self.config.widen_page_size)?;
            widened += linked.len();
            units.extend_records(&linked);
        }

        self.set_state(CycleState::Aggregating);
        let rows = aggregate(conn, &self.catalog, units.as_slice())?;

        Ok(Collected {
            pages,
            widened,
            units,
            rows,
        })
    }

    fn advance_checkpoint(
        &self,
        stream: &str,
        watermark: &Watermark,
        stop: &StopSignal,
    ) -> SyncResult<bool> {
        let key = match self.catalog.stream(stream) {
            Some(spec) => spec.checkpoint_key(),
            None => return Ok(false),
        };
        let advanced = self.checkpoint_backoff.retry_until_stopped(
            || self.checkpoints.advance(&key, watermark.clone()),
            CheckpointError::is_retryable,
            stop,
        )?;
        Ok(advanced)
    }

    /// Handles an error by updating state and stats.
    fn handle_error(&self, error: &SyncError) {
        self.set_state(CycleState::Idle);
        {
            let mut stats = self.stats.write();
            stats.cycles_failed += 1;
            stats.consecutive_failures = stats.consecutive_failures.saturating_add(1);
            stats.last_error = Some(error.to_string());
        }
        error!(error = %error, "sync cycle aborted");
    }

    /// Runs cycles until `stop` is raised.
    ///
    /// Sleeps `poll_interval` after an empty or failed cycle and
    /// `cycle_interval` after a productive one. Recoverable failures only
    /// delay the next cycle.
    ///
    /// # Errors
    ///
    /// Returns a fatal error, or the last error once
    /// `max_consecutive_failures` cycles failed in a row.
    pub fn run(&self, stop: &StopSignal) -> SyncResult<()> {
        info!(
            index = %self.config.index_name,
            streams = self.catalog.streams().len(),
            "sync loop started"
        );

        while !stop.is_stopped() {
            let pause = match self.run_cycle_until(stop) {
                Ok(report) if report.is_empty() => self.config.poll_interval,
                Ok(_) => self.config.cycle_interval,
                Err(e) if e.is_fatal() => {
                    self.set_state(CycleState::Stopped);
                    return Err(e);
                }
                Err(e) => {
                    let failures = self.stats.read().consecutive_failures;
                    if let Some(max) = self.config.max_consecutive_failures {
                        if failures >= max {
                            error!(failures, "giving up after consecutive failed cycles");
                            self.set_state(CycleState::Stopped);
                            return Err(e);
                        }
                    }
                    self.config.poll_interval
                }
            };

            self.set_state(CycleState::Sleeping);
            if stop.wait_timeout(pause) {
                break;
            }
            self.set_state(CycleState::Idle);
        }

        self.set_state(CycleState::Stopped);
        info!("sync loop stopped");
        Ok(())
    }
}
