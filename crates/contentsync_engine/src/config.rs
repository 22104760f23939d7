//! Engine settings.

use std::time::Duration;

/// Settings of the sync loop.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Index the documents go to.
    pub index_name: String,
    /// Changed rows fetched per stream and cycle.
    pub page_size: u32,
    /// Units surfaced per dependent stream and cycle.
    pub widen_page_size: u32,
    /// Pause after an empty or failed cycle.
    pub poll_interval: Duration,
    /// Pause after a cycle that carried changes.
    pub cycle_interval: Duration,
    /// Reconnect policy for the source, also applied to sink requests.
    pub retry: RetryConfig,
    /// Ends the loop after this many failed cycles in a row.
    pub max_consecutive_failures: Option<u32>,
}

impl SyncConfig {
    /// Settings for `index_name` with the default pages and intervals.
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            page_size: 100,
            widen_page_size: 1000,
            poll_interval: Duration::from_secs(10),
            cycle_interval: Duration::from_secs(1),
            retry: RetryConfig::default(),
            max_consecutive_failures: None,
        }
    }

    /// Sets the change page size.
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the widening page size.
    pub fn with_widen_page_size(mut self, size: u32) -> Self {
        self.widen_page_size = size;
        self
    }

    /// Sets the pause after empty or failed cycles.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the pause after productive cycles.
    pub fn with_cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval = interval;
        self
    }

    /// Sets the reconnect policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Ends the loop after `max` failed cycles in a row.
    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = Some(max);
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("movies")
    }
}

/// Bounded, doubling reconnect schedule.
///
/// `max_attempts` counts the first attempt: the default of 6 is one connect
/// plus five reconnects waiting 1, 2, 4, 8 and 16 seconds.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts including the first one.
    pub max_attempts: u32,
    /// Wait before the first reconnect.
    pub initial_delay: Duration,
    /// Cap on any single wait.
    pub max_delay: Duration,
}

impl RetryConfig {
    /// A schedule of `max_attempts` attempts starting at one second.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    /// Sets the wait before the first reconnect.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Wait before attempt number `attempt` (0 is the first attempt).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match attempt {
            0 => Duration::ZERO,
            n => {
                let doubled = self.initial_delay.saturating_mul(1 << (n - 1).min(31));
                doubled.min(self.max_delay)
            }
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(6)
    }
}
