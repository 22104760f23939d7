//! Unbounded exponential backoff for arbitrary operations.

use crate::signal::StopSignal;
use rand::Rng;
use std::fmt::Display;
use std::time::Duration;
use tracing::{error, warn};

/// Retries an operation until it succeeds or fails with an error the caller
/// classifies as non-retryable.
///
/// The n-th retry waits `min(start * factor^n, border) + U(0, jitter)`.
/// Unlike [`crate::RetryConfig`] there is no attempt limit; use it where
/// giving up would lose work, such as persisting a checkpoint after the
/// documents were already written.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Delay before the first retry.
    pub start: Duration,
    /// Growth factor per retry.
    pub factor: f64,
    /// Upper bound of the exponential part.
    pub border: Duration,
    /// Upper bound of the random extra delay.
    pub jitter: Duration,
}

impl Backoff {
    /// Creates a backoff without jitter.
    pub fn new(start: Duration, factor: f64, border: Duration) -> Self {
        Self {
            start,
            factor,
            border,
            jitter: Duration::ZERO,
        }
    }

    /// Sets the jitter bound.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn delay(&self, retry: u32) -> Duration {
        let exp = self.start.as_secs_f64() * self.factor.powi(retry.min(64) as i32);
        let base = exp.min(self.border.as_secs_f64());
        let extra = if self.jitter.is_zero() {
            0.0
        } else {
            rand::thread_rng().gen_range(0.0..self.jitter.as_secs_f64())
        };
        Duration::from_secs_f64(base + extra)
    }

    /// Runs `op` until it succeeds.
    ///
    /// Errors for which `retryable` returns false are returned immediately.
    pub fn retry<T, E, F, R>(&self, op: F, retryable: R) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        R: Fn(&E) -> bool,
        E: Display,
    {
        self.run(op, retryable, None)
    }

    /// Like [`Backoff::retry`], but gives up once `stop` is raised.
    ///
    /// The wait between attempts wakes early on stop; the last error is
    /// returned then.
    pub fn retry_until_stopped<T, E, F, R>(
        &self,
        op: F,
        retryable: R,
        stop: &StopSignal,
    ) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        R: Fn(&E) -> bool,
        E: Display,
    {
        self.run(op, retryable, Some(stop))
    }

    fn run<T, E, F, R>(&self, mut op: F, retryable: R, stop: Option<&StopSignal>) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        R: Fn(&E) -> bool,
        E: Display,
    {
        let mut retry = 0u32;
        loop {
            let e = match op() {
                Ok(value) => return Ok(value),
                Err(e) if retryable(&e) => e,
                Err(e) => return Err(e),
            };

            let delay = self.delay(retry);
            error!(error = %e, "retry in {:.2} seconds", delay.as_secs_f64());
            let stopped = match stop {
                Some(stop) => stop.is_stopped() || stop.wait_timeout(delay),
                None => {
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    false
                }
            };
            if stopped {
                warn!(error = %e, retries = retry, "stop requested, giving up");
                return Err(e);
            }
            retry = retry.saturating_add(1);
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), 2.0, Duration::from_secs(10))
            .with_jitter(Duration::from_millis(100))
    }
}
