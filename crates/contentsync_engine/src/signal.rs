//! Cooperative stop signal.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A clonable flag used to stop the sync loop between cycles.
///
/// Raising the signal never interrupts a running cycle; it wakes the loop
/// if it is sleeping and prevents the next cycle from starting.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    /// Creates a lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal and wakes every waiter.
    pub fn stop(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock() = true;
        cvar.notify_all();
    }

    /// Returns true once the signal was raised.
    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleeps for `timeout` or until the signal is raised.
    ///
    /// Returns true if the signal was raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut stopped = lock.lock();
        while !*stopped {
            if cvar.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn wait_times_out_when_not_stopped() {
        let signal = StopSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
        assert!(!signal.is_stopped());
    }

    #[test]
    fn stop_wakes_waiter() {
        let signal = StopSignal::new();
        let waiter = signal.clone();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(30)));

        thread::sleep(Duration::from_millis(20));
        signal.stop();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn already_stopped_returns_immediately() {
        let signal = StopSignal::new();
        signal.stop();
        assert!(signal.wait_timeout(Duration::from_secs(30)));
    }
}
