//! Cooperative stop signal
//!
//! Shared between a broker and whoever controls it. The broker checks it once
//! per loop iteration and sleeps on it, so a stop request also cuts the poll
//! and reconnect delays short. An in-flight read is never interrupted.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Inner {
    stopped: Mutex<bool>,
    changed: Condvar,
}

/// Clonable, one-way stop flag
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop
    ///
    /// Returns `true` only for the call that actually flipped the flag.
    pub fn stop(&self) -> bool {
        let mut stopped = self.inner.stopped.lock();
        if *stopped {
            return false;
        }
        *stopped = true;
        self.inner.changed.notify_all();
        true
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.stopped.lock()
    }

    /// Sleep for `duration` unless a stop is requested first
    ///
    /// Returns `true` when stopped.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let mut stopped = self.inner.stopped.lock();
        let Some(deadline) = Instant::now().checked_add(duration) else {
            while !*stopped {
                self.inner.changed.wait(&mut stopped);
            }
            return true;
        };

        while !*stopped {
            if self.inner.changed.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_idempotent() {
        let signal = StopSignal::new();
        assert!(!signal.is_stopped());
        assert!(signal.stop());
        assert!(!signal.stop());
        assert!(signal.is_stopped());
    }

    #[test]
    fn test_wait_timeout_elapses() {
        let signal = StopSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_wait_timeout_cut_short_by_stop() {
        let signal = StopSignal::new();
        let remote = signal.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.stop();
        });

        let started = Instant::now();
        assert!(signal.wait_timeout(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_after_stop_returns_immediately() {
        let signal = StopSignal::new();
        signal.stop();
        assert!(signal.wait_timeout(Duration::from_secs(10)));
    }
}
