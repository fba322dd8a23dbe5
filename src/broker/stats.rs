//! Broker statistics
//!
//! Thread-safe counters for what the broker did, plus a frame rate.
//! Uses lock-free atomics for all operations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Minimum interval between rate updates (seconds)
const RATE_UPDATE_MIN_INTERVAL_SECS: f64 = 0.5;

/// Broker counters with frame rate calculation (fully lock-free)
pub struct BrokerStats {
    /// Frames successfully read from the source
    frames_read: AtomicU64,
    /// Snapshots handed to the subscribers
    snapshots_published: AtomicU64,
    /// Failed reads
    read_failures: AtomicU64,
    /// Reconnection attempts made
    reconnect_attempts: AtomicU64,
    /// Messages evicted from a full subscriber queue
    evicted: AtomicU64,
    /// Snapshot of frames_read at last rate calculation
    frames_snapshot: AtomicU64,
    /// Reference instant for time calculations
    start_time: Instant,
    /// Nanoseconds since start_time at last rate calculation
    last_calc_nanos: AtomicU64,
    /// Cached frame rate in frames/sec (stored as f64 bits)
    frame_rate: AtomicU64,
}

impl BrokerStats {
    pub fn new() -> Self {
        Self {
            frames_read: AtomicU64::new(0),
            snapshots_published: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            frames_snapshot: AtomicU64::new(0),
            start_time: Instant::now(),
            last_calc_nanos: AtomicU64::new(0),
            frame_rate: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn add_frame(&self) {
        self.frames_read.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_snapshot(&self) {
        self.snapshots_published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read.load(Ordering::Relaxed)
    }

    pub fn snapshots_published(&self) -> u64 {
        self.snapshots_published.load(Ordering::Relaxed)
    }

    pub fn read_failures(&self) -> u64 {
        self.read_failures.load(Ordering::Relaxed)
    }

    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Update the frame rate and return it (frames/sec)
    /// Call this periodically (e.g., every few seconds) from a status reporter
    pub fn update_rate(&self) -> f64 {
        let now_nanos = self.start_time.elapsed().as_nanos() as u64;
        let last_nanos = self.last_calc_nanos.load(Ordering::Relaxed);
        let elapsed = now_nanos.saturating_sub(last_nanos) as f64 / 1_000_000_000.0;

        if elapsed < RATE_UPDATE_MIN_INTERVAL_SECS {
            return f64::from_bits(self.frame_rate.load(Ordering::Relaxed));
        }

        // Try to claim the update (avoid duplicate calculations)
        if self
            .last_calc_nanos
            .compare_exchange(last_nanos, now_nanos, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return f64::from_bits(self.frame_rate.load(Ordering::Relaxed));
        }

        let frames_now = self.frames_read.load(Ordering::Relaxed);
        let frames_prev = self.frames_snapshot.swap(frames_now, Ordering::Relaxed);
        let rate = frames_now.saturating_sub(frames_prev) as f64 / elapsed;

        self.frame_rate.store(rate.to_bits(), Ordering::Relaxed);
        rate
    }
}

impl Default for BrokerStats {
    fn default() -> Self {
        Self::new()
    }
}
