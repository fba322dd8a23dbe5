//! Producer broker
//!
//! Owns one frame source, polls it on a fixed interval, decodes every frame
//! against the schema and hands the result to its subscribers. Provides a
//! handle so the broker can be stopped and observed from elsewhere.
//!
//! ```ignore
//! let mut broker = Broker::new(source, schema, BrokerOptions::default())?;
//! let queue = broker.subscribe();
//! let handle = broker.spawn()?;
//!
//! while let Some(message) = queue.pop_timeout(Duration::from_secs(10)) {
//!     match message {
//!         BrokerMessage::Snapshot(snapshot) => println!("{:?}", snapshot.get("iT1_LVL")),
//!         BrokerMessage::ReconnectNotice { .. } => {}
//!         BrokerMessage::Terminate(_) => break,
//!     }
//! }
//! handle.stop();
//! ```

pub mod queue;
mod runner;
pub mod stats;
pub mod stop;

pub use queue::HandoffQueue;
pub use stats::BrokerStats;
pub use stop::StopSignal;

use self::runner::Runner;
use crate::codec::{FrameRecorder, ValueSnapshot};
use crate::config::BrokerConfig;
use crate::constants::{
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_QUEUE_CAPACITY, DEFAULT_RECONNECT_ATTEMPTS,
    DEFAULT_RECONNECT_DELAY_MS,
};
use crate::error::{BrokerError, Result};
use crate::schema::{compute_window, FrameWindow, Schema};
use crate::source::FrameSource;
use parking_lot::RwLock;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

// ============================================================================
// Messages
// ============================================================================

/// Everything a consumer can receive
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerMessage {
    /// Values decoded from one successful read
    Snapshot(ValueSnapshot),
    /// A read failed and the broker is reconnecting (informational)
    ReconnectNotice { attempt: u32, max_attempts: u32 },
    /// The broker stopped; nothing follows
    Terminate(TerminateReason),
}

impl BrokerMessage {
    pub fn is_terminate(&self) -> bool {
        matches!(self, BrokerMessage::Terminate(_))
    }
}

/// Why a broker run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateReason {
    /// A stop was requested
    Stopped,
    /// The source ran out of frames (replay finished)
    EndOfStream,
    /// The initial connection failed
    ConnectFailed,
    /// Every reconnection attempt failed
    ReconnectExhausted,
}

impl TerminateReason {
    /// Normal terminations are not failures
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TerminateReason::ConnectFailed | TerminateReason::ReconnectExhausted
        )
    }
}

impl fmt::Display for TerminateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminateReason::Stopped => write!(f, "stopped"),
            TerminateReason::EndOfStream => write!(f, "end of stream"),
            TerminateReason::ConnectFailed => write!(f, "initial connection failed"),
            TerminateReason::ReconnectExhausted => write!(f, "reconnect attempts exhausted"),
        }
    }
}

/// A subscriber's queue
pub type Subscription = Arc<HandoffQueue<BrokerMessage>>;

// ============================================================================
// State
// ============================================================================

/// Broker connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    Disconnected,
    Connecting,
    Connected,
    Reading,
    Reconnecting,
    Terminated,
}

impl BrokerState {
    /// Whether a run can no longer make progress
    pub fn is_final(&self) -> bool {
        matches!(self, BrokerState::Terminated)
    }
}

// ============================================================================
// Options
// ============================================================================

/// Runtime options of a broker, fixed at construction
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerOptions {
    /// Delay after each successful read
    pub poll_interval: Duration,
    /// Reconnection attempts after a failed read
    pub reconnect_attempts: u32,
    /// Delay before each reconnection attempt
    pub reconnect_delay: Duration,
    /// Capacity of the queues created by `subscribe`
    pub queue_capacity: usize,
    /// Frame log to append every read frame to
    pub record_path: Option<PathBuf>,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            record_path: None,
        }
    }
}

impl From<&BrokerConfig> for BrokerOptions {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            reconnect_attempts: config.reconnect_attempts,
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            queue_capacity: config.queue_capacity,
            record_path: config.record_path.clone(),
        }
    }
}

// ============================================================================
// Broker
// ============================================================================

/// Poll/decode/publish loop over one frame source
///
/// Schema and window are read-only for the broker's lifetime. The broker can
/// be driven on the caller's thread with `run`, or on its own thread with
/// `spawn`.
pub struct Broker<S: FrameSource> {
    source: S,
    schema: Arc<Schema>,
    window: FrameWindow,
    options: BrokerOptions,
    subscribers: Vec<Subscription>,
    state: Arc<RwLock<BrokerState>>,
    stats: Arc<BrokerStats>,
}

impl<S: FrameSource> Broker<S> {
    /// Create a broker, computing the frame window once
    ///
    /// # Errors
    ///
    /// `BrokerError::Schema` when no window can be derived from the schema,
    /// `BrokerError::ConfigValidation` for a zero poll interval or capacity.
    pub fn new(source: S, schema: Schema, options: BrokerOptions) -> Result<Self> {
        if options.poll_interval.is_zero() {
            return Err(BrokerError::ConfigValidation {
                field: "poll_interval",
                reason: "must be greater than zero".into(),
            });
        }
        if options.queue_capacity == 0 {
            return Err(BrokerError::ConfigValidation {
                field: "queue_capacity",
                reason: "must be at least 1".into(),
            });
        }
        let window = compute_window(&schema)?;

        Ok(Self {
            source,
            schema: Arc::new(schema),
            window,
            options,
            subscribers: Vec::new(),
            state: Arc::new(RwLock::new(BrokerState::Disconnected)),
            stats: Arc::new(BrokerStats::new()),
        })
    }

    pub fn window(&self) -> FrameWindow {
        self.window
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn options(&self) -> &BrokerOptions {
        &self.options
    }

    pub fn stats(&self) -> Arc<BrokerStats> {
        self.stats.clone()
    }

    /// Add a subscriber queue with the configured capacity
    pub fn subscribe(&mut self) -> Subscription {
        self.subscribe_with_capacity(self.options.queue_capacity)
    }

    /// Add a subscriber queue with its own capacity
    pub fn subscribe_with_capacity(&mut self, capacity: usize) -> Subscription {
        let queue = Arc::new(HandoffQueue::new(capacity));
        self.subscribers.push(queue.clone());
        queue
    }

    /// Run on the current thread until the run ends
    pub fn run(self, stop: StopSignal) -> TerminateReason {
        self.into_runner(stop).run()
    }

    /// Run on a dedicated thread
    ///
    /// # Errors
    ///
    /// `BrokerError::Thread` when the OS refuses to spawn the thread.
    pub fn spawn(self) -> Result<BrokerHandle> {
        let stop = StopSignal::new();
        let state = self.state.clone();
        let stats = self.stats.clone();
        let runner = self.into_runner(stop.clone());

        let thread = std::thread::Builder::new()
            .name("s7-broker".to_string())
            .spawn(move || runner.run())
            .map_err(|e| BrokerError::Thread { source: e })?;

        Ok(BrokerHandle {
            stop,
            state,
            stats,
            thread: Some(thread),
        })
    }

    fn into_runner(self, stop: StopSignal) -> Runner<S> {
        if self.subscribers.is_empty() {
            warn!("Broker started without subscribers, snapshots will be discarded");
        }

        let recorder = self
            .options
            .record_path
            .as_deref()
            .and_then(|path| match FrameRecorder::open(path) {
                Ok(recorder) => {
                    info!("Recording frames to {}", path.display());
                    Some(recorder)
                }
                Err(e) => {
                    warn!("Frame recording disabled: {}", e);
                    None
                }
            });

        Runner {
            source: self.source,
            schema: self.schema,
            window: self.window,
            options: self.options,
            subscribers: self.subscribers,
            recorder,
            stop,
            state: self.state,
            stats: self.stats,
            sequence: 0,
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Handle to control a running broker
///
/// Dropping the handle stops the broker and waits for its thread.
pub struct BrokerHandle {
    stop: StopSignal,
    state: Arc<RwLock<BrokerState>>,
    stats: Arc<BrokerStats>,
    thread: Option<JoinHandle<TerminateReason>>,
}

impl BrokerHandle {
    /// Request broker shutdown
    ///
    /// Idempotent: later calls, or calls after the broker already ended,
    /// have no effect.
    pub fn stop(&self) {
        if self.stop.stop() && !self.is_finished() {
            info!("Broker stop requested");
        }
    }

    /// Get current state
    pub fn state(&self) -> BrokerState {
        *self.state.read()
    }

    /// Get broker statistics
    pub fn stats(&self) -> &Arc<BrokerStats> {
        &self.stats
    }

    /// Stop signal shared with the broker thread
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Whether the broker thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the broker thread
    ///
    /// Returns `None` if the thread panicked.
    pub fn join(mut self) -> Option<TerminateReason> {
        self.thread.take().and_then(|t| t.join().ok())
    }
}

impl Drop for BrokerHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.stop.stop();
            let _ = thread.join();
        }
    }
}
