//! Consumers of the broker output
//!
//! `run_consumer` implements the consumer side of the hand-off: pop with a
//! timeout, hand snapshots to a sink, stop on `Terminate` or when the queue
//! stays silent for the whole timeout. Sinks only format and write.

mod json;
mod table;

pub use json::JsonLinesSink;
pub use table::TableSink;

use crate::broker::{BrokerMessage, HandoffQueue, TerminateReason};
use crate::codec::ValueSnapshot;
use std::fmt;
use std::io;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Destination of decoded snapshots
pub trait SnapshotSink {
    /// Write one snapshot
    fn snapshot(&mut self, snapshot: &ValueSnapshot) -> io::Result<()>;

    /// The broker lost the PLC and is retrying (informational)
    fn reconnecting(&mut self, _attempt: u32, _max_attempts: u32) -> io::Result<()> {
        Ok(())
    }

    /// Called once when the consumer loop ends
    fn finish(&mut self, _exit: ConsumerExit) -> io::Result<()> {
        Ok(())
    }
}

impl<K: SnapshotSink + ?Sized> SnapshotSink for Box<K> {
    fn snapshot(&mut self, snapshot: &ValueSnapshot) -> io::Result<()> {
        (**self).snapshot(snapshot)
    }

    fn reconnecting(&mut self, attempt: u32, max_attempts: u32) -> io::Result<()> {
        (**self).reconnecting(attempt, max_attempts)
    }

    fn finish(&mut self, exit: ConsumerExit) -> io::Result<()> {
        (**self).finish(exit)
    }
}

/// Why a consumer loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerExit {
    /// The broker sent `Terminate`
    Terminated(TerminateReason),
    /// Nothing arrived within the timeout
    TimedOut,
    /// The sink could not be written to
    SinkFailed,
}

impl fmt::Display for ConsumerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumerExit::Terminated(reason) => write!(f, "broker terminated ({})", reason),
            ConsumerExit::TimedOut => write!(f, "timed out waiting for data"),
            ConsumerExit::SinkFailed => write!(f, "output failed"),
        }
    }
}

/// Drain `queue` into `sink` until terminated or timed out
///
/// Blocks the calling thread; run it on a dedicated or blocking-pool thread.
pub fn run_consumer<K: SnapshotSink + ?Sized>(
    queue: &HandoffQueue<BrokerMessage>,
    timeout: Duration,
    sink: &mut K,
) -> ConsumerExit {
    let exit = loop {
        let Some(message) = queue.pop_timeout(timeout) else {
            break ConsumerExit::TimedOut;
        };

        let written = match message {
            BrokerMessage::Snapshot(snapshot) => sink.snapshot(&snapshot),
            BrokerMessage::ReconnectNotice {
                attempt,
                max_attempts,
            } => {
                debug!("Consumer notified of reconnect {}/{}", attempt, max_attempts);
                sink.reconnecting(attempt, max_attempts)
            }
            BrokerMessage::Terminate(reason) => break ConsumerExit::Terminated(reason),
        };

        if let Err(e) = written {
            warn!("Consumer output failed: {}", e);
            break ConsumerExit::SinkFailed;
        }
    };

    if let Err(e) = sink.finish(exit) {
        warn!("Consumer output failed: {}", e);
    }
    info!("Consumer ended: {}", exit);
    exit
}
