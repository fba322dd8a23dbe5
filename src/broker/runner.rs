//! Broker runner (internal implementation)
//!
//! The connection state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Reading <-> Connected
//!                     |                        |
//!                     v                        v
//!                 Terminated  <-(exhausted)- Reconnecting -(ok)-> Connected
//! ```
//!
//! Every exit path closes the source exactly once and then publishes exactly
//! one `Terminate`.

use super::stats::BrokerStats;
use super::stop::StopSignal;
use super::{BrokerMessage, BrokerOptions, BrokerState, Subscription, TerminateReason};
use crate::codec::{decode_at, FrameRecorder};
use crate::schema::{FrameWindow, Schema};
use crate::source::FrameSource;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of a reconnection cycle
enum Recovery {
    Reconnected,
    Exhausted,
    Stopped,
}

pub(super) struct Runner<S: FrameSource> {
    pub(super) source: S,
    pub(super) schema: Arc<Schema>,
    pub(super) window: FrameWindow,
    pub(super) options: BrokerOptions,
    pub(super) subscribers: Vec<Subscription>,
    pub(super) recorder: Option<FrameRecorder>,
    pub(super) stop: StopSignal,
    pub(super) state: Arc<RwLock<BrokerState>>,
    pub(super) stats: Arc<BrokerStats>,
    pub(super) sequence: u64,
}

impl<S: FrameSource> Runner<S> {
    /// Run until stopped, exhausted or out of frames
    pub(super) fn run(mut self) -> TerminateReason {
        let reason = self.drive();

        self.source.close();
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.flush();
        }

        let final_state = match reason {
            TerminateReason::Stopped | TerminateReason::EndOfStream => BrokerState::Disconnected,
            TerminateReason::ConnectFailed | TerminateReason::ReconnectExhausted => {
                BrokerState::Terminated
            }
        };
        self.set_state(final_state);
        self.publish(BrokerMessage::Terminate(reason));
        info!("Broker finished ({}): {}", self.source.describe(), reason);
        reason
    }

    fn drive(&mut self) -> TerminateReason {
        if self.stop.is_stopped() {
            return TerminateReason::Stopped;
        }

        self.set_state(BrokerState::Connecting);
        if let Err(e) = self.source.open() {
            // No retries for the initial connection
            error!("Initial connection to {} failed: {}", self.source.describe(), e);
            return TerminateReason::ConnectFailed;
        }
        self.set_state(BrokerState::Connected);
        info!("Connected to {}, polling {}", self.source.describe(), self.window);

        loop {
            if self.stop.is_stopped() {
                return TerminateReason::Stopped;
            }

            self.set_state(BrokerState::Reading);
            match self.source.read_frame(self.window) {
                Ok(Some(frame)) => {
                    self.stats.add_frame();
                    if let Some(recorder) = self.recorder.as_mut() {
                        recorder.record(&frame);
                    }

                    self.sequence += 1;
                    let snapshot = decode_at(&frame, self.window.start, &self.schema)
                        .with_sequence(self.sequence);
                    if frame.len() < self.window.length {
                        debug!(
                            "Short frame #{}: {} of {} bytes",
                            self.sequence,
                            frame.len(),
                            self.window.length
                        );
                    }
                    self.publish(BrokerMessage::Snapshot(snapshot));
                    self.stats.add_snapshot();
                    self.set_state(BrokerState::Connected);

                    if self.stop.wait_timeout(self.options.poll_interval) {
                        return TerminateReason::Stopped;
                    }
                }
                Ok(None) => {
                    info!("{} has no more frames", self.source.describe());
                    return TerminateReason::EndOfStream;
                }
                Err(e) => {
                    warn!("Cannot receive data from {}: {}", self.source.describe(), e);
                    self.stats.add_read_failure();
                    self.set_state(BrokerState::Reconnecting);

                    match self.reconnect() {
                        Recovery::Reconnected => self.set_state(BrokerState::Connected),
                        Recovery::Stopped => return TerminateReason::Stopped,
                        Recovery::Exhausted => return TerminateReason::ReconnectExhausted,
                    }
                }
            }
        }
    }

    /// Bounded reconnection: one notice, one delay and one attempt per round
    fn reconnect(&mut self) -> Recovery {
        let max_attempts = self.options.reconnect_attempts;

        for attempt in 1..=max_attempts {
            self.stats.add_reconnect_attempt();
            self.publish(BrokerMessage::ReconnectNotice {
                attempt,
                max_attempts,
            });
            warn!(
                "Reconnecting to {} ... attempt {}/{}",
                self.source.describe(),
                attempt,
                max_attempts
            );

            if self.stop.wait_timeout(self.options.reconnect_delay) {
                return Recovery::Stopped;
            }

            match self.source.recover() {
                Ok(()) => {
                    info!("Reconnected to {}", self.source.describe());
                    return Recovery::Reconnected;
                }
                Err(e) => warn!("Reconnect attempt {} failed: {}", attempt, e),
            }
        }

        error!(
            "Giving up on {} after {} reconnect attempts",
            self.source.describe(),
            max_attempts
        );
        Recovery::Exhausted
    }

    fn publish(&self, message: BrokerMessage) {
        let Some((last, others)) = self.subscribers.split_last() else {
            return;
        };
        for queue in others {
            if queue.push(message.clone()).is_some() {
                self.stats.add_evicted();
            }
        }
        if last.push(message).is_some() {
            self.stats.add_evicted();
        }
    }

    fn set_state(&self, next: BrokerState) {
        let mut state = self.state.write();
        if *state != next {
            debug!("Broker state {:?} -> {:?}", *state, next);
            *state = next;
        }
    }
}
