//! In-process PLC link
//!
//! Serves reads from a byte image held in memory instead of a PLC. Faults can
//! be scripted through a `MemoryLinkControl` handle that stays usable after
//! the link has been moved into a broker:
//!
//! ```ignore
//! let link = MemoryLink::new(vec![0; 16]);
//! let control = link.control();
//! control.write(0, &[0x00, 0x64]);
//! control.fail_reads(Failures::Next(1));
//! ```

use super::PlcLink;
use crate::error::{BrokerError, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Fault script for connects or reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Failures {
    #[default]
    Never,
    Always,
    /// Fail the next `n` calls, then succeed
    Next(u32),
}

impl Failures {
    /// Consume one call, returning whether it fails
    fn take(&mut self) -> bool {
        match self {
            Failures::Never => false,
            Failures::Always => true,
            Failures::Next(0) => {
                *self = Failures::Never;
                false
            }
            Failures::Next(n) => {
                *n -= 1;
                true
            }
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    image: Vec<u8>,
    connected: bool,
    address: Option<String>,
    connect_failures: Failures,
    read_failures: Failures,
    read_delay: Duration,
    connect_calls: u32,
    read_calls: u32,
    disconnect_calls: u32,
}

/// PLC link backed by an in-memory data block image
///
/// Reads past the end of the image return the bytes that exist (a short
/// frame), which is how a truncated response looks to the decoder.
pub struct MemoryLink {
    state: Arc<Mutex<MemoryState>>,
}

/// Handle to inspect and script a `MemoryLink`
#[derive(Clone)]
pub struct MemoryLinkControl {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLink {
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                image,
                ..Default::default()
            })),
        }
    }

    pub fn control(&self) -> MemoryLinkControl {
        MemoryLinkControl {
            state: self.state.clone(),
        }
    }
}

impl PlcLink for MemoryLink {
    fn connect(&mut self, address: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.connect_calls += 1;
        if state.connect_failures.take() {
            state.connected = false;
            return Err(BrokerError::Connect {
                address: address.to_string(),
                reason: "connection refused".into(),
            });
        }
        state.connected = true;
        state.address = Some(address.to_string());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn read_area(&mut self, start: usize, length: usize) -> Result<Bytes> {
        let delay = {
            let mut state = self.state.lock();
            state.read_calls += 1;
            state.read_delay
        };
        // Simulated network round trip, outside the lock
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        let read_error = |reason: &str| BrokerError::Read {
            start,
            length,
            reason: reason.to_string(),
        };
        if !state.connected {
            return Err(read_error("not connected"));
        }
        if state.read_failures.take() {
            return Err(read_error("no response from PLC"));
        }

        let from = start.min(state.image.len());
        let to = start.saturating_add(length).min(state.image.len());
        Ok(Bytes::copy_from_slice(&state.image[from..to]))
    }

    fn disconnect(&mut self) {
        let mut state = self.state.lock();
        state.disconnect_calls += 1;
        state.connected = false;
    }
}

impl MemoryLinkControl {
    /// Replace the whole data block image
    pub fn set_image(&self, image: Vec<u8>) {
        self.state.lock().image = image;
    }

    /// Overwrite bytes of the image, growing it when needed
    pub fn write(&self, offset: usize, bytes: &[u8]) {
        let mut state = self.state.lock();
        let end = offset + bytes.len();
        if state.image.len() < end {
            state.image.resize(end, 0);
        }
        state.image[offset..end].copy_from_slice(bytes);
    }

    pub fn fail_connects(&self, failures: Failures) {
        self.state.lock().connect_failures = failures;
    }

    pub fn fail_reads(&self, failures: Failures) {
        self.state.lock().read_failures = failures;
    }

    /// Delay every read by `delay` (blocking the caller)
    pub fn set_read_delay(&self, delay: Duration) {
        self.state.lock().read_delay = delay;
    }

    /// Drop the session as if the PLC went away
    pub fn drop_connection(&self) {
        self.state.lock().connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Address of the last successful connect
    pub fn address(&self) -> Option<String> {
        self.state.lock().address.clone()
    }

    pub fn connect_calls(&self) -> u32 {
        self.state.lock().connect_calls
    }

    pub fn read_calls(&self) -> u32 {
        self.state.lock().read_calls
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.state.lock().disconnect_calls
    }
}
