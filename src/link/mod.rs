//! PLC link abstraction
//!
//! The wire protocol (S7 over ISO-on-TCP) belongs to an external client
//! library. The broker only needs four primitives from it, captured by the
//! `PlcLink` trait:
//!
//! - `connect` / `disconnect`: session lifecycle
//! - `is_connected`: cheap connectivity check used while reconnecting
//! - `read_area`: read a byte range of the configured data block
//!
//! A link does NOT handle:
//! - Retrying (that's the broker's job)
//! - Decoding (that's the codec's job)
//!
//! # Adding a new link
//!
//! 1. Wrap the client library in a struct
//! 2. Implement `PlcLink` for it
//! 3. Hand it to `LiveFrameSource::new`

pub mod memory;

pub use memory::{Failures, MemoryLink, MemoryLinkControl};

use crate::error::Result;
use bytes::Bytes;

/// Blocking PLC client primitives
///
/// Calls may block on network I/O; the broker runs them on its own thread.
pub trait PlcLink: Send + 'static {
    /// Open a session to the PLC at `address`
    ///
    /// # Errors
    ///
    /// `BrokerError::Connect` when the PLC cannot be reached.
    fn connect(&mut self, address: &str) -> Result<()>;

    /// Whether a session is currently open
    fn is_connected(&self) -> bool;

    /// Read `length` bytes of the data block starting at byte `start`
    ///
    /// # Errors
    ///
    /// `BrokerError::Read` when the request fails.
    fn read_area(&mut self, start: usize, length: usize) -> Result<Bytes>;

    /// Close the session; a no-op when already closed
    fn disconnect(&mut self);
}

impl<L: PlcLink + ?Sized> PlcLink for Box<L> {
    fn connect(&mut self, address: &str) -> Result<()> {
        (**self).connect(address)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn read_area(&mut self, start: usize, length: usize) -> Result<Bytes> {
        (**self).read_area(start, length)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}
