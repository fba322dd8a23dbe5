//! Frame sources
//!
//! The broker state machine is written once and fed by a `FrameSource`:
//! - **Live**: frames read from a PLC through a `PlcLink`
//! - **Replay**: frames read back from a recorded frame log
//!
//! A source does NOT handle:
//! - Retry budget and delays (that's the broker's job)
//! - Decoding (that's the codec's job)

pub mod live;
pub mod replay;

pub use live::LiveFrameSource;
pub use replay::ReplayFrameSource;

use crate::error::Result;
use crate::schema::FrameWindow;
use bytes::Bytes;

/// Where the broker gets its raw frames from
///
/// # Lifecycle
///
/// 1. `open()` once; a failure ends the run without retries
/// 2. `read_frame()` once per poll cycle
/// 3. After a failed read, `recover()` once per reconnection attempt
/// 4. `close()` exactly once, whatever the exit path
pub trait FrameSource: Send + 'static {
    /// Establish the initial session
    fn open(&mut self) -> Result<()>;

    /// Fetch the bytes of `window`
    ///
    /// Returns `Ok(None)` when the source has no more frames (normal end).
    fn read_frame(&mut self, window: FrameWindow) -> Result<Option<Bytes>>;

    /// One attempt at making the source readable again
    fn recover(&mut self) -> Result<()>;

    /// Release the session
    fn close(&mut self);

    /// Human readable description for logs
    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn read_frame(&mut self, window: FrameWindow) -> Result<Option<Bytes>> {
        (**self).read_frame(window)
    }

    fn recover(&mut self) -> Result<()> {
        (**self).recover()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
