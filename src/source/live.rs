//! Live frame source: reads the data block window through a PLC link

use super::FrameSource;
use crate::error::Result;
use crate::link::PlcLink;
use crate::schema::FrameWindow;
use bytes::Bytes;
use tracing::debug;

/// Frame source backed by a `PlcLink`
///
/// The link is owned for the source's whole lifetime. A session that was
/// already dropped after a failed read is not disconnected again on close.
pub struct LiveFrameSource<L: PlcLink> {
    link: L,
    address: String,
    session_open: bool,
}

impl<L: PlcLink> LiveFrameSource<L> {
    pub fn new(link: L, address: impl Into<String>) -> Self {
        Self {
            link,
            address: address.into(),
            session_open: false,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }
}

impl<L: PlcLink> FrameSource for LiveFrameSource<L> {
    fn open(&mut self) -> Result<()> {
        // A failed first connect may leave a half-open session behind
        self.session_open = true;
        self.link.connect(&self.address)
    }

    fn read_frame(&mut self, window: FrameWindow) -> Result<Option<Bytes>> {
        match self.link.read_area(window.start, window.length) {
            Ok(frame) => Ok(Some(frame)),
            Err(e) => {
                // Drop the stale session so recovery really reconnects
                if self.link.is_connected() {
                    debug!("Dropping session to {} after failed read", self.address);
                    self.link.disconnect();
                    self.session_open = false;
                }
                Err(e)
            }
        }
    }

    fn recover(&mut self) -> Result<()> {
        if self.link.is_connected() {
            return Ok(());
        }
        self.link.connect(&self.address)?;
        self.session_open = true;
        Ok(())
    }

    fn close(&mut self) {
        if self.session_open {
            self.link.disconnect();
            self.session_open = false;
        }
    }

    fn describe(&self) -> String {
        format!("PLC {}", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{Failures, MemoryLink};

    const WINDOW: FrameWindow = FrameWindow {
        start: 0,
        length: 2,
    };

    #[test]
    fn test_read_through_link() {
        let link = MemoryLink::new(vec![0x00, 0x64, 0xFF]);
        let mut source = LiveFrameSource::new(link, "192.168.0.1");

        source.open().unwrap();
        let frame = source.read_frame(WINDOW).unwrap().unwrap();
        assert_eq!(frame.as_ref(), &[0x00, 0x64]);
        assert_eq!(source.describe(), "PLC 192.168.0.1");
    }

    #[test]
    fn test_failed_read_drops_session() {
        let link = MemoryLink::new(vec![0; 2]);
        let control = link.control();
        let mut source = LiveFrameSource::new(link, "plc");

        source.open().unwrap();
        control.fail_reads(Failures::Next(1));
        assert!(source.read_frame(WINDOW).is_err());
        assert!(!control.is_connected());

        source.recover().unwrap();
        assert!(control.is_connected());
        assert_eq!(control.connect_calls(), 2);
        assert!(source.read_frame(WINDOW).unwrap().is_some());
    }

    #[test]
    fn test_recover_skips_connect_when_still_connected() {
        let link = MemoryLink::new(vec![0; 2]);
        let control = link.control();
        let mut source = LiveFrameSource::new(link, "plc");

        source.open().unwrap();
        source.recover().unwrap();
        assert_eq!(control.connect_calls(), 1);
    }

    #[test]
    fn test_close_disconnects() {
        let link = MemoryLink::new(vec![0; 2]);
        let control = link.control();
        let mut source = LiveFrameSource::new(link, "plc");

        source.open().unwrap();
        source.close();
        assert!(!control.is_connected());
        assert_eq!(control.disconnect_calls(), 1);
    }

    #[test]
    fn test_close_after_dropped_session_does_not_disconnect_again() {
        let link = MemoryLink::new(vec![0; 2]);
        let control = link.control();
        let mut source = LiveFrameSource::new(link, "plc");

        source.open().unwrap();
        control.fail_reads(Failures::Always);
        control.fail_connects(Failures::Always);
        assert!(source.read_frame(WINDOW).is_err());
        assert!(source.recover().is_err());
        source.close();
        source.close();
        assert_eq!(control.disconnect_calls(), 1);
    }

    #[test]
    fn test_close_after_failed_open_disconnects_once() {
        let link = MemoryLink::new(vec![0; 2]);
        let control = link.control();
        control.fail_connects(Failures::Always);
        let mut source = LiveFrameSource::new(link, "plc");

        assert!(source.open().is_err());
        source.close();
        assert_eq!(control.disconnect_calls(), 1);
    }
}
