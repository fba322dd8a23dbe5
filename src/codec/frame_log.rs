//! Frame log format and recorder
//!
//! A frame log holds one raw frame per line, each byte written as a decimal
//! number and separated by a single space:
//!
//! ```text
//! 0 33 0 66 50 55 65 40 0 0
//! ```
//!
//! Logs written by the recorder can be fed back through the replay source.

use crate::constants::RECORDER_BUFFER_SIZE;
use crate::error::{BrokerError, Result};
use bytes::Bytes;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Format a frame as a log line (without the trailing newline)
pub fn format_line(frame: &[u8]) -> String {
    let mut line = String::with_capacity(frame.len() * 4);
    for (i, byte) in frame.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        line.push_str(&byte.to_string());
    }
    line
}

/// Parse a log line back into a frame
///
/// Surrounding whitespace (including a CR from CRLF files) is ignored.
pub fn parse_line(line: &str) -> std::result::Result<Bytes, String> {
    let line = line.trim();
    if line.is_empty() {
        return Err("empty line".to_string());
    }
    line.split_ascii_whitespace()
        .map(|token| {
            token
                .parse::<u8>()
                .map_err(|_| format!("'{}' is not a byte value", token))
        })
        .collect::<std::result::Result<Vec<u8>, String>>()
        .map(Bytes::from)
}

/// Appends every frame it is given to a frame log
///
/// Recording is best effort: the first write error is logged and disables
/// the recorder, the broker keeps polling.
pub struct FrameRecorder {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FrameRecorder {
    /// Open (or create) the log in append mode
    pub fn open(path: &Path) -> Result<Self> {
        let map_err = |e: std::io::Error| BrokerError::Io {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(map_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(map_err)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::with_capacity(RECORDER_BUFFER_SIZE, file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the recorder is still writing
    pub fn is_active(&self) -> bool {
        self.writer.is_some()
    }

    /// Append `frame` as one line
    ///
    /// Empty frames are not recorded: their blank line would not replay.
    pub fn record(&mut self, frame: &[u8]) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        if frame.is_empty() {
            debug!("Not recording empty frame");
            return;
        }
        let line = format_line(frame);
        let result = writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.write_all(b"\n"));
        if let Err(e) = result {
            warn!("Frame recording to {} disabled: {}", self.path.display(), e);
            self.writer = None;
        }
    }

    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                warn!("Frame recording to {} disabled: {}", self.path.display(), e);
                self.writer = None;
            }
        }
    }
}

impl Drop for FrameRecorder {
    fn drop(&mut self) {
        self.flush();
    }
}
