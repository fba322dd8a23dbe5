//! Replay frame source: plays back a recorded frame log
//!
//! Lets the whole pipeline run without a PLC. The cadence is the broker's
//! poll interval; the end of the log ends the run like a stop request.

use super::FrameSource;
use crate::codec::frame_log::parse_line;
use crate::error::{BrokerError, Result};
use crate::schema::FrameWindow;
use bytes::Bytes;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Frame source reading one frame per line from a frame log
pub struct ReplayFrameSource {
    path: PathBuf,
    lines: Option<Lines<BufReader<File>>>,
    line_no: usize,
}

impl ReplayFrameSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lines: None,
            line_no: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for ReplayFrameSource {
    fn open(&mut self) -> Result<()> {
        let file = File::open(&self.path).map_err(|e| BrokerError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        self.lines = Some(BufReader::new(file).lines());
        self.line_no = 0;
        Ok(())
    }

    fn read_frame(&mut self, _window: FrameWindow) -> Result<Option<Bytes>> {
        let Some(lines) = self.lines.as_mut() else {
            return Ok(None);
        };

        for line in lines.by_ref() {
            self.line_no += 1;
            let line = line.map_err(|e| BrokerError::Io {
                path: self.path.clone(),
                source: e,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line) {
                Ok(frame) => return Ok(Some(frame)),
                Err(reason) => {
                    warn!(
                        "Skipping {} line {}: {}",
                        self.path.display(),
                        self.line_no,
                        reason
                    );
                }
            }
        }
        Ok(None)
    }

    fn recover(&mut self) -> Result<()> {
        Err(BrokerError::Connect {
            address: self.path.display().to_string(),
            reason: "a frame log cannot be reopened mid-replay".into(),
        })
    }

    fn close(&mut self) {
        self.lines = None;
    }

    fn describe(&self) -> String {
        format!("replay {}", self.path.display())
    }
}
