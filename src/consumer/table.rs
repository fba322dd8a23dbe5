//! Human-readable snapshot table

use super::{ConsumerExit, SnapshotSink};
use crate::codec::ValueSnapshot;
use std::io::{self, Write};

/// Placeholder for a field that could not be decoded
const ABSENT: &str = "-";

/// Prints every snapshot as an aligned name/value table
pub struct TableSink<W: Write> {
    out: W,
}

impl<W: Write> TableSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl TableSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> SnapshotSink for TableSink<W> {
    fn snapshot(&mut self, snapshot: &ValueSnapshot) -> io::Result<()> {
        let width = snapshot.iter().map(|f| f.name.len()).max().unwrap_or(0);

        writeln!(
            self.out,
            "#{} {}",
            snapshot.sequence(),
            snapshot.captured_at().format("%Y-%m-%d %H:%M:%S%.3f")
        )?;
        for field in snapshot.iter() {
            match field.value {
                Some(value) => writeln!(self.out, "  {:<width$}  {}", field.name, value)?,
                None => writeln!(self.out, "  {:<width$}  {}", field.name, ABSENT)?,
            }
        }
        writeln!(self.out)?;
        self.out.flush()
    }

    fn reconnecting(&mut self, attempt: u32, max_attempts: u32) -> io::Result<()> {
        writeln!(
            self.out,
            "Connection lost, reconnecting ... attempt {}/{}",
            attempt, max_attempts
        )?;
        self.out.flush()
    }

    fn finish(&mut self, exit: ConsumerExit) -> io::Result<()> {
        writeln!(self.out, "Consumer ended: {}", exit)?;
        self.out.flush()
    }
}
