//! JSON lines output
//!
//! One object per line:
//!
//! ```text
//! {"sequence":1,"captured_at":"2026-01-05T10:00:00.123+01:00","values":{"iT1_LVL":33,"rT1_MV":10.5}}
//! {"event":"reconnect","attempt":1,"max_attempts":3}
//! ```
//!
//! Absent values (and non-finite reals) are written as `null`.

use super::SnapshotSink;
use crate::codec::ValueSnapshot;
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::json;
use std::io::{self, Write};

#[derive(Serialize)]
struct SnapshotLine<'a> {
    sequence: u64,
    captured_at: DateTime<Local>,
    values: &'a ValueSnapshot,
}

/// Writes snapshots as newline-delimited JSON
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, value)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

impl JsonLinesSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> SnapshotSink for JsonLinesSink<W> {
    fn snapshot(&mut self, snapshot: &ValueSnapshot) -> io::Result<()> {
        self.write_line(&SnapshotLine {
            sequence: snapshot.sequence(),
            captured_at: snapshot.captured_at(),
            values: snapshot,
        })
    }

    fn reconnecting(&mut self, attempt: u32, max_attempts: u32) -> io::Result<()> {
        self.write_line(&json!({
            "event": "reconnect",
            "attempt": attempt,
            "max_attempts": max_attempts,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FieldValue, Value};
    use std::sync::Arc;

    #[test]
    fn test_snapshot_line() {
        let snapshot = ValueSnapshot::new(
            3,
            vec![
                FieldValue {
                    name: Arc::from("iT1_LVL"),
                    value: Some(Value::Int(33)),
                },
                FieldValue {
                    name: Arc::from("rT1_MV"),
                    value: Some(Value::Real(10.5)),
                },
                FieldValue {
                    name: Arc::from("xRun"),
                    value: Some(Value::Bit(false)),
                },
                FieldValue {
                    name: Arc::from("iMissing"),
                    value: None,
                },
            ],
        );

        let mut sink = JsonLinesSink::new(Vec::new());
        sink.snapshot(&snapshot).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.ends_with('\n'));

        let parsed: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(parsed["sequence"], 3);
        assert!(parsed["captured_at"].is_string());
        assert_eq!(parsed["values"]["iT1_LVL"], 33);
        assert_eq!(parsed["values"]["rT1_MV"], 10.5);
        assert_eq!(parsed["values"]["xRun"], false);
        assert!(parsed["values"]["iMissing"].is_null());
    }

    #[test]
    fn test_reconnect_line() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.reconnecting(1, 3).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(parsed["event"], "reconnect");
        assert_eq!(parsed["attempt"], 1);
        assert_eq!(parsed["max_attempts"], 3);
    }
}
