//! Frame codecs
//!
//! Separates byte-level concerns from the broker loop:
//! - **frame**: raw data block bytes + schema -> named, typed values
//! - **frame_log**: one recorded frame per text line (recording and replay)

pub mod frame;
pub mod frame_log;

pub use frame::{decode, decode_at};
pub use frame_log::FrameRecorder;

use chrono::{DateTime, Local};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// A decoded field value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i16),
    Real(f32),
    Bit(bool),
}

impl Value {
    pub fn as_i16(&self) -> Option<i16> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bit(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{:.2}", v),
            Value::Bit(v) => write!(f, "{}", u8::from(*v)),
        }
    }
}

/// One named field of a snapshot (`None` when it could not be decoded)
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub name: Arc<str>,
    pub value: Option<Value>,
}

/// Immutable result of one poll cycle
///
/// Cheap to clone: the field list is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSnapshot {
    sequence: u64,
    captured_at: DateTime<Local>,
    values: Arc<[FieldValue]>,
}

impl ValueSnapshot {
    pub fn new(sequence: u64, values: Vec<FieldValue>) -> Self {
        Self {
            sequence,
            captured_at: Local::now(),
            values: values.into(),
        }
    }

    /// Position of this snapshot in the broker's output (starts at 1)
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    /// Value of a field by name; `None` for unknown names and absent values
    pub fn get(&self, name: &str) -> Option<Value> {
        self.values
            .iter()
            .find(|f| &*f.name == name)
            .and_then(|f| f.value)
    }

    /// Fields in schema order
    pub fn iter(&self) -> impl Iterator<Item = &FieldValue> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }
}

/// Serialized as a name -> value map in schema order (`null` for absent)
impl Serialize for ValueSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for field in self.values.iter() {
            map.serialize_entry(&*field.name, &field.value)?;
        }
        map.end()
    }
}
