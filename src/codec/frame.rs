//! Data block frame decoder
//!
//! Pure transformation of a raw data block buffer into a `ValueSnapshot`.
//! S7 stores every multi-byte value big-endian.
//!
//! Decoding never fails as a whole: a field whose bytes fall outside the
//! buffer, or a `Bool` whose bit index is not in 0..=7, resolves to an absent
//! value and the remaining fields are still decoded. Partial reads therefore
//! degrade field by field instead of dropping the frame.

use super::{FieldValue, Value, ValueSnapshot};
use crate::schema::{DataType, FieldSpec, Schema};

/// Decode a frame whose first byte is data block byte 0
///
/// The returned snapshot has sequence 0; the broker numbers the snapshots it
/// publishes.
pub fn decode(frame: &[u8], schema: &Schema) -> ValueSnapshot {
    decode_at(frame, 0, schema)
}

/// Decode a frame whose first byte is data block byte `base`
///
/// This is what the broker uses: the PLC returns only the window, starting at
/// the window's first byte.
pub fn decode_at(frame: &[u8], base: usize, schema: &Schema) -> ValueSnapshot {
    let values = schema
        .fields()
        .iter()
        .map(|field| FieldValue {
            name: field.name.clone(),
            value: decode_field(frame, base, field),
        })
        .collect();
    ValueSnapshot::new(0, values)
}

fn decode_field(frame: &[u8], base: usize, field: &FieldSpec) -> Option<Value> {
    // Fields before the window start cannot be in the frame
    let index = field.offset.byte().checked_sub(base)?;

    match field.data_type {
        DataType::Int16 => {
            let bytes = take::<2>(frame, index)?;
            Some(Value::Int(i16::from_be_bytes(bytes)))
        }
        DataType::Real32 => {
            let bytes = take::<4>(frame, index)?;
            Some(Value::Real(f32::from_be_bytes(bytes)))
        }
        DataType::Bool => {
            let [byte] = take::<1>(frame, index)?;
            get_bit(byte, field.offset.bit()).map(Value::Bit)
        }
    }
}

/// Copy `N` bytes starting at `index`, `None` when the frame is too short
fn take<const N: usize>(frame: &[u8], index: usize) -> Option<[u8; N]> {
    let end = index.checked_add(N)?;
    frame.get(index..end)?.try_into().ok()
}

/// Bit 0 is the least significant bit
fn get_bit(byte: u8, bit: u8) -> Option<bool> {
    if bit > 7 {
        return None;
    }
    Some(byte & (1 << bit) != 0)
}
