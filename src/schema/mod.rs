//! Schema catalog
//!
//! Turns the parsed data block description (one row per value) into a
//! validated `Schema` and derives the byte window the broker has to fetch.
//!
//! - `Schema::load`: validate rows (known type, parseable offset, unique name)
//! - `compute_window`: smallest contiguous window covering every field
//!
//! Reading the rows from disk lives in [`file`]; the catalog itself only
//! consumes an already-parsed row list.

pub mod file;
mod offset;

pub use offset::Offset;

use crate::constants::MAX_DB_BYTE;
use crate::error::{BrokerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// =============================================================================
// Data types
// =============================================================================

/// S7 data types understood by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// `Int`: signed 16-bit, big-endian
    Int16,
    /// `Real`: IEEE-754 single precision, big-endian
    Real32,
    /// `Bool`: a single bit addressed as byte.bit
    Bool,
}

impl DataType {
    /// Bytes touched in the frame when decoding this type
    pub fn read_size(&self) -> usize {
        match self {
            DataType::Int16 => 2,
            DataType::Real32 => 4,
            DataType::Bool => 1,
        }
    }

    /// Bytes added past `ceil(offset)` when this type closes the window
    pub fn trailing_size(&self) -> usize {
        match self {
            DataType::Int16 => 2,
            DataType::Real32 => 4,
            DataType::Bool => 0,
        }
    }

    /// Name used in the PLC project (`Int`, `Real`, `Bool`)
    pub fn s7_name(&self) -> &'static str {
        match self {
            DataType::Int16 => "Int",
            DataType::Real32 => "Real",
            DataType::Bool => "Bool",
        }
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" | "int16" => Ok(DataType::Int16),
            "real" | "real32" => Ok(DataType::Real32),
            "bool" => Ok(DataType::Bool),
            _ => Err(format!("unknown data type '{}'", s.trim())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.s7_name())
    }
}

// =============================================================================
// Rows (input)
// =============================================================================

/// Offset as it comes out of the source table: a number or a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowOffset {
    Number(f64),
    Text(String),
}

impl RowOffset {
    fn parse(&self) -> std::result::Result<Offset, String> {
        match self {
            RowOffset::Number(n) => {
                Offset::from_f64(*n).ok_or_else(|| format!("'{}' is not a byte.bit offset", n))
            }
            RowOffset::Text(s) => s.parse(),
        }
    }
}

impl From<&str> for RowOffset {
    fn from(s: &str) -> Self {
        RowOffset::Text(s.to_string())
    }
}

impl From<f64> for RowOffset {
    fn from(n: f64) -> Self {
        RowOffset::Number(n)
    }
}

/// One unvalidated row of the data block description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRow {
    pub name: String,
    pub data_type: String,
    pub offset: RowOffset,
    /// Free text, ignored by the broker
    #[serde(default)]
    pub comment: Option<String>,
}

impl SchemaRow {
    pub fn new(
        name: impl Into<String>,
        data_type: impl Into<String>,
        offset: impl Into<RowOffset>,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            offset: offset.into(),
            comment: None,
        }
    }
}

// =============================================================================
// Schema
// =============================================================================

/// A validated field of the data block
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: Arc<str>,
    pub data_type: DataType,
    pub offset: Offset,
}

impl FieldSpec {
    /// First byte past the bytes this field reads
    fn byte_end(&self) -> usize {
        self.offset.byte() + self.data_type.read_size()
    }
}

/// Validated, non-empty field list in source order
///
/// Source order is kept for output; window arithmetic uses the offsets, not
/// the position.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    /// Validate a row list into a schema
    ///
    /// # Errors
    ///
    /// `BrokerError::Schema` when the row list is empty, a type is unknown,
    /// an offset does not parse, or a name is empty or repeated.
    pub fn load(rows: &[SchemaRow]) -> Result<Self> {
        if rows.is_empty() {
            return Err(BrokerError::schema(None, "no fields defined"));
        }

        let mut seen = HashSet::with_capacity(rows.len());
        let mut fields = Vec::with_capacity(rows.len());

        for (i, row) in rows.iter().enumerate() {
            let row_no = Some(i + 1);
            let name = row.name.trim();
            if name.is_empty() {
                return Err(BrokerError::schema(row_no, "empty name"));
            }
            if !seen.insert(name.to_string()) {
                return Err(BrokerError::schema(
                    row_no,
                    format!("duplicate name '{}'", name),
                ));
            }

            let data_type = row
                .data_type
                .parse::<DataType>()
                .map_err(|reason| BrokerError::schema(row_no, reason))?;
            let offset = row
                .offset
                .parse()
                .map_err(|reason| BrokerError::schema(row_no, reason))?;
            if offset.byte() > MAX_DB_BYTE {
                return Err(BrokerError::schema(
                    row_no,
                    format!("offset {} is beyond DB byte {}", offset, MAX_DB_BYTE),
                ));
            }

            fields.push(FieldSpec {
                name: Arc::from(name),
                data_type,
                offset,
            });
        }

        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| &*f.name == name)
    }
}

// =============================================================================
// Frame window
// =============================================================================

/// Contiguous byte range fetched from the data block on every poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameWindow {
    pub start: usize,
    pub length: usize,
}

impl FrameWindow {
    /// First byte past the window
    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

impl fmt::Display for FrameWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DB bytes {}..{} ({} B)", self.start, self.end(), self.length)
    }
}

/// Derive the byte window to read from a schema
///
/// `start = floor(min offset)` and
/// `length = ceil(max offset) + trailing_size(last type) - start`, where the
/// last field is the one with the greatest offset. The length is widened when
/// that rule would cut off a field (e.g. a `Bool` at a whole byte offset).
///
/// # Errors
///
/// `BrokerError::Schema` when the schema has no field.
pub fn compute_window(schema: &Schema) -> Result<FrameWindow> {
    let fields = schema.fields();
    let Some(first) = fields.iter().min_by_key(|f| f.offset) else {
        return Err(BrokerError::schema(None, "cannot compute a window without fields"));
    };
    let Some(last) = fields
        .iter()
        .max_by_key(|f| (f.offset, f.data_type.trailing_size()))
    else {
        return Err(BrokerError::schema(None, "cannot compute a window without fields"));
    };

    let start = first.offset.byte();
    let end_by_rule = last.offset.ceil_byte() + last.data_type.trailing_size();
    let end_by_coverage = fields.iter().map(FieldSpec::byte_end).max().unwrap_or(end_by_rule);
    let end = end_by_rule.max(end_by_coverage);

    Ok(FrameWindow {
        start,
        length: end - start,
    })
}
