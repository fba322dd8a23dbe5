//! Schema file loading
//!
//! The data block description is kept in a TOML file, one `[[field]]` table
//! per value, mirroring the columns of the PLC project export
//! (`Name`, `Data type`, `Offset`, `Comment`):
//!
//! ```toml
//! [[field]]
//! name = "iT1_LVL"
//! data_type = "Int"
//! offset = 0.0
//! comment = "Tank 1 level"
//! ```

use super::{Schema, SchemaRow};
use crate::error::{BrokerError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    field: Vec<SchemaRow>,
}

/// Parse schema rows from TOML text
pub fn parse_rows(content: &str) -> std::result::Result<Vec<SchemaRow>, String> {
    let file: SchemaFile = toml::from_str(content).map_err(|e| e.to_string())?;
    Ok(file.field)
}

/// Read, parse and validate a schema file
pub fn load(path: &Path) -> Result<Schema> {
    let content = fs::read_to_string(path).map_err(|e| BrokerError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let rows = parse_rows(&content).map_err(|reason| BrokerError::ConfigParse {
        path: path.to_path_buf(),
        reason,
    })?;
    Schema::load(&rows)
}
