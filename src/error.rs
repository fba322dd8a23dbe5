//! Centralized error types for the broker
//!
//! All broker errors are represented by the `BrokerError` enum.
//! Use `Result<T>` as shorthand for `std::result::Result<T, BrokerError>`.
//!
//! Errors never travel through the hand-off queue: consumers only ever see
//! snapshots and control signals.

use std::fmt;
use std::path::PathBuf;

/// All broker errors
#[derive(Debug)]
pub enum BrokerError {
    // === Configuration ===
    /// Invalid config value
    ConfigValidation { field: &'static str, reason: String },
    /// Config file could not be parsed
    ConfigParse { path: PathBuf, reason: String },
    /// Invalid schema row (`row` is 1-based, `None` for the schema as a whole)
    Schema { row: Option<usize>, reason: String },

    // === PLC link ===
    /// Connection to the PLC could not be established
    Connect { address: String, reason: String },
    /// Reading the data block window failed
    Read {
        start: usize,
        length: usize,
        reason: String,
    },

    // === IO ===
    /// File system operation failed
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Runtime ===
    /// Tokio runtime creation failed
    Runtime { source: std::io::Error },
    /// Broker thread could not be spawned
    Thread { source: std::io::Error },
}

impl BrokerError {
    /// Whether this error is a configuration error (fatal before start)
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::ConfigValidation { .. } | Self::ConfigParse { .. } | Self::Schema { .. }
        )
    }

    pub(crate) fn schema(row: Option<usize>, reason: impl Into<String>) -> Self {
        Self::Schema {
            row,
            reason: reason.into(),
        }
    }
}

impl std::error::Error for BrokerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } | Self::Runtime { source } | Self::Thread { source } => {
                Some(source)
            }
            _ => None,
        }
    }
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigValidation { field, reason } => {
                write!(f, "Invalid {}: {}", field, reason)
            }
            Self::ConfigParse { path, reason } => {
                write!(f, "Cannot parse {}: {}", path.display(), reason)
            }
            Self::Schema {
                row: Some(row),
                reason,
            } => write!(f, "Invalid schema row {}: {}", row, reason),
            Self::Schema { row: None, reason } => write!(f, "Invalid schema: {}", reason),
            Self::Connect { address, reason } => {
                write!(f, "Cannot connect to PLC {}: {}", address, reason)
            }
            Self::Read {
                start,
                length,
                reason,
            } => write!(
                f,
                "Cannot read {} bytes at offset {}: {}",
                length, start, reason
            ),
            Self::Io { path, .. } => write!(f, "IO error: {}", path.display()),
            Self::Runtime { .. } => write!(f, "Failed to create runtime"),
            Self::Thread { .. } => write!(f, "Failed to spawn broker thread"),
        }
    }
}

/// Alias for Result with BrokerError
pub type Result<T> = std::result::Result<T, BrokerError>;
