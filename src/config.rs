//! Configuration management
//!
//! Config file is looked up as `config.toml` next to the executable, falling
//! back to `config/default.toml`. Every section is optional; missing keys use
//! the defaults from `constants`. Relative paths set in a config file are
//! taken relative to that file's directory.

use crate::constants::{
    DEFAULT_CONSUMER_TIMEOUT_MS, DEFAULT_DB_NUMBER, DEFAULT_PLC_ADDRESS, DEFAULT_PLC_PORT,
    DEFAULT_PLC_RACK, DEFAULT_PLC_SLOT, DEFAULT_POLL_INTERVAL_MS, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY_MS, DEFAULT_REPLAY_INTERVAL_MS,
};
use crate::error::{BrokerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Application Configuration
// =============================================================================

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub link: LinkConfig,
    pub broker: BrokerConfig,
    pub replay: ReplayConfig,
    pub consumer: ConsumerConfig,
    pub schema: SchemaConfig,
}

// =============================================================================
// PLC Link Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// PLC host name or IP address
    pub address: String,
    /// CPU rack
    pub rack: u16,
    /// CPU slot
    pub slot: u16,
    /// ISO-on-TCP port
    pub port: u16,
    /// Data block to poll
    pub db_number: u16,
}

impl LinkConfig {
    /// Address in `host:port` form, as handed to the link
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_PLC_ADDRESS.to_string(),
            rack: DEFAULT_PLC_RACK,
            slot: DEFAULT_PLC_SLOT,
            port: DEFAULT_PLC_PORT,
            db_number: DEFAULT_DB_NUMBER,
        }
    }
}

// =============================================================================
// Broker Configuration
// =============================================================================

/// Construction value of a broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Delay after each successful read
    pub poll_interval_ms: u64,
    /// Reconnection attempts after a failed read
    pub reconnect_attempts: u32,
    /// Delay before each reconnection attempt
    pub reconnect_delay_ms: u64,
    /// Capacity of each consumer queue (1 = latest value only)
    pub queue_capacity: usize,
    /// Append every read frame to this file (optional)
    pub record_path: Option<PathBuf>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            record_path: None,
        }
    }
}

// =============================================================================
// Replay Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Frame log to replay
    pub log_path: Option<PathBuf>,
    /// Delay between two replayed frames
    pub interval_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            interval_ms: DEFAULT_REPLAY_INTERVAL_MS,
        }
    }
}

// =============================================================================
// Consumer Configuration
// =============================================================================

/// Output format of the bundled consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerFormat {
    /// Human-readable name/value table
    #[default]
    Table,
    /// One JSON object per snapshot
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Pop timeout; the consumer ends when nothing arrives for this long
    pub timeout_ms: u64,
    pub format: ConsumerFormat,
}

impl ConsumerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_CONSUMER_TIMEOUT_MS,
            format: ConsumerFormat::Table,
        }
    }
}

// =============================================================================
// Schema Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Schema file (`[[field]]` tables)
    pub path: PathBuf,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("config/exchange_data.toml"),
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

impl Config {
    /// Load config from `path`; a missing file yields the defaults
    ///
    /// # Errors
    ///
    /// `BrokerError::Io` when the file exists but cannot be read,
    /// `BrokerError::ConfigParse` when it is not valid TOML for this layout.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| BrokerError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config = Self::parse(&content).map_err(|reason| BrokerError::ConfigParse {
            path: path.to_path_buf(),
            reason,
        })?;

        if let Some(base) = path.parent() {
            let explicit: toml::Table = toml::from_str(&content).unwrap_or_default();
            config.resolve_paths(&explicit, base);
        }
        Ok(config)
    }

    /// Anchor the file paths the config file sets at `base`
    ///
    /// Defaults stay relative to the working directory.
    fn resolve_paths(&mut self, explicit: &toml::Table, base: &Path) {
        let is_set = |section: &str, key: &str| {
            explicit
                .get(section)
                .and_then(|table| table.get(key))
                .is_some()
        };

        if is_set("schema", "path") {
            anchor(&mut self.schema.path, base);
        }
        if let Some(path) = self.broker.record_path.as_mut() {
            anchor(path, base);
        }
        if let Some(path) = self.replay.log_path.as_mut() {
            anchor(path, base);
        }
    }

    /// Parse config from TOML text
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Check values the broker cannot work with
    pub fn validate(&self) -> Result<()> {
        let broker = &self.broker;
        if broker.poll_interval_ms == 0 {
            return Err(invalid("broker.poll_interval_ms", "must be greater than zero"));
        }
        if broker.reconnect_attempts == 0 {
            return Err(invalid("broker.reconnect_attempts", "must be at least 1"));
        }
        if broker.queue_capacity == 0 {
            return Err(invalid("broker.queue_capacity", "must be at least 1"));
        }
        if self.replay.interval_ms == 0 {
            return Err(invalid("replay.interval_ms", "must be greater than zero"));
        }
        if self.consumer.timeout_ms == 0 {
            return Err(invalid("consumer.timeout_ms", "must be greater than zero"));
        }
        Ok(())
    }

    /// Additional checks for runs that talk to a PLC link
    pub fn validate_link(&self) -> Result<()> {
        if self.link.address.trim().is_empty() {
            return Err(invalid("link.address", "must not be empty"));
        }
        if self.link.port == 0 {
            return Err(invalid("link.port", "must not be 0"));
        }
        Ok(())
    }
}

fn anchor(path: &mut PathBuf, base: &Path) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

fn invalid(field: &'static str, reason: &str) -> BrokerError {
    BrokerError::ConfigValidation {
        field,
        reason: reason.to_string(),
    }
}

/// Get the project root directory
///
/// Searches in order:
/// 1. Next to executable (production deployment)
/// 2. Up from target/release or target/debug (dev builds)
/// 3. The current directory
fn find_project_root() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    if let Some(exe_dir) = exe_dir {
        if exe_dir.join("config.toml").exists() || exe_dir.join("config").exists() {
            return exe_dir;
        }

        // exe_dir = .../target/release, we want ...
        if let Some(target_dir) = exe_dir.parent() {
            if target_dir.file_name().is_some_and(|n| n == "target") {
                if let Some(project_root) = target_dir.parent() {
                    if project_root.join("config").exists() {
                        return project_root.to_path_buf();
                    }
                }
            }
        }
    }

    PathBuf::from(".")
}

/// Get the config file path
///
/// Looks for config.toml, falls back to config/default.toml
pub fn config_path() -> PathBuf {
    let root = find_project_root();

    let user_config = root.join("config.toml");
    if user_config.exists() {
        return user_config;
    }

    let default_config = root.join("config").join("default.toml");
    if default_config.exists() {
        return default_config;
    }

    user_config
}

// ============================================================================
// Tests
// ============================================================================
