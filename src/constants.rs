//! Application-wide constants
//!
//! Centralized defaults so the config layer, the broker and the CLI agree.

// =============================================================================
// PLC link
// =============================================================================

/// Default PLC address
pub const DEFAULT_PLC_ADDRESS: &str = "192.168.33.6";

/// Default ISO-on-TCP port of an S7 PLC
pub const DEFAULT_PLC_PORT: u16 = 102;

/// Highest byte address of an S7 data block
pub const MAX_DB_BYTE: usize = 65_535;

/// Default rack of the CPU
pub const DEFAULT_PLC_RACK: u16 = 0;

/// Default slot of the CPU
pub const DEFAULT_PLC_SLOT: u16 = 1;

/// Default data block number to poll
pub const DEFAULT_DB_NUMBER: u16 = 1;

// =============================================================================
// Timing - Polling
// =============================================================================

/// Delay between two successful reads (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Delay between two replayed frames (milliseconds)
pub const DEFAULT_REPLAY_INTERVAL_MS: u64 = 1000;

// =============================================================================
// Timing - Reconnection
// =============================================================================

/// Delay before each reconnection attempt (milliseconds)
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2000;

/// Reconnection attempts after a failed read before giving up
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 3;

// =============================================================================
// Hand-off
// =============================================================================

/// Capacity of a consumer queue (1 = latest value only)
pub const DEFAULT_QUEUE_CAPACITY: usize = 1;

/// Consumer pop timeout before it gives up (milliseconds)
pub const DEFAULT_CONSUMER_TIMEOUT_MS: u64 = 10_000;

// =============================================================================
// Status
// =============================================================================

/// Interval of the periodic status line (seconds)
pub const STATUS_INTERVAL_SECS: u64 = 10;

// =============================================================================
// Recording
// =============================================================================

/// Buffered writer capacity for the frame recorder
pub const RECORDER_BUFFER_SIZE: usize = 8 * 1024;
