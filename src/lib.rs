//! S7 data block broker
//!
//! Polls a window of a PLC data block, decodes it against a declarative
//! schema and hands the resulting snapshots to consumers through bounded,
//! drop-oldest queues.
//!
//! - [`schema`]: field list validation and frame window
//! - [`codec`]: frame decoding and frame logs
//! - [`link`] / [`source`]: where frames come from
//! - [`broker`]: poll/decode/publish loop with bounded reconnection
//! - [`consumer`]: the consumer loop and bundled sinks

pub mod broker;
pub mod codec;
pub mod config;
pub mod constants;
pub mod consumer;
pub mod error;
pub mod link;
pub mod logging;
pub mod schema;
pub mod source;

pub use broker::{
    Broker, BrokerHandle, BrokerMessage, BrokerOptions, BrokerState, TerminateReason,
};
pub use codec::{Value, ValueSnapshot};
pub use error::{BrokerError, Result};
pub use schema::{compute_window, FrameWindow, Schema, SchemaRow};
