//! Shared wire types for the devnode supervisor.
//!
//! This crate defines the messages exchanged between the node supervisor and its
//! remote consumer, the typed node configuration produced from a start request, and
//! the newline-delimited JSON codec both ends speak.

#![warn(missing_docs)]

pub mod codec;
pub mod config;
pub mod types;

pub use codec::{CodecError, decode_command, decode_event, encode_line};
pub use config::{AccountSource, ConfigValidationError, DEFAULT_PORT, MAX_TOTAL_ACCOUNTS, NodeConfig, NodeConfigBuilder, RawNodeConfig};
pub use types::*;
