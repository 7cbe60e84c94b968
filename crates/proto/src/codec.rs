//! Newline-delimited JSON framing.
//!
//! One message per line. Encoded lines always end in `\n`; decoders accept a line
//! with or without its terminator.

use serde::Serialize;
use thiserror::Error;

use crate::types::{Command, Event};

/// Errors produced by the line codec.
#[derive(Debug, Error)]
pub enum CodecError {
	/// The line held no message.
	#[error("empty line")]
	Empty,
	/// The line was not a valid message.
	#[error("malformed message: {0}")]
	Json(#[from] serde_json::Error),
}

/// Encodes one message as a single terminated line.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the message cannot be serialized.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<String, CodecError> {
	let mut line = serde_json::to_string(msg)?;
	line.push('\n');
	Ok(line)
}

/// Decodes one inbound command line.
///
/// # Errors
///
/// Returns [`CodecError::Empty`] for blank lines and [`CodecError::Json`] for
/// anything that is not a known command.
pub fn decode_command(line: &str) -> Result<Command, CodecError> {
	let line = line.trim();
	if line.is_empty() {
		return Err(CodecError::Empty);
	}
	Ok(serde_json::from_str(line)?)
}

/// Decodes one outbound event line.
///
/// # Errors
///
/// Returns [`CodecError::Empty`] for blank lines and [`CodecError::Json`] for
/// anything that is not a known event.
pub fn decode_event(line: &str) -> Result<Event, CodecError> {
	let line = line.trim();
	if line.is_empty() {
		return Err(CodecError::Empty);
	}
	Ok(serde_json::from_str(line)?)
}
