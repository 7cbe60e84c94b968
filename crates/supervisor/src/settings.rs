//! Supervisor tuning, loadable from TOML.
//!
//! ```toml
//! poll_interval_ms = 1000
//! engine_timeout_ms = 10000
//! mailbox_capacity = 256
//! event_buffer = 256
//! recent_blocks = 5
//! recent_transactions = 5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
	/// Error reading the settings file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// Error parsing TOML syntax or an unknown key.
	#[error("settings parse error: {0}")]
	Parse(#[from] toml::de::Error),

	/// A value is out of range.
	#[error("invalid setting {key}: {reason}")]
	Invalid {
		/// Offending key.
		key: &'static str,
		/// Why it was rejected.
		reason: &'static str,
	},
}

/// Runtime settings for [`NodeSupervisor`](crate::NodeSupervisor).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorSettings {
	/// Period of the state poll while running.
	pub poll_interval_ms: u64,
	/// Upper bound for any single engine call.
	pub engine_timeout_ms: u64,
	/// Command mailbox capacity.
	pub mailbox_capacity: usize,
	/// Outbound event buffer per subscriber.
	pub event_buffer: usize,
	/// Size of the recent-blocks window.
	pub recent_blocks: usize,
	/// Transaction count at which the recent-transactions walk stops.
	pub recent_transactions: usize,
}

impl Default for SupervisorSettings {
	fn default() -> Self {
		Self {
			poll_interval_ms: 1_000,
			engine_timeout_ms: 10_000,
			mailbox_capacity: 256,
			event_buffer: 256,
			recent_blocks: 5,
			recent_transactions: 5,
		}
	}
}

impl SupervisorSettings {
	/// Poll period.
	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	/// Engine call bound.
	pub fn engine_timeout(&self) -> Duration {
		Duration::from_millis(self.engine_timeout_ms)
	}

	/// Parses and validates settings from TOML text.
	///
	/// # Errors
	///
	/// Returns [`SettingsError`] on syntax errors, unknown keys, or zero-sized
	/// intervals and buffers.
	pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
		let settings: Self = toml::from_str(text)?;
		settings.validate()?;
		Ok(settings)
	}

	/// Reads settings from a TOML file.
	///
	/// # Errors
	///
	/// Returns [`SettingsError::Io`] if the file cannot be read, otherwise as
	/// [`Self::from_toml_str`].
	pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|error| SettingsError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&text)
	}

	fn validate(&self) -> Result<(), SettingsError> {
		let checks = [
			("poll_interval_ms", self.poll_interval_ms == 0),
			("engine_timeout_ms", self.engine_timeout_ms == 0),
			("mailbox_capacity", self.mailbox_capacity == 0),
			("event_buffer", self.event_buffer == 0),
		];
		for (key, is_zero) in checks {
			if is_zero {
				return Err(SettingsError::Invalid { key, reason: "must be > 0" });
			}
		}
		Ok(())
	}
}
