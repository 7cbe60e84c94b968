//! Leveled log records, mirrored to the consumer.

use devnode_engine::EngineLog;
use devnode_proto::{Event, LogLevel};

use crate::transport::EventBus;

/// Writes each record to `tracing` and publishes it as an [`Event::Log`].
#[derive(Debug, Clone)]
pub struct LogSink {
	events: EventBus,
}

impl LogSink {
	/// Creates a sink publishing on `events`.
	pub fn new(events: EventBus) -> Self {
		Self { events }
	}

	/// Plain progress output.
	pub fn log(&self, message: impl Into<String>) {
		self.emit(LogLevel::Log, message.into());
	}

	/// Informational record.
	pub fn info(&self, message: impl Into<String>) {
		self.emit(LogLevel::Info, message.into());
	}

	/// Warning record.
	pub fn warning(&self, message: impl Into<String>) {
		self.emit(LogLevel::Warning, message.into());
	}

	/// Error record.
	pub fn error(&self, message: impl Into<String>) {
		self.emit(LogLevel::Error, message.into());
	}

	/// Writes one record at `level`.
	pub fn emit(&self, level: LogLevel, message: String) {
		let severity = level.as_str();
		match level {
			LogLevel::Log => tracing::debug!(target: "devnode::node", severity, "{message}"),
			LogLevel::Info => tracing::info!(target: "devnode::node", severity, "{message}"),
			LogLevel::Warning => tracing::warn!(target: "devnode::node", severity, "{message}"),
			LogLevel::Error => tracing::error!(target: "devnode::node", severity, "{message}"),
		}
		self.events.send(Event::Log { message, level });
	}
}

impl EngineLog for LogSink {
	fn write(&self, level: LogLevel, message: &str) {
		self.emit(level, message.to_string());
	}
}
