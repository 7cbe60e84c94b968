//! Node lifecycle actor.
//!
//! [`NodeSupervisor`] owns the engine exclusively. Consumer commands, launch
//! results and poll ticks all arrive in one task and are handled one at a time, so
//! no two engine calls ever overlap.
//!
//! Lifecycle: `Uninitialized -> Starting -> Running`. A failed start returns to
//! `Uninitialized` and records the reason, so the consumer may retry.

mod commands;
mod handle;
mod service;

use std::fmt;

pub use handle::SupervisorHandle;
pub use service::NodeSupervisor;

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
	/// No engine exists.
	Uninitialized,
	/// An engine is being launched.
	Starting,
	/// The engine is serving.
	Running,
}

impl fmt::Display for LifecycleState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Uninitialized => "uninitialized",
			Self::Starting => "starting",
			Self::Running => "running",
		})
	}
}

/// Point-in-time supervisor status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorStatus {
	/// Current lifecycle state.
	pub state: LifecycleState,
	/// Port the running engine listens on.
	pub port: Option<u16>,
	/// Reason of the most recent failed start, cleared by a successful one.
	pub last_failure: Option<String>,
}

#[cfg(test)]
mod tests;
