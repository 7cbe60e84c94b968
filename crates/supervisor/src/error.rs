//! Supervisor error types.

use thiserror::Error;

use crate::supervisor::LifecycleState;

/// Errors surfaced by the supervisor and its handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
	/// A start request arrived while the node was starting or running.
	#[error("node is already {0}")]
	DuplicateStart(LifecycleState),
	/// The command needs a running node.
	#[error("{0} ignored: node is not running")]
	NotRunning(&'static str),
	/// The supervisor actor has stopped.
	#[error("supervisor has stopped")]
	Closed,
}

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;
