use devnode_proto::{Command, RawNodeConfig};
use tokio::sync::{mpsc, oneshot};

use super::SupervisorStatus;
use super::commands::SupervisorCmd;
use crate::error::{Result, SupervisorError};

/// Handle for communicating with the [`NodeSupervisor`](super::NodeSupervisor).
///
/// Commands are queued in send order. Sending returns once the command is queued,
/// not once it has been handled; outcomes are reported as events.
#[derive(Clone, Debug)]
pub struct SupervisorHandle {
	tx: mpsc::Sender<SupervisorCmd>,
}

impl SupervisorHandle {
	pub(crate) fn new(tx: mpsc::Sender<SupervisorCmd>) -> Self {
		Self { tx }
	}

	/// Queues a consumer command.
	///
	/// # Errors
	///
	/// Returns [`SupervisorError::Closed`] if the supervisor has stopped.
	pub async fn dispatch(&self, command: Command) -> Result<()> {
		self.send(command.into()).await
	}

	/// Queues a start request.
	///
	/// # Errors
	///
	/// Returns [`SupervisorError::Closed`] if the supervisor has stopped.
	pub async fn start(&self, config: RawNodeConfig) -> Result<()> {
		self.dispatch(Command::StartRpc(config)).await
	}

	/// Reads the lifecycle state once every earlier command has been handled.
	///
	/// # Errors
	///
	/// Returns [`SupervisorError::Closed`] if the supervisor has stopped.
	pub async fn status(&self) -> Result<SupervisorStatus> {
		let (reply, rx) = oneshot::channel();
		self.send(SupervisorCmd::Status { reply }).await?;
		rx.await.map_err(|_| SupervisorError::Closed)
	}

	/// Stops polling, shuts the engine down and ends the actor.
	///
	/// # Errors
	///
	/// Returns [`SupervisorError::Closed`] if the supervisor had already stopped.
	pub async fn shutdown(&self) -> Result<()> {
		let (reply, rx) = oneshot::channel();
		self.send(SupervisorCmd::Shutdown { reply }).await?;
		rx.await.map_err(|_| SupervisorError::Closed)
	}

	async fn send(&self, cmd: SupervisorCmd) -> Result<()> {
		self.tx.send(cmd).await.map_err(|_| SupervisorError::Closed)
	}
}
