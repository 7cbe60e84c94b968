use devnode_proto::{AccountOptions, Command, RawNodeConfig};
use tokio::sync::oneshot;

use super::SupervisorStatus;

/// Messages for the supervisor actor.
#[derive(Debug)]
pub(crate) enum SupervisorCmd {
	Start(RawNodeConfig),
	PushState,
	StartMining,
	StopMining,
	ForceMine,
	MakeSnapshot,
	RevertSnapshot,
	AddAccount(AccountOptions),
	Status { reply: oneshot::Sender<SupervisorStatus> },
	Shutdown { reply: oneshot::Sender<()> },
}

impl From<Command> for SupervisorCmd {
	fn from(command: Command) -> Self {
		match command {
			Command::StartRpc(raw) => Self::Start(raw),
			Command::GetBlockchainState => Self::PushState,
			Command::StartMining => Self::StartMining,
			Command::StopMining => Self::StopMining,
			Command::ForceMine => Self::ForceMine,
			Command::MakeSnapshot => Self::MakeSnapshot,
			Command::RevertSnapshot => Self::RevertSnapshot,
			Command::AddAccount(options) => Self::AddAccount(options),
		}
	}
}
