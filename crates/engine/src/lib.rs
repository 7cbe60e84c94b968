//! Engine collaborator surface for the devnode supervisor.
//!
//! The supervisor never reaches into an engine's internals. It launches one through
//! an [`EngineLauncher`], drives it through [`Engine`], and reads chain state through
//! [`ChainReader`]. Numeric chain data stays in the engine's native big-endian byte
//! form here; projecting it for consumers is the supervisor's job.
//!
//! [`DevChain`] is the in-process reference engine. It keeps accounts, blocks and
//! restore points in memory and derives keys with Keccak-256 rather than real wallet
//! cryptography.

#![warn(missing_docs)]

pub mod dev;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use devnode_proto::{AccountOptions, LogLevel, NodeConfig};
use thiserror::Error;

pub use dev::{DevChain, DevChainLauncher};
pub use types::{AccountEntry, Address, Block, BlockHeader, ChainParams, H256, Transaction, decode_uint, encode_uint};

/// Errors reported by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
	/// The engine could not be initialized.
	#[error("engine failed to start: {0}")]
	Start(String),
	/// The engine could not bind its listening port.
	#[error("failed to listen on port {port}: {reason}")]
	Listen {
		/// Requested port.
		port: u16,
		/// Bind error message.
		reason: String,
	},
	/// The requested feature is not available in this engine.
	#[error("unsupported: {0}")]
	Unsupported(String),
	/// Account creation options were malformed.
	#[error("invalid account options: {0}")]
	InvalidAccount(String),
	/// An account with this address already exists.
	#[error("account {0} already exists")]
	DuplicateAccount(String),
	/// A transaction was rejected.
	#[error("transaction rejected: {0}")]
	Rejected(String),
	/// The call did not complete in time.
	#[error("{operation} timed out after {after:?}")]
	Timeout {
		/// Engine operation name.
		operation: &'static str,
		/// Elapsed bound.
		after: Duration,
	},
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Log output handed to an engine at launch.
pub trait EngineLog: Send + Sync + 'static {
	/// Writes one record.
	fn write(&self, level: LogLevel, message: &str);
}

/// A consistent, point-in-time read of an engine's chain and account state.
///
/// Every call on one view observes the same chain. Engines keep writers, their own
/// background miners included, out until the view is dropped, so views must stay
/// short-lived and never be held across an `.await`.
pub trait ChainView {
	/// All accounts in creation order.
	fn accounts(&self) -> Vec<AccountEntry>;

	/// Whether the engine lets `address` sign without authorization.
	fn is_unlocked(&self, address: &Address) -> bool;

	/// Gas parameters, mining flags and other node-wide values.
	fn params(&self) -> ChainParams;

	/// Number of blocks in storage, genesis included.
	fn block_count(&self) -> usize;

	/// Copy of the block at storage position `index`.
	fn block(&self, index: usize) -> Option<Block>;
}

/// Read access to an engine's chain and account state.
pub trait ChainReader {
	/// Opens a consistent view of the chain.
	fn view(&self) -> Box<dyn ChainView + '_>;
}

/// A running engine instance.
#[async_trait]
pub trait Engine: ChainReader + Send + 'static {
	/// Opens the engine's client-facing port.
	async fn listen(&mut self, port: u16) -> Result<()>;

	/// Enables mining.
	async fn start_mining(&mut self) -> Result<()>;

	/// Disables mining.
	async fn stop_mining(&mut self) -> Result<()>;

	/// Mines `count` blocks immediately, whatever the mining mode.
	async fn process_blocks(&mut self, count: u64) -> Result<()>;

	/// Records a restore point and returns its id.
	async fn snapshot(&mut self) -> Result<u64>;

	/// Rolls back to the most recent restore point.
	///
	/// Returns `false` when there was nothing to revert.
	async fn revert(&mut self) -> Result<bool>;

	/// Creates a new account without registering it.
	async fn create_account(&mut self, options: &AccountOptions) -> Result<AccountEntry>;

	/// Adds an account to the full account set, and to the unlocked set if `unlocked`.
	async fn register_account(&mut self, account: AccountEntry, unlocked: bool) -> Result<()>;

	/// Stops background work before the engine is dropped.
	async fn shutdown(&mut self) {}
}

/// Creates engine instances.
#[async_trait]
pub trait EngineLauncher: Send + Sync + 'static {
	/// Builds and initializes an engine from `config`.
	async fn launch(&self, config: &NodeConfig, log: Arc<dyn EngineLog>) -> Result<Box<dyn Engine>>;
}
