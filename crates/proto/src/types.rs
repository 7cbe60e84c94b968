//! Wire types for the supervisor command/event channel.
//!
//! Every message is adjacently tagged: `{"type": "<Variant>", "payload": {...}}`.
//! Commands without arguments may omit the payload or send `null`.
//! Field names of [`ChainStateSnapshot`] and its children are a fixed external
//! contract and are serialized in camelCase.

use serde::{Deserialize, Serialize};

use crate::config::RawNodeConfig;

/// A command sent by the remote consumer to the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
	/// Start the embedded node with the given raw configuration.
	StartRpc(RawNodeConfig),
	/// Push the current chain state immediately.
	GetBlockchainState,
	/// Switch the engine into mining mode.
	StartMining,
	/// Switch the engine out of mining mode.
	StopMining,
	/// Mine exactly one block regardless of the mining mode.
	ForceMine,
	/// Ask the engine for a new restore point.
	MakeSnapshot,
	/// Roll back to the engine's most recent restore point.
	RevertSnapshot,
	/// Create and register a new account.
	AddAccount(AccountOptions),
}

impl Command {
	/// Stable name of the command, used in log records.
	pub const fn name(&self) -> &'static str {
		match self {
			Self::StartRpc(_) => "StartRpc",
			Self::GetBlockchainState => "GetBlockchainState",
			Self::StartMining => "StartMining",
			Self::StopMining => "StopMining",
			Self::ForceMine => "ForceMine",
			Self::MakeSnapshot => "MakeSnapshot",
			Self::RevertSnapshot => "RevertSnapshot",
			Self::AddAccount(_) => "AddAccount",
		}
	}
}

/// Options forwarded to the engine when creating an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountOptions {
	/// Initial balance in wei, as a decimal string.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub balance: Option<String>,
	/// Hex-encoded private key to import instead of deriving one.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub secret_key: Option<String>,
}

/// An event pushed by the supervisor to the remote consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
	/// The node started; carries the first state snapshot.
	Started {
		/// Chain state right after start.
		snapshot: Box<ChainStateSnapshot>,
	},
	/// The node failed to start.
	FailedToStart {
		/// Human-readable failure reason.
		reason: String,
	},
	/// Periodic or on-demand state push.
	BlockchainState {
		/// Current chain state.
		snapshot: Box<ChainStateSnapshot>,
	},
	/// A mirrored log record.
	Log {
		/// Log message.
		message: String,
		/// Log severity.
		level: LogLevel,
	},
}

/// Severity of a mirrored log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	/// Plain progress output.
	Log,
	/// Informational message.
	Info,
	/// Something unexpected that did not fail an operation.
	Warning,
	/// A failed operation.
	Error,
}

impl LogLevel {
	/// Wire name of the level.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Log => "log",
			Self::Info => "info",
			Self::Warning => "warning",
			Self::Error => "error",
		}
	}
}

/// Consumer-facing view of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
	/// Creation order of the account.
	pub index: usize,
	/// `0x`-prefixed hex address.
	pub address: String,
	/// Balance in wei, decimal.
	pub balance: String,
	/// Account nonce, decimal.
	pub nonce: String,
	/// Hex-encoded private key.
	pub private_key: String,
	/// Whether the engine lets this account sign without a password.
	pub is_unlocked: bool,
}

/// Consumer-facing view of one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxView {
	/// Computed transaction hash.
	pub hash: String,
	/// Sender address.
	pub from: String,
	/// Recipient address; absent for contract creation.
	pub to: Option<String>,
	/// Sender nonce, decimal.
	pub nonce: String,
	/// Transferred value in wei, decimal.
	pub value: String,
	/// Gas price in wei, decimal.
	pub gas_price: String,
	/// Gas limit.
	pub gas_limit: u64,
	/// `0x`-prefixed hex call data.
	pub data: String,
}

/// Consumer-facing view of one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockView {
	/// Block number.
	pub number: u64,
	/// Computed block hash.
	pub hash: String,
	/// Hash of the parent block.
	pub parent_hash: String,
	/// Block timestamp, seconds since the Unix epoch.
	pub timestamp: u64,
	/// Block gas limit.
	pub gas_limit: u64,
	/// Gas consumed by the block's transactions.
	pub gas_used: u64,
	/// Miner address.
	pub coinbase: String,
	/// Transactions in original block order.
	pub transactions: Vec<TxView>,
}

/// Serialized, consumer-facing view of the node's current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStateSnapshot {
	/// All accounts in creation order.
	pub accounts: Vec<AccountView>,
	/// HD wallet mnemonic, when the engine has one.
	pub mnemonic: Option<String>,
	/// HD derivation path prefix.
	pub hd_path: String,
	/// Default gas price in wei.
	pub gas_price: u64,
	/// Block gas limit.
	pub gas_limit: u64,
	/// Number of accounts generated at start.
	pub total_accounts: u64,
	/// Miner address.
	pub coinbase: String,
	/// Whether blocks are mined on a fixed interval.
	pub is_mining_on_interval: bool,
	/// Whether mining is currently enabled.
	pub is_mining: bool,
	/// Block interval in seconds; absent when mining on every transaction.
	pub blocktime: Option<u64>,
	/// Number of the latest block.
	pub block_number: u64,
	/// Network id reported by `net_version`.
	pub network_id: u64,
	/// Outstanding engine restore points, oldest first.
	pub snapshots: Vec<u64>,
	/// Most recent blocks, newest first.
	pub blocks: Vec<BlockView>,
	/// Most recent transactions, newest block first.
	pub transactions: Vec<TxView>,
}
