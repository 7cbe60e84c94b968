//! In-process reference engine.
//!
//! `DevChain` keeps the whole chain in memory behind one lock. Mining is either
//! instant (pending transactions are sealed as soon as they arrive) or driven by an
//! interval miner task when a block time is configured. The client port is bound for
//! real so port conflicts surface at start, but the engine does not speak JSON-RPC;
//! accepted connections are closed immediately.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use devnode_proto::{AccountOptions, AccountSource, LogLevel, NodeConfig};
use parking_lot::{Mutex, MutexGuard};
use tokio::net::TcpListener;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::types::{AccountEntry, Address, Block, BlockHeader, ChainParams, Transaction, address_of, derive_secret, encode_uint};
use crate::{ChainReader, ChainView, Engine, EngineError, EngineLauncher, EngineLog, Result};

const DEFAULT_TOTAL_ACCOUNTS: u64 = 10;
const DEFAULT_GAS_PRICE: u64 = 20_000_000_000;
const DEFAULT_GAS_LIMIT: u64 = 4_712_388;
const DEFAULT_BALANCE_WEI: u128 = 100_000_000_000_000_000_000;
const TRANSFER_GAS: u64 = 21_000;
const HD_PATH: &str = "m/44'/60'/0'/0/";

/// Launcher for [`DevChain`] engines.
#[derive(Debug, Clone, Default)]
pub struct DevChainLauncher;

impl DevChainLauncher {
	/// Creates a launcher.
	#[must_use]
	pub fn new() -> Self {
		Self
	}
}

#[async_trait]
impl EngineLauncher for DevChainLauncher {
	async fn launch(&self, config: &NodeConfig, log: Arc<dyn EngineLog>) -> Result<Box<dyn Engine>> {
		// Account generation is CPU-bound; keep it off the runtime so callers can time out.
		let config = config.clone();
		let chain = tokio::task::spawn_blocking(move || DevChain::new(&config, log))
			.await
			.map_err(|e| EngineError::Start(format!("chain construction aborted: {e}")))??;
		Ok(Box::new(chain))
	}
}

struct RestorePoint {
	id: u64,
	accounts: Vec<AccountEntry>,
	unlocked: HashSet<Address>,
	block_count: usize,
	pending: Vec<Transaction>,
}

struct ChainState {
	accounts: Vec<AccountEntry>,
	unlocked: HashSet<Address>,
	blocks: Vec<Block>,
	pending: Vec<Transaction>,
	restore_points: Vec<RestorePoint>,
	next_restore_id: u64,
	is_mining: bool,
	blocktime: Option<u64>,
	gas_price: u64,
	gas_limit: u64,
	coinbase: Address,
	clock_offset_secs: i64,
	verbose: bool,
}

impl ChainState {
	fn now(&self) -> u64 {
		u64::try_from(chrono::Utc::now().timestamp() + self.clock_offset_secs).unwrap_or_default()
	}

	fn seal_block(&mut self) -> &Block {
		let number = self.blocks.len() as u128;
		let parent_hash = self.blocks.last().map(Block::hash).unwrap_or_default();
		let transactions = std::mem::take(&mut self.pending);
		let gas_used = TRANSFER_GAS.saturating_mul(transactions.len() as u64);
		let block = Block {
			header: BlockHeader {
				parent_hash,
				coinbase: self.coinbase,
				number: encode_uint(number),
				timestamp: encode_uint(u128::from(self.now())),
				gas_limit: encode_uint(u128::from(self.gas_limit)),
				gas_used: encode_uint(u128::from(gas_used)),
			},
			transactions,
		};
		self.blocks.push(block);
		&self.blocks[self.blocks.len() - 1]
	}

	fn account_mut(&mut self, address: &Address) -> Option<&mut AccountEntry> {
		self.accounts.iter_mut().find(|a| &a.address == address)
	}
}

/// In-memory engine with hash-derived accounts and optional interval mining.
pub struct DevChain {
	state: Arc<Mutex<ChainState>>,
	log: Arc<dyn EngineLog>,
	seed: String,
	mnemonic: Option<String>,
	total_accounts: u64,
	network_id: u64,
	shutdown: CancellationToken,
	miner: Option<CancellationToken>,
}

impl DevChain {
	/// Builds a chain with its generated accounts and genesis block.
	///
	/// Interval mining starts on [`Engine::listen`], so this does not need a runtime.
	///
	/// # Errors
	///
	/// Returns [`EngineError::Unsupported`] when asked to fork a remote chain.
	pub fn new(config: &NodeConfig, log: Arc<dyn EngineLog>) -> Result<Self> {
		if let Some(url) = config.fork_url() {
			return Err(EngineError::Unsupported(format!("forking {url} requires a networked engine")));
		}
		if config.debug() {
			log.write(LogLevel::Warning, "opcode debugging is not available in the in-process engine");
		}

		let (seed, mnemonic) = match config.account_source() {
			Some(AccountSource::Mnemonic(m)) => (m.clone(), Some(m.clone())),
			Some(AccountSource::Seed(s)) => (s.clone(), None),
			None => (uuid::Uuid::new_v4().to_string(), None),
		};
		let total_accounts = config.total_accounts().unwrap_or(DEFAULT_TOTAL_ACCOUNTS);
		let locked = config.accounts_locked();

		let accounts: Vec<AccountEntry> = (0..total_accounts as usize)
			.map(|index| {
				let secret_key = derive_secret(&seed, index);
				AccountEntry {
					address: address_of(&secret_key),
					balance: encode_uint(DEFAULT_BALANCE_WEI),
					nonce: Vec::new(),
					secret_key,
				}
			})
			.collect();
		let unlocked = if locked {
			HashSet::new()
		} else {
			accounts.iter().map(|a| a.address).collect()
		};

		let now = chrono::Utc::now();
		let clock_offset_secs = config.time().map(|t| t.timestamp() - now.timestamp()).unwrap_or_default();
		let network_id = u64::try_from(now.timestamp_millis()).unwrap_or_default();

		let mut state = ChainState {
			accounts,
			unlocked,
			blocks: Vec::new(),
			pending: Vec::new(),
			restore_points: Vec::new(),
			next_restore_id: 1,
			is_mining: true,
			blocktime: config.block_time_seconds(),
			gas_price: config.gas_price().unwrap_or(DEFAULT_GAS_PRICE),
			gas_limit: config.gas_limit().unwrap_or(DEFAULT_GAS_LIMIT),
			coinbase: [0; 20],
			clock_offset_secs,
			verbose: config.verbose(),
		};
		state.seal_block();

		log.write(LogLevel::Info, &format!("DevChain initialized with {total_accounts} accounts"));
		tracing::debug!(total_accounts, locked, network_id, "devchain.init");

		Ok(Self {
			state: Arc::new(Mutex::new(state)),
			log,
			seed,
			mnemonic,
			total_accounts,
			network_id,
			shutdown: CancellationToken::new(),
			miner: None,
		})
	}

	/// Queues a value transfer from an unlocked account.
	///
	/// This is the entry point for tests and embedding hosts; the daemon exposes no
	/// transaction path, since the engine does not serve JSON-RPC.
	///
	/// With instant mining enabled the transfer is sealed into a block right away.
	///
	/// # Errors
	///
	/// Returns [`EngineError::Rejected`] for unknown or locked senders and for
	/// insufficient balance.
	pub fn submit_transfer(&self, from: Address, to: Address, value: u128) -> Result<crate::H256> {
		let mut state = self.state.lock();
		if !state.unlocked.contains(&from) {
			return Err(EngineError::Rejected(format!("sender 0x{} is locked or unknown", hex::encode(from))));
		}
		let gas_price = state.gas_price;
		let sender = state
			.account_mut(&from)
			.ok_or_else(|| EngineError::Rejected(format!("unknown sender 0x{}", hex::encode(from))))?;
		let balance = bytes_to_u128(&sender.balance);
		if balance < value {
			return Err(EngineError::Rejected("insufficient balance".into()));
		}
		let nonce = bytes_to_u128(&sender.nonce);
		sender.balance = encode_uint(balance - value);
		sender.nonce = encode_uint(nonce + 1);
		if let Some(recipient) = state.account_mut(&to) {
			recipient.balance = encode_uint(bytes_to_u128(&recipient.balance).saturating_add(value));
		}

		let tx = Transaction {
			from,
			to: Some(to),
			nonce: encode_uint(nonce),
			value: encode_uint(value),
			gas_price: encode_uint(u128::from(gas_price)),
			gas_limit: encode_uint(u128::from(TRANSFER_GAS)),
			data: Vec::new(),
		};
		let hash = tx.hash();
		state.pending.push(tx);
		if state.is_mining && state.blocktime.is_none() {
			state.seal_block();
		}
		Ok(hash)
	}

	fn spawn_miner(&mut self, seconds: u64) {
		if self.miner.is_some() {
			return;
		}
		let cancel = self.shutdown.child_token();
		let task_cancel = cancel.clone();
		let state = Arc::clone(&self.state);
		let log = Arc::clone(&self.log);
		tokio::spawn(async move {
			let mut tick = interval(Duration::from_secs(seconds.max(1)));
			tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
			tick.tick().await;
			loop {
				tokio::select! {
					biased;
					_ = task_cancel.cancelled() => break,
					_ = tick.tick() => {
						let mut state = state.lock();
						if !state.is_mining {
							continue;
						}
						let verbose = state.verbose;
						let number = state.seal_block().number();
						drop(state);
						if verbose {
							log.write(LogLevel::Log, &format!("mined block {number}"));
						}
					}
				}
			}
			tracing::debug!("devchain.miner.stopped");
		});
		self.miner = Some(cancel);
	}
}

impl Drop for DevChain {
	fn drop(&mut self) {
		self.shutdown.cancel();
	}
}

fn bytes_to_u128(bytes: &[u8]) -> u128 {
	bytes.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b))
}

fn parse_balance(raw: &str) -> Result<u128> {
	raw.trim()
		.parse()
		.map_err(|_| EngineError::InvalidAccount(format!("balance {raw:?} is not a decimal wei amount")))
}

fn parse_secret(raw: &str) -> Result<crate::H256> {
	let digits = raw.trim().trim_start_matches("0x");
	let bytes = hex::decode(digits).map_err(|e| EngineError::InvalidAccount(format!("secret key: {e}")))?;
	bytes
		.try_into()
		.map_err(|_| EngineError::InvalidAccount("secret key must be 32 bytes".into()))
}

/// A [`DevChain`] read under its state lock.
struct LockedChain<'a> {
	chain: &'a DevChain,
	state: MutexGuard<'a, ChainState>,
}

impl ChainReader for DevChain {
	fn view(&self) -> Box<dyn ChainView + '_> {
		Box::new(LockedChain {
			chain: self,
			state: self.state.lock(),
		})
	}
}

impl ChainView for LockedChain<'_> {
	fn accounts(&self) -> Vec<AccountEntry> {
		self.state.accounts.clone()
	}

	fn is_unlocked(&self, address: &Address) -> bool {
		self.state.unlocked.contains(address)
	}

	fn params(&self) -> ChainParams {
		let state = &self.state;
		ChainParams {
			mnemonic: self.chain.mnemonic.clone(),
			hd_path: HD_PATH.to_string(),
			gas_price: state.gas_price,
			gas_limit: state.gas_limit,
			total_accounts: self.chain.total_accounts,
			coinbase: state.coinbase,
			is_mining_on_interval: state.blocktime.is_some(),
			is_mining: state.is_mining,
			blocktime: state.blocktime,
			block_number: state.blocks.len().saturating_sub(1) as u64,
			network_id: self.chain.network_id,
			snapshots: state.restore_points.iter().map(|p| p.id).collect(),
		}
	}

	fn block_count(&self) -> usize {
		self.state.blocks.len()
	}

	fn block(&self, index: usize) -> Option<Block> {
		self.state.blocks.get(index).cloned()
	}
}

#[async_trait]
impl Engine for DevChain {
	async fn listen(&mut self, port: u16) -> Result<()> {
		let listener = TcpListener::bind(("127.0.0.1", port)).await.map_err(|e| EngineError::Listen {
			port,
			reason: e.to_string(),
		})?;
		let bound = listener.local_addr().map(|a| a.port()).unwrap_or(port);
		let cancel = self.shutdown.child_token();
		tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = cancel.cancelled() => break,
					accepted = listener.accept() => {
						if let Ok((_stream, peer)) = accepted {
							tracing::debug!(%peer, "devchain.listener.reject");
						}
					}
				}
			}
		});
		self.log.write(LogLevel::Info, &format!("DevChain bound 127.0.0.1:{bound}"));

		let blocktime = self.state.lock().blocktime;
		if let Some(seconds) = blocktime {
			self.spawn_miner(seconds);
		}
		Ok(())
	}

	async fn start_mining(&mut self) -> Result<()> {
		let blocktime = {
			let mut state = self.state.lock();
			state.is_mining = true;
			if state.blocktime.is_none() && !state.pending.is_empty() {
				state.seal_block();
			}
			state.blocktime
		};
		if let Some(seconds) = blocktime {
			self.spawn_miner(seconds);
		}
		Ok(())
	}

	async fn stop_mining(&mut self) -> Result<()> {
		self.state.lock().is_mining = false;
		Ok(())
	}

	async fn process_blocks(&mut self, count: u64) -> Result<()> {
		let mut state = self.state.lock();
		for _ in 0..count {
			state.seal_block();
		}
		Ok(())
	}

	async fn snapshot(&mut self) -> Result<u64> {
		let mut state = self.state.lock();
		let id = state.next_restore_id;
		state.next_restore_id += 1;
		let point = RestorePoint {
			id,
			accounts: state.accounts.clone(),
			unlocked: state.unlocked.clone(),
			block_count: state.blocks.len(),
			pending: state.pending.clone(),
		};
		state.restore_points.push(point);
		Ok(id)
	}

	async fn revert(&mut self) -> Result<bool> {
		let mut state = self.state.lock();
		let Some(point) = state.restore_points.pop() else {
			return Ok(false);
		};
		state.accounts = point.accounts;
		state.unlocked = point.unlocked;
		state.blocks.truncate(point.block_count);
		state.pending = point.pending;
		Ok(true)
	}

	async fn create_account(&mut self, options: &AccountOptions) -> Result<AccountEntry> {
		let index = self.state.lock().accounts.len();
		let secret_key = match &options.secret_key {
			Some(raw) => parse_secret(raw)?,
			None => derive_secret(&self.seed, index),
		};
		let balance = options.balance.as_deref().map(parse_balance).transpose()?.unwrap_or_default();
		Ok(AccountEntry {
			address: address_of(&secret_key),
			balance: encode_uint(balance),
			nonce: Vec::new(),
			secret_key,
		})
	}

	async fn register_account(&mut self, account: AccountEntry, unlocked: bool) -> Result<()> {
		let mut state = self.state.lock();
		if state.accounts.iter().any(|a| a.address == account.address) {
			return Err(EngineError::DuplicateAccount(format!("0x{}", hex::encode(account.address))));
		}
		if unlocked {
			state.unlocked.insert(account.address);
		}
		state.accounts.push(account);
		Ok(())
	}

	async fn shutdown(&mut self) {
		self.shutdown.cancel();
		self.miner = None;
	}
}
