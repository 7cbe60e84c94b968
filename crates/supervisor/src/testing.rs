//! In-memory engine doubles for supervisor tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use devnode_engine::{
	AccountEntry, Address, Block, BlockHeader, ChainParams, ChainReader, ChainView, Engine, EngineError, EngineLauncher, EngineLog,
	Transaction, encode_uint,
};
use devnode_proto::{AccountOptions, NodeConfig};
use parking_lot::{Mutex, MutexGuard};

/// Mutable state behind a [`FakeChain`].
#[derive(Debug, Default)]
pub struct FakeState {
	/// Registered accounts.
	pub accounts: Vec<AccountEntry>,
	/// Unlocked addresses.
	pub unlocked: HashSet<Address>,
	/// Stored blocks, genesis first.
	pub blocks: Vec<Block>,
	/// Mining flag.
	pub is_mining: bool,
	/// Outstanding restore points.
	pub snapshots: Vec<u64>,
	/// Names of engine operations in call order.
	pub calls: Vec<&'static str>,
	/// When set, every mutating operation fails.
	pub failing: bool,
	/// Port passed to `listen`.
	pub port: Option<u16>,
}

/// Scriptable engine sharing its state across clones.
#[derive(Debug, Clone, Default)]
pub struct FakeChain {
	state: Arc<Mutex<FakeState>>,
}

/// Builds block `number` holding `tx_count` transactions.
///
/// Transaction nonces encode `number * 100 + position`, so tests can recover where
/// a transaction came from.
pub fn fixture_block(number: u64, tx_count: usize) -> Block {
	let transactions = (0..tx_count as u64)
		.map(|position| Transaction {
			from: [1; 20],
			to: Some([2; 20]),
			nonce: encode_uint(u128::from(number * 100 + position)),
			value: encode_uint(1),
			gas_price: encode_uint(1),
			gas_limit: encode_uint(21_000),
			data: Vec::new(),
		})
		.collect();
	Block {
		header: BlockHeader {
			parent_hash: [0; 32],
			coinbase: [0; 20],
			number: encode_uint(u128::from(number)),
			timestamp: encode_uint(1_000 + u128::from(number)),
			gas_limit: encode_uint(4_712_388),
			gas_used: encode_uint(21_000 * tx_count as u128),
		},
		transactions,
	}
}

impl FakeChain {
	/// A chain whose block at position `i` holds `counts[i]` transactions.
	pub fn with_tx_counts(counts: &[usize]) -> Self {
		let chain = Self::default();
		chain.state.lock().blocks = counts.iter().enumerate().map(|(i, n)| fixture_block(i as u64, *n)).collect();
		chain
	}

	/// Locks the shared state.
	pub fn state(&self) -> MutexGuard<'_, FakeState> {
		self.state.lock()
	}

	/// Operation names recorded so far.
	pub fn calls(&self) -> Vec<&'static str> {
		self.state.lock().calls.clone()
	}

	/// Makes subsequent mutating operations fail.
	pub fn set_failing(&self, failing: bool) {
		self.state.lock().failing = failing;
	}

	fn record(&self, call: &'static str) -> Result<MutexGuard<'_, FakeState>, EngineError> {
		let mut state = self.state.lock();
		state.calls.push(call);
		if state.failing {
			return Err(EngineError::Rejected(format!("{call} refused")));
		}
		Ok(state)
	}

	fn mine(state: &mut FakeState) {
		let number = state.blocks.len() as u64;
		state.blocks.push(fixture_block(number, 0));
	}
}

struct FakeView<'a>(MutexGuard<'a, FakeState>);

impl ChainReader for FakeChain {
	fn view(&self) -> Box<dyn ChainView + '_> {
		Box::new(FakeView(self.state.lock()))
	}
}

impl ChainView for FakeView<'_> {
	fn accounts(&self) -> Vec<AccountEntry> {
		self.0.accounts.clone()
	}

	fn is_unlocked(&self, address: &Address) -> bool {
		self.0.unlocked.contains(address)
	}

	fn params(&self) -> ChainParams {
		let state = &self.0;
		ChainParams {
			mnemonic: None,
			hd_path: "m/44'/60'/0'/0/".to_string(),
			gas_price: 1,
			gas_limit: 4_712_388,
			total_accounts: state.accounts.len() as u64,
			coinbase: [0; 20],
			is_mining_on_interval: false,
			is_mining: state.is_mining,
			blocktime: None,
			block_number: state.blocks.len().saturating_sub(1) as u64,
			network_id: 1,
			snapshots: state.snapshots.clone(),
		}
	}

	fn block_count(&self) -> usize {
		self.0.blocks.len()
	}

	fn block(&self, index: usize) -> Option<Block> {
		self.0.blocks.get(index).cloned()
	}
}

#[async_trait]
impl Engine for FakeChain {
	async fn listen(&mut self, port: u16) -> devnode_engine::Result<()> {
		self.record("listen")?.port = Some(port);
		Ok(())
	}

	async fn start_mining(&mut self) -> devnode_engine::Result<()> {
		self.record("start_mining")?.is_mining = true;
		Ok(())
	}

	async fn stop_mining(&mut self) -> devnode_engine::Result<()> {
		self.record("stop_mining")?.is_mining = false;
		Ok(())
	}

	async fn process_blocks(&mut self, count: u64) -> devnode_engine::Result<()> {
		let mut state = self.record("process_blocks")?;
		for _ in 0..count {
			Self::mine(&mut state);
		}
		Ok(())
	}

	async fn snapshot(&mut self) -> devnode_engine::Result<u64> {
		let mut state = self.record("snapshot")?;
		let id = state.snapshots.len() as u64 + 1;
		state.snapshots.push(id);
		Ok(id)
	}

	async fn revert(&mut self) -> devnode_engine::Result<bool> {
		Ok(self.record("revert")?.snapshots.pop().is_some())
	}

	async fn create_account(&mut self, options: &AccountOptions) -> devnode_engine::Result<AccountEntry> {
		let state = self.record("create_account")?;
		let tag = state.accounts.len() as u8 + 1;
		let balance = match options.balance.as_deref() {
			Some(balance) => balance
				.parse::<u128>()
				.map_err(|_| EngineError::InvalidAccount(format!("bad balance {balance:?}")))?,
			None => 0,
		};
		Ok(AccountEntry {
			address: [tag; 20],
			balance: encode_uint(balance),
			nonce: Vec::new(),
			secret_key: [tag; 32],
		})
	}

	async fn register_account(&mut self, account: AccountEntry, unlocked: bool) -> devnode_engine::Result<()> {
		let mut state = self.record("register_account")?;
		if unlocked {
			state.unlocked.insert(account.address);
		}
		state.accounts.push(account);
		Ok(())
	}

	async fn shutdown(&mut self) {
		self.state.lock().calls.push("shutdown");
	}
}

/// Launcher handing out clones of one [`FakeChain`].
#[derive(Debug)]
pub struct FakeLauncher {
	chain: FakeChain,
	launches: AtomicUsize,
	failure: Mutex<Option<EngineError>>,
	delay: Duration,
	configs: Mutex<Vec<NodeConfig>>,
}

impl FakeLauncher {
	/// Launches always succeed immediately.
	pub fn new(chain: FakeChain) -> Arc<Self> {
		Self::build(chain, None, Duration::ZERO)
	}

	/// The first launch fails with `error`; later ones succeed.
	pub fn failing_once(chain: FakeChain, error: EngineError) -> Arc<Self> {
		Self::build(chain, Some(error), Duration::ZERO)
	}

	/// Every launch takes `delay` before returning.
	pub fn delayed(chain: FakeChain, delay: Duration) -> Arc<Self> {
		Self::build(chain, None, delay)
	}

	fn build(chain: FakeChain, failure: Option<EngineError>, delay: Duration) -> Arc<Self> {
		Arc::new(Self {
			chain,
			launches: AtomicUsize::new(0),
			failure: Mutex::new(failure),
			delay,
			configs: Mutex::new(Vec::new()),
		})
	}

	/// Number of launch attempts so far.
	pub fn launches(&self) -> usize {
		self.launches.load(Ordering::SeqCst)
	}

	/// Configurations passed to each launch attempt.
	pub fn configs(&self) -> Vec<NodeConfig> {
		self.configs.lock().clone()
	}
}

#[async_trait]
impl EngineLauncher for FakeLauncher {
	async fn launch(&self, config: &NodeConfig, log: Arc<dyn EngineLog>) -> devnode_engine::Result<Box<dyn Engine>> {
		self.launches.fetch_add(1, Ordering::SeqCst);
		self.configs.lock().push(config.clone());
		if !self.delay.is_zero() {
			tokio::time::sleep(self.delay).await;
		}
		if let Some(error) = self.failure.lock().take() {
			return Err(error);
		}
		{
			let mut state = self.chain.state();
			if state.blocks.is_empty() {
				state.blocks.push(fixture_block(0, 0));
			}
		}
		log.write(devnode_proto::LogLevel::Info, "fake chain ready");
		Ok(Box::new(self.chain.clone()))
	}
}
