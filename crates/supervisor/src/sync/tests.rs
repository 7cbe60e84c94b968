use devnode_engine::encode_uint;
use pretty_assertions::assert_eq;

use super::*;
use crate::testing::FakeChain;

fn tx_origins(txs: &[TxView]) -> Vec<u64> {
	txs.iter().map(|tx| tx.nonce.parse::<u64>().unwrap()).collect()
}

#[test]
fn recent_blocks_are_newest_first_and_bounded() {
	let chain = FakeChain::with_tx_counts(&[0; 8]);
	let numbers: Vec<u64> = StateSynchronizer::default()
		.recent_blocks(&chain)
		.iter()
		.map(|b| b.number)
		.collect();
	assert_eq!(numbers, vec![7, 6, 5, 4, 3]);
}

#[test]
fn short_chains_yield_every_block() {
	let chain = FakeChain::with_tx_counts(&[0, 0, 0]);
	let numbers: Vec<u64> = StateSynchronizer::default()
		.recent_blocks(&chain)
		.iter()
		.map(|b| b.number)
		.collect();
	assert_eq!(numbers, vec![2, 1, 0]);
	assert!(StateSynchronizer::default().recent_blocks(&FakeChain::default()).is_empty());
}

#[test]
fn transaction_walk_takes_whole_blocks_until_threshold() {
	// Blocks 4 and 3 together hold 6 transactions; blocks 2, 1 and 0 are not visited.
	let chain = FakeChain::with_tx_counts(&[0, 3, 0, 4, 2]);
	let txs = StateSynchronizer::default().recent_transactions(&chain);
	assert_eq!(tx_origins(&txs), vec![400, 401, 300, 301, 302, 303]);
}

#[test]
fn transaction_walk_never_reaches_genesis() {
	let chain = FakeChain::with_tx_counts(&[9, 1, 1]);
	let txs = StateSynchronizer::default().recent_transactions(&chain);
	assert_eq!(tx_origins(&txs), vec![200, 100]);

	let genesis_only = FakeChain::with_tx_counts(&[9]);
	assert!(StateSynchronizer::default().recent_transactions(&genesis_only).is_empty());
	assert!(StateSynchronizer::default().recent_transactions(&FakeChain::default()).is_empty());
}

#[test]
fn windows_follow_configured_sizes() {
	let chain = FakeChain::with_tx_counts(&[0, 1, 1, 1, 1]);
	let sync = StateSynchronizer::new(2, 1);
	assert_eq!(sync.recent_blocks(&chain).len(), 2);
	assert_eq!(tx_origins(&sync.recent_transactions(&chain)), vec![400]);
}

#[test]
fn accounts_are_indexed_in_order_with_lock_state() {
	let chain = FakeChain::with_tx_counts(&[0]);
	{
		let mut state = chain.state();
		for tag in 1..=3u8 {
			state.accounts.push(AccountEntry {
				address: [tag; 20],
				balance: encode_uint(100_000_000_000_000_000_000),
				nonce: encode_uint(u128::from(tag)),
				secret_key: [tag; 32],
			});
		}
		state.unlocked.insert([2; 20]);
	}

	let snapshot = StateSynchronizer::default().extract(&chain);
	let indexes: Vec<usize> = snapshot.accounts.iter().map(|a| a.index).collect();
	assert_eq!(indexes, vec![0, 1, 2]);
	let unlocked: Vec<bool> = snapshot.accounts.iter().map(|a| a.is_unlocked).collect();
	assert_eq!(unlocked, vec![false, true, false]);

	let first = &snapshot.accounts[0];
	assert_eq!(first.address, format!("0x{}", "01".repeat(20)));
	assert_eq!(first.balance, "100000000000000000000");
	assert_eq!(first.nonce, "1");
	assert_eq!(first.private_key, "01".repeat(32));
}

#[test]
fn block_view_carries_header_fields() {
	let chain = FakeChain::with_tx_counts(&[0, 2]);
	let blocks = StateSynchronizer::default().recent_blocks(&chain);
	let newest = &blocks[0];
	assert_eq!(newest.number, 1);
	assert_eq!(newest.timestamp, 1_001);
	assert_eq!(newest.gas_used, 42_000);
	assert_eq!(newest.transactions.len(), 2);
	assert_eq!(newest.transactions[0].to.as_deref(), Some(format!("0x{}", "02".repeat(20)).as_str()));
	assert_eq!(newest.transactions[0].gas_limit, 21_000);
	assert_eq!(newest.transactions[0].data, "0x");
	assert_eq!(newest.hash, to_hex(&chain.view().block(1).unwrap().hash()));
}

#[test]
fn extraction_is_repeatable_and_read_only() {
	let chain = FakeChain::with_tx_counts(&[0, 1, 2, 3]);
	let sync = StateSynchronizer::default();
	let first = sync.extract(&chain);
	let second = sync.extract(&chain);
	assert_eq!(first, second);
	assert!(chain.calls().is_empty());
	assert_eq!(first.block_number, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn snapshots_stay_consistent_while_the_miner_runs() {
	use std::sync::Arc;
	use std::time::{Duration, Instant};

	use devnode_engine::{DevChain, Engine, EngineLog};
	use devnode_proto::{LogLevel, NodeConfig};

	struct Quiet;
	impl EngineLog for Quiet {
		fn write(&self, _level: LogLevel, _message: &str) {}
	}

	let config = NodeConfig::builder().seed("fixture").block_time_seconds(1).build().unwrap();
	let mut chain = DevChain::new(&config, Arc::new(Quiet)).unwrap();
	chain.listen(0).await.unwrap();

	let sync = StateSynchronizer::default();
	let deadline = Instant::now() + Duration::from_millis(2_500);
	let mut newest_seen = 0;
	while Instant::now() < deadline {
		let snapshot = sync.extract(&chain);
		assert_eq!(snapshot.blocks[0].number, snapshot.block_number);
		newest_seen = newest_seen.max(snapshot.block_number);
		tokio::task::yield_now().await;
	}
	assert!(newest_seen >= 1, "the miner sealed blocks during the run");
	chain.shutdown().await;
}
