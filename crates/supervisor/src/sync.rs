//! Projection of engine state into consumer snapshots.
//!
//! Extraction only reads through [`ChainReader`]; it never mutates the engine. Each
//! extraction runs against a single [`ChainView`], so a snapshot is never torn by
//! blocks sealed in the background while it is being built. Two extractions with no
//! engine activity in between produce equal snapshots.

use devnode_engine::{AccountEntry, Block, ChainReader, ChainView, Transaction, decode_uint};
use devnode_proto::{AccountView, BlockView, ChainStateSnapshot, TxView};

use crate::numeric::{to_decimal, to_hex};

/// Builds [`ChainStateSnapshot`]s with bounded block and transaction windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSynchronizer {
	recent_blocks: usize,
	recent_transactions: usize,
}

impl Default for StateSynchronizer {
	fn default() -> Self {
		Self::new(5, 5)
	}
}

impl StateSynchronizer {
	/// Creates a synchronizer keeping the newest `recent_blocks` blocks and walking
	/// back until at least `recent_transactions` transactions are collected.
	pub const fn new(recent_blocks: usize, recent_transactions: usize) -> Self {
		Self {
			recent_blocks,
			recent_transactions,
		}
	}

	/// Reads a full snapshot from `chain`.
	pub fn extract<R: ChainReader + ?Sized>(&self, chain: &R) -> ChainStateSnapshot {
		let view = chain.view();
		let view = &*view;
		let params = view.params();
		let accounts = view
			.accounts()
			.iter()
			.enumerate()
			.map(|(index, account)| account_view(index, account, view.is_unlocked(&account.address)))
			.collect();

		ChainStateSnapshot {
			accounts,
			mnemonic: params.mnemonic,
			hd_path: params.hd_path,
			gas_price: params.gas_price,
			gas_limit: params.gas_limit,
			total_accounts: params.total_accounts,
			coinbase: to_hex(&params.coinbase),
			is_mining_on_interval: params.is_mining_on_interval,
			is_mining: params.is_mining,
			blocktime: params.blocktime,
			block_number: params.block_number,
			network_id: params.network_id,
			snapshots: params.snapshots,
			blocks: self.block_window(view),
			transactions: self.transaction_walk(view),
		}
	}

	/// The newest blocks in storage, highest number first.
	pub fn recent_blocks<R: ChainReader + ?Sized>(&self, chain: &R) -> Vec<BlockView> {
		self.block_window(&*chain.view())
	}

	/// Transactions from the newest blocks backwards, stopping once the threshold is
	/// reached. Whole blocks are taken, so the result may exceed the threshold.
	/// The genesis position is never visited.
	pub fn recent_transactions<R: ChainReader + ?Sized>(&self, chain: &R) -> Vec<TxView> {
		self.transaction_walk(&*chain.view())
	}

	fn block_window(&self, view: &dyn ChainView) -> Vec<BlockView> {
		let count = view.block_count();
		let start = count.saturating_sub(self.recent_blocks);
		let mut window: Vec<Block> = (start..count).filter_map(|index| view.block(index)).collect();
		window.sort_by_key(|block| std::cmp::Reverse(block.number()));
		window.iter().map(block_view).collect()
	}

	fn transaction_walk(&self, view: &dyn ChainView) -> Vec<TxView> {
		let mut collected = Vec::new();
		let mut index = view.block_count();
		while collected.len() < self.recent_transactions && index > 1 {
			index -= 1;
			if let Some(block) = view.block(index) {
				collected.extend(block.transactions.iter().map(tx_view));
			}
		}
		collected
	}
}

fn account_view(index: usize, account: &AccountEntry, is_unlocked: bool) -> AccountView {
	AccountView {
		index,
		address: to_hex(&account.address),
		balance: to_decimal(&account.balance),
		nonce: to_decimal(&account.nonce),
		private_key: hex::encode(account.secret_key),
		is_unlocked,
	}
}

fn block_view(block: &Block) -> BlockView {
	let header = &block.header;
	BlockView {
		number: block.number(),
		hash: to_hex(&block.hash()),
		parent_hash: to_hex(&header.parent_hash),
		timestamp: decode_uint(&header.timestamp),
		gas_limit: decode_uint(&header.gas_limit),
		gas_used: decode_uint(&header.gas_used),
		coinbase: to_hex(&header.coinbase),
		transactions: block.transactions.iter().map(tx_view).collect(),
	}
}

fn tx_view(tx: &Transaction) -> TxView {
	TxView {
		hash: to_hex(&tx.hash()),
		from: to_hex(&tx.from),
		to: tx.to.as_ref().map(|to| to_hex(to)),
		nonce: to_decimal(&tx.nonce),
		value: to_decimal(&tx.value),
		gas_price: to_decimal(&tx.gas_price),
		gas_limit: decode_uint(&tx.gas_limit),
		data: to_hex(&tx.data),
	}
}

#[cfg(test)]
mod tests;
