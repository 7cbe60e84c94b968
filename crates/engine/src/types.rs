//! Engine-native chain data.
//!
//! Integers are stored as minimal big-endian byte strings (zero is empty), the way
//! Ethereum engines keep them. Hashes are not stored; [`Block::hash`] and
//! [`Transaction::hash`] compute them on demand.

use sha3::{Digest, Keccak256};

/// 20-byte account address.
pub type Address = [u8; 20];

/// 32-byte hash.
pub type H256 = [u8; 32];

/// Encodes an integer as a minimal big-endian byte string.
pub fn encode_uint(value: u128) -> Vec<u8> {
	let bytes = value.to_be_bytes();
	let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
	bytes[first..].to_vec()
}

/// Decodes a big-endian byte string, saturating at `u64::MAX`.
pub fn decode_uint(bytes: &[u8]) -> u64 {
	let significant = match bytes.iter().position(|b| *b != 0) {
		Some(first) => &bytes[first..],
		None => return 0,
	};
	if significant.len() > 8 {
		return u64::MAX;
	}
	significant.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

fn keccak(parts: &[&[u8]]) -> H256 {
	let mut hasher = Keccak256::new();
	for part in parts {
		hasher.update((part.len() as u32).to_be_bytes());
		hasher.update(part);
	}
	hasher.finalize().into()
}

/// Derives a private key from seed material and a derivation index.
pub(crate) fn derive_secret(seed: &str, index: usize) -> H256 {
	keccak(&[seed.as_bytes(), &(index as u64).to_be_bytes()[..]])
}

/// Derives the address belonging to a private key.
pub(crate) fn address_of(secret: &H256) -> Address {
	let digest = keccak(&[&secret[..]]);
	let mut address = [0u8; 20];
	address.copy_from_slice(&digest[12..]);
	address
}

/// One account as held by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountEntry {
	/// Account address.
	pub address: Address,
	/// Balance in wei.
	pub balance: Vec<u8>,
	/// Transaction count.
	pub nonce: Vec<u8>,
	/// Private key.
	pub secret_key: H256,
}

/// Block header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
	/// Hash of the parent block; zero for genesis.
	pub parent_hash: H256,
	/// Miner address.
	pub coinbase: Address,
	/// Block number.
	pub number: Vec<u8>,
	/// Seconds since the Unix epoch.
	pub timestamp: Vec<u8>,
	/// Block gas limit.
	pub gas_limit: Vec<u8>,
	/// Gas used by the block's transactions.
	pub gas_used: Vec<u8>,
}

/// One signed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
	/// Sender.
	pub from: Address,
	/// Recipient; `None` creates a contract.
	pub to: Option<Address>,
	/// Sender nonce.
	pub nonce: Vec<u8>,
	/// Value in wei.
	pub value: Vec<u8>,
	/// Gas price in wei.
	pub gas_price: Vec<u8>,
	/// Gas limit.
	pub gas_limit: Vec<u8>,
	/// Call data.
	pub data: Vec<u8>,
}

impl Transaction {
	/// Computes the transaction hash.
	pub fn hash(&self) -> H256 {
		let to = self.to.map(|a| a.to_vec()).unwrap_or_default();
		keccak(&[&self.from[..], &to[..], &self.nonce[..], &self.value[..], &self.gas_price[..], &self.gas_limit[..], &self.data[..]])
	}
}

/// One block: header plus transactions in inclusion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
	/// Header fields.
	pub header: BlockHeader,
	/// Included transactions.
	pub transactions: Vec<Transaction>,
}

impl Block {
	/// Computes the block hash over the header and the transaction hashes.
	pub fn hash(&self) -> H256 {
		let tx_hashes: Vec<u8> = self.transactions.iter().flat_map(Transaction::hash).collect();
		let h = &self.header;
		keccak(&[
			&h.parent_hash[..],
			&h.coinbase[..],
			&h.number[..],
			&h.timestamp[..],
			&h.gas_limit[..],
			&h.gas_used[..],
			&tx_hashes[..],
		])
	}

	/// Block number decoded from the header.
	pub fn number(&self) -> u64 {
		decode_uint(&self.header.number)
	}
}

/// Node-wide values read alongside accounts and blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainParams {
	/// HD wallet mnemonic, when the engine has one.
	pub mnemonic: Option<String>,
	/// HD derivation path prefix.
	pub hd_path: String,
	/// Default gas price in wei.
	pub gas_price: u64,
	/// Block gas limit.
	pub gas_limit: u64,
	/// Accounts generated at start.
	pub total_accounts: u64,
	/// Miner address.
	pub coinbase: Address,
	/// Whether blocks are produced on a fixed interval.
	pub is_mining_on_interval: bool,
	/// Whether mining is enabled.
	pub is_mining: bool,
	/// Block interval in seconds.
	pub blocktime: Option<u64>,
	/// Number of the latest block.
	pub block_number: u64,
	/// Network id.
	pub network_id: u64,
	/// Outstanding restore point ids, oldest first.
	pub snapshots: Vec<u64>,
}
