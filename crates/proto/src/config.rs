//! Start-request normalization.
//!
//! The consumer's configuration form sends a flat [`RawNodeConfig`]. Every falsy field
//! (zero, empty or blank string, `false`, absent) is dropped on the way to
//! [`NodeConfig`] so the engine's own defaults fill the gaps. A consequence is that a
//! numeric field cannot be set to zero on purpose.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Port used when the configuration leaves it unset.
pub const DEFAULT_PORT: u16 = 8545;

/// Largest number of accounts a start request may ask for.
pub const MAX_TOTAL_ACCOUNTS: u64 = 10_000;

/// Errors produced while normalizing a start request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
	/// Both a mnemonic and seed data were supplied.
	#[error("a mnemonic and seed data cannot both be set")]
	MnemonicAndSeed,
	/// The port does not fit in a TCP port number.
	#[error("port {0} is out of range")]
	PortOutOfRange(u64),
	/// More accounts were requested than an engine will generate.
	#[error("{0} accounts requested, at most {max} are allowed", max = MAX_TOTAL_ACCOUNTS)]
	TooManyAccounts(u64),
	/// The specific start time could not be parsed.
	#[error("invalid start time {value:?}: {reason}")]
	InvalidTime {
		/// Raw input.
		value: String,
		/// Parser message.
		reason: String,
	},
	/// The fork URL could not be parsed.
	#[error("invalid fork url {value:?}: {reason}")]
	InvalidForkUrl {
		/// Raw input.
		value: String,
		/// Parser message.
		reason: String,
	},
}

/// Raw `StartRpc` payload as sent by the configuration form.
///
/// Numeric fields accept JSON numbers or numeric strings, since the form collects
/// them from text inputs. Missing fields take the form's defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawNodeConfig {
	/// Listening port.
	#[serde(deserialize_with = "lenient_u64")]
	pub port: u64,
	/// Number of accounts to generate.
	#[serde(deserialize_with = "lenient_u64")]
	pub total_accounts: u64,
	/// Block interval in seconds.
	#[serde(deserialize_with = "lenient_u64")]
	pub block_time_seconds: u64,
	/// Default gas price in wei.
	#[serde(deserialize_with = "lenient_u64")]
	pub gas_price: u64,
	/// Block gas limit.
	#[serde(deserialize_with = "lenient_u64")]
	pub gas_limit: u64,
	/// HD wallet mnemonic.
	pub mnemonic: Option<String>,
	/// Seed data for account derivation.
	pub seed: Option<String>,
	/// Specific chain start time, RFC 3339.
	pub time: Option<String>,
	/// URL of a chain to fork from.
	pub fork_url: Option<String>,
	/// Create accounts locked.
	pub accounts_locked: bool,
	/// Enable VM opcode debug logging.
	pub debug: bool,
	/// Enable verbose engine logging.
	pub verbose: bool,
}

impl Default for RawNodeConfig {
	fn default() -> Self {
		Self {
			port: u64::from(DEFAULT_PORT),
			total_accounts: 6,
			block_time_seconds: 1,
			gas_price: 1,
			gas_limit: 4_712_388,
			mnemonic: None,
			seed: None,
			time: None,
			fork_url: None,
			accounts_locked: false,
			debug: false,
			verbose: false,
		}
	}
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
	D: Deserializer<'de>,
{
	struct LenientU64;

	impl Visitor<'_> for LenientU64 {
		type Value = u64;

		fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			f.write_str("a non-negative integer or a numeric string")
		}

		fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
			Ok(v)
		}

		fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
			u64::try_from(v).map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
		}

		fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
			let trimmed = v.trim();
			if trimmed.is_empty() {
				return Ok(0);
			}
			trimmed.parse().map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
		}

		fn visit_unit<E: de::Error>(self) -> Result<u64, E> {
			Ok(0)
		}
	}

	deserializer.deserialize_any(LenientU64)
}

/// Source of the engine's account keys. Mnemonic and seed are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountSource {
	/// HD wallet mnemonic.
	Mnemonic(String),
	/// Arbitrary seed data.
	Seed(String),
}

/// Typed, sparse node configuration handed to the engine.
///
/// `None` and `false` mean "use the engine default"; they are also omitted when the
/// configuration is serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
	#[serde(skip_serializing_if = "Option::is_none")]
	port: Option<u16>,
	#[serde(skip_serializing_if = "Option::is_none")]
	total_accounts: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	block_time_seconds: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	gas_price: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	gas_limit: Option<u64>,
	#[serde(flatten)]
	account_source: Option<AccountSource>,
	#[serde(skip_serializing_if = "Option::is_none")]
	time: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	fork_url: Option<Url>,
	#[serde(skip_serializing_if = "std::ops::Not::not")]
	accounts_locked: bool,
	#[serde(skip_serializing_if = "std::ops::Not::not")]
	debug: bool,
	#[serde(skip_serializing_if = "std::ops::Not::not")]
	verbose: bool,
}

impl NodeConfig {
	/// Starts an empty builder.
	pub fn builder() -> NodeConfigBuilder {
		NodeConfigBuilder::default()
	}

	/// Normalizes a raw start request, dropping every falsy field.
	///
	/// # Errors
	///
	/// Returns [`ConfigValidationError`] when the remaining fields are malformed.
	pub fn from_raw(raw: &RawNodeConfig) -> Result<Self, ConfigValidationError> {
		let mut builder = Self::builder()
			.port(raw.port)
			.total_accounts(raw.total_accounts)
			.block_time_seconds(raw.block_time_seconds)
			.gas_price(raw.gas_price)
			.gas_limit(raw.gas_limit)
			.accounts_locked(raw.accounts_locked)
			.debug(raw.debug)
			.verbose(raw.verbose);
		if let Some(mnemonic) = &raw.mnemonic {
			builder = builder.mnemonic(mnemonic);
		}
		if let Some(seed) = &raw.seed {
			builder = builder.seed(seed);
		}
		if let Some(time) = &raw.time {
			builder = builder.time(time);
		}
		if let Some(url) = &raw.fork_url {
			builder = builder.fork_url(url);
		}
		builder.build()
	}

	/// Listening port, if set.
	pub fn port(&self) -> Option<u16> {
		self.port
	}

	/// Listening port, falling back to [`DEFAULT_PORT`].
	pub fn port_or_default(&self) -> u16 {
		self.port.unwrap_or(DEFAULT_PORT)
	}

	/// Number of accounts to generate, if set.
	pub fn total_accounts(&self) -> Option<u64> {
		self.total_accounts
	}

	/// Block interval in seconds, if set.
	pub fn block_time_seconds(&self) -> Option<u64> {
		self.block_time_seconds
	}

	/// Default gas price, if set.
	pub fn gas_price(&self) -> Option<u64> {
		self.gas_price
	}

	/// Block gas limit, if set.
	pub fn gas_limit(&self) -> Option<u64> {
		self.gas_limit
	}

	/// Key source, if set.
	pub fn account_source(&self) -> Option<&AccountSource> {
		self.account_source.as_ref()
	}

	/// Mnemonic, if that is the key source.
	pub fn mnemonic(&self) -> Option<&str> {
		match &self.account_source {
			Some(AccountSource::Mnemonic(m)) => Some(m),
			_ => None,
		}
	}

	/// Seed data, if that is the key source.
	pub fn seed(&self) -> Option<&str> {
		match &self.account_source {
			Some(AccountSource::Seed(s)) => Some(s),
			_ => None,
		}
	}

	/// Specific chain start time, if set.
	pub fn time(&self) -> Option<DateTime<Utc>> {
		self.time
	}

	/// Fork URL, if set.
	pub fn fork_url(&self) -> Option<&Url> {
		self.fork_url.as_ref()
	}

	/// Whether accounts start locked.
	pub fn accounts_locked(&self) -> bool {
		self.accounts_locked
	}

	/// Whether VM opcode debugging is on.
	pub fn debug(&self) -> bool {
		self.debug
	}

	/// Whether verbose engine logging is on.
	pub fn verbose(&self) -> bool {
		self.verbose
	}
}

/// Optional-field builder for [`NodeConfig`].
///
/// Setters ignore falsy values, so an unset field is never produced by removing it
/// after the fact. Parsing and cross-field checks run in [`NodeConfigBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct NodeConfigBuilder {
	port: Option<u64>,
	total_accounts: Option<u64>,
	block_time_seconds: Option<u64>,
	gas_price: Option<u64>,
	gas_limit: Option<u64>,
	mnemonic: Option<String>,
	seed: Option<String>,
	time: Option<String>,
	fork_url: Option<String>,
	accounts_locked: bool,
	debug: bool,
	verbose: bool,
}

fn non_zero(value: u64) -> Option<u64> {
	(value != 0).then_some(value)
}

fn non_blank(value: &str) -> Option<String> {
	let trimmed = value.trim();
	(!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl NodeConfigBuilder {
	/// Sets the listening port; zero is ignored.
	#[must_use]
	pub fn port(mut self, port: u64) -> Self {
		self.port = non_zero(port);
		self
	}

	/// Sets the number of generated accounts; zero is ignored.
	#[must_use]
	pub fn total_accounts(mut self, count: u64) -> Self {
		self.total_accounts = non_zero(count);
		self
	}

	/// Sets the block interval; zero is ignored.
	#[must_use]
	pub fn block_time_seconds(mut self, seconds: u64) -> Self {
		self.block_time_seconds = non_zero(seconds);
		self
	}

	/// Sets the default gas price; zero is ignored.
	#[must_use]
	pub fn gas_price(mut self, price: u64) -> Self {
		self.gas_price = non_zero(price);
		self
	}

	/// Sets the block gas limit; zero is ignored.
	#[must_use]
	pub fn gas_limit(mut self, limit: u64) -> Self {
		self.gas_limit = non_zero(limit);
		self
	}

	/// Sets the mnemonic; blank input is ignored.
	#[must_use]
	pub fn mnemonic(mut self, mnemonic: &str) -> Self {
		self.mnemonic = non_blank(mnemonic);
		self
	}

	/// Sets the seed data; blank input is ignored.
	#[must_use]
	pub fn seed(mut self, seed: &str) -> Self {
		self.seed = non_blank(seed);
		self
	}

	/// Sets the chain start time (RFC 3339); blank input is ignored.
	#[must_use]
	pub fn time(mut self, time: &str) -> Self {
		self.time = non_blank(time);
		self
	}

	/// Sets the fork URL; blank input is ignored.
	#[must_use]
	pub fn fork_url(mut self, url: &str) -> Self {
		self.fork_url = non_blank(url);
		self
	}

	/// Sets the locked-accounts flag.
	#[must_use]
	pub fn accounts_locked(mut self, locked: bool) -> Self {
		self.accounts_locked = locked;
		self
	}

	/// Sets the opcode debug flag.
	#[must_use]
	pub fn debug(mut self, debug: bool) -> Self {
		self.debug = debug;
		self
	}

	/// Sets the verbose logging flag.
	#[must_use]
	pub fn verbose(mut self, verbose: bool) -> Self {
		self.verbose = verbose;
		self
	}

	/// Validates the collected fields.
	///
	/// # Errors
	///
	/// Returns [`ConfigValidationError`] for conflicting key sources, an out-of-range
	/// port, or an unparsable time or URL.
	pub fn build(self) -> Result<NodeConfig, ConfigValidationError> {
		let account_source = match (self.mnemonic, self.seed) {
			(Some(_), Some(_)) => return Err(ConfigValidationError::MnemonicAndSeed),
			(Some(mnemonic), None) => Some(AccountSource::Mnemonic(mnemonic)),
			(None, Some(seed)) => Some(AccountSource::Seed(seed)),
			(None, None) => None,
		};

		let port = self
			.port
			.map(|port| u16::try_from(port).map_err(|_| ConfigValidationError::PortOutOfRange(port)))
			.transpose()?;

		if let Some(count) = self.total_accounts
			&& count > MAX_TOTAL_ACCOUNTS
		{
			return Err(ConfigValidationError::TooManyAccounts(count));
		}

		let time = self
			.time
			.map(|value| {
				DateTime::parse_from_rfc3339(&value)
					.map(|t| t.with_timezone(&Utc))
					.map_err(|e| ConfigValidationError::InvalidTime {
						reason: e.to_string(),
						value,
					})
			})
			.transpose()?;

		let fork_url = self
			.fork_url
			.map(|value| {
				Url::parse(&value).map_err(|e| ConfigValidationError::InvalidForkUrl {
					reason: e.to_string(),
					value,
				})
			})
			.transpose()?;

		Ok(NodeConfig {
			port,
			total_accounts: self.total_accounts,
			block_time_seconds: self.block_time_seconds,
			gas_price: self.gas_price,
			gas_limit: self.gas_limit,
			account_source,
			time,
			fork_url,
			accounts_locked: self.accounts_locked,
			debug: self.debug,
			verbose: self.verbose,
		})
	}
}
