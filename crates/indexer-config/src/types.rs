//! Configuration schema.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use indexer_types::Address;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
	#[serde(default)]
	pub indexer: GeneralConfig,
	pub contracts: ContractsConfig,
	#[serde(default)]
	pub workers: WorkersConfig,
	#[serde(default)]
	pub expiry: ExpiryConfig,
	/// Fixed conversion rates for non-native settlement currencies.
	#[serde(default)]
	pub prices: Vec<PriceRateConfig>,
	/// Marketplace-frontend domain per protocol tag, for attribution.
	#[serde(default)]
	pub sources: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
	#[serde(default = "default_name")]
	pub name: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	/// Backfill mode writes canonical rows but skips reconciliation fan-out.
	#[serde(default)]
	pub backfill: bool,
}

impl Default for GeneralConfig {
	fn default() -> Self {
		Self {
			name: default_name(),
			log_level: default_log_level(),
			backfill: false,
		}
	}
}

/// On-chain deployments the handlers and adapters are keyed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
	/// Wrapped native token; the only supported buy-side payment token.
	pub weth: Address,
	pub zeroex_v4_exchange: Address,
	pub payment_processor_exchange: Address,
	pub looks_rare_exchange: Address,
	pub wyvern_exchange: Address,
	pub punks: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
	#[serde(default = "default_concurrency")]
	pub order_info_concurrency: usize,
	#[serde(default = "default_concurrency")]
	pub maker_info_concurrency: usize,
	#[serde(default = "default_concurrency")]
	pub order_concurrency: usize,
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_retry_delay_secs")]
	pub retry_delay_secs: u64,
}

impl Default for WorkersConfig {
	fn default() -> Self {
		Self {
			order_info_concurrency: default_concurrency(),
			maker_info_concurrency: default_concurrency(),
			order_concurrency: default_concurrency(),
			max_attempts: default_max_attempts(),
			retry_delay_secs: default_retry_delay_secs(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryConfig {
	#[serde(default = "default_expiry_interval_secs")]
	pub interval_secs: u64,
}

impl Default for ExpiryConfig {
	fn default() -> Self {
		Self {
			interval_secs: default_expiry_interval_secs(),
		}
	}
}

/// `numerator / denominator` native units per currency unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRateConfig {
	pub currency: Address,
	pub numerator: u64,
	pub denominator: u64,
}

fn default_name() -> String {
	"nft-indexer".to_string()
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_concurrency() -> usize {
	4
}

fn default_max_attempts() -> u32 {
	5
}

fn default_retry_delay_secs() -> u64 {
	1
}

fn default_expiry_interval_secs() -> u64 {
	60
}
