//! Configuration loading with environment variable substitution.

use std::env;
use std::path::Path;

use thiserror::Error;

mod types;

pub use types::{
	ContractsConfig, ExpiryConfig, GeneralConfig, IndexerConfig, PriceRateConfig, WorkersConfig,
};

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Loads TOML configuration, substituting `${VAR}` references from the
/// environment before parsing.
#[derive(Default)]
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "INDEXER_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<IndexerConfig, ConfigError> {
		let mut config = if let Some(file_path) = &self.file_path {
			self.load_from_file(file_path).await?
		} else {
			return Err(ConfigError::FileNotFound(
				"No configuration file specified".to_string(),
			));
		};

		self.apply_env_overrides(&mut config)?;
		Self::validate_config(&config)?;
		Ok(config)
	}

	/// Parses a TOML string directly, without file IO or env overrides.
	pub fn from_toml(content: &str) -> Result<IndexerConfig, ConfigError> {
		let config =
			toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
		Self::validate_config(&config)?;
		Ok(config)
	}

	async fn load_from_file(&self, file_path: &str) -> Result<IndexerConfig, ConfigError> {
		let content = tokio::fs::read_to_string(file_path).await?;
		let substituted = self.substitute_env_vars(&content)?;
		toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let mut result = content.to_string();

		// The pattern is infallible; failures surface as missing variables.
		let re = regex::Regex::new(r"\$\{([^}]+)\}")
			.map_err(|e| ConfigError::ParseError(e.to_string()))?;

		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value = env::var(var_name)
				.map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut IndexerConfig) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			config.indexer.log_level = log_level;
		}
		if let Ok(backfill) = env::var(format!("{}BACKFILL", self.env_prefix)) {
			config.indexer.backfill = backfill.parse().map_err(|e| {
				ConfigError::ValidationError(format!("Invalid backfill flag: {}", e))
			})?;
		}
		Ok(())
	}

	fn validate_config(config: &IndexerConfig) -> Result<(), ConfigError> {
		if config.contracts.weth == indexer_types::Address::ZERO {
			return Err(ConfigError::ValidationError(
				"contracts.weth must not be the zero address".to_string(),
			));
		}
		if config.workers.order_info_concurrency == 0
			|| config.workers.maker_info_concurrency == 0
			|| config.workers.order_concurrency == 0
		{
			return Err(ConfigError::ValidationError(
				"Worker concurrency must be at least 1".to_string(),
			));
		}
		if config.workers.max_attempts == 0 {
			return Err(ConfigError::ValidationError(
				"workers.max_attempts must be at least 1".to_string(),
			));
		}
		for rate in &config.prices {
			if rate.denominator == 0 {
				return Err(ConfigError::ValidationError(format!(
					"Zero denominator in price rate for {}",
					rate.currency
				)));
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
[contracts]
weth = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"
zeroex_v4_exchange = "0xdef1c0ded9bec7f1a1670819833240f027b25eff"
payment_processor_exchange = "0x009a1dc629242961c9b4f88b734e0c56310c2f83"
looks_rare_exchange = "0x59728544b08ab483533076417fbbb2fd0b17ce3a"
wyvern_exchange = "0x7be8076f4ea4a4ad08075c2508e481d6c946d12b"
punks = "0xb47e3cd837ddf8e4c57f05d70ab865de6e193bbb"
"#;

	#[test]
	fn minimal_config_gets_defaults() {
		let config = ConfigLoader::from_toml(MINIMAL).unwrap();
		assert_eq!(config.indexer.name, "nft-indexer");
		assert_eq!(config.workers.order_info_concurrency, 4);
		assert_eq!(config.expiry.interval_secs, 60);
		assert!(!config.indexer.backfill);
	}

	#[test]
	fn zero_concurrency_is_rejected() {
		let toml = format!("{MINIMAL}\n[workers]\norder_info_concurrency = 0\n");
		let result = ConfigLoader::from_toml(&toml);
		assert!(matches!(result, Err(ConfigError::ValidationError(_))));
	}

	#[test]
	fn sources_and_rates_parse() {
		let toml = format!(
			r#"{MINIMAL}
[sources]
looks-rare = "looksrare.org"
wyvern = "opensea.io"

[[prices]]
currency = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"
numerator = 1
denominator = 1
"#
		);
		let config = ConfigLoader::from_toml(&toml).unwrap();
		assert_eq!(
			config.sources.get("looks-rare").map(String::as_str),
			Some("looksrare.org")
		);
		assert_eq!(config.prices.len(), 1);
	}

	#[test]
	fn missing_substitution_variable_is_an_error() {
		let loader = ConfigLoader::new();
		let result =
			loader.substitute_env_vars("weth = \"${DEFINITELY_UNSET_VARIABLE_12345}\"");
		assert!(matches!(result, Err(ConfigError::EnvVarNotFound(_))));
	}
}
