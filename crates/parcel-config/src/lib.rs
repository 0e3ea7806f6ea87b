//! Configuration module for the parcel fulfillment service.
//!
//! This module provides the configuration structure that is injected into the
//! orchestrator and the workflow at construction time. Configuration is loaded
//! once from a TOML file at process start; `${VAR}` and `${VAR:-default}`
//! references are resolved from the environment before parsing so that secrets
//! such as the vendor key never have to be written to disk.

#[cfg(any(test, feature = "testing"))]
pub mod builders {
	pub mod config;
}

use alloy_primitives::Address;
use once_cell::sync::Lazy;
use parcel_types::SecretString;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, drop the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Ledger node connection and gas settings.
	pub node: NodeConfig,
	/// Vendor signer.
	pub vendor: VendorConfig,
	/// Delivery contract location or deployment source.
	#[serde(default)]
	pub contract: ContractConfig,
	/// Confirmation polling settings.
	#[serde(default)]
	pub confirmation: ConfirmationConfig,
	/// Retry policies for the operations that retry.
	#[serde(default)]
	pub retry: RetryConfig,
	/// Order store backend.
	pub storage: StorageConfig,
	/// Items that can be ordered.
	pub catalog: CatalogConfig,
	/// HTTP API server.
	#[serde(default)]
	pub api: ApiConfig,
	/// Ledger/local-record reconciliation.
	#[serde(default)]
	pub reconciliation: ReconciliationConfig,
}

/// Ledger node connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
	/// HTTP JSON-RPC endpoint of the ledger node.
	pub rpc_url: String,
	/// Chain id used when signing. Queried from the node when absent.
	pub chain_id: Option<u64>,
	/// Gas limit attached to every transaction.
	#[serde(default = "default_gas_limit")]
	pub gas_limit: u64,
	/// Fixed gas price in wei. The node's suggestion is used when absent.
	pub gas_price: Option<u64>,
}

fn default_gas_limit() -> u64 {
	3_000_000
}

/// Vendor signer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VendorConfig {
	/// Hex encoded secp256k1 secret, with or without `0x`.
	pub private_key: SecretString,
}

/// Delivery contract configuration.
///
/// Either an existing contract `address` or creation bytecode must be
/// provided. When only bytecode is given the contract is deployed on startup,
/// or lazily by the first mint when `deploy_on_startup` is false.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContractConfig {
	/// Address of an already deployed contract.
	pub address: Option<Address>,
	/// Hex encoded creation bytecode.
	pub bytecode: Option<String>,
	/// File containing hex encoded creation bytecode.
	pub bytecode_path: Option<PathBuf>,
	/// Deploy during startup when no address is configured.
	#[serde(default = "default_true")]
	pub deploy_on_startup: bool,
}

fn default_true() -> bool {
	true
}

impl ContractConfig {
	/// Returns true when the contract can be deployed from configuration.
	pub fn has_bytecode(&self) -> bool {
		self.bytecode.is_some() || self.bytecode_path.is_some()
	}
}

/// Confirmation polling settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfirmationConfig {
	/// Wall-clock deadline of a confirmation wait.
	#[serde(default = "default_confirmation_timeout")]
	pub timeout_seconds: u64,
	/// Fixed interval between receipt polls.
	#[serde(default = "default_poll_interval")]
	pub poll_interval_seconds: u64,
}

fn default_confirmation_timeout() -> u64 {
	30
}

fn default_poll_interval() -> u64 {
	2
}

impl Default for ConfirmationConfig {
	fn default() -> Self {
		Self {
			timeout_seconds: default_confirmation_timeout(),
			poll_interval_seconds: default_poll_interval(),
		}
	}
}

impl ConfirmationConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_seconds)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_secs(self.poll_interval_seconds)
	}
}

/// Retry policies of the retrying operations.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RetryConfig {
	/// Lookup of the token id assigned to a freshly minted order.
	#[serde(default)]
	pub token_lookup: RetryPolicyConfig,
	/// Submission of the mint transaction.
	#[serde(default)]
	pub mint_submission: RetryPolicyConfig,
}

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategyKind {
	/// Same pause before every attempt.
	#[default]
	Fixed,
	/// Pause multiplied after every attempt, capped at `max_interval_seconds`.
	Exponential,
}

/// A single retry policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryPolicyConfig {
	/// Total attempts including the first one.
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	/// Pause before the second attempt.
	#[serde(default = "default_retry_interval")]
	pub interval_seconds: u64,
	#[serde(default)]
	pub strategy: RetryStrategyKind,
	/// Growth factor for the exponential strategy.
	#[serde(default = "default_multiplier")]
	pub multiplier: f64,
	/// Upper bound of a single pause for the exponential strategy.
	#[serde(default = "default_max_interval")]
	pub max_interval_seconds: u64,
}

fn default_max_attempts() -> u32 {
	5
}

fn default_retry_interval() -> u64 {
	2
}

fn default_multiplier() -> f64 {
	2.0
}

fn default_max_interval() -> u64 {
	30
}

impl Default for RetryPolicyConfig {
	fn default() -> Self {
		Self {
			max_attempts: default_max_attempts(),
			interval_seconds: default_retry_interval(),
			strategy: RetryStrategyKind::default(),
			multiplier: default_multiplier(),
			max_interval_seconds: default_max_interval(),
		}
	}
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Items that can be ordered, keyed by item id.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
	pub items: HashMap<String, CatalogItem>,
}

impl CatalogConfig {
	pub fn get(&self, item_id: &str) -> Option<&CatalogItem> {
		self.items.get(item_id)
	}
}

/// A single catalog entry. Prices are in the smallest ledger unit.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogItem {
	pub name: String,
	pub price: u64,
	pub delivery_price: u64,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	8080
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			host: default_api_host(),
			port: default_api_port(),
		}
	}
}

/// Reconciliation of ledger ownership against local order records.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReconciliationConfig {
	/// Run one reconciliation pass before serving requests.
	#[serde(default)]
	pub on_startup: bool,
}

static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.expect("environment variable pattern is valid")
});

/// Resolves `${VAR}` and `${VAR:-default}` references from the environment.
///
/// A reference without a default whose variable is unset is an error.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let mut result = String::with_capacity(input.len());
	let mut last = 0;

	for cap in ENV_VAR_PATTERN.captures_iter(input) {
		let Some(full_match) = cap.get(0) else {
			continue;
		};
		let var_name = &cap[1];
		let value = match std::env::var(var_name) {
			Ok(value) => value,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)))
				}
			},
		};

		result.push_str(&input[last..full_match.start()]);
		result.push_str(&value);
		last = full_match.end();
	}
	result.push_str(&input[last..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, resolving environment references.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path).await?;
		content.parse()
	}

	/// Reads the contract creation bytecode, if any is configured.
	///
	/// Inline bytecode takes precedence over `bytecode_path`.
	pub async fn load_bytecode(&self) -> Result<Option<String>, ConfigError> {
		if let Some(bytecode) = &self.contract.bytecode {
			return Ok(Some(bytecode.trim().to_string()));
		}
		match &self.contract.bytecode_path {
			Some(path) => {
				let content = tokio::fs::read_to_string(path).await?;
				Ok(Some(content.trim().to_string()))
			}
			None => Ok(None),
		}
	}

	/// Validates the configuration.
	///
	/// Checks that the node endpoint and vendor key are present, that
	/// polling and retry settings can make progress, that the contract can be
	/// located or deployed, that the primary storage backend is configured and
	/// that the catalog has at least one sellable item.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.node.rpc_url.trim().is_empty() {
			return Err(ConfigError::Validation(
				"node.rpc_url cannot be empty".into(),
			));
		}
		if self.node.gas_limit == 0 {
			return Err(ConfigError::Validation(
				"node.gas_limit must be greater than 0".into(),
			));
		}
		if self.vendor.private_key.is_empty() {
			return Err(ConfigError::Validation(
				"vendor.private_key cannot be empty".into(),
			));
		}

		if self.contract.address.is_none() && !self.contract.has_bytecode() {
			return Err(ConfigError::Validation(
				"Either contract.address or contract bytecode must be configured".into(),
			));
		}

		let confirmation = &self.confirmation;
		if confirmation.timeout_seconds == 0 || confirmation.poll_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Confirmation timeout and poll interval must be greater than 0".into(),
			));
		}
		if confirmation.poll_interval_seconds > confirmation.timeout_seconds {
			return Err(ConfigError::Validation(format!(
				"Confirmation poll interval ({}s) exceeds timeout ({}s)",
				confirmation.poll_interval_seconds, confirmation.timeout_seconds
			)));
		}

		for (name, policy) in [
			("token_lookup", &self.retry.token_lookup),
			("mint_submission", &self.retry.mint_submission),
		] {
			if policy.max_attempts == 0 {
				return Err(ConfigError::Validation(format!(
					"retry.{}.max_attempts must be at least 1",
					name
				)));
			}
			let multiplier = policy.multiplier;
			if policy.strategy == RetryStrategyKind::Exponential
				&& (!multiplier.is_finite() || multiplier < 1.0)
			{
				return Err(ConfigError::Validation(format!(
					"retry.{}.multiplier must be a finite number of at least 1.0",
					name
				)));
			}
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		if self.catalog.items.is_empty() {
			return Err(ConfigError::Validation(
				"Catalog must contain at least one item".into(),
			));
		}
		for (item_id, item) in &self.catalog.items {
			if item.name.trim().is_empty() {
				return Err(ConfigError::Validation(format!(
					"Catalog item '{}' has an empty name",
					item_id
				)));
			}
		}

		Ok(())
	}
}

/// Parses and validates a configuration string.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
