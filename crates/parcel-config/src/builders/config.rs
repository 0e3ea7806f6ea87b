//! Configuration builder for tests.
//!
//! Produces a `Config` pointing at a local node with an in-memory order store
//! and a one-item catalog, without going through TOML.

use crate::{
	ApiConfig, CatalogConfig, CatalogItem, Config, ConfirmationConfig, ContractConfig,
	NodeConfig, ReconciliationConfig, RetryConfig, RetryPolicyConfig, StorageConfig,
	VendorConfig,
};
use alloy_primitives::Address;
use parcel_types::SecretString;
use std::collections::HashMap;

/// Well-known development key (first account of a local dev node).
pub const TEST_VENDOR_KEY: &str =
	"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	rpc_url: String,
	chain_id: Option<u64>,
	gas_price: Option<u64>,
	vendor_key: String,
	contract_address: Option<Address>,
	bytecode: Option<String>,
	confirmation: ConfirmationConfig,
	retry: RetryConfig,
	reconcile_on_startup: bool,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			rpc_url: "http://localhost:8545".to_string(),
			chain_id: Some(31337),
			gas_price: Some(0),
			vendor_key: TEST_VENDOR_KEY.to_string(),
			contract_address: Some(Address::repeat_byte(0xde)),
			bytecode: None,
			confirmation: ConfirmationConfig::default(),
			retry: RetryConfig::default(),
			reconcile_on_startup: false,
		}
	}

	pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
		self.rpc_url = url.into();
		self
	}

	pub fn chain_id(mut self, chain_id: Option<u64>) -> Self {
		self.chain_id = chain_id;
		self
	}

	pub fn gas_price(mut self, gas_price: Option<u64>) -> Self {
		self.gas_price = gas_price;
		self
	}

	pub fn vendor_key(mut self, key: impl Into<String>) -> Self {
		self.vendor_key = key.into();
		self
	}

	/// Sets the deployed contract address; `None` forces deployment.
	pub fn contract_address(mut self, address: Option<Address>) -> Self {
		self.contract_address = address;
		self
	}

	pub fn bytecode(mut self, bytecode: impl Into<String>) -> Self {
		self.bytecode = Some(bytecode.into());
		self
	}

	/// Sets the confirmation deadline and poll interval in seconds.
	pub fn confirmation(mut self, timeout_seconds: u64, poll_interval_seconds: u64) -> Self {
		self.confirmation = ConfirmationConfig {
			timeout_seconds,
			poll_interval_seconds,
		};
		self
	}

	pub fn token_lookup_retry(mut self, policy: RetryPolicyConfig) -> Self {
		self.retry.token_lookup = policy;
		self
	}

	pub fn mint_submission_retry(mut self, policy: RetryPolicyConfig) -> Self {
		self.retry.mint_submission = policy;
		self
	}

	pub fn reconcile_on_startup(mut self, enabled: bool) -> Self {
		self.reconcile_on_startup = enabled;
		self
	}

	pub fn build(self) -> Config {
		let mut implementations = HashMap::new();
		implementations.insert(
			"memory".to_string(),
			toml::Value::Table(toml::map::Map::new()),
		);

		let mut items = HashMap::new();
		items.insert(
			"sock-1".to_string(),
			CatalogItem {
				name: "socks".to_string(),
				price: 500,
				delivery_price: 75,
			},
		);

		Config {
			node: NodeConfig {
				rpc_url: self.rpc_url,
				chain_id: self.chain_id,
				gas_limit: 3_000_000,
				gas_price: self.gas_price,
			},
			vendor: VendorConfig {
				private_key: SecretString::new(self.vendor_key),
			},
			contract: ContractConfig {
				address: self.contract_address,
				bytecode: self.bytecode,
				bytecode_path: None,
				deploy_on_startup: true,
			},
			confirmation: self.confirmation,
			retry: self.retry,
			storage: StorageConfig {
				primary: "memory".to_string(),
				implementations,
			},
			catalog: CatalogConfig { items },
			api: ApiConfig::default(),
			reconciliation: ReconciliationConfig {
				on_startup: self.reconcile_on_startup,
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_built_config_passes_validation() {
		let config = ConfigBuilder::new().build();
		assert!(config.validate().is_ok());
		assert_eq!(config.storage.primary, "memory");
	}

	#[test]
	fn test_builder_without_contract_source_fails_validation() {
		let config = ConfigBuilder::new().contract_address(None).build();
		assert!(config.validate().is_err());

		let config = ConfigBuilder::new()
			.contract_address(None)
			.bytecode("0x6080")
			.build();
		assert!(config.validate().is_ok());
	}
}
