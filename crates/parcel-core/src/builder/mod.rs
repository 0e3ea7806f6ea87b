//! Builder wiring configuration into a [`ParcelEngine`].
//!
//! Storage backends are created through factory functions keyed by the
//! implementation names used in `[storage.implementations]`; the ledger
//! handle is supplied by the caller so tests can substitute an in-process
//! node.

use crate::contract::{ContractOrchestrator, OrchestratorPolicies};
use crate::event_bus::EventBus;
use crate::workflow::OrderFulfillmentWorkflow;
use crate::ParcelEngine;
use alloy_primitives::Bytes;
use parcel_account::SignerKey;
use parcel_config::{Config, RetryPolicyConfig, RetryStrategyKind};
use parcel_delivery::{CancelSignal, DeliveryService, GasSettings, LedgerInterface, RetryPolicy};
use parcel_storage::{StorageError, StorageInterface, StorageOrderRepository, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while building the engine.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for pluggable components.
pub struct ParcelFactories<SF> {
	pub storage_factories: HashMap<String, SF>,
}

/// Builds a [`ParcelEngine`] from configuration.
pub struct ParcelBuilder {
	config: Config,
}

/// Converts a configured retry policy.
pub fn retry_policy(config: &RetryPolicyConfig) -> RetryPolicy {
	let interval = Duration::from_secs(config.interval_seconds);
	match config.strategy {
		RetryStrategyKind::Fixed => RetryPolicy::fixed(config.max_attempts, interval),
		RetryStrategyKind::Exponential => RetryPolicy::exponential(
			config.max_attempts,
			interval,
			config.multiplier,
			Duration::from_secs(config.max_interval_seconds),
		),
	}
}

impl ParcelBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine over `ledger`.
	///
	/// `cancel` ends every confirmation wait and retry pause of the built
	/// engine once it fires.
	pub async fn build<SF>(
		self,
		ledger: Arc<dyn LedgerInterface>,
		factories: ParcelFactories<SF>,
		cancel: CancelSignal,
	) -> Result<ParcelEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		let config = self.config;

		let primary = &config.storage.primary;
		let storage_config = config.storage.implementations.get(primary).ok_or_else(|| {
			BuilderError::Config(format!("Primary storage '{}' is not configured", primary))
		})?;
		let factory = factories.storage_factories.get(primary).ok_or_else(|| {
			BuilderError::MissingComponent(format!("storage implementation '{}'", primary))
		})?;
		let backend = factory(storage_config).map_err(|e| {
			tracing::error!(component = "storage", implementation = %primary, error = %e, "Failed to create storage implementation");
			BuilderError::Config(format!(
				"Failed to create storage implementation '{}': {}",
				primary, e
			))
		})?;
		tracing::info!(component = "storage", implementation = %primary, "Loaded");
		let storage = Arc::new(StorageService::new(backend));

		let vendor = SignerKey::from_secret(&config.vendor.private_key)
			.map_err(|e| BuilderError::Config(format!("vendor.private_key: {}", e)))?;
		tracing::info!(component = "account", address = %vendor.address(), "Loaded vendor signer");

		let bytecode = match config
			.load_bytecode()
			.await
			.map_err(|e| BuilderError::Config(e.to_string()))?
		{
			Some(hex) => Some(hex.parse::<Bytes>().map_err(|e| {
				BuilderError::Config(format!("Contract bytecode is not valid hex: {}", e))
			})?),
			None => None,
		};

		let delivery = Arc::new(DeliveryService::new(
			ledger,
			GasSettings {
				gas_limit: config.node.gas_limit,
				gas_price: config.node.gas_price.map(u128::from),
				chain_id: config.node.chain_id,
			},
			config.confirmation.timeout(),
			config.confirmation.poll_interval(),
		));

		let contracts = Arc::new(ContractOrchestrator::new(
			delivery,
			vendor,
			config.contract.address,
			bytecode,
			OrchestratorPolicies {
				mint_submission: retry_policy(&config.retry.mint_submission),
				token_lookup: retry_policy(&config.retry.token_lookup),
			},
			cancel,
		));

		let event_bus = EventBus::new(1000);
		let workflow = Arc::new(OrderFulfillmentWorkflow::new(
			Arc::clone(&contracts),
			Arc::new(StorageOrderRepository::new(storage)),
			event_bus.clone(),
		));

		Ok(ParcelEngine {
			config,
			workflow,
			event_bus,
		})
	}
}
