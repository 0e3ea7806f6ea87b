//! Core of the parcel delivery-token service.
//!
//! Ties the delivery layer and the order store together:
//!
//! - [`contract::ContractOrchestrator`] runs the delivery-token contract's
//!   operations (deploy, mint, buy, vendor payment, burn, owner lookup).
//! - [`workflow::OrderFulfillmentWorkflow`] sequences those operations and
//!   the order store into create, deliver and cancel, and reconciles records
//!   with the ledger.
//! - [`builder::ParcelBuilder`] assembles both from configuration.

use crate::event_bus::EventBus;
use crate::recovery::ReconciliationReport;
use crate::workflow::{OrderFulfillmentWorkflow, WorkflowError};
use parcel_config::Config;
use std::sync::Arc;

pub mod builder;
pub mod contract;
pub mod event_bus;
pub mod recovery;
pub mod workflow;

#[cfg(test)]
pub(crate) mod simulation;

/// A fully wired service instance.
pub struct ParcelEngine {
	config: Config,
	workflow: Arc<OrderFulfillmentWorkflow>,
	event_bus: EventBus,
}

impl ParcelEngine {
	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn workflow(&self) -> &Arc<OrderFulfillmentWorkflow> {
		&self.workflow
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	/// Startup tasks: deploys the contract when configured to and, if
	/// enabled, runs a reconciliation pass.
	///
	/// Returns the reconciliation report when a pass ran.
	pub async fn initialize(&self) -> Result<Option<ReconciliationReport>, WorkflowError> {
		let contracts = self.workflow.contracts();
		match contracts.contract_address().await {
			Some(address) => tracing::info!(contract = %address, "Using delivery contract"),
			None if self.config.contract.deploy_on_startup => {
				contracts.ensure_deployed().await?;
			}
			None => tracing::info!("Delivery contract will be deployed by the first mint"),
		}

		if !self.config.reconciliation.on_startup {
			return Ok(None);
		}
		self.workflow.reconcile().await.map(Some)
	}
}
