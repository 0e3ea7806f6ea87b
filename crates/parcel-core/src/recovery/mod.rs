//! Reconciliation of order records with ledger ownership.
//!
//! A crash between a confirmed ledger operation and the store write that
//! follows it leaves the two disagreeing. The reconciliation pass walks every
//! open order, asks the contract who owns its token and repairs the record
//! where the ledger is authoritative.

use crate::contract::ContractError;
use crate::workflow::{OrderFulfillmentWorkflow, WorkflowError};
use parcel_types::{truncate_id, Order, TokenHolder, WorkflowEvent};
use tracing::instrument;

/// Outcome of one reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconciliationReport {
	/// Orders compared with the ledger.
	pub examined: usize,
	/// Orders whose ledger state matched the record.
	pub consistent: usize,
	/// Customer-held tokens recorded as undelivered, now marked delivered.
	pub marked_delivered: usize,
	/// Orders whose token no longer exists, now marked canceled.
	pub marked_canceled: usize,
	/// Delivered orders whose token is back with the vendor; left untouched.
	pub inconsistent: Vec<String>,
	/// Orders that could not be checked or repaired.
	pub failed: usize,
}

enum Repair {
	None,
	MarkDelivered,
	MarkCanceled,
	Flag,
}

impl OrderFulfillmentWorkflow {
	/// Compares every order that is not canceled with the ledger and repairs
	/// what the ledger proves.
	///
	/// Failures on individual orders are counted and do not stop the pass;
	/// only failing to list the orders is an error.
	#[instrument(skip_all)]
	pub async fn reconcile(&self) -> Result<ReconciliationReport, WorkflowError> {
		let orders = self.orders.list_orders().await?;
		let mut report = ReconciliationReport::default();

		for order in orders.into_iter().filter(|order| !order.canceled) {
			report.examined += 1;
			let short_id = truncate_id(&order.order_id);

			let repair = match self.assess(&order).await {
				Ok(repair) => repair,
				Err(e) => {
					tracing::warn!(order_id = %short_id, error = %e, "Could not check order against ledger");
					report.failed += 1;
					continue;
				}
			};

			let result = match repair {
				Repair::None => {
					report.consistent += 1;
					Ok(())
				}
				Repair::Flag => {
					tracing::warn!(order_id = %short_id, "Delivered order's token is held by the vendor");
					report.inconsistent.push(order.order_id.clone());
					Ok(())
				}
				Repair::MarkDelivered => self
					.orders
					.mark_order_delivered(&order.order_id)
					.await
					.map(|_| {
						report.marked_delivered += 1;
						self.repaired(&order, "marked_delivered");
					}),
				Repair::MarkCanceled => self
					.orders
					.mark_order_canceled(&order.order_id)
					.await
					.map(|_| {
						report.marked_canceled += 1;
						self.repaired(&order, "marked_canceled");
					}),
			};
			if let Err(e) = result {
				tracing::warn!(order_id = %short_id, error = %e, "Could not repair order");
				report.failed += 1;
			}
		}

		tracing::info!(
			examined = report.examined,
			marked_delivered = report.marked_delivered,
			marked_canceled = report.marked_canceled,
			inconsistent = report.inconsistent.len(),
			failed = report.failed,
			"Reconciliation finished"
		);
		Ok(report)
	}

	async fn assess(&self, order: &Order) -> Result<Repair, ContractError> {
		match self.contracts.get_owner(order.token_id).await {
			Ok(owner) => Ok(match (self.holder_of(owner), order.delivered) {
				(TokenHolder::Customer, false) => Repair::MarkDelivered,
				(TokenHolder::Vendor, true) => Repair::Flag,
				_ => Repair::None,
			}),
			Err(ContractError::TokenNotFound(_)) => Ok(Repair::MarkCanceled),
			Err(e) => Err(e),
		}
	}

	fn repaired(&self, order: &Order, action: &str) {
		tracing::info!(order_id = %truncate_id(&order.order_id), action, "Order repaired");
		self.event_bus
			.publish(WorkflowEvent::OrderRepaired {
				order_id: order.order_id.clone(),
				action: action.to_string(),
			})
			.ok();
	}
}
