//! Event types published by the fulfillment workflow.
//!
//! Events flow through an event bus so that observers (logging, metrics,
//! tests) can react to order transitions without the workflow knowing them.

use alloy_primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};

/// Events emitted while an order moves through its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowEvent {
	/// A delivery token was minted and the order record persisted.
	OrderCreated {
		order_id: String,
		token_id: U256,
		contract_address: Address,
	},
	/// The customer paid and now holds the token.
	OrderDelivered { order_id: String, buy_tx: TxHash },
	/// Releasing escrowed funds to the vendor failed after delivery.
	///
	/// Delivery is still reported as successful to the customer; this event
	/// is the only place the failure surfaces besides the log.
	VendorPaymentFailed {
		order_id: String,
		token_id: U256,
		error: String,
	},
	/// The token was burned and the order recorded as canceled.
	OrderCanceled { order_id: String },
	/// Reconciliation changed the local record to match the ledger.
	OrderRepaired { order_id: String, action: String },
}

impl WorkflowEvent {
	/// Order the event relates to.
	pub fn order_id(&self) -> &str {
		match self {
			WorkflowEvent::OrderCreated { order_id, .. }
			| WorkflowEvent::OrderDelivered { order_id, .. }
			| WorkflowEvent::VendorPaymentFailed { order_id, .. }
			| WorkflowEvent::OrderCanceled { order_id }
			| WorkflowEvent::OrderRepaired { order_id, .. } => order_id,
		}
	}
}
