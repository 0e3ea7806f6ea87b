//! Order fulfillment workflow.
//!
//! Sequences contract operations and order-store writes into the order
//! lifecycle: created, then either delivered or canceled. Ledger operations
//! and store writes are not transactionally coupled; a crash between them
//! leaves a discrepancy that [`reconcile`](OrderFulfillmentWorkflow::reconcile)
//! repairs.

use crate::contract::{ContractError, ContractOrchestrator};
use crate::event_bus::EventBus;
use alloy_primitives::{Address, U256};
use parcel_account::SignerKey;
use parcel_storage::{OrderRepository, StorageError};
use parcel_types::{truncate_id, Order, OwnershipReport, Purchase, TokenHolder, WorkflowEvent};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors returned by workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
	#[error("Invalid input: {0}")]
	InvalidInput(String),
	#[error("Order ID [{0}] does not exist")]
	OrderNotFound(String),
	#[error("Order ID [{0}] not found or already delivered")]
	NotDeliverable(String),
	#[error("Order ID [{0}] has already been delivered and cannot be canceled")]
	AlreadyDelivered(String),
	#[error(transparent)]
	Contract(#[from] ContractError),
	#[error("Order store error: {0}")]
	Storage(#[from] StorageError),
}

/// Input of [`OrderFulfillmentWorkflow::create`].
#[derive(Debug, Clone)]
pub struct NewOrder {
	pub item_id: String,
	pub item_name: String,
	pub price: U256,
	pub delivery_price: U256,
	pub buyer: Address,
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedOrder {
	pub order_id: String,
	pub token_id: U256,
	pub contract_address: Address,
}

/// Drives orders through create, deliver and cancel.
pub struct OrderFulfillmentWorkflow {
	pub(crate) contracts: Arc<ContractOrchestrator>,
	pub(crate) orders: Arc<dyn OrderRepository>,
	pub(crate) event_bus: EventBus,
}

impl OrderFulfillmentWorkflow {
	pub fn new(
		contracts: Arc<ContractOrchestrator>,
		orders: Arc<dyn OrderRepository>,
		event_bus: EventBus,
	) -> Self {
		Self {
			contracts,
			orders,
			event_bus,
		}
	}

	pub fn contracts(&self) -> &Arc<ContractOrchestrator> {
		&self.contracts
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	/// Mints a delivery token for a new order and persists the order.
	///
	/// Nothing is written when minting fails.
	#[instrument(skip_all, fields(item_id = %new_order.item_id))]
	pub async fn create(&self, new_order: NewOrder) -> Result<CreatedOrder, WorkflowError> {
		if new_order.buyer == Address::ZERO {
			return Err(WorkflowError::InvalidInput(
				"buyer address must not be the zero address".to_string(),
			));
		}

		let order_id = uuid::Uuid::new_v4().to_string();
		let minted = self
			.contracts
			.mint(&Purchase {
				order_id: order_id.clone(),
				purchase_price: new_order.price,
				delivery_price: new_order.delivery_price,
				recipient: new_order.buyer,
			})
			.await?;

		let order = Order {
			order_id: order_id.clone(),
			item_id: new_order.item_id,
			item_name: new_order.item_name,
			price: new_order.price,
			delivery_price: new_order.delivery_price,
			token_address: minted.contract_address,
			token_id: minted.token_id,
			delivered: false,
			canceled: false,
			created_at: chrono::Utc::now(),
		};
		if let Err(e) = self.orders.create_order(&order).await {
			tracing::error!(
				order_id = %truncate_id(&order_id),
				token_id = %minted.token_id,
				error = %e,
				"Token minted but order could not be stored"
			);
			return Err(e.into());
		}

		tracing::info!(order_id = %truncate_id(&order_id), token_id = %minted.token_id, "Order created");
		self.event_bus
			.publish(WorkflowEvent::OrderCreated {
				order_id: order_id.clone(),
				token_id: minted.token_id,
				contract_address: minted.contract_address,
			})
			.ok();

		Ok(CreatedOrder {
			order_id,
			token_id: minted.token_id,
			contract_address: minted.contract_address,
		})
	}

	/// Sells the order's token to the customer and pays the vendor.
	///
	/// Once the purchase is confirmed the order is delivered: a failed
	/// vendor payment is logged and published as
	/// [`WorkflowEvent::VendorPaymentFailed`] but not returned.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn deliver(&self, order_id: &str, customer: &SignerKey) -> Result<(), WorkflowError> {
		let order = self
			.orders
			.get_order(order_id)
			.await?
			.filter(|order| !order.is_final())
			.ok_or_else(|| WorkflowError::NotDeliverable(order_id.to_string()))?;

		let receipt = self
			.contracts
			.buy(order.token_id, customer, order.total_price())
			.await?;

		if let Err(e) = self.contracts.pay_vendor(order.token_id).await {
			tracing::error!(token_id = %order.token_id, error = %e, "Vendor payment failed");
			self.event_bus
				.publish(WorkflowEvent::VendorPaymentFailed {
					order_id: order_id.to_string(),
					token_id: order.token_id,
					error: e.to_string(),
				})
				.ok();
		}

		self.orders.mark_order_delivered(order_id).await?;

		tracing::info!("Order delivered");
		self.event_bus
			.publish(WorkflowEvent::OrderDelivered {
				order_id: order_id.to_string(),
				buy_tx: receipt.hash,
			})
			.ok();
		Ok(())
	}

	/// Burns the order's token and records the order as canceled.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn cancel(&self, order_id: &str) -> Result<(), WorkflowError> {
		let order = self
			.orders
			.get_order(order_id)
			.await?
			.filter(|order| !order.canceled)
			.ok_or_else(|| WorkflowError::OrderNotFound(order_id.to_string()))?;
		if order.delivered {
			return Err(WorkflowError::AlreadyDelivered(order_id.to_string()));
		}

		// Fails with TokenNotFound when the token is already gone
		self.contracts.get_owner(order.token_id).await?;
		self.contracts.burn(order_id).await?;
		self.orders.mark_order_canceled(order_id).await?;

		tracing::info!("Order canceled");
		self.event_bus
			.publish(WorkflowEvent::OrderCanceled {
				order_id: order_id.to_string(),
			})
			.ok();
		Ok(())
	}

	/// Compares ledger ownership of the order's token with the local record.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn get_owner(&self, order_id: &str) -> Result<OwnershipReport, WorkflowError> {
		let order = self
			.orders
			.get_order(order_id)
			.await?
			.ok_or_else(|| WorkflowError::OrderNotFound(order_id.to_string()))?;

		let owner = self.contracts.get_owner(order.token_id).await?;
		let report = OwnershipReport {
			order_id: order.order_id,
			owner,
			holder: self.holder_of(owner),
			recorded_delivered: order.delivered,
		};
		if !report.is_consistent() {
			tracing::warn!(
				holder = %report.holder,
				recorded_delivered = report.recorded_delivered,
				"Ledger ownership disagrees with order record"
			);
		}
		Ok(report)
	}

	pub(crate) fn holder_of(&self, owner: Address) -> TokenHolder {
		if owner == self.contracts.vendor_address() {
			TokenHolder::Vendor
		} else {
			TokenHolder::Customer
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::Bytes;
	use crate::simulation::{orchestrator, SimulatedContract};
	use parcel_delivery::implementations::mock::MockOutcome;
	use parcel_delivery::DeliveryError;
	use parcel_storage::implementations::memory::MemoryStorage;
	use parcel_storage::{MockOrderRepository, StorageOrderRepository, StorageService};

	struct Harness {
		sim: SimulatedContract,
		orders: Arc<StorageOrderRepository>,
		workflow: OrderFulfillmentWorkflow,
	}

	fn harness() -> Harness {
		let sim = SimulatedContract::deployed();
		let orders = Arc::new(StorageOrderRepository::new(Arc::new(StorageService::new(
			Box::new(MemoryStorage::new()),
		))));
		let workflow = OrderFulfillmentWorkflow::new(
			Arc::new(orchestrator(&sim)),
			orders.clone(),
			EventBus::new(16),
		);
		Harness {
			sim,
			orders,
			workflow,
		}
	}

	fn socks() -> NewOrder {
		NewOrder {
			item_id: "sock-1".to_string(),
			item_name: "socks".to_string(),
			price: U256::from(500),
			delivery_price: U256::from(75),
			buyer: Address::repeat_byte(0xab),
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_create_persists_undelivered_order() {
		let h = harness();
		let mut events = h.workflow.event_bus().subscribe();

		let created = h.workflow.create(socks()).await.unwrap();

		let order = h.orders.get_order(&created.order_id).await.unwrap().unwrap();
		assert!(!order.delivered);
		assert_eq!(order.token_id, created.token_id);
		assert_eq!(order.token_address, created.contract_address);
		assert_eq!(order.total_price(), U256::from(575));
		assert!(uuid::Uuid::parse_str(&created.order_id).is_ok());
		assert!(matches!(
			events.recv().await.unwrap(),
			WorkflowEvent::OrderCreated { .. }
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_failed_mint_writes_nothing() {
		let sim = SimulatedContract::deployed();
		sim.ledger
			.on_transaction(|_| MockOutcome::Revert("mint disabled".to_string()));
		let mut orders = MockOrderRepository::new();
		orders.expect_create_order().times(0);
		let workflow = OrderFulfillmentWorkflow::new(
			Arc::new(orchestrator(&sim)),
			Arc::new(orders),
			EventBus::new(16),
		);

		let err = workflow.create(socks()).await.unwrap_err();
		assert!(matches!(
			err,
			WorkflowError::Contract(ContractError::Delivery(DeliveryError::TransactionFailed(_)))
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_deliver_happy_path() {
		let h = harness();
		let created = h.workflow.create(socks()).await.unwrap();
		let customer = SignerKey::random();

		h.workflow.deliver(&created.order_id, &customer).await.unwrap();

		assert!(h.orders.get_order(&created.order_id).await.unwrap().unwrap().delivered);
		let token = h.sim.token(created.token_id).unwrap();
		assert_eq!(token.owner, customer.address());
		assert!(token.withdrawn);

		let report = h.workflow.get_owner(&created.order_id).await.unwrap();
		assert_eq!(report.holder, TokenHolder::Customer);
		assert!(report.is_consistent());
	}

	#[tokio::test(start_paused = true)]
	async fn test_vendor_payment_failure_is_swallowed() {
		let h = harness();
		let created = h.workflow.create(socks()).await.unwrap();
		let mut events = h.workflow.event_bus().subscribe();

		// Let the purchase through, then fail the withdrawal at the node
		let customer = SignerKey::random();
		let customer_address = customer.address();
		let sent_before = h.sim.ledger.transactions().len();
		h.sim.ledger.on_transaction(move |intent| {
			if intent.sender == customer_address {
				MockOutcome::Success
			} else {
				MockOutcome::Reject("node error".to_string())
			}
		});

		h.workflow.deliver(&created.order_id, &customer).await.unwrap();

		assert!(h.orders.get_order(&created.order_id).await.unwrap().unwrap().delivered);
		// Only the purchase reached the ledger
		assert_eq!(h.sim.ledger.transactions().len(), sent_before + 1);
		let mut saw_failure = false;
		while let Ok(event) = events.try_recv() {
			if matches!(event, WorkflowEvent::VendorPaymentFailed { .. }) {
				saw_failure = true;
			}
		}
		assert!(saw_failure);
	}

	#[tokio::test(start_paused = true)]
	async fn test_second_deliver_rejected_without_ledger_calls() {
		let h = harness();
		let created = h.workflow.create(socks()).await.unwrap();
		let customer = SignerKey::random();
		h.workflow.deliver(&created.order_id, &customer).await.unwrap();
		let requests = h.sim.ledger.total_requests();

		let err = h
			.workflow
			.deliver(&created.order_id, &customer)
			.await
			.unwrap_err();

		assert!(matches!(err, WorkflowError::NotDeliverable(_)));
		assert!(err.to_string().contains("not found or already delivered"));
		assert_eq!(h.sim.ledger.total_requests(), requests);
	}

	#[tokio::test]
	async fn test_deliver_unknown_order_touches_only_the_store() {
		let sim = SimulatedContract::deployed();
		let mut orders = MockOrderRepository::new();
		orders
			.expect_get_order()
			.times(1)
			.returning(|_| Ok(None));
		orders.expect_mark_order_delivered().times(0);
		let workflow = OrderFulfillmentWorkflow::new(
			Arc::new(orchestrator(&sim)),
			Arc::new(orders),
			EventBus::new(16),
		);

		let err = workflow
			.deliver("missing", &SignerKey::random())
			.await
			.unwrap_err();
		assert!(matches!(err, WorkflowError::NotDeliverable(_)));
		assert_eq!(sim.ledger.total_requests(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_failed_buy_leaves_order_undelivered() {
		let h = harness();
		let created = h.workflow.create(socks()).await.unwrap();
		h.sim
			.ledger
			.on_transaction(|_| MockOutcome::Revert("insufficient payment".to_string()));

		let err = h
			.workflow
			.deliver(&created.order_id, &SignerKey::random())
			.await
			.unwrap_err();

		assert!(matches!(err, WorkflowError::Contract(_)));
		assert!(!h.orders.get_order(&created.order_id).await.unwrap().unwrap().delivered);
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_burns_and_records() {
		let h = harness();
		let created = h.workflow.create(socks()).await.unwrap();

		h.workflow.cancel(&created.order_id).await.unwrap();

		assert!(h.orders.get_order(&created.order_id).await.unwrap().unwrap().canceled);
		assert!(h.sim.token(created.token_id).is_none());
		assert!(matches!(
			h.workflow.get_owner(&created.order_id).await,
			Err(WorkflowError::Contract(ContractError::TokenNotFound(_)))
		));
		// Canceling twice reports the order as gone
		assert!(matches!(
			h.workflow.cancel(&created.order_id).await,
			Err(WorkflowError::OrderNotFound(_))
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_after_delivery_rejected() {
		let h = harness();
		let created = h.workflow.create(socks()).await.unwrap();
		h.workflow
			.deliver(&created.order_id, &SignerKey::random())
			.await
			.unwrap();

		assert!(matches!(
			h.workflow.cancel(&created.order_id).await,
			Err(WorkflowError::AlreadyDelivered(_))
		));
		assert!(h.sim.token(created.token_id).is_some());
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_with_burned_token_reports_token_missing() {
		let h = harness();
		let created = h.workflow.create(socks()).await.unwrap();
		h.sim.remove_token(created.token_id);

		let err = h.workflow.cancel(&created.order_id).await.unwrap_err();
		assert_eq!(
			err.to_string(),
			format!("Token [{}] does not exist or has been burned", created.token_id)
		);
		assert!(!h.orders.get_order(&created.order_id).await.unwrap().unwrap().canceled);
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_with_node_refusal_keeps_order_open() {
		let h = harness();
		let created = h.workflow.create(socks()).await.unwrap();
		h.sim.ledger.on_call(|_, _: &Bytes| {
			Err(DeliveryError::Rejected("header not found".to_string()))
		});

		assert!(matches!(
			h.workflow.cancel(&created.order_id).await,
			Err(WorkflowError::Contract(ContractError::Delivery(DeliveryError::Rejected(_))))
		));
		assert!(!h.orders.get_order(&created.order_id).await.unwrap().unwrap().canceled);
		assert!(h.sim.token(created.token_id).is_some());
	}

	#[tokio::test(start_paused = true)]
	async fn test_get_owner_reports_vendor_before_delivery() {
		let h = harness();
		let created = h.workflow.create(socks()).await.unwrap();

		let report = h.workflow.get_owner(&created.order_id).await.unwrap();
		assert_eq!(report.owner, h.sim.vendor.address());
		assert_eq!(report.holder, TokenHolder::Vendor);
		assert!(report.is_consistent());
	}

	#[tokio::test]
	async fn test_zero_buyer_rejected() {
		let h = harness();
		let mut order = socks();
		order.buyer = Address::ZERO;
		assert!(matches!(
			h.workflow.create(order).await,
			Err(WorkflowError::InvalidInput(_))
		));
		assert_eq!(h.sim.ledger.total_requests(), 0);
	}
}
