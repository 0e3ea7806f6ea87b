//! Order types for the parcel system.
//!
//! An order is created once when a delivery token is minted for it and is
//! afterwards only ever flagged as delivered or canceled.

use crate::api::u256_serde;
use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload that drives minting of a delivery token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
	/// Identifier of the order the token represents.
	pub order_id: String,
	/// Price of the goods, in the smallest ledger unit.
	pub purchase_price: U256,
	/// Price of the delivery, in the smallest ledger unit.
	pub delivery_price: U256,
	/// Address of the buyer the token is minted for.
	pub recipient: Address,
}

/// Locally persisted order record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier for this order.
	pub order_id: String,
	/// Catalog identifier of the purchased item.
	pub item_id: String,
	/// Display name of the purchased item.
	pub item_name: String,
	/// Price of the goods.
	#[serde(with = "u256_serde")]
	pub price: U256,
	/// Price of the delivery.
	#[serde(with = "u256_serde")]
	pub delivery_price: U256,
	/// Address of the contract holding the delivery token.
	pub token_address: Address,
	/// Identifier of the delivery token within the contract.
	#[serde(with = "u256_serde")]
	pub token_id: U256,
	/// Set once the customer has paid and holds the token.
	pub delivered: bool,
	/// Set once the token has been burned.
	#[serde(default)]
	pub canceled: bool,
	/// Timestamp when this order was created.
	pub created_at: DateTime<Utc>,
}

impl Order {
	/// Amount the customer pays: goods plus delivery.
	pub fn total_price(&self) -> U256 {
		self.price.saturating_add(self.delivery_price)
	}

	/// Returns true when the order can no longer change.
	pub fn is_final(&self) -> bool {
		self.delivered || self.canceled
	}
}

/// Which party currently holds a delivery token on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenHolder {
	/// Still owned by the vendor: the order has not been delivered.
	Vendor,
	/// Owned by someone other than the vendor: the customer has paid.
	Customer,
}

impl fmt::Display for TokenHolder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TokenHolder::Vendor => write!(f, "vendor"),
			TokenHolder::Customer => write!(f, "customer"),
		}
	}
}

/// Ledger ownership of an order's token compared with the local record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipReport {
	/// Order the report is about.
	pub order_id: String,
	/// Current owner address reported by the contract.
	pub owner: Address,
	/// Which party the owner address corresponds to.
	pub holder: TokenHolder,
	/// Value of the locally stored `delivered` flag.
	pub recorded_delivered: bool,
}

impl OwnershipReport {
	/// Returns true when ledger ownership agrees with the local flag.
	pub fn is_consistent(&self) -> bool {
		(self.holder == TokenHolder::Customer) == self.recorded_delivered
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn order() -> Order {
		Order {
			order_id: "order-1".to_string(),
			item_id: "sock-1".to_string(),
			item_name: "socks".to_string(),
			price: U256::from(500),
			delivery_price: U256::from(75),
			token_address: Address::repeat_byte(0xde),
			token_id: U256::from(7),
			delivered: false,
			canceled: false,
			created_at: Utc::now(),
		}
	}

	#[test]
	fn test_total_price() {
		assert_eq!(order().total_price(), U256::from(575));
	}

	#[test]
	fn test_legacy_record_without_canceled_flag() {
		let mut value = serde_json::to_value(order()).unwrap();
		value.as_object_mut().unwrap().remove("canceled");
		let decoded: Order = serde_json::from_value(value).unwrap();
		assert!(!decoded.canceled);
		assert_eq!(decoded.price, U256::from(500));
	}

	#[test]
	fn test_ownership_consistency() {
		let mut report = OwnershipReport {
			order_id: "order-1".to_string(),
			owner: Address::repeat_byte(1),
			holder: TokenHolder::Vendor,
			recorded_delivered: false,
		};
		assert!(report.is_consistent());

		report.recorded_delivered = true;
		assert!(!report.is_consistent());

		report.holder = TokenHolder::Customer;
		assert!(report.is_consistent());
	}
}
