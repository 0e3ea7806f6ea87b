//! API types for the parcel HTTP surface.
//!
//! This module defines the query strings, request bodies and JSON responses of
//! the order endpoints. Field names follow the camelCase convention of the
//! public API.

use crate::order::{OwnershipReport, TokenHolder};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Query parameters of `POST /order`.
///
/// Both fields are optional at the type level so that the handler can report
/// every missing parameter at once.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateOrderQuery {
	#[serde(rename = "itemId")]
	pub item_id: Option<String>,
	#[serde(rename = "buyerAddress")]
	pub buyer_address: Option<String>,
}

/// Response of `POST /order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderResponse {
	#[serde(rename = "orderId")]
	pub order_id: String,
	#[serde(rename = "tokenId", with = "u256_serde")]
	pub token_id: U256,
	#[serde(rename = "contractAddress")]
	pub contract_address: Address,
}

/// Query parameters of `POST /order/{orderId}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrderQuery {
	/// Customer secret key, required when the requested status is `delivered`.
	#[serde(rename = "customerKey")]
	pub customer_key: Option<String>,
}

/// Request body of `POST /order/{orderId}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpdateOrderRequest {
	/// Either `delivered` or `canceled`, case-insensitive.
	pub status: String,
}

/// Response of a successful status update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusResponse {
	pub status: String,
}

/// Response of `GET /order/{orderId}/owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenOwnerResponse {
	pub owner: Address,
	pub holder: TokenHolder,
	#[serde(rename = "recordedDelivered")]
	pub recorded_delivered: bool,
	pub consistent: bool,
}

impl From<OwnershipReport> for TokenOwnerResponse {
	fn from(report: OwnershipReport) -> Self {
		let consistent = report.is_consistent();
		Self {
			owner: report.owner,
			holder: report.holder,
			recorded_delivered: report.recorded_delivered,
			consistent,
		}
	}
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub error: String,
}

/// Serde helpers that encode a U256 as a decimal string.
pub mod u256_serde {
	use alloy_primitives::U256;
	use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

	pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		value.to_string().serialize(serializer)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		U256::from_str_radix(&s, 10).map_err(D::Error::custom)
	}
}
