//! Order endpoints.
//!
//! Creating an order mints a delivery token for it; updating its status to
//! `delivered` has the customer buy the token, and `canceled` burns it.

use crate::apis::ApiError;
use crate::server::AppState;
use alloy_primitives::{Address, U256};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use parcel_account::SignerKey;
use parcel_core::workflow::{NewOrder, WorkflowError};
use parcel_types::{
	CreateOrderQuery, CreateOrderResponse, OrderStatusResponse, TokenOwnerResponse,
	UpdateOrderQuery, UpdateOrderRequest,
};

const INVALID_STATUS: &str = "Invalid status. Expected 'delivered' or 'canceled'";

/// Returns the parameter values, or a 400 naming every missing one.
fn required<const N: usize>(
	params: [(&'static str, Option<String>); N],
) -> Result<[String; N], ApiError> {
	let missing: Vec<&str> = params
		.iter()
		.filter(|(_, value)| value.as_deref().is_none_or(str::is_empty))
		.map(|(name, _)| *name)
		.collect();
	if !missing.is_empty() {
		return Err(ApiError::bad_request(missing.join(",")));
	}
	Ok(params.map(|(_, value)| value.unwrap_or_default()))
}

/// Handles `POST /order?itemId=..&buyerAddress=..`.
pub async fn create_order(
	State(state): State<AppState>,
	Query(query): Query<CreateOrderQuery>,
) -> Result<Json<CreateOrderResponse>, ApiError> {
	let [item_id, buyer_address] = required([
		("itemId", query.item_id),
		("buyerAddress", query.buyer_address),
	])?;

	let buyer: Address = buyer_address
		.parse()
		.map_err(|_| ApiError::bad_request(format!("Invalid buyerAddress [{}]", buyer_address)))?;
	let item = state
		.catalog
		.get(&item_id)
		.ok_or_else(|| ApiError::bad_request(format!("Unknown item [{}]", item_id)))?;

	let new_order = NewOrder {
		item_name: item.name.clone(),
		price: U256::from(item.price),
		delivery_price: U256::from(item.delivery_price),
		item_id,
		buyer,
	};

	let _vendor = state.vendor_lock.lock().await;
	let created = state.workflow.create(new_order).await.map_err(|e| match e {
		WorkflowError::Storage(e) => {
			tracing::error!(error = %e, "Failed to persist order");
			ApiError::internal("Error writing order to database")
		}
		e => ApiError::from(e),
	})?;

	Ok(Json(CreateOrderResponse {
		order_id: created.order_id,
		token_id: created.token_id,
		contract_address: created.contract_address,
	}))
}

/// Handles `POST /order/{orderId}` with body `{"status": ...}`.
///
/// An unreadable body is treated like an unknown status.
pub async fn update_order(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
	Query(query): Query<UpdateOrderQuery>,
	body: Result<Json<UpdateOrderRequest>, JsonRejection>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
	let status = body.map(|Json(request)| request.status).unwrap_or_default();

	if status.eq_ignore_ascii_case("delivered") {
		let [customer_key] = required([("customerKey", query.customer_key)])?;
		let customer = SignerKey::from_hex(&customer_key)
			.map_err(|e| ApiError::bad_request(format!("Invalid customerKey: {}", e)))?;

		tracing::info!("Delivering order [{}]", order_id);
		let _vendor = state.vendor_lock.lock().await;
		state.workflow.deliver(&order_id, &customer).await?;
		Ok(Json(OrderStatusResponse {
			status: "delivered".to_string(),
		}))
	} else if status.eq_ignore_ascii_case("canceled") {
		tracing::info!("Canceling order [{}]", order_id);
		let _vendor = state.vendor_lock.lock().await;
		state.workflow.cancel(&order_id).await?;
		Ok(Json(OrderStatusResponse {
			status: "canceled".to_string(),
		}))
	} else {
		Err(ApiError::bad_request(INVALID_STATUS))
	}
}

/// Handles `GET /order/{orderId}/owner`.
///
/// Reads ownership from the contract rather than the order store.
pub async fn get_token_owner(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
) -> Result<Json<TokenOwnerResponse>, ApiError> {
	let report = state.workflow.get_owner(&order_id).await?;
	Ok(Json(report.into()))
}
