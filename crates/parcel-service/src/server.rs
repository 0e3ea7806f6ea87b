//! HTTP server for the parcel order API.

use crate::apis::order;
use axum::{
	routing::{get, post},
	Router,
};
use parcel_config::{ApiConfig, CatalogConfig};
use parcel_core::workflow::OrderFulfillmentWorkflow;
use parcel_core::ParcelEngine;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Order lifecycle operations.
	pub workflow: Arc<OrderFulfillmentWorkflow>,
	/// Items that can be ordered, with their prices.
	pub catalog: Arc<CatalogConfig>,
	/// Held by every request that signs with the vendor key, so vendor
	/// nonces are never read concurrently.
	pub vendor_lock: Arc<Mutex<()>>,
}

impl AppState {
	pub fn new(engine: &ParcelEngine) -> Self {
		Self {
			workflow: Arc::clone(engine.workflow()),
			catalog: Arc::new(engine.config().catalog.clone()),
			vendor_lock: Arc::new(Mutex::new(())),
		}
	}
}

/// Builds the order API router.
pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/order", post(order::create_order))
		.route("/order/{order_id}", post(order::update_order))
		.route("/order/{order_id}/owner", get(order::get_token_owner))
		.layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
		.with_state(state)
}

/// Serves the order API until `shutdown` resolves.
pub async fn start_server<F>(
	api_config: ApiConfig,
	engine: &ParcelEngine,
	shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
	F: Future<Output = ()> + Send + 'static,
{
	let app = router(AppState::new(engine));

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Parcel API server starting on {}", bind_address);

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown)
		.await?;

	Ok(())
}
