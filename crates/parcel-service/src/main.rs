//! Main entry point for the parcel service.
//!
//! Loads configuration, connects to the ledger node, wires the order
//! workflow and serves the order API until interrupted.

use clap::Parser;
use parcel_config::Config;
use parcel_core::builder::{ParcelBuilder, ParcelFactories};
use parcel_core::ParcelEngine;
use parcel_delivery::implementations::alloy::create_http_ledger;
use parcel_delivery::{cancellation, CancelHandle, CancelSignal, LedgerInterface};
use parcel_storage::implementations::file::create_storage as create_file_storage;
use parcel_storage::implementations::memory::create_storage as create_memory_storage;
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod server;

/// Command-line arguments for the parcel service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started parcel service");

	let config = Config::from_file(&args.config.to_string_lossy()).await?;
	tracing::info!(rpc_url = %config.node.rpc_url, "Loaded configuration");

	let ledger = create_http_ledger(&config.node.rpc_url)?;
	let (cancel_handle, cancel_signal) = cancellation();

	let api_config = config.api.clone();
	let engine = Arc::new(build_engine(config, ledger, cancel_signal).await?);

	if let Some(report) = engine.initialize().await? {
		tracing::info!(
			examined = report.examined,
			repaired = report.marked_delivered + report.marked_canceled,
			inconsistent = report.inconsistent.len(),
			failed = report.failed,
			"Startup reconciliation finished"
		);
	}

	server::start_server(api_config, &engine, shutdown_signal(cancel_handle)).await?;

	tracing::info!("Stopped parcel service");
	Ok(())
}

/// Resolves on Ctrl-C and cancels every in-flight confirmation wait.
async fn shutdown_signal(cancel: CancelHandle) {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %e, "Failed to listen for shutdown signal");
		std::future::pending::<()>().await;
	}
	tracing::info!("Shutdown requested");
	cancel.cancel();
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the engine with the storage backends this binary ships.
async fn build_engine(
	config: Config,
	ledger: Arc<dyn LedgerInterface>,
	cancel: CancelSignal,
) -> Result<ParcelEngine, Box<dyn std::error::Error>> {
	let storage_factories = create_factory_map!(
		parcel_storage::StorageInterface,
		parcel_storage::StorageError,
		"file" => create_file_storage,
		"memory" => create_memory_storage,
	);

	let factories = ParcelFactories { storage_factories };
	Ok(ParcelBuilder::new(config)
		.build(ledger, factories, cancel)
		.await?)
}
