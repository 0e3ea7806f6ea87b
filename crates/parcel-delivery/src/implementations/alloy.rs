//! Ledger node access over HTTP JSON-RPC using the Alloy provider.

use crate::{DeliveryError, LedgerInterface, SignedTransaction};
use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_transport::{RpcError, TransportErrorKind};
use alloy_transport_http::Http;
use async_trait::async_trait;
use parcel_types::TransactionReceipt;
use std::sync::Arc;

/// HTTP JSON-RPC ledger.
///
/// The provider carries no wallet or fillers: transactions arrive fully
/// signed from [`TransactionSubmitter`](crate::TransactionSubmitter).
pub struct AlloyLedger {
	provider: Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>,
}

impl AlloyLedger {
	/// Creates a ledger handle for the node at `rpc_url`.
	///
	/// No request is made; an unreachable node surfaces on first use.
	pub fn new(rpc_url: &str) -> Result<Self, DeliveryError> {
		let url = rpc_url
			.parse()
			.map_err(|e| DeliveryError::InvalidInput(format!("Invalid RPC URL {}: {}", rpc_url, e)))?;

		let provider = ProviderBuilder::new().on_http(url);

		Ok(Self {
			provider: Arc::new(provider),
		})
	}
}

/// JSON-RPC error code nodes use for reverts carrying revert data.
const REVERT_ERROR_CODE: i64 = 3;

/// Whether a node error response reports reverted contract execution.
///
/// Nodes without revert data answer `-32000 "execution reverted"`, so the
/// message is checked as well as the code.
fn is_revert(code: i64, message: &str) -> bool {
	code == REVERT_ERROR_CODE || message.to_ascii_lowercase().contains("revert")
}

/// Node error responses become `Reverted` or `Rejected`; anything else is a
/// transport problem.
fn map_rpc_error(context: &str, error: RpcError<TransportErrorKind>) -> DeliveryError {
	match error.as_error_resp() {
		Some(payload) if is_revert(payload.code, &payload.message) => {
			DeliveryError::Reverted(format!("{}: {}", context, payload.message))
		}
		Some(payload) => DeliveryError::Rejected(format!("{}: {}", context, payload.message)),
		None => DeliveryError::Connectivity(format!("{}: {}", context, error)),
	}
}

#[async_trait]
impl LedgerInterface for AlloyLedger {
	async fn chain_id(&self) -> Result<u64, DeliveryError> {
		self.provider
			.get_chain_id()
			.await
			.map_err(|e| map_rpc_error("Failed to get chain id", e))
	}

	async fn get_pending_nonce(&self, address: Address) -> Result<u64, DeliveryError> {
		self.provider
			.get_transaction_count(address)
			.pending()
			.await
			.map_err(|e| map_rpc_error("Failed to get nonce", e))
	}

	async fn get_balance(&self, address: Address) -> Result<U256, DeliveryError> {
		self.provider
			.get_balance(address)
			.await
			.map_err(|e| map_rpc_error("Failed to get balance", e))
	}

	async fn get_gas_price(&self) -> Result<u128, DeliveryError> {
		self.provider
			.get_gas_price()
			.await
			.map_err(|e| map_rpc_error("Failed to get gas price", e))
	}

	async fn get_receipt(&self, hash: TxHash) -> Result<Option<TransactionReceipt>, DeliveryError> {
		let receipt = self
			.provider
			.get_transaction_receipt(hash)
			.await
			.map_err(|e| map_rpc_error("Failed to get receipt", e))?;

		Ok(receipt.map(|receipt| TransactionReceipt {
			hash: receipt.transaction_hash,
			block_number: receipt.block_number.unwrap_or(0),
			success: receipt.status(),
			contract_address: receipt.contract_address,
		}))
	}

	async fn send_raw_transaction(&self, tx: &SignedTransaction) -> Result<TxHash, DeliveryError> {
		let pending = self
			.provider
			.send_raw_transaction(&tx.raw)
			.await
			.map_err(|e| map_rpc_error("Failed to send transaction", e))?;
		Ok(*pending.tx_hash())
	}

	async fn call(&self, from: Address, to: Address, data: Bytes) -> Result<Bytes, DeliveryError> {
		let request = TransactionRequest::default()
			.from(from)
			.to(to)
			.input(data.into());
		self.provider
			.call(&request)
			.await
			.map_err(|e| map_rpc_error("Call failed", e))
	}
}

/// Builds the HTTP ledger for `rpc_url`.
pub fn create_http_ledger(rpc_url: &str) -> Result<Arc<dyn LedgerInterface>, DeliveryError> {
	let ledger = AlloyLedger::new(rpc_url)?;
	tracing::info!(rpc_url, "Created HTTP ledger");
	Ok(Arc::new(ledger))
}
