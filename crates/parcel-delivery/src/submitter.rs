//! Transaction signing and submission.

use crate::{DeliveryError, LedgerInterface, SignedTransaction};
use alloy_consensus::TxEnvelope;
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TransactionBuilder;
use alloy_rpc_types::TransactionRequest;
use chrono::Utc;
use parcel_account::SignerKey;
use parcel_types::{truncate_id, SubmittedTransaction, TransactionIntent, TransactionTarget};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Gas and chain parameters applied to every transaction.
#[derive(Debug, Clone)]
pub struct GasSettings {
	/// Gas limit of every transaction.
	pub gas_limit: u64,
	/// Fixed gas price in wei; the node is asked when `None`.
	pub gas_price: Option<u128>,
	/// Chain id used for signing; the node is asked when `None`.
	pub chain_id: Option<u64>,
}

impl Default for GasSettings {
	fn default() -> Self {
		Self {
			gas_limit: 3_000_000,
			gas_price: None,
			chain_id: None,
		}
	}
}

/// Signs transaction intents and submits them to the node.
///
/// Every successful call places exactly one transaction in the node's
/// pending pool. No deduplication is performed: two intents differing only in
/// nonce become two transactions.
pub struct TransactionSubmitter {
	ledger: Arc<dyn LedgerInterface>,
	gas: GasSettings,
	chain_id: OnceCell<u64>,
}

impl TransactionSubmitter {
	pub fn new(ledger: Arc<dyn LedgerInterface>, gas: GasSettings) -> Self {
		let chain_id = match gas.chain_id {
			Some(id) => OnceCell::new_with(Some(id)),
			None => OnceCell::new(),
		};
		Self {
			ledger,
			gas,
			chain_id,
		}
	}

	async fn chain_id(&self) -> Result<u64, DeliveryError> {
		self.chain_id
			.get_or_try_init(|| self.ledger.chain_id())
			.await
			.copied()
	}

	async fn gas_price(&self) -> Result<u128, DeliveryError> {
		match self.gas.gas_price {
			Some(price) => Ok(price),
			None => self.ledger.get_gas_price().await,
		}
	}

	/// Builds and signs a legacy transaction for `intent` with `key`.
	pub async fn sign(
		&self,
		key: &SignerKey,
		intent: TransactionIntent,
	) -> Result<SignedTransaction, DeliveryError> {
		if key.address() != intent.sender {
			return Err(DeliveryError::InvalidInput(format!(
				"Intent sender {} does not match signer {}",
				intent.sender,
				key.address()
			)));
		}

		let chain_id = self.chain_id().await?;
		let gas_price = self.gas_price().await?;

		let request = TransactionRequest::default()
			.with_from(intent.sender)
			.with_nonce(intent.nonce)
			.with_chain_id(chain_id)
			.with_gas_limit(self.gas.gas_limit)
			.with_gas_price(gas_price)
			.with_value(intent.value);
		let request = match intent.target {
			TransactionTarget::Call(to) => request.with_to(to).with_input(intent.input.clone()),
			TransactionTarget::Create => request.with_deploy_code(intent.input.clone()),
		};

		let envelope: TxEnvelope = request
			.build(&key.wallet())
			.await
			.map_err(|e| DeliveryError::Signing(e.to_string()))?;

		Ok(SignedTransaction {
			hash: *envelope.tx_hash(),
			raw: envelope.encoded_2718().into(),
			intent,
		})
	}

	/// Signs `intent` with `key` and submits it to the node.
	pub async fn submit(
		&self,
		key: &SignerKey,
		intent: TransactionIntent,
	) -> Result<SubmittedTransaction, DeliveryError> {
		let signed = self.sign(key, intent).await?;
		self.send(&signed).await
	}

	/// Broadcasts an already signed transaction.
	///
	/// An error does not prove the node dropped it: a response lost after
	/// the node accepted the envelope looks the same as a refusal.
	pub async fn send(
		&self,
		signed: &SignedTransaction,
	) -> Result<SubmittedTransaction, DeliveryError> {
		let hash = self.ledger.send_raw_transaction(signed).await?;

		tracing::info!(
			tx_hash = %truncate_id(&hash.to_string()),
			operation = %signed.intent.operation,
			sender = %signed.intent.sender,
			nonce = signed.intent.nonce,
			"Submitted transaction"
		);

		Ok(SubmittedTransaction {
			hash,
			submitted_at: Utc::now(),
		})
	}
}
