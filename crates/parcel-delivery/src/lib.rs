//! Transaction delivery module for the parcel system.
//!
//! This module turns transaction intents into signed ledger transactions and
//! tracks them until they are mined. It is split along the life of a
//! transaction:
//!
//! - [`NonceAllocator`] fetches the next sequence number of a signer.
//! - [`TransactionSubmitter`] signs an intent and hands it to the node.
//! - [`ConfirmationWaiter`] polls the node until the transaction is mined,
//!   fails, times out or the caller cancels.
//!
//! All node access goes through [`LedgerInterface`], implemented over HTTP
//! JSON-RPC by [`implementations::alloy::AlloyLedger`].

use alloy_primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use parcel_account::SignerKey;
use parcel_types::{TransactionIntent, TransactionReceipt};
use std::sync::Arc;
use thiserror::Error;

pub mod cancel;
pub mod nonce;
pub mod retry;
pub mod submitter;
pub mod waiter;

/// Re-export implementations
pub mod implementations {
	pub mod alloy;
	#[cfg(any(test, feature = "testing"))]
	pub mod mock;
}

pub use cancel::{cancellation, CancelHandle, CancelSignal};
pub use nonce::{NonceAllocator, NonceLease};
pub use retry::{RetryPolicy, RetryStrategy};
pub use submitter::{GasSettings, TransactionSubmitter};
pub use waiter::ConfirmationWaiter;

/// Errors that can occur during transaction delivery operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// Malformed caller input, detected before contacting the node.
	#[error("Invalid input: {0}")]
	InvalidInput(String),
	/// The node could not be reached or returned garbage.
	#[error("Connectivity error: {0}")]
	Connectivity(String),
	/// The pending nonce could not be fetched.
	#[error("Nonce error: {0}")]
	Nonce(String),
	/// The transaction could not be built or signed.
	#[error("Signing error: {0}")]
	Signing(String),
	/// The node refused the request without executing it.
	#[error("Transaction rejected: {0}")]
	Rejected(String),
	/// Contract code ran and reverted, during a call or gas estimation.
	#[error("Execution reverted: {0}")]
	Reverted(String),
	/// The transaction was not observed mined within the deadline.
	#[error("Transaction [{hash}] was not mined after {waited_seconds} seconds")]
	Timeout { hash: TxHash, waited_seconds: u64 },
	/// The transaction was mined but its execution reverted.
	#[error("Transaction failed: {0}")]
	TransactionFailed(String),
	/// The caller abandoned the operation.
	#[error("Operation cancelled")]
	Cancelled,
}

impl DeliveryError {
	/// Returns true for transient failures worth repeating.
	///
	/// A `Connectivity` or `Rejected` error from a broadcast does not prove
	/// the node dropped the transaction; callers that resubmit must first
	/// check the pending nonce.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			DeliveryError::Connectivity(_) | DeliveryError::Nonce(_) | DeliveryError::Rejected(_)
		)
	}
}

/// A signed transaction ready for submission.
///
/// Carries the intent it was built from so that logs (and test nodes) can
/// describe it without decoding the envelope.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
	/// Hash of the signed envelope.
	pub hash: TxHash,
	/// EIP-2718 encoded envelope.
	pub raw: Bytes,
	/// Intent the envelope was built from.
	pub intent: TransactionIntent,
}

/// Operations consumed from a ledger node.
///
/// Implementations map transport failures to [`DeliveryError::Connectivity`],
/// contract reverts to [`DeliveryError::Reverted`] and any other node-side
/// refusal to [`DeliveryError::Rejected`].
#[async_trait]
pub trait LedgerInterface: Send + Sync {
	/// Chain id reported by the node.
	async fn chain_id(&self) -> Result<u64, DeliveryError>;

	/// Transaction count of `address` including pending transactions.
	async fn get_pending_nonce(&self, address: Address) -> Result<u64, DeliveryError>;

	/// Native balance of `address`.
	async fn get_balance(&self, address: Address) -> Result<U256, DeliveryError>;

	/// Gas price suggested by the node, in wei.
	async fn get_gas_price(&self) -> Result<u128, DeliveryError>;

	/// Receipt of a transaction, or `None` while the node has none.
	async fn get_receipt(&self, hash: TxHash) -> Result<Option<TransactionReceipt>, DeliveryError>;

	/// Broadcasts a signed transaction and returns the hash the node reports.
	async fn send_raw_transaction(&self, tx: &SignedTransaction) -> Result<TxHash, DeliveryError>;

	/// Executes a read-only contract call against the latest state.
	async fn call(&self, from: Address, to: Address, data: Bytes) -> Result<Bytes, DeliveryError>;
}

/// Service bundling nonce allocation, submission and confirmation over one
/// shared ledger handle.
///
/// The ledger handle is the only shared resource; it is safe for concurrent
/// reads. Callers submitting for the same signer must serialize themselves.
pub struct DeliveryService {
	ledger: Arc<dyn LedgerInterface>,
	nonces: NonceAllocator,
	submitter: TransactionSubmitter,
	waiter: ConfirmationWaiter,
}

impl DeliveryService {
	/// Creates a new DeliveryService over the given ledger.
	pub fn new(
		ledger: Arc<dyn LedgerInterface>,
		gas: GasSettings,
		confirmation_timeout: std::time::Duration,
		poll_interval: std::time::Duration,
	) -> Self {
		Self {
			nonces: NonceAllocator::new(Arc::clone(&ledger)),
			submitter: TransactionSubmitter::new(Arc::clone(&ledger), gas),
			waiter: ConfirmationWaiter::new(Arc::clone(&ledger), confirmation_timeout, poll_interval),
			ledger,
		}
	}

	pub fn nonces(&self) -> &NonceAllocator {
		&self.nonces
	}

	pub fn submitter(&self) -> &TransactionSubmitter {
		&self.submitter
	}

	pub fn waiter(&self) -> &ConfirmationWaiter {
		&self.waiter
	}

	/// Submits an intent and waits for it to be mined.
	///
	/// A timeout, revert or cancellation is returned as an error; the
	/// transaction itself may still be mined later and is not tracked.
	pub async fn execute(
		&self,
		key: &SignerKey,
		intent: TransactionIntent,
		cancel: &CancelSignal,
	) -> Result<TransactionReceipt, DeliveryError> {
		let submitted = self.submitter.submit(key, intent).await?;
		self.waiter.confirm(submitted.hash, cancel).await
	}

	/// Executes a read-only contract call.
	pub async fn call(&self, from: Address, to: Address, data: Bytes) -> Result<Bytes, DeliveryError> {
		self.ledger.call(from, to, data).await
	}

	/// Native balance of `address`.
	pub async fn balance(&self, address: Address) -> Result<U256, DeliveryError> {
		self.ledger.get_balance(address).await
	}
}
