//! Confirmation polling.
//!
//! The waiter polls for a receipt at a fixed interval until the transaction
//! is seen in a block, the deadline passes or the caller cancels. Polling is
//! literal-interval with no backoff. A transaction reported as timed out may
//! still be mined later; nothing tracks it afterwards.

use crate::{CancelSignal, DeliveryError, LedgerInterface};
use alloy_primitives::TxHash;
use parcel_types::{truncate_id, ConfirmationResult, TransactionReceipt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Polls the node for transaction inclusion.
pub struct ConfirmationWaiter {
	ledger: Arc<dyn LedgerInterface>,
	timeout: Duration,
	poll_interval: Duration,
}

impl ConfirmationWaiter {
	pub fn new(ledger: Arc<dyn LedgerInterface>, timeout: Duration, poll_interval: Duration) -> Self {
		Self {
			ledger,
			timeout,
			poll_interval,
		}
	}

	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// Polls once.
	///
	/// Query failures are treated as "not mined yet" and yield `Pending`.
	pub async fn check(&self, hash: TxHash) -> ConfirmationResult {
		match self.ledger.get_receipt(hash).await {
			Ok(Some(receipt)) if receipt.is_included() => {
				if receipt.success {
					ConfirmationResult::Confirmed(receipt)
				} else {
					ConfirmationResult::Failed(format!(
						"Transaction [{}] reverted in block {}",
						hash, receipt.block_number
					))
				}
			}
			Ok(_) => ConfirmationResult::Pending,
			Err(e) => {
				tracing::debug!(tx_hash = %truncate_id(&hash.to_string()), error = %e, "Receipt query failed");
				ConfirmationResult::Pending
			}
		}
	}

	/// Polls until the transaction is confirmed, fails, the deadline elapses
	/// or `cancel` fires.
	///
	/// `TimedOut` is only returned once the full timeout has elapsed since the
	/// start of the wait; the last poll happens at the deadline itself.
	pub async fn wait(&self, hash: TxHash, cancel: &CancelSignal) -> ConfirmationResult {
		let deadline = Instant::now() + self.timeout;
		let short_hash = truncate_id(&hash.to_string());

		loop {
			if cancel.is_cancelled() {
				return ConfirmationResult::Cancelled;
			}

			match self.check(hash).await {
				ConfirmationResult::Pending => {}
				outcome => {
					tracing::info!(tx_hash = %short_hash, %outcome, "Transaction settled");
					return outcome;
				}
			}

			let now = Instant::now();
			if now >= deadline {
				tracing::warn!(
					tx_hash = %short_hash,
					timeout_seconds = self.timeout.as_secs(),
					"Transaction not mined before deadline"
				);
				return ConfirmationResult::TimedOut;
			}

			let pause = self.poll_interval.min(deadline - now);
			tracing::debug!(tx_hash = %short_hash, ?pause, "Transaction pending");
			tokio::select! {
				_ = tokio::time::sleep(pause) => {}
				_ = cancel.cancelled() => {
					tracing::info!(tx_hash = %short_hash, "Confirmation wait cancelled");
					return ConfirmationResult::Cancelled;
				}
			}
		}
	}

	/// Waits and converts every outcome other than `Confirmed` into an error.
	pub async fn confirm(
		&self,
		hash: TxHash,
		cancel: &CancelSignal,
	) -> Result<TransactionReceipt, DeliveryError> {
		match self.wait(hash, cancel).await {
			ConfirmationResult::Confirmed(receipt) => Ok(receipt),
			ConfirmationResult::Failed(reason) => Err(DeliveryError::TransactionFailed(reason)),
			ConfirmationResult::Cancelled => Err(DeliveryError::Cancelled),
			ConfirmationResult::TimedOut | ConfirmationResult::Pending => Err(DeliveryError::Timeout {
				hash,
				waited_seconds: self.timeout.as_secs(),
			}),
		}
	}
}
