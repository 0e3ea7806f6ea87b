//! Nonce allocation.
//!
//! Nonces are always read from the node's pending transaction count; nothing
//! is cached between operations. A [`NonceLease`] covers the one case where a
//! caller issues several transactions back to back from the same signer
//! inside a single operation and increments locally.

use crate::{DeliveryError, LedgerInterface};
use alloy_primitives::Address;
use std::sync::Arc;

/// Fetches the next usable nonce of a signer from the node.
pub struct NonceAllocator {
	ledger: Arc<dyn LedgerInterface>,
}

impl NonceAllocator {
	pub fn new(ledger: Arc<dyn LedgerInterface>) -> Self {
		Self { ledger }
	}

	/// Returns the pending transaction count of `address`.
	///
	/// Any failure is reported as [`DeliveryError::Nonce`].
	pub async fn next_nonce(&self, address: Address) -> Result<u64, DeliveryError> {
		let nonce = self
			.ledger
			.get_pending_nonce(address)
			.await
			.map_err(|e| DeliveryError::Nonce(format!("Failed to fetch nonce for {}: {}", address, e)))?;
		tracing::debug!(%address, nonce, "Fetched pending nonce");
		Ok(nonce)
	}

	/// Fetches the pending nonce once and hands out consecutive values.
	pub async fn lease(&self, address: Address) -> Result<NonceLease, DeliveryError> {
		let next = self.next_nonce(address).await?;
		Ok(NonceLease { address, next })
	}
}

/// Consecutive nonces for one signer within one operation.
#[derive(Debug)]
pub struct NonceLease {
	address: Address,
	next: u64,
}

impl NonceLease {
	pub fn address(&self) -> Address {
		self.address
	}

	/// Returns the current nonce and advances the lease.
	pub fn take(&mut self) -> u64 {
		let nonce = self.next;
		self.next += 1;
		nonce
	}

	/// Nonce the next call to [`take`](Self::take) returns.
	pub fn peek(&self) -> u64 {
		self.next
	}
}
