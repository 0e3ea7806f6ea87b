//! Signer keys for the parcel system.
//!
//! A `SignerKey` wraps a secp256k1 secret and the ledger address derived from
//! it. Vendor keys come from configuration, customer keys arrive with each
//! delivery request; neither is ever persisted. Parsing is pure: no ledger
//! interaction happens here.

use alloy_network::EthereumWallet;
use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use parcel_types::{without_0x_prefix, SecretString};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while handling signer keys.
#[derive(Debug, Error)]
pub enum AccountError {
	/// The secret is not a valid 32-byte secp256k1 key.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
}

/// A secret key and its derived address.
#[derive(Clone)]
pub struct SignerKey {
	signer: PrivateKeySigner,
}

impl SignerKey {
	/// Parses a hex encoded secret, with or without a `0x` prefix.
	pub fn from_hex(secret: &str) -> Result<Self, AccountError> {
		let stripped = without_0x_prefix(secret.trim());
		if stripped.len() != 64 {
			return Err(AccountError::InvalidKey(format!(
				"expected 64 hex characters, got {}",
				stripped.len()
			)));
		}

		let bytes = hex::decode(stripped)
			.map_err(|e| AccountError::InvalidKey(format!("not valid hex: {}", e)))?;
		let signer = PrivateKeySigner::from_slice(&bytes)
			.map_err(|e| AccountError::InvalidKey(e.to_string()))?;

		Ok(Self { signer })
	}

	/// Parses a secret held in a `SecretString`.
	pub fn from_secret(secret: &SecretString) -> Result<Self, AccountError> {
		secret.with_exposed(Self::from_hex)
	}

	/// Generates a fresh random key.
	pub fn random() -> Self {
		Self {
			signer: PrivateKeySigner::random(),
		}
	}

	/// The ledger address controlled by this key.
	pub fn address(&self) -> Address {
		self.signer.address()
	}

	/// Wallet used to sign transaction envelopes with this key.
	pub fn wallet(&self) -> EthereumWallet {
		EthereumWallet::from(self.signer.clone())
	}
}

impl fmt::Debug for SignerKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SignerKey")
			.field("address", &self.address())
			.finish_non_exhaustive()
	}
}
