//! Transaction delivery types for the parcel system.
//!
//! This module defines the life of a single ledger transaction: the intent a
//! caller builds, the submission handle returned by the node, the receipt the
//! node eventually reports and the outcome of waiting for that receipt.

use alloy_primitives::{Address, Bytes, TxHash, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Destination of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionTarget {
	/// Invoke an operation on an existing contract.
	Call(Address),
	/// Create a new contract; the input carries its bytecode.
	Create,
}

/// Everything needed to build one ledger transaction.
///
/// An intent is constructed fresh for every submission and never reused.
/// The operation name is carried for logging only; the encoded call lives in
/// `input`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIntent {
	/// Address that signs and pays for the transaction.
	pub sender: Address,
	/// Per-sender sequence number.
	pub nonce: u64,
	/// Value transferred with the call, in the smallest ledger unit.
	pub value: U256,
	/// Contract call target or contract creation.
	pub target: TransactionTarget,
	/// Human readable operation name, e.g. `mintToken`.
	pub operation: String,
	/// ABI encoded call data, or creation bytecode.
	pub input: Bytes,
}

impl TransactionIntent {
	/// Creates an intent that calls `operation` on the contract at `to`.
	pub fn call(
		sender: Address,
		nonce: u64,
		to: Address,
		operation: impl Into<String>,
		input: impl Into<Bytes>,
	) -> Self {
		Self {
			sender,
			nonce,
			value: U256::ZERO,
			target: TransactionTarget::Call(to),
			operation: operation.into(),
			input: input.into(),
		}
	}

	/// Creates a contract-creation intent carrying `bytecode`.
	pub fn create(sender: Address, nonce: u64, bytecode: impl Into<Bytes>) -> Self {
		Self {
			sender,
			nonce,
			value: U256::ZERO,
			target: TransactionTarget::Create,
			operation: "deploy".to_string(),
			input: bytecode.into(),
		}
	}

	/// Attaches a value transfer to the intent.
	pub fn with_value(mut self, value: U256) -> Self {
		self.value = value;
		self
	}
}

/// A transaction accepted into the node's pending pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedTransaction {
	/// Transaction hash reported by the node.
	pub hash: TxHash,
	/// Local time of submission.
	pub submitted_at: DateTime<Utc>,
}

/// Transaction receipt as reported by the ledger node.
///
/// A `block_number` of zero means the node knows the transaction but has not
/// placed it in a block yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	/// The hash of the transaction.
	pub hash: TxHash,
	/// The block number where the transaction was included.
	pub block_number: u64,
	/// Whether the transaction executed successfully.
	pub success: bool,
	/// Address of the contract created by the transaction, if any.
	pub contract_address: Option<Address>,
}

impl TransactionReceipt {
	/// Returns true when the receipt carries a non-zero inclusion height.
	pub fn is_included(&self) -> bool {
		self.block_number > 0
	}
}

/// Outcome of waiting for a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationResult {
	/// Included in a block and executed successfully.
	Confirmed(TransactionReceipt),
	/// Not yet observed in a block.
	Pending,
	/// The deadline elapsed before inclusion was observed.
	TimedOut,
	/// Included, but execution reverted.
	Failed(String),
	/// The caller abandoned the wait.
	Cancelled,
}

impl ConfirmationResult {
	/// Block height of a confirmed transaction.
	pub fn block_number(&self) -> Option<u64> {
		match self {
			ConfirmationResult::Confirmed(receipt) => Some(receipt.block_number),
			_ => None,
		}
	}
}

impl fmt::Display for ConfirmationResult {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfirmationResult::Confirmed(receipt) => {
				write!(f, "confirmed in block {}", receipt.block_number)
			}
			ConfirmationResult::Pending => write!(f, "pending"),
			ConfirmationResult::TimedOut => write!(f, "timed out"),
			ConfirmationResult::Failed(reason) => write!(f, "failed: {}", reason),
			ConfirmationResult::Cancelled => write!(f, "cancelled"),
		}
	}
}
