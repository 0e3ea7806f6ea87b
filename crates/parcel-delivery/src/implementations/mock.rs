//! In-process ledger node for tests.
//!
//! `MockLedger` keeps per-sender nonces, enforces nonce ordering on
//! submission, mines every accepted transaction into its own block and makes
//! receipts visible after a configurable delay. Contract behavior is supplied
//! through hooks: `on_transaction` decides the outcome of each submission and
//! `on_call` answers read-only calls. Receipt visibility uses tokio's clock so
//! paused-time tests are deterministic.

use crate::{DeliveryError, LedgerInterface, SignedTransaction};
use alloy_primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use parcel_types::{TransactionIntent, TransactionReceipt, TransactionTarget};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Result of executing a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
	/// Mined and executed successfully.
	Success,
	/// Mined, but execution reverted.
	Revert(String),
	/// Refused by the node; never enters the pool and consumes no nonce.
	Reject(String),
}

type TransactionHook = Arc<dyn Fn(&TransactionIntent) -> MockOutcome + Send + Sync>;
type CallHook = Arc<dyn Fn(Address, &Bytes) -> Result<Bytes, DeliveryError> + Send + Sync>;

struct MinedReceipt {
	receipt: TransactionReceipt,
	visible_at: Option<Instant>,
}

#[derive(Default)]
struct MockState {
	nonces: HashMap<Address, u64>,
	balances: HashMap<Address, U256>,
	transactions: Vec<TransactionIntent>,
	receipts: HashMap<TxHash, MinedReceipt>,
	block_number: u64,
	receipt_delay: Duration,
	withhold_receipts: bool,
	on_transaction: Option<TransactionHook>,
	on_call: Option<CallHook>,
}

/// Scriptable ledger node.
#[derive(Default)]
pub struct MockLedger {
	state: Mutex<MockState>,
	unreachable: AtomicBool,
	nonce_requests: AtomicUsize,
	submissions: AtomicUsize,
	receipt_queries: AtomicUsize,
	calls: AtomicUsize,
	balance_queries: AtomicUsize,
}

impl MockLedger {
	pub const CHAIN_ID: u64 = 31337;

	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self) -> MutexGuard<'_, MockState> {
		// A panicking test thread must not hide the state from the others
		self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	fn check_reachable(&self) -> Result<(), DeliveryError> {
		if self.unreachable.load(Ordering::SeqCst) {
			Err(DeliveryError::Connectivity("connection refused".to_string()))
		} else {
			Ok(())
		}
	}

	/// Makes every request fail with a connectivity error while set.
	pub fn set_unreachable(&self, unreachable: bool) {
		self.unreachable.store(unreachable, Ordering::SeqCst);
	}

	/// Delay between mining a transaction and its receipt becoming visible.
	pub fn set_receipt_delay(&self, delay: Duration) {
		self.state().receipt_delay = delay;
	}

	/// While set, receipts of newly mined transactions stay invisible until
	/// [`release_receipts`](Self::release_receipts) is called.
	pub fn withhold_receipts(&self, withhold: bool) {
		self.state().withhold_receipts = withhold;
	}

	/// Makes every withheld receipt visible now.
	pub fn release_receipts(&self) {
		let now = Instant::now();
		for mined in self.state().receipts.values_mut() {
			mined.visible_at.get_or_insert(now);
		}
	}

	pub fn on_transaction<F>(&self, hook: F)
	where
		F: Fn(&TransactionIntent) -> MockOutcome + Send + Sync + 'static,
	{
		self.state().on_transaction = Some(Arc::new(hook));
	}

	pub fn on_call<F>(&self, hook: F)
	where
		F: Fn(Address, &Bytes) -> Result<Bytes, DeliveryError> + Send + Sync + 'static,
	{
		self.state().on_call = Some(Arc::new(hook));
	}

	pub fn set_nonce(&self, address: Address, nonce: u64) {
		self.state().nonces.insert(address, nonce);
	}

	pub fn set_balance(&self, address: Address, balance: U256) {
		self.state().balances.insert(address, balance);
	}

	/// Intents of every accepted transaction, in submission order.
	pub fn transactions(&self) -> Vec<TransactionIntent> {
		self.state().transactions.clone()
	}

	/// Receipt of a mined transaction regardless of visibility.
	pub fn receipt(&self, hash: TxHash) -> Option<TransactionReceipt> {
		self.state()
			.receipts
			.get(&hash)
			.map(|mined| mined.receipt.clone())
	}

	pub fn nonce_requests(&self) -> usize {
		self.nonce_requests.load(Ordering::SeqCst)
	}

	pub fn submissions(&self) -> usize {
		self.submissions.load(Ordering::SeqCst)
	}

	pub fn receipt_queries(&self) -> usize {
		self.receipt_queries.load(Ordering::SeqCst)
	}

	pub fn call_count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	/// Number of requests of any kind received.
	pub fn total_requests(&self) -> usize {
		self.nonce_requests()
			+ self.submissions()
			+ self.receipt_queries()
			+ self.call_count()
			+ self.balance_queries.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl LedgerInterface for MockLedger {
	async fn chain_id(&self) -> Result<u64, DeliveryError> {
		self.check_reachable()?;
		Ok(Self::CHAIN_ID)
	}

	async fn get_pending_nonce(&self, address: Address) -> Result<u64, DeliveryError> {
		self.nonce_requests.fetch_add(1, Ordering::SeqCst);
		self.check_reachable()?;
		Ok(self.state().nonces.get(&address).copied().unwrap_or(0))
	}

	async fn get_balance(&self, address: Address) -> Result<U256, DeliveryError> {
		self.balance_queries.fetch_add(1, Ordering::SeqCst);
		self.check_reachable()?;
		Ok(self
			.state()
			.balances
			.get(&address)
			.copied()
			.unwrap_or(U256::ZERO))
	}

	async fn get_gas_price(&self) -> Result<u128, DeliveryError> {
		self.check_reachable()?;
		Ok(0)
	}

	async fn get_receipt(&self, hash: TxHash) -> Result<Option<TransactionReceipt>, DeliveryError> {
		self.receipt_queries.fetch_add(1, Ordering::SeqCst);
		self.check_reachable()?;
		let now = Instant::now();
		Ok(self.state().receipts.get(&hash).and_then(|mined| {
			mined
				.visible_at
				.filter(|visible_at| *visible_at <= now)
				.map(|_| mined.receipt.clone())
		}))
	}

	async fn send_raw_transaction(&self, tx: &SignedTransaction) -> Result<TxHash, DeliveryError> {
		self.submissions.fetch_add(1, Ordering::SeqCst);
		self.check_reachable()?;

		let intent = &tx.intent;
		let (expected, hook) = {
			let state = self.state();
			let expected = state.nonces.get(&intent.sender).copied().unwrap_or(0);
			(expected, state.on_transaction.clone())
		};
		if intent.nonce != expected {
			return Err(DeliveryError::Rejected(format!(
				"nonce mismatch: expected {}, got {}",
				expected, intent.nonce
			)));
		}

		// Hooks run without the state lock held
		let outcome = hook.map_or(MockOutcome::Success, |hook| hook(intent));
		if let MockOutcome::Reject(reason) = outcome {
			return Err(DeliveryError::Rejected(reason));
		}

		let mut state = self.state();

		state.nonces.insert(intent.sender, expected + 1);
		state.block_number += 1;

		let success = outcome == MockOutcome::Success;
		let contract_address = match intent.target {
			TransactionTarget::Create if success => Some(intent.sender.create(intent.nonce)),
			_ => None,
		};
		if success && !intent.value.is_zero() {
			if let TransactionTarget::Call(to) = intent.target {
				let sender_balance = state.balances.entry(intent.sender).or_default();
				*sender_balance = sender_balance.saturating_sub(intent.value);
				let target_balance = state.balances.entry(to).or_default();
				*target_balance = target_balance.saturating_add(intent.value);
			}
		}

		let visible_at = if state.withhold_receipts {
			None
		} else {
			Some(Instant::now() + state.receipt_delay)
		};
		let receipt = TransactionReceipt {
			hash: tx.hash,
			block_number: state.block_number,
			success,
			contract_address,
		};
		state.receipts.insert(
			tx.hash,
			MinedReceipt {
				receipt,
				visible_at,
			},
		);
		state.transactions.push(intent.clone());

		Ok(tx.hash)
	}

	async fn call(&self, _from: Address, to: Address, data: Bytes) -> Result<Bytes, DeliveryError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.check_reachable()?;
		let hook = self.state().on_call.clone();
		match hook {
			Some(hook) => hook(to, &data),
			None => Err(DeliveryError::Reverted("no contract code".to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn signed(sender: Address, nonce: u64, hash: u8) -> SignedTransaction {
		SignedTransaction {
			hash: TxHash::repeat_byte(hash),
			raw: Bytes::new(),
			intent: TransactionIntent::call(sender, nonce, Address::repeat_byte(9), "buy", Bytes::new())
				.with_value(U256::from(10)),
		}
	}

	#[tokio::test]
	async fn test_nonce_ordering_enforced() {
		let ledger = MockLedger::new();
		let sender = Address::repeat_byte(1);

		let err = ledger.send_raw_transaction(&signed(sender, 1, 1)).await.unwrap_err();
		assert!(matches!(err, DeliveryError::Rejected(_)));

		ledger.send_raw_transaction(&signed(sender, 0, 2)).await.unwrap();
		assert_eq!(ledger.get_pending_nonce(sender).await.unwrap(), 1);

		let err = ledger.send_raw_transaction(&signed(sender, 0, 3)).await.unwrap_err();
		assert!(matches!(err, DeliveryError::Rejected(_)));
	}

	#[tokio::test]
	async fn test_rejected_outcome_consumes_no_nonce() {
		let ledger = MockLedger::new();
		ledger.on_transaction(|_| MockOutcome::Reject("bad call".into()));
		let sender = Address::repeat_byte(1);

		assert!(ledger.send_raw_transaction(&signed(sender, 0, 1)).await.is_err());
		assert_eq!(ledger.get_pending_nonce(sender).await.unwrap(), 0);
		assert!(ledger.transactions().is_empty());
	}

	#[tokio::test]
	async fn test_value_transfer_and_withheld_receipts() {
		let ledger = MockLedger::new();
		let sender = Address::repeat_byte(1);
		ledger.set_balance(sender, U256::from(100));
		ledger.withhold_receipts(true);

		let hash = ledger.send_raw_transaction(&signed(sender, 0, 1)).await.unwrap();
		assert_eq!(ledger.get_receipt(hash).await.unwrap(), None);
		assert_eq!(ledger.get_balance(sender).await.unwrap(), U256::from(90));
		assert_eq!(
			ledger.get_balance(Address::repeat_byte(9)).await.unwrap(),
			U256::from(10)
		);

		ledger.release_receipts();
		let receipt = ledger.get_receipt(hash).await.unwrap().unwrap();
		assert!(receipt.success);
		assert_eq!(receipt.block_number, 1);
	}

	#[tokio::test]
	async fn test_create_reports_contract_address() {
		let ledger = MockLedger::new();
		let sender = Address::repeat_byte(1);
		let tx = SignedTransaction {
			hash: TxHash::repeat_byte(5),
			raw: Bytes::new(),
			intent: TransactionIntent::create(sender, 0, vec![0x60u8]),
		};

		let hash = ledger.send_raw_transaction(&tx).await.unwrap();
		let receipt = ledger.get_receipt(hash).await.unwrap().unwrap();
		assert_eq!(receipt.contract_address, Some(sender.create(0)));
	}

	#[tokio::test]
	async fn test_calls_without_hook_revert() {
		let ledger = MockLedger::new();
		let err = ledger
			.call(Address::ZERO, Address::ZERO, Bytes::new())
			.await
			.unwrap_err();
		assert!(matches!(err, DeliveryError::Reverted(_)));
		assert_eq!(ledger.call_count(), 1);
	}
}
