//! Delivery-token contract simulated on top of [`MockLedger`] hooks.

use crate::contract::abi::IDeliveryContract::{self, IDeliveryContractCalls};
use crate::contract::{ContractOrchestrator, OrchestratorPolicies};
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{SolCall, SolInterface};
use parcel_account::SignerKey;
use parcel_delivery::implementations::mock::{MockLedger, MockOutcome};
use parcel_delivery::{
	CancelSignal, DeliveryError, DeliveryService, GasSettings, LedgerInterface, RetryPolicy,
};
use parcel_types::{TransactionIntent, TransactionTarget};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct SimToken {
	pub order_id: String,
	pub minter: Address,
	pub owner: Address,
	pub delivery_price: U256,
	pub purchase_price: U256,
	pub withdrawn: bool,
}

#[derive(Default)]
struct ContractState {
	tokens: HashMap<U256, SimToken>,
	by_order: HashMap<String, U256>,
	next_id: u64,
	reject_mints: u32,
	hidden_lookups: u32,
	lookup_calls: u32,
}

pub(crate) struct SimulatedContract {
	pub ledger: Arc<MockLedger>,
	pub vendor: SignerKey,
	pub address: Option<Address>,
	state: Arc<Mutex<ContractState>>,
}

impl SimulatedContract {
	pub fn deployed() -> Self {
		Self::new(Some(Address::repeat_byte(0xde)))
	}

	pub fn undeployed() -> Self {
		Self::new(None)
	}

	fn new(address: Option<Address>) -> Self {
		let sim = Self {
			ledger: Arc::new(MockLedger::new()),
			vendor: SignerKey::random(),
			address,
			state: Arc::new(Mutex::new(ContractState::default())),
		};
		sim.install();
		sim
	}

	/// Reinstalls the contract hooks, replacing any test override.
	pub fn install(&self) {
		let state = Arc::clone(&self.state);
		self.ledger
			.on_transaction(move |intent| execute(&mut state.lock().unwrap(), intent));
		let state = Arc::clone(&self.state);
		self.ledger
			.on_call(move |_, data| query(&mut state.lock().unwrap(), data));
	}

	/// The next `count` mint submissions are refused by the node.
	pub fn reject_next_mints(&self, count: u32) {
		self.state.lock().unwrap().reject_mints = count;
	}

	/// The next `count` token id lookups revert as if state had not
	/// propagated yet.
	pub fn hide_token_lookups(&self, count: u32) {
		self.state.lock().unwrap().hidden_lookups = count;
	}

	pub fn lookup_calls(&self) -> u32 {
		self.state.lock().unwrap().lookup_calls
	}

	pub fn token(&self, token_id: U256) -> Option<SimToken> {
		self.state.lock().unwrap().tokens.get(&token_id).cloned()
	}

	/// Transfers a token directly, bypassing the workflow.
	pub fn set_owner(&self, token_id: U256, owner: Address) {
		if let Some(token) = self.state.lock().unwrap().tokens.get_mut(&token_id) {
			token.owner = owner;
		}
	}

	/// Burns a token directly, bypassing the workflow.
	pub fn remove_token(&self, token_id: U256) {
		let mut state = self.state.lock().unwrap();
		if let Some(token) = state.tokens.remove(&token_id) {
			state.by_order.remove(&token.order_id);
		}
	}
}

fn revert(reason: &str) -> MockOutcome {
	MockOutcome::Revert(reason.to_string())
}

fn execute(state: &mut ContractState, intent: &TransactionIntent) -> MockOutcome {
	if intent.target == TransactionTarget::Create {
		return MockOutcome::Success;
	}
	let Ok(call) = IDeliveryContractCalls::abi_decode(&intent.input, true) else {
		return revert("unknown selector");
	};

	match call {
		IDeliveryContractCalls::mintToken(mint) => {
			if state.reject_mints > 0 {
				state.reject_mints -= 1;
				return MockOutcome::Reject("replacement transaction underpriced".to_string());
			}
			if state.by_order.contains_key(&mint.orderId) {
				return revert("order already minted");
			}
			state.next_id += 1;
			let token_id = U256::from(state.next_id);
			state.by_order.insert(mint.orderId.clone(), token_id);
			state.tokens.insert(
				token_id,
				SimToken {
					order_id: mint.orderId,
					minter: intent.sender,
					owner: intent.sender,
					delivery_price: mint.deliveryPrice,
					purchase_price: mint.purchasePrice,
					withdrawn: false,
				},
			);
			MockOutcome::Success
		}
		IDeliveryContractCalls::buy(buy) => match state.tokens.get_mut(&buy.tokenId) {
			Some(token)
				if token.owner == token.minter
					&& intent.value >= token.delivery_price + token.purchase_price =>
			{
				token.owner = intent.sender;
				MockOutcome::Success
			}
			Some(_) => revert("token not for sale or insufficient payment"),
			None => revert("token does not exist"),
		},
		IDeliveryContractCalls::withdraw(withdraw) => match state.tokens.get_mut(&withdraw.tokenId) {
			Some(token)
				if intent.sender == token.minter && token.owner != token.minter && !token.withdrawn =>
			{
				token.withdrawn = true;
				MockOutcome::Success
			}
			Some(_) => revert("nothing to withdraw"),
			None => revert("token does not exist"),
		},
		IDeliveryContractCalls::burnTokenByOrderId(burn) => {
			match state.by_order.remove(&burn.orderId) {
				Some(token_id) => {
					state.tokens.remove(&token_id);
					MockOutcome::Success
				}
				None => revert("token does not exist"),
			}
		}
		_ => revert("view function"),
	}
}

fn query(state: &mut ContractState, data: &Bytes) -> Result<Bytes, DeliveryError> {
	let missing = || DeliveryError::Reverted("token does not exist".to_string());
	let call = IDeliveryContractCalls::abi_decode(data, true)
		.map_err(|e| DeliveryError::Reverted(e.to_string()))?;

	match call {
		IDeliveryContractCalls::getTokenIdForOrder(lookup) => {
			state.lookup_calls += 1;
			if state.hidden_lookups > 0 {
				state.hidden_lookups -= 1;
				return Err(missing());
			}
			let token_id = state.by_order.get(&lookup.orderId).ok_or_else(missing)?;
			Ok(IDeliveryContract::getTokenIdForOrderCall::abi_encode_returns(&(*token_id,)).into())
		}
		IDeliveryContractCalls::ownerOf(owner_of) => {
			let token = state.tokens.get(&owner_of.tokenId).ok_or_else(missing)?;
			Ok(IDeliveryContract::ownerOfCall::abi_encode_returns(&(token.owner,)).into())
		}
		_ => Err(DeliveryError::Reverted("not a view function".to_string())),
	}
}

fn policies() -> OrchestratorPolicies {
	OrchestratorPolicies {
		mint_submission: RetryPolicy::fixed(5, Duration::from_secs(2)),
		token_lookup: RetryPolicy::fixed(5, Duration::from_secs(2)),
	}
}

fn delivery(ledger: Arc<dyn LedgerInterface>) -> Arc<DeliveryService> {
	Arc::new(DeliveryService::new(
		ledger,
		GasSettings {
			gas_limit: 3_000_000,
			gas_price: Some(0),
			chain_id: Some(MockLedger::CHAIN_ID),
		},
		Duration::from_secs(30),
		Duration::from_secs(2),
	))
}

pub(crate) fn orchestrator(sim: &SimulatedContract) -> ContractOrchestrator {
	orchestrator_over(sim, sim.ledger.clone())
}

/// Orchestrator for `sim` whose node traffic goes through `ledger`.
pub(crate) fn orchestrator_over(
	sim: &SimulatedContract,
	ledger: Arc<dyn LedgerInterface>,
) -> ContractOrchestrator {
	ContractOrchestrator::new(
		delivery(ledger),
		sim.vendor.clone(),
		sim.address,
		Some(Bytes::from(vec![0x60u8, 0x80, 0x60, 0x40])),
		policies(),
		CancelSignal::never(),
	)
}

pub(crate) fn orchestrator_without_bytecode(sim: &SimulatedContract) -> ContractOrchestrator {
	ContractOrchestrator::new(
		delivery(sim.ledger.clone()),
		sim.vendor.clone(),
		sim.address,
		None,
		policies(),
		CancelSignal::never(),
	)
}
