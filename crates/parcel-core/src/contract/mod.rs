//! Contract orchestration.
//!
//! [`ContractOrchestrator`] composes nonce allocation, submission and
//! confirmation into the delivery-token contract's operations. Vendor-signed
//! operations use the configured vendor key; `buy` is signed by the customer.
//! Callers must serialize operations signed by the same key.

pub mod abi;

use abi::IDeliveryContract;
use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_sol_types::SolCall;
use parcel_account::SignerKey;
use parcel_delivery::{
	CancelSignal, DeliveryError, DeliveryService, NonceLease, RetryPolicy, SignedTransaction,
};
use parcel_types::{truncate_id, Purchase, TransactionIntent, TransactionReceipt};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors raised by contract operations.
#[derive(Debug, Error)]
pub enum ContractError {
	#[error(transparent)]
	Delivery(#[from] DeliveryError),
	#[error("Invalid input: {0}")]
	InvalidInput(String),
	#[error("Token [{0}] does not exist or has been burned")]
	TokenNotFound(String),
	#[error("Failed to decode contract response: {0}")]
	Decode(String),
	#[error("No delivery contract has been deployed")]
	NotDeployed,
	#[error("No contract bytecode configured")]
	MissingBytecode,
}

impl ContractError {
	/// True for transient delivery failures.
	pub fn is_retryable(&self) -> bool {
		matches!(self, ContractError::Delivery(e) if e.is_retryable())
	}
}

/// A freshly minted delivery token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintedToken {
	pub token_id: U256,
	pub contract_address: Address,
	/// Hash of the mint transaction.
	pub tx_hash: TxHash,
}

/// Retry policies applied by the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorPolicies {
	/// Mint submission; transient errors are retried once the node is known
	/// not to hold the failed transaction.
	pub mint_submission: RetryPolicy,
	/// Token id lookup after a confirmed mint; every error is retried.
	pub token_lookup: RetryPolicy,
}

/// Runs delivery-token contract operations against the ledger.
pub struct ContractOrchestrator {
	delivery: Arc<DeliveryService>,
	vendor: SignerKey,
	bytecode: Option<Bytes>,
	contract: RwLock<Option<Address>>,
	policies: OrchestratorPolicies,
	cancel: CancelSignal,
}

impl ContractOrchestrator {
	/// Creates an orchestrator.
	///
	/// `contract` is the address of an already deployed contract, if any.
	/// Every wait and retry pause ends early once `cancel` fires.
	pub fn new(
		delivery: Arc<DeliveryService>,
		vendor: SignerKey,
		contract: Option<Address>,
		bytecode: Option<Bytes>,
		policies: OrchestratorPolicies,
		cancel: CancelSignal,
	) -> Self {
		Self {
			delivery,
			vendor,
			bytecode,
			contract: RwLock::new(contract),
			policies,
			cancel,
		}
	}

	pub fn vendor_address(&self) -> Address {
		self.vendor.address()
	}

	/// Address of the delivery contract, once known.
	pub async fn contract_address(&self) -> Option<Address> {
		*self.contract.read().await
	}

	async fn require_contract(&self) -> Result<Address, ContractError> {
		self.contract_address().await.ok_or(ContractError::NotDeployed)
	}

	/// Deploys a new delivery contract and records its address.
	///
	/// Not retried; any failure is returned to the caller.
	pub async fn deploy(&self) -> Result<Address, ContractError> {
		let mut lease = self.delivery.nonces().lease(self.vendor.address()).await?;
		self.deploy_with(&mut lease).await
	}

	async fn deploy_with(&self, lease: &mut NonceLease) -> Result<Address, ContractError> {
		let bytecode = self.bytecode.clone().ok_or(ContractError::MissingBytecode)?;
		let intent = TransactionIntent::create(self.vendor.address(), lease.take(), bytecode);
		let receipt = self.delivery.execute(&self.vendor, intent, &self.cancel).await?;

		let address = receipt.contract_address.ok_or_else(|| {
			ContractError::Decode(format!(
				"deployment receipt {} carries no contract address",
				receipt.hash
			))
		})?;
		*self.contract.write().await = Some(address);

		tracing::info!(contract = %address, block = receipt.block_number, "Deployed delivery contract");
		Ok(address)
	}

	/// Returns the known contract address, deploying a contract first when
	/// there is none.
	pub async fn ensure_deployed(&self) -> Result<Address, ContractError> {
		match self.contract_address().await {
			Some(address) => Ok(address),
			None => self.deploy().await,
		}
	}

	/// Mints the delivery token of `purchase` and returns its id.
	///
	/// When no contract exists yet it is deployed first and the mint uses
	/// the next nonce of the same lease. Submission is retried per the mint
	/// policy with a fresh nonce on every attempt, unless a failed send may
	/// still have reached the pool: that transaction is awaited instead.
	/// The confirmation wait is not retried. The token id is then looked up
	/// per the lookup policy.
	pub async fn mint(&self, purchase: &Purchase) -> Result<MintedToken, ContractError> {
		if purchase.order_id.is_empty() {
			return Err(ContractError::InvalidInput("order id is empty".to_string()));
		}
		if purchase.recipient == Address::ZERO {
			return Err(ContractError::InvalidInput(
				"recipient is the zero address".to_string(),
			));
		}

		let (tx_hash, contract_address) = self
			.policies
			.mint_submission
			.run("mint_submission", &self.cancel, ContractError::is_retryable, || {
				self.submit_mint(purchase)
			})
			.await?;

		let receipt = self.delivery.waiter().confirm(tx_hash, &self.cancel).await?;
		tracing::info!(
			order_id = %truncate_id(&purchase.order_id),
			tx_hash = %truncate_id(&tx_hash.to_string()),
			block = receipt.block_number,
			"Mint confirmed"
		);

		let token_id = self
			.policies
			.token_lookup
			.run("token_lookup", &self.cancel, |_: &ContractError| true, || {
				self.token_id_for_order(&purchase.order_id)
			})
			.await?;

		Ok(MintedToken {
			token_id,
			contract_address,
			tx_hash,
		})
	}

	async fn submit_mint(&self, purchase: &Purchase) -> Result<(TxHash, Address), ContractError> {
		let mut lease = self.delivery.nonces().lease(self.vendor.address()).await?;
		let contract = match self.contract_address().await {
			Some(address) => address,
			None => self.deploy_with(&mut lease).await?,
		};

		let call = IDeliveryContract::mintTokenCall {
			deliveryPrice: purchase.delivery_price,
			purchasePrice: purchase.purchase_price,
			orderId: purchase.order_id.clone(),
			recipient: purchase.recipient,
		};
		let intent = TransactionIntent::call(
			self.vendor.address(),
			lease.take(),
			contract,
			"mintToken",
			call.abi_encode(),
		);
		let signed = self.delivery.submitter().sign(&self.vendor, intent).await?;
		match self.delivery.submitter().send(&signed).await {
			Ok(submitted) => Ok((submitted.hash, contract)),
			Err(e) if self.may_hold(&signed).await => {
				tracing::warn!(
					order_id = %truncate_id(&purchase.order_id),
					tx_hash = %truncate_id(&signed.hash.to_string()),
					error = %e,
					"Mint send failed after its nonce was consumed; awaiting it instead of resubmitting"
				);
				Ok((signed.hash, contract))
			}
			Err(e) => Err(e.into()),
		}
	}

	/// Whether the node may hold `signed` although sending it failed.
	///
	/// True once the pending nonce has moved past the transaction's nonce,
	/// or when the nonce cannot be read.
	async fn may_hold(&self, signed: &SignedTransaction) -> bool {
		match self.delivery.nonces().next_nonce(signed.intent.sender).await {
			Ok(pending) => pending > signed.intent.nonce,
			Err(_) => true,
		}
	}

	/// Token id the contract assigned to `order_id`.
	pub async fn token_id_for_order(&self, order_id: &str) -> Result<U256, ContractError> {
		let contract = self.require_contract().await?;
		let call = IDeliveryContract::getTokenIdForOrderCall {
			orderId: order_id.to_string(),
		};
		let output = self
			.delivery
			.call(self.vendor.address(), contract, call.abi_encode().into())
			.await?;
		let decoded = IDeliveryContract::getTokenIdForOrderCall::abi_decode_returns(&output, true)
			.map_err(|e| ContractError::Decode(e.to_string()))?;
		Ok(decoded._0)
	}

	/// Customer purchase: pays `total_price` into the contract and takes
	/// ownership of the token.
	pub async fn buy(
		&self,
		token_id: U256,
		customer: &SignerKey,
		total_price: U256,
	) -> Result<TransactionReceipt, ContractError> {
		let contract = self.require_contract().await?;
		self.log_balances("before buy", Some(customer.address())).await;

		let nonce = self.delivery.nonces().next_nonce(customer.address()).await?;
		let call = IDeliveryContract::buyCall { tokenId: token_id };
		let intent = TransactionIntent::call(customer.address(), nonce, contract, "buy", call.abi_encode())
			.with_value(total_price);
		let receipt = self.delivery.execute(customer, intent, &self.cancel).await?;

		self.log_balances("after buy", Some(customer.address())).await;
		tracing::info!(%token_id, buyer = %customer.address(), "Token bought");
		Ok(receipt)
	}

	/// Releases the escrowed payment of `token_id` to the vendor.
	pub async fn pay_vendor(&self, token_id: U256) -> Result<TransactionReceipt, ContractError> {
		let contract = self.require_contract().await?;
		self.log_balances("before withdraw", None).await;

		let receipt = self
			.send_vendor_call(
				contract,
				"withdraw",
				IDeliveryContract::withdrawCall { tokenId: token_id }.abi_encode(),
			)
			.await?;

		self.log_balances("after withdraw", None).await;
		tracing::info!(%token_id, "Vendor paid");
		Ok(receipt)
	}

	/// Burns the token of `order_id` and waits for confirmation.
	pub async fn burn(&self, order_id: &str) -> Result<TransactionReceipt, ContractError> {
		let contract = self.require_contract().await?;
		let receipt = self
			.send_vendor_call(
				contract,
				"burnTokenByOrderId",
				IDeliveryContract::burnTokenByOrderIdCall {
					orderId: order_id.to_string(),
				}
				.abi_encode(),
			)
			.await?;
		tracing::info!(order_id = %truncate_id(order_id), "Token burned");
		Ok(receipt)
	}

	/// Current owner of `token_id`.
	///
	/// A reverted call or the zero address means the token does not exist.
	/// Other node errors are passed through unchanged.
	pub async fn get_owner(&self, token_id: U256) -> Result<Address, ContractError> {
		let contract = self.require_contract().await?;
		let call = IDeliveryContract::ownerOfCall { tokenId: token_id };
		let output = match self
			.delivery
			.call(self.vendor.address(), contract, call.abi_encode().into())
			.await
		{
			Ok(output) => output,
			Err(DeliveryError::Reverted(reason)) => {
				tracing::debug!(%token_id, %reason, "ownerOf reverted");
				return Err(ContractError::TokenNotFound(token_id.to_string()));
			}
			Err(e) => return Err(e.into()),
		};

		let owner = IDeliveryContract::ownerOfCall::abi_decode_returns(&output, true)
			.map_err(|e| ContractError::Decode(e.to_string()))?
			._0;
		if owner == Address::ZERO {
			return Err(ContractError::TokenNotFound(token_id.to_string()));
		}
		Ok(owner)
	}

	async fn send_vendor_call(
		&self,
		contract: Address,
		operation: &str,
		input: Vec<u8>,
	) -> Result<TransactionReceipt, ContractError> {
		let nonce = self.delivery.nonces().next_nonce(self.vendor.address()).await?;
		let intent = TransactionIntent::call(self.vendor.address(), nonce, contract, operation, input);
		Ok(self.delivery.execute(&self.vendor, intent, &self.cancel).await?)
	}

	/// Logs customer, vendor and contract balances at debug level.
	async fn log_balances(&self, stage: &str, customer: Option<Address>) {
		if !tracing::enabled!(tracing::Level::DEBUG) {
			return;
		}

		let mut parties = vec![("vendor", self.vendor.address())];
		if let Some(contract) = self.contract_address().await {
			parties.push(("contract", contract));
		}
		if let Some(customer) = customer {
			parties.push(("customer", customer));
		}

		for (party, address) in parties {
			match self.delivery.balance(address).await {
				Ok(balance) => tracing::debug!(stage, party, %address, %balance, "Balance"),
				Err(e) => tracing::debug!(stage, party, %address, error = %e, "Balance unavailable"),
			}
		}
	}
}
