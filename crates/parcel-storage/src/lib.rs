//! Storage module for the parcel system.
//!
//! This module provides a key-value abstraction with pluggable backends
//! (in-memory and file-based), a typed [`StorageService`] on top of it, and
//! the [`OrderRepository`] the workflow persists orders through.

use async_trait::async_trait;
use parcel_types::{ImplementationRegistry, Order, StorageKey};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors raised by storage backends and the order store.
#[derive(Debug, Error)]
pub enum StorageError {
	/// No value under the key.
	#[error("Not found")]
	NotFound,
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// The backend failed to read or write (I/O, lock, encoding).
	#[error("Backend error: {0}")]
	Backend(String),
	/// Backend settings in `[storage.implementations]` are unusable.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Byte-level key-value operations every backend provides.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Raw value under `key`, or [`StorageError::NotFound`].
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, replacing any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists every key starting with `prefix`, sorted.
	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Builds a backend from its `[storage.implementations.<name>]` table.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Name and factory of every backend this crate ships.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Typed JSON access on top of a backend; values live under
/// `<namespace>:<id>`.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	/// Stores a serializable value, creating or overwriting it.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&Self::key(namespace, id), bytes).await
	}

	/// Reads and decodes one value.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Updates an existing value in storage.
	///
	/// Returns [`StorageError::NotFound`] if the key doesn't exist, unlike
	/// [`store`](Self::store) which creates or overwrites.
	pub async fn update<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = Self::key(namespace, id);
		if !self.backend.exists(&key).await? {
			return Err(StorageError::NotFound);
		}

		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key, bytes).await
	}

	/// Retrieves every value of a namespace, ordered by id.
	///
	/// Entries that no longer deserialize are skipped with a warning.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: &str,
	) -> Result<Vec<T>, StorageError> {
		let prefix = format!("{}:", namespace);
		let keys = self.backend.list_keys(&prefix).await?;

		let mut values = Vec::with_capacity(keys.len());
		for key in keys {
			let bytes = match self.backend.get_bytes(&key).await {
				Ok(bytes) => bytes,
				// Deleted between listing and reading
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			};
			match serde_json::from_slice(&bytes) {
				Ok(value) => values.push(value),
				Err(e) => tracing::warn!(%key, error = %e, "Skipping undecodable entry"),
			}
		}
		Ok(values)
	}
}

/// Persistence of order records.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait OrderRepository: Send + Sync {
	/// Returns the order, or `None` when no order has this id.
	async fn get_order(&self, order_id: &str) -> Result<Option<Order>, StorageError>;

	/// Persists a new order.
	async fn create_order(&self, order: &Order) -> Result<(), StorageError>;

	/// Sets the delivered flag of an existing order.
	async fn mark_order_delivered(&self, order_id: &str) -> Result<(), StorageError>;

	/// Sets the canceled flag of an existing order.
	async fn mark_order_canceled(&self, order_id: &str) -> Result<(), StorageError>;

	/// Every stored order, ordered by id.
	async fn list_orders(&self) -> Result<Vec<Order>, StorageError>;
}

/// [`OrderRepository`] over a [`StorageService`], one JSON value per order
/// under the `orders` namespace.
pub struct StorageOrderRepository {
	storage: Arc<StorageService>,
}

impl StorageOrderRepository {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	async fn modify<F>(&self, order_id: &str, change: F) -> Result<(), StorageError>
	where
		F: FnOnce(&mut Order) + Send,
	{
		let namespace = StorageKey::Orders.as_str();
		let mut order: Order = self.storage.retrieve(namespace, order_id).await?;
		change(&mut order);
		self.storage.update(namespace, order_id, &order).await
	}
}

#[async_trait]
impl OrderRepository for StorageOrderRepository {
	async fn get_order(&self, order_id: &str) -> Result<Option<Order>, StorageError> {
		match self
			.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
		{
			Ok(order) => Ok(Some(order)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	async fn create_order(&self, order: &Order) -> Result<(), StorageError> {
		self.storage
			.store(StorageKey::Orders.as_str(), &order.order_id, order)
			.await?;
		tracing::debug!(order_id = %order.order_id, "Stored order");
		Ok(())
	}

	async fn mark_order_delivered(&self, order_id: &str) -> Result<(), StorageError> {
		self.modify(order_id, |order| order.delivered = true).await
	}

	async fn mark_order_canceled(&self, order_id: &str) -> Result<(), StorageError> {
		self.modify(order_id, |order| order.canceled = true).await
	}

	async fn list_orders(&self) -> Result<Vec<Order>, StorageError> {
		self.storage
			.retrieve_all(StorageKey::Orders.as_str())
			.await
	}
}
