//! Common types module for the parcel fulfillment system.
//!
//! This module defines the data types shared by every parcel crate: ledger
//! transaction intents and receipts, order records, workflow events and the
//! request/response shapes of the HTTP surface.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Ledger transaction types: intents, submissions, receipts and confirmation outcomes.
pub mod delivery;
/// Event types published while orders move through their lifecycle.
pub mod events;
/// Order records and the purchase payload that drives minting.
pub mod order;
/// Base trait for self-registering implementations.
pub mod registry;
/// Zeroizing string wrapper for secrets read from configuration.
pub mod secret_string;
/// Storage namespaces.
pub mod storage;
/// Utility functions for common string conversions.
pub mod utils;

// Re-export all types for convenient access
pub use api::*;
pub use delivery::*;
pub use events::*;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use storage::*;
pub use utils::{truncate_id, without_0x_prefix};
