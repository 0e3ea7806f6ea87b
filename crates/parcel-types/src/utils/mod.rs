//! Utility functions for string formatting.

pub mod formatting;

pub use formatting::{truncate_id, without_0x_prefix};
