//! String formatting utilities.
//!
//! Hex prefix stripping for user supplied keys, and shortening of long
//! identifiers for log lines.

/// Shortens a hash or identifier for display.
///
/// Keeps the first 10 characters (enough for `0x` and four bytes).
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(10) {
		Some((end, _)) => format!("{}..", &id[..end]),
		None => id.to_string(),
	}
}

/// Removes a `0x` or `0X` prefix from a hex string if present.
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}
