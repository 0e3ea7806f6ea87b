//! Storage namespaces for the parcel system.

/// Storage namespaces.
///
/// Keys are written as `<namespace>:<id>`; this enum replaces the namespace
/// string literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order records keyed by order id.
	Orders,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
		}
	}
}
