// SPDX-License-Identifier: GPL-3.0

//! String constants for the JSON-RPC layer.

/// JSON-RPC method names.
///
/// These match the actual RPC method names in the Polkadot SDK JSON-RPC specification.
pub mod methods {
	pub const STATE_GET_STORAGE: &str = "state_getStorage";
	pub const STATE_QUERY_STORAGE_AT: &str = "state_queryStorageAt";
	pub const STATE_GET_KEYS_PAGED: &str = "state_getKeysPaged";
	pub const STATE_GET_METADATA: &str = "state_getMetadata";
	pub const STATE_GET_RUNTIME_VERSION: &str = "state_getRuntimeVersion";
}

/// JSON-RPC 2.0 protocol constants.
pub mod protocol {
	/// The protocol version carried by every envelope.
	pub const VERSION: &str = "2.0";
	/// Error code for a method the server does not know.
	pub const METHOD_NOT_FOUND: i64 = -32601;
	/// Error code for malformed parameters.
	pub const INVALID_PARAMS: i64 = -32602;
}
