// SPDX-License-Identifier: GPL-3.0

//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default deadline for a single JSON-RPC call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
/// Default deadline for a chain's coder factory to become available.
pub const DEFAULT_FACTORY_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of keys requested per `state_getKeysPaged` page.
pub const DEFAULT_KEYS_PAGE_SIZE: u32 = 1000;
/// Default number of keys per `state_queryStorageAt` call.
pub const DEFAULT_QUERY_BATCH_SIZE: usize = 500;

/// Tunables for connections, the runtime provider and storage workers.
///
/// Every field has a default, so a partial TOML document is enough:
///
/// ```toml
/// call_timeout = 5000
/// reconnect_attempts = 5
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
	/// Deadline applied to every RPC call without a per-call override, in milliseconds.
	#[serde(with = "duration_millis_format")]
	pub call_timeout: Duration,
	/// How long a storage request waits for the chain's coder factory, in milliseconds.
	#[serde(with = "duration_millis_format")]
	pub factory_timeout: Duration,
	/// Reconnect attempts against the same node before a connection gives up.
	pub reconnect_attempts: u32,
	/// Pause between reconnect attempts, in milliseconds.
	#[serde(with = "duration_millis_format")]
	pub reconnect_delay: Duration,
	/// Page size for prefix key enumeration.
	pub keys_page_size: u32,
	/// Maximum number of keys fetched by one batched value query.
	pub query_batch_size: usize,
	/// Maximum number of in-flight requests per connection.
	pub pending_capacity: usize,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			call_timeout: DEFAULT_CALL_TIMEOUT,
			factory_timeout: DEFAULT_FACTORY_TIMEOUT,
			reconnect_attempts: 3,
			reconnect_delay: Duration::from_secs(1),
			keys_page_size: DEFAULT_KEYS_PAGE_SIZE,
			query_batch_size: DEFAULT_QUERY_BATCH_SIZE,
			pending_capacity: 1024,
		}
	}
}

impl EngineConfig {
	/// Parse a configuration from a TOML document, filling missing fields with defaults.
	pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(source)
	}
}

pub mod duration_millis_format {
	use serde::{Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(duration.as_millis() as u64)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = u64::deserialize(deserializer)?;
		Ok(Duration::from_millis(value))
	}
}
