// SPDX-License-Identifier: GPL-3.0

//! Typed `state_*` calls over a [`Connection`].
//!
//! Keys and values travel as `0x`-prefixed hex strings. A missing storage value is `null` on the
//! wire and `None` here.

use crate::{
	connection::{CallOptions, Connection},
	error::RpcError,
	metadata::RuntimeVersion,
	strings::rpc::methods,
};
use serde::Deserialize;
use serde_json::{Value, json};
use sp_core::H256;
use std::{collections::HashMap, sync::Arc, time::Duration};

#[derive(Deserialize)]
struct StorageChangeSet {
	changes: Vec<(String, Option<String>)>,
}

/// The `state_*` RPC methods a storage query needs.
#[derive(Clone)]
pub struct StateRpc {
	connection: Arc<Connection>,
	timeout: Option<Duration>,
}

impl StateRpc {
	pub fn new(connection: Arc<Connection>) -> Self {
		Self { connection, timeout: None }
	}

	/// Override the connection's call deadline.
	pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn connection(&self) -> &Arc<Connection> {
		&self.connection
	}

	/// A single storage value.
	///
	/// # Returns
	/// * `Ok(Some(value))` - Storage exists with value
	/// * `Ok(None)` - Storage key doesn't exist
	/// * `Err(_)` - RPC error
	pub async fn storage(&self, key: &[u8], at: Option<H256>) -> Result<Option<Vec<u8>>, RpcError> {
		let result = self.call(methods::STATE_GET_STORAGE, with_block(vec![to_hex(key).into()], at)).await?;
		optional_bytes(&result)
	}

	/// Several storage values in one call, in the same order as `keys`.
	pub async fn storage_batch(&self, keys: &[Vec<u8>], at: Option<H256>) -> Result<Vec<Option<Vec<u8>>>, RpcError> {
		if keys.is_empty() {
			return Ok(vec![]);
		}
		let hex_keys: Vec<String> = keys.iter().map(|key| to_hex(key)).collect();
		let result = self.call(methods::STATE_QUERY_STORAGE_AT, with_block(vec![json!(hex_keys)], at)).await?;
		let change_sets: Vec<StorageChangeSet> =
			serde_json::from_value(result).map_err(|e| RpcError::InvalidResponse(e.to_string()))?;

		let mut changes = HashMap::new();
		for (key, value) in change_sets.into_iter().flat_map(|set| set.changes) {
			let value = value.as_deref().map(from_hex).transpose()?;
			changes.insert(from_hex(&key)?, value);
		}
		// A key repeated in `keys` gets the same value in every slot.
		Ok(keys.iter().map(|key| changes.get(key).cloned().flatten()).collect())
	}

	/// Up to `count` keys under `prefix`, starting after `start_key`.
	pub async fn storage_keys_paged(
		&self,
		prefix: &[u8],
		count: u32,
		start_key: Option<&[u8]>,
		at: Option<H256>,
	) -> Result<Vec<Vec<u8>>, RpcError> {
		let params = vec![to_hex(prefix).into(), count.into(), start_key.map(to_hex).into()];
		let result = self.call(methods::STATE_GET_KEYS_PAGED, with_block(params, at)).await?;
		let keys: Vec<String> =
			serde_json::from_value(result).map_err(|e| RpcError::InvalidResponse(e.to_string()))?;
		keys.iter().map(|key| from_hex(key)).collect()
	}

	/// The raw SCALE encoded runtime metadata.
	pub async fn metadata(&self, at: Option<H256>) -> Result<Vec<u8>, RpcError> {
		let result = self.call(methods::STATE_GET_METADATA, with_block(vec![], at)).await?;
		optional_bytes(&result)?.ok_or_else(|| RpcError::InvalidResponse("no metadata returned".into()))
	}

	pub async fn runtime_version(&self, at: Option<H256>) -> Result<RuntimeVersion, RpcError> {
		let result = self.call(methods::STATE_GET_RUNTIME_VERSION, with_block(vec![], at)).await?;
		serde_json::from_value(result).map_err(|e| RpcError::InvalidResponse(e.to_string()))
	}

	async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
		let options = CallOptions { timeout: self.timeout, cancel: None };
		self.connection.request_with(method, Value::Array(params), options).await
	}
}

fn with_block(mut params: Vec<Value>, at: Option<H256>) -> Vec<Value> {
	if let Some(hash) = at {
		params.push(to_hex(hash.as_bytes()).into());
	}
	params
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
	format!("0x{}", hex::encode(bytes))
}

pub(crate) fn from_hex(value: &str) -> Result<Vec<u8>, RpcError> {
	let digits = value.strip_prefix("0x").unwrap_or(value);
	hex::decode(digits).map_err(|e| RpcError::InvalidResponse(format!("invalid hex {value:?}: {e}")))
}

fn optional_bytes(value: &Value) -> Result<Option<Vec<u8>>, RpcError> {
	match value {
		Value::Null => Ok(None),
		Value::String(hex) => from_hex(hex).map(Some),
		other => Err(RpcError::InvalidResponse(format!("expected a hex string, got {other}"))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		config::EngineConfig,
		testing::{MockConnector, MockNode, VERSION_1},
	};
	use url::Url;

	fn rpc(node: &MockNode) -> StateRpc {
		let url: Url = "ws://node:9944".parse().unwrap();
		let connector = Arc::new(MockConnector::new());
		connector.add_node(url.clone(), node.clone());
		StateRpc::new(Arc::new(Connection::open("polkadot".into(), url, connector, &EngineConfig::default())))
	}

	#[test]
	fn hex_helpers() {
		assert_eq!(to_hex(&[0xde, 0xad]), "0xdead");
		assert_eq!(from_hex("0xdead").unwrap(), vec![0xde, 0xad]);
		assert_eq!(from_hex("beef").unwrap(), vec![0xbe, 0xef]);
		assert!(matches!(from_hex("0xzz"), Err(RpcError::InvalidResponse(_))));
	}

	#[test]
	fn block_hash_is_appended() {
		let params = with_block(vec![json!("0x00")], Some(H256::repeat_byte(0x11)));
		assert_eq!(params[1], json!(format!("0x{}", "11".repeat(32))));
		assert_eq!(with_block(vec![], None), Vec::<Value>::new());
	}

	#[tokio::test]
	async fn storage_present_and_absent() {
		let node = MockNode::new();
		node.insert(vec![1], vec![42]);
		let rpc = rpc(&node);
		assert_eq!(rpc.storage(&[1], None).await.unwrap(), Some(vec![42]));
		assert_eq!(rpc.storage(&[2], None).await.unwrap(), None);
	}

	#[tokio::test]
	async fn storage_batch_preserves_input_order() {
		let node = MockNode::new();
		node.insert(vec![1], vec![10]);
		node.insert(vec![3], vec![30]);
		let rpc = rpc(&node);
		let values = rpc.storage_batch(&[vec![3], vec![2], vec![1]], None).await.unwrap();
		assert_eq!(values, vec![Some(vec![30]), None, Some(vec![10])]);
		assert!(rpc.storage_batch(&[], None).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn storage_batch_repeats_value_for_repeated_keys() {
		let node = MockNode::new();
		node.insert(vec![1], vec![10]);
		node.insert(vec![2], vec![20]);
		let rpc = rpc(&node);
		let values = rpc.storage_batch(&[vec![1], vec![2], vec![1], vec![3], vec![1]], None).await.unwrap();
		assert_eq!(values, vec![Some(vec![10]), Some(vec![20]), Some(vec![10]), None, Some(vec![10])]);
	}

	#[tokio::test]
	async fn keys_paged_walks_in_order() {
		let node = MockNode::new();
		for i in 0..5u8 {
			node.insert(vec![9, i], vec![i]);
		}
		node.insert(vec![8, 0], vec![0]);
		let rpc = rpc(&node);
		let first = rpc.storage_keys_paged(&[9], 2, None, None).await.unwrap();
		assert_eq!(first, vec![vec![9, 0], vec![9, 1]]);
		let rest = rpc.storage_keys_paged(&[9], 10, Some(&[9, 1]), None).await.unwrap();
		assert_eq!(rest, vec![vec![9, 2], vec![9, 3], vec![9, 4]]);
	}

	#[tokio::test]
	async fn runtime_version_and_metadata() {
		let node = MockNode::new();
		node.set_runtime(VERSION_1, vec![1, 2, 3]);
		let rpc = rpc(&node);
		assert_eq!(rpc.runtime_version(None).await.unwrap(), VERSION_1);
		assert_eq!(rpc.metadata(None).await.unwrap(), vec![1, 2, 3]);
	}
}
