// SPDX-License-Identifier: GPL-3.0

//! Raw storage value caches consulted by streaming requests.

use crate::chain::ChainId;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A store of raw storage values keyed by chain and storage key.
///
/// Values are kept encoded, so a cached value is decoded against whatever runtime is current
/// when it is read.
#[async_trait]
pub trait StorageCache: Send + Sync {
	async fn get(&self, chain_id: &ChainId, key: &[u8]) -> Option<Vec<u8>>;

	/// Store a fresh value; `None` evicts the key.
	async fn put(&self, chain_id: &ChainId, key: &[u8], value: Option<Vec<u8>>);
}

/// An in-memory [`StorageCache`].
#[derive(Debug, Default)]
pub struct MemoryStorageCache {
	entries: RwLock<HashMap<(ChainId, Vec<u8>), Vec<u8>>>,
}

impl MemoryStorageCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn len(&self) -> usize {
		self.entries.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.entries.read().await.is_empty()
	}
}

#[async_trait]
impl StorageCache for MemoryStorageCache {
	async fn get(&self, chain_id: &ChainId, key: &[u8]) -> Option<Vec<u8>> {
		self.entries.read().await.get(&(chain_id.clone(), key.to_vec())).cloned()
	}

	async fn put(&self, chain_id: &ChainId, key: &[u8], value: Option<Vec<u8>>) {
		let mut entries = self.entries.write().await;
		let entry = (chain_id.clone(), key.to_vec());
		match value {
			Some(value) => entries.insert(entry, value),
			None => entries.remove(&entry),
		};
	}
}
