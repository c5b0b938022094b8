// SPDX-License-Identifier: GPL-3.0

//! The storage query façade.
//!
//! Every operation captures the chain's current coder factory once and uses that snapshot for
//! key derivation and decoding, so a runtime upgrade in the middle of a request never mixes
//! metadata versions.

use super::{
	cache::StorageCache,
	key::StorageKeyEncoder,
	request::{Cardinality, StorageRequest},
	worker::{self, StorageWorker},
};
use crate::{
	chain::ChainId,
	coder::{RuntimeCoderFactory, StorageDecode, Value},
	config::EngineConfig,
	error::{DecodeError, RpcError, StorageError},
	metadata::StorageEntry,
	pool::ConnectionPool,
	runtime::RuntimeRegistry,
	state::StateRpc,
};
use futures::Stream;
use indexmap::IndexMap;
use log::{debug, warn};
use std::sync::Arc;

/// Performs storage requests against one chain.
#[derive(Clone)]
pub struct StorageRequestPerformer {
	chain_id: ChainId,
	pool: Arc<ConnectionPool>,
	runtimes: Arc<RuntimeRegistry>,
	config: EngineConfig,
	cache: Option<Arc<dyn StorageCache>>,
}

impl StorageRequestPerformer {
	pub fn new(
		chain_id: ChainId,
		pool: Arc<ConnectionPool>,
		runtimes: Arc<RuntimeRegistry>,
		config: EngineConfig,
	) -> Self {
		Self { chain_id, pool, runtimes, config, cache: None }
	}

	/// Consult and refresh `cache` in the streaming operations.
	pub fn with_cache(mut self, cache: Arc<dyn StorageCache>) -> Self {
		self.cache = Some(cache);
		self
	}

	pub fn chain_id(&self) -> &ChainId {
		&self.chain_id
	}

	/// Read one value. Absent values of defaulted entries read as the default.
	pub async fn perform_single<T: StorageDecode>(&self, request: &StorageRequest) -> Result<Option<T>, StorageError> {
		expect_cardinality(request, Cardinality::Single)?;
		let factory = self.runtimes.factory(&self.chain_id).await?;
		let (entry, key) = single_key(&factory, request)?;
		let raw = self.fetch(std::slice::from_ref(&key), request).await?.pop().flatten();
		Ok(worker::decode_value(&factory, entry, raw.as_deref())?)
	}

	/// Read several values, one result per requested key in request order.
	///
	/// A value that fails to decode only fails its own slot.
	pub async fn perform_multiple<T: StorageDecode>(
		&self,
		request: &StorageRequest,
	) -> Result<Vec<Result<Option<T>, DecodeError>>, StorageError> {
		expect_cardinality(request, Cardinality::Multiple)?;
		let factory = self.runtimes.factory(&self.chain_id).await?;
		let encoder = StorageKeyEncoder::new(&factory);
		let entry = encoder.entry(&request.path)?;
		let keys = StorageWorker::select(request)?.keys(&encoder, &request.path)?;
		if keys.is_empty() {
			return Ok(vec![]);
		}
		let values = self.fetch(&keys, request).await?;
		Ok(values.iter().map(|raw| worker::decode_value(&factory, entry, raw.as_deref())).collect())
	}

	/// Enumerate an entry, keyed by the key components that follow the request's leading ones.
	///
	/// Items are in enumeration order. Items that fail to decode are skipped.
	pub async fn perform_prefix<T: StorageDecode>(&self, request: &StorageRequest) -> Result<IndexMap<Value, T>, StorageError> {
		expect_cardinality(request, Cardinality::Prefix)?;
		let factory = self.runtimes.factory(&self.chain_id).await?;
		let encoder = StorageKeyEncoder::new(&factory);
		let entry = encoder.entry(&request.path)?;
		let prefix = StorageWorker::select(request)?.prefix(&encoder, &request.path)?;

		let rpc = self.rpc(request).await?;
		let items = match worker::fetch_prefix(
			&rpc,
			&prefix,
			self.config.keys_page_size,
			self.config.query_batch_size,
			request.at,
		)
		.await
		{
			Ok(items) => items,
			Err(e) => return Err(self.failed(&rpc, e).await),
		};

		let mut values = IndexMap::with_capacity(items.len());
		for (key, raw) in items {
			let decoded = encoder
				.decode_key_suffix(&prefix, &key)
				.and_then(|item| Ok((item, worker::decode_value::<T>(&factory, entry, raw.as_deref())?)));
			match decoded {
				Ok((item, Some(value))) => {
					values.insert(item, value);
				},
				Ok((_, None)) => debug!("Key 0x{} of {} vanished during the scan", hex::encode(&key), request.path),
				Err(e) => warn!("Skipping undecodable item 0x{} of {}: {e}", hex::encode(&key), request.path),
			}
		}
		Ok(values)
	}

	/// Like [`Self::perform_single`], first yielding the cached value if there is one.
	///
	/// The fresh value is written back to the cache.
	pub fn stream_single<'a, T: StorageDecode + 'a>(
		&'a self,
		request: StorageRequest,
	) -> impl Stream<Item = Result<Option<T>, StorageError>> + 'a {
		async_stream::try_stream! {
			expect_cardinality(&request, Cardinality::Single)?;
			let factory = self.runtimes.factory(&self.chain_id).await?;
			let (entry, key) = single_key(&factory, &request)?;
			if let Some(cache) = &self.cache {
				if let Some(cached) = cache.get(&self.chain_id, &key).await {
					match worker::decode_value::<T>(&factory, entry, Some(cached.as_slice())) {
						Ok(value) => yield value,
						Err(e) => warn!("Ignoring cached value of {}: {e}", request.path),
					}
				}
			}
			let raw = self.fetch(std::slice::from_ref(&key), &request).await?.pop().flatten();
			if let Some(cache) = &self.cache {
				cache.put(&self.chain_id, &key, raw.clone()).await;
			}
			yield worker::decode_value(&factory, entry, raw.as_deref())?;
		}
	}

	/// Like [`Self::perform_multiple`], first yielding the cached values when every requested key
	/// is cached.
	pub fn stream_multiple<'a, T: StorageDecode + 'a>(
		&'a self,
		request: StorageRequest,
	) -> impl Stream<Item = Result<Vec<Result<Option<T>, DecodeError>>, StorageError>> + 'a {
		async_stream::try_stream! {
			expect_cardinality(&request, Cardinality::Multiple)?;
			let factory = self.runtimes.factory(&self.chain_id).await?;
			let encoder = StorageKeyEncoder::new(&factory);
			let entry = encoder.entry(&request.path)?;
			let keys = StorageWorker::select(&request)?.keys(&encoder, &request.path)?;
			if let Some(cache) = &self.cache {
				let mut cached = Vec::with_capacity(keys.len());
				for key in &keys {
					match cache.get(&self.chain_id, key).await {
						Some(raw) => cached.push(raw),
						None => break,
					}
				}
				if !keys.is_empty() && cached.len() == keys.len() {
					let results: Vec<Result<Option<T>, DecodeError>> =
						cached.iter().map(|raw| worker::decode_value(&factory, entry, Some(raw.as_slice()))).collect();
					yield results;
				}
			}
			let values = if keys.is_empty() { vec![] } else { self.fetch(&keys, &request).await? };
			if let Some(cache) = &self.cache {
				for (key, raw) in keys.iter().zip(&values) {
					cache.put(&self.chain_id, key, raw.clone()).await;
				}
			}
			let results: Vec<Result<Option<T>, DecodeError>> =
				values.iter().map(|raw| worker::decode_value(&factory, entry, raw.as_deref())).collect();
			yield results;
		}
	}

	async fn rpc(&self, request: &StorageRequest) -> Result<StateRpc, StorageError> {
		let connection = self.pool.acquire(&self.chain_id).await?;
		Ok(StateRpc::new(connection).with_timeout(request.timeout))
	}

	async fn fetch(&self, keys: &[Vec<u8>], request: &StorageRequest) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
		let rpc = self.rpc(request).await?;
		match worker::fetch_values(&rpc, keys, request.at, self.config.query_batch_size).await {
			Ok(values) => Ok(values),
			Err(e) => Err(self.failed(&rpc, e).await),
		}
	}

	/// Report a transport failure to the pool so the next request uses another node.
	async fn failed(&self, rpc: &StateRpc, error: RpcError) -> StorageError {
		if error.is_transport() {
			let url = rpc.connection().url();
			if let Err(e) = self.pool.report_failure(&self.chain_id, &url).await {
				warn!("Failover for chain {} failed: {e}", self.chain_id);
			}
		}
		error.into()
	}
}

fn expect_cardinality(request: &StorageRequest, expected: Cardinality) -> Result<(), StorageError> {
	if request.cardinality == expected {
		return Ok(());
	}
	Err(StorageError::IncompatibleStorageType {
		path: request.path.clone(),
		reason: format!("expected a {expected:?} request, got {:?}", request.cardinality),
	})
}

/// The entry and the one key of a single-value request.
fn single_key<'f>(
	factory: &'f RuntimeCoderFactory,
	request: &StorageRequest,
) -> Result<(&'f StorageEntry, Vec<u8>), StorageError> {
	let encoder = StorageKeyEncoder::new(factory);
	let entry = encoder.entry(&request.path)?;
	let mut keys = StorageWorker::select(request)?.keys(&encoder, &request.path)?;
	match (keys.pop(), keys.is_empty()) {
		(Some(key), true) => Ok((entry, key)),
		_ => Err(StorageError::IncompatibleStorageType {
			path: request.path.clone(),
			reason: "single requests resolve to exactly one key".into(),
		}),
	}
}
