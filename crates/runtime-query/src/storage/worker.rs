// SPDX-License-Identifier: GPL-3.0

//! Workers that turn a request into RPC calls.
//!
//! Every worker derives and validates all of its keys before the first call, so a malformed
//! request never reaches the node.

use super::{
	key::{StorageKeyEncoder, StoragePrefix},
	request::{Cardinality, KeyParam, NMapKeys, StorageParams, StorageRequest},
};
use crate::{
	coder::{RuntimeCoderFactory, StorageDecode},
	error::{DecodeError, RpcError, StorageError},
	metadata::{StorageCodingPath, StorageEntry, StorageEntryModifier},
	state::StateRpc,
};
use futures::future::try_join_all;
use log::{debug, trace};
use sp_core::H256;
use std::slice;

/// The worker that serves a request, borrowing its key parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StorageWorker<'r> {
	/// A plain entry.
	Simple,
	/// One single-component key per item.
	Encodable(&'r [KeyParam]),
	/// One multi-component key per row.
	NMap(&'r NMapKeys),
	/// Every key under a prefix of leading components.
	Prefix(&'r [KeyParam]),
}

impl<'r> StorageWorker<'r> {
	/// Pick the worker for a request, rejecting parameter kinds that do not fit its cardinality.
	pub fn select(request: &'r StorageRequest) -> Result<Self, StorageError> {
		let path = &request.path;
		match (request.cardinality, &request.params) {
			(Cardinality::Prefix, StorageParams::None) => Ok(Self::Prefix(&[])),
			(Cardinality::Prefix, StorageParams::Encodable(param)) => Ok(Self::Prefix(slice::from_ref(param))),
			(Cardinality::Prefix, StorageParams::EncodableList(params)) => Ok(Self::Prefix(params)),
			(Cardinality::Prefix, StorageParams::NMap(_)) =>
				Err(incompatible(path, "prefix scans take leading key components, not n-map rows")),
			(Cardinality::Single, StorageParams::None) => Ok(Self::Simple),
			(Cardinality::Multiple, StorageParams::None) => Err(StorageError::MissingRequiredParams(path.clone())),
			(Cardinality::Single, StorageParams::EncodableList(_)) =>
				Err(incompatible(path, "single requests take one key, got a key list")),
			(_, StorageParams::Encodable(param)) => Ok(Self::Encodable(slice::from_ref(param))),
			(_, StorageParams::EncodableList(params)) => Ok(Self::Encodable(params)),
			(_, StorageParams::NMap(keys)) => Ok(Self::NMap(keys)),
		}
	}

	/// The storage keys to read, in result order.
	pub fn keys(&self, encoder: &StorageKeyEncoder<'_>, path: &StorageCodingPath) -> Result<Vec<Vec<u8>>, StorageError> {
		match self {
			Self::Simple => {
				if encoder.entry(path)?.shape.arity() > 0 {
					return Err(StorageError::MissingRequiredParams(path.clone()));
				}
				Ok(vec![encoder.key(path, &[])?])
			},
			Self::Encodable(params) => encoder.keys(path, params),
			Self::NMap(keys) => encoder.n_map_keys(path, keys),
			Self::Prefix(_) => Err(incompatible(path, "prefix scans have no fixed set of keys")),
		}
	}

	/// The iteration prefix of a prefix scan.
	pub fn prefix(&self, encoder: &StorageKeyEncoder<'_>, path: &StorageCodingPath) -> Result<StoragePrefix, StorageError> {
		match self {
			Self::Prefix(leading) => {
				let prefix = encoder.prefix(path, leading)?;
				if !prefix.reveals_keys() {
					return Err(incompatible(path, "its hashers do not reveal the keys to enumerate"));
				}
				Ok(prefix)
			},
			_ => Err(incompatible(path, "only prefix requests can be enumerated")),
		}
	}
}

/// Read `keys` in order, one `state_getStorage` call for a single key and concurrent
/// `state_queryStorageAt` batches of at most `batch_size` keys otherwise.
pub(crate) async fn fetch_values(
	rpc: &StateRpc,
	keys: &[Vec<u8>],
	at: Option<H256>,
	batch_size: usize,
) -> Result<Vec<Option<Vec<u8>>>, RpcError> {
	match keys {
		[] => Ok(vec![]),
		[key] => Ok(vec![rpc.storage(key, at).await?]),
		_ => {
			let batches = keys.chunks(batch_size.max(1)).map(|batch| rpc.storage_batch(batch, at));
			let values: Vec<Option<Vec<u8>>> = try_join_all(batches).await?.into_iter().flatten().collect();
			trace!("Fetched {} values in batches of {batch_size}", values.len());
			Ok(values)
		},
	}
}

/// Enumerate every key under `prefix` page by page, then read their values.
pub(crate) async fn fetch_prefix(
	rpc: &StateRpc,
	prefix: &StoragePrefix,
	page_size: u32,
	batch_size: usize,
	at: Option<H256>,
) -> Result<Vec<(Vec<u8>, Option<Vec<u8>>)>, RpcError> {
	let page_size = page_size.max(1);
	let mut keys: Vec<Vec<u8>> = Vec::new();
	let mut pages = 0;
	loop {
		let start = keys.last().map(Vec::as_slice);
		let page = rpc.storage_keys_paged(prefix.as_bytes(), page_size, start, at).await?;
		pages += 1;
		let last = page.len() < page_size as usize;
		keys.extend(page);
		if last {
			break;
		}
	}
	debug!("Enumerated {} keys of {} in {pages} pages", keys.len(), prefix.path());
	let values = fetch_values(rpc, &keys, at, batch_size).await?;
	Ok(keys.into_iter().zip(values).collect())
}

/// Decode a raw value, reading absent keys of defaulted entries as the entry's default.
pub(crate) fn decode_value<T: StorageDecode>(
	factory: &RuntimeCoderFactory,
	entry: &StorageEntry,
	raw: Option<&[u8]>,
) -> Result<Option<T>, DecodeError> {
	let bytes = match (raw, entry.modifier) {
		(Some(bytes), _) => bytes,
		(None, StorageEntryModifier::Default) => entry.default.as_slice(),
		(None, StorageEntryModifier::Optional) => return Ok(None),
	};
	factory.decode_as(entry.value, bytes).map(Some)
}

fn incompatible(path: &StorageCodingPath, reason: &str) -> StorageError {
	StorageError::IncompatibleStorageType { path: path.clone(), reason: reason.into() }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		coder::Value,
		testing::{self, ALICE},
	};

	fn factory() -> RuntimeCoderFactory {
		RuntimeCoderFactory::new(testing::metadata())
	}

	#[test]
	fn worker_selection() {
		let path = StorageCodingPath::SYSTEM_ACCOUNT;
		let alice = KeyParam::Value(Value::from(ALICE));
		assert_eq!(StorageWorker::select(&StorageRequest::plain(StorageCodingPath::SYSTEM_NUMBER)).unwrap(), StorageWorker::Simple);
		assert!(matches!(
			StorageWorker::select(&StorageRequest::single(path.clone(), alice.clone())).unwrap(),
			StorageWorker::Encodable([_])
		));
		assert!(matches!(
			StorageWorker::select(&StorageRequest::prefix(path.clone())).unwrap(),
			StorageWorker::Prefix([])
		));
		let request = StorageRequest::n_map(testing::ASSETS_APPROVALS, NMapKeys::default());
		assert!(matches!(StorageWorker::select(&request).unwrap(), StorageWorker::NMap(_)));
	}

	#[test]
	fn cardinality_mismatches_are_rejected() {
		let path = StorageCodingPath::SYSTEM_ACCOUNT;
		let mut request = StorageRequest::multiple(path.clone(), Vec::<KeyParam>::new());
		request.params = StorageParams::None;
		assert_eq!(StorageWorker::select(&request), Err(StorageError::MissingRequiredParams(path.clone())));

		let mut request = StorageRequest::plain(path.clone());
		request.params = StorageParams::EncodableList(vec![]);
		assert!(matches!(StorageWorker::select(&request), Err(StorageError::IncompatibleStorageType { .. })));

		let mut request = StorageRequest::prefix(path);
		request.params = StorageParams::NMap(NMapKeys::default());
		assert!(matches!(StorageWorker::select(&request), Err(StorageError::IncompatibleStorageType { .. })));
	}

	#[test]
	fn simple_worker_on_a_map_requires_params() {
		let factory = factory();
		let encoder = StorageKeyEncoder::new(&factory);
		let path = StorageCodingPath::SYSTEM_ACCOUNT;
		assert_eq!(StorageWorker::Simple.keys(&encoder, &path), Err(StorageError::MissingRequiredParams(path)));
	}

	#[test]
	fn prefix_over_opaque_hashers_is_rejected() {
		let factory = factory();
		let encoder = StorageKeyEncoder::new(&factory);
		assert!(matches!(
			StorageWorker::Prefix(&[]).prefix(&encoder, &testing::SESSION_QUEUED_KEYS_HASH),
			Err(StorageError::IncompatibleStorageType { .. })
		));
	}

	#[test]
	fn absent_values_follow_the_modifier() {
		let factory = factory();
		let metadata = factory.metadata();
		let account = metadata.storage_entry(&StorageCodingPath::SYSTEM_ACCOUNT).unwrap();
		let decoded: Option<Value> = decode_value(&factory, account, None).unwrap();
		assert_eq!(decoded, Some(testing::account_info(0, 0, 0)));

		let issuance = metadata.storage_entry(&StorageCodingPath::BALANCES_TOTAL_ISSUANCE).unwrap();
		assert_eq!(decode_value::<Value>(&factory, issuance, None).unwrap(), None);
		let raw = 10u128.to_le_bytes();
		assert_eq!(decode_value::<Value>(&factory, issuance, Some(&raw)).unwrap(), Some(Value::UInt(10)));
	}
}
