// SPDX-License-Identifier: GPL-3.0

//! Storage key derivation.
//!
//! A key is `twox128(module prefix) ++ twox128(item)` followed by every key component, each
//! SCALE encoded with its declared type and passed through its declared hasher:
//!
//! ```text
//! System.Account(alice)
//! ┌──────────────────┬──────────────────┬──────────────────────┬──────────────┐
//! │ twox128(System)  │ twox128(Account) │ blake2_128(alice)    │ alice        │
//! │ 16 bytes         │ 16 bytes         │ 16 bytes             │ 32 bytes     │
//! └──────────────────┴──────────────────┴──────────────────────┴──────────────┘
//!                                        └────── Blake2_128Concat(alice) ─────┘
//! ```
//!
//! Key derivation is pure: failures are deterministic and never worth retrying.

use super::request::{KeyParam, NMapKeys};
use crate::{
	coder::{Composite, RuntimeCoderFactory, TypeId, Value},
	error::{DecodeError, StorageError},
	metadata::{StorageCodingPath, StorageEntry, StorageHasher},
};

/// The iteration prefix of a storage entry plus what is needed to read back the remaining key
/// components of every key under it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoragePrefix {
	path: StorageCodingPath,
	bytes: Vec<u8>,
	remaining: Vec<(TypeId, StorageHasher)>,
}

impl StoragePrefix {
	pub fn path(&self) -> &StorageCodingPath {
		&self.path
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.bytes
	}

	/// Number of key components that follow the prefix.
	pub fn remaining_components(&self) -> usize {
		self.remaining.len()
	}

	/// Whether every remaining component can be read back from a full key.
	pub fn reveals_keys(&self) -> bool {
		self.remaining.iter().all(|(_, hasher)| hasher.reveals_key())
	}
}

/// Derives storage keys from a runtime's storage catalog.
pub struct StorageKeyEncoder<'a> {
	factory: &'a RuntimeCoderFactory,
}

impl<'a> StorageKeyEncoder<'a> {
	pub fn new(factory: &'a RuntimeCoderFactory) -> Self {
		Self { factory }
	}

	/// The entry declared at `path`.
	pub fn entry(&self, path: &StorageCodingPath) -> Result<&'a StorageEntry, StorageError> {
		self.factory
			.metadata()
			.storage_entry(path)
			.ok_or_else(|| StorageError::InvalidStoragePath(path.clone()))
	}

	/// The key of one value, with exactly as many components as the entry declares.
	pub fn key(&self, path: &StorageCodingPath, params: &[KeyParam]) -> Result<Vec<u8>, StorageError> {
		let entry = self.entry(path)?;
		let components = entry.shape.components();
		if components.len() != params.len() {
			return Err(incompatible(
				path,
				format!("expected {} key components, got {}", components.len(), params.len()),
			));
		}
		let mut key = self.item_prefix(path)?;
		for ((ty, hasher), param) in components.iter().zip(params) {
			key.extend(self.component(*ty, *hasher, param)?);
		}
		Ok(key)
	}

	/// One key per param for single-component entries, in input order.
	pub fn keys(&self, path: &StorageCodingPath, params: &[KeyParam]) -> Result<Vec<Vec<u8>>, StorageError> {
		params.iter().map(|param| self.key(path, std::slice::from_ref(param))).collect()
	}

	/// One key per row of `keys`, in input order.
	///
	/// Every column must have the same length and there must be one column per key component;
	/// otherwise nothing is encoded.
	pub fn n_map_keys(&self, path: &StorageCodingPath, keys: &NMapKeys) -> Result<Vec<Vec<u8>>, StorageError> {
		let arity = self.entry(path)?.shape.arity();
		if keys.width() != arity {
			return Err(incompatible(
				path,
				format!("expected {arity} key component lists, got {}", keys.width()),
			));
		}
		if keys.row_count().is_none() {
			return Err(incompatible(path, "key component lists differ in length".into()));
		}
		keys.rows()
			.into_iter()
			.map(|row| {
				let row: Vec<KeyParam> = row.into_iter().cloned().collect();
				self.key(path, &row)
			})
			.collect()
	}

	/// The prefix shared by all keys starting with `leading` components.
	pub fn prefix(&self, path: &StorageCodingPath, leading: &[KeyParam]) -> Result<StoragePrefix, StorageError> {
		let entry = self.entry(path)?;
		let mut components = entry.shape.components();
		if components.is_empty() {
			return Err(incompatible(path, "plain entries have no keys to enumerate".into()));
		}
		if leading.len() >= components.len() {
			return Err(incompatible(
				path,
				format!(
					"a prefix takes fewer than {} key components, got {}",
					components.len(),
					leading.len()
				),
			));
		}
		let remaining = components.split_off(leading.len());
		let mut bytes = self.item_prefix(path)?;
		for ((ty, hasher), param) in components.iter().zip(leading) {
			bytes.extend(self.component(*ty, *hasher, param)?);
		}
		Ok(StoragePrefix { path: path.clone(), bytes, remaining })
	}

	/// Recover the key components that follow `prefix` in `key`.
	///
	/// A single remaining component is returned as is, several as an unnamed composite.
	pub fn decode_key_suffix(&self, prefix: &StoragePrefix, key: &[u8]) -> Result<Value, StorageError> {
		let path = &prefix.path;
		let Some(mut suffix) = key.strip_prefix(prefix.bytes.as_slice()) else {
			return Err(incompatible(path, format!("key 0x{} is outside the prefix", hex::encode(key))));
		};
		let mut values = Vec::with_capacity(prefix.remaining.len());
		for (ty, hasher) in &prefix.remaining {
			if !hasher.reveals_key() {
				return Err(incompatible(path, format!("{hasher:?} keys cannot be decoded")));
			}
			let digest = hasher.digest_len();
			if suffix.len() < digest {
				return Err(DecodeError::SchemaMismatch {
					ty: *ty,
					detail: format!("need a {digest} byte digest, {} left", suffix.len()),
				}
				.into());
			}
			let mut decoder = self.factory.decoder(&suffix[digest..]);
			values.push(decoder.decode(*ty)?);
			suffix = decoder.remaining();
		}
		if !suffix.is_empty() {
			return Err(DecodeError::SchemaMismatch {
				ty: prefix.remaining.last().map(|(ty, _)| *ty).unwrap_or(TypeId(0)),
				detail: format!("{} trailing key bytes", suffix.len()),
			}
			.into());
		}
		Ok(match values.len() {
			1 => values.remove(0),
			_ => Value::Composite(Composite::Unnamed(values)),
		})
	}

	fn item_prefix(&self, path: &StorageCodingPath) -> Result<Vec<u8>, StorageError> {
		let module = self
			.factory
			.metadata()
			.storage_prefix(path.module())
			.ok_or_else(|| StorageError::InvalidStoragePath(path.clone()))?;
		let mut key = Vec::with_capacity(32);
		key.extend(sp_core::twox_128(module.as_bytes()));
		key.extend(sp_core::twox_128(path.item().as_bytes()));
		Ok(key)
	}

	fn component(&self, ty: TypeId, hasher: StorageHasher, param: &KeyParam) -> Result<Vec<u8>, StorageError> {
		let hashed = match param {
			KeyParam::Value(value) => hasher.hash(&self.factory.encode(ty, value)?),
			KeyParam::Encoded(bytes) => hasher.hash(bytes),
		};
		Ok(hashed)
	}
}

fn incompatible(path: &StorageCodingPath, reason: String) -> StorageError {
	StorageError::IncompatibleStorageType { path: path.clone(), reason }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{self, ALICE, BOB};
	use scale::Encode;

	/// System::Number storage key: twox128("System") ++ twox128("Number")
	const SYSTEM_NUMBER_KEY: &str = "26aa394eea5630e07c48ae0c9558cef702a5c1b19ab7a04f536c519aca4983ac";

	fn factory() -> RuntimeCoderFactory {
		RuntimeCoderFactory::new(testing::metadata())
	}

	fn alice() -> KeyParam {
		KeyParam::Value(Value::from(ALICE))
	}

	#[test]
	fn plain_key_is_module_and_item_hash() {
		let factory = factory();
		let encoder = StorageKeyEncoder::new(&factory);
		let key = encoder.key(&StorageCodingPath::SYSTEM_NUMBER, &[]).unwrap();
		assert_eq!(hex::encode(key), SYSTEM_NUMBER_KEY);
	}

	#[test]
	fn system_account_key_matches_known_layout() {
		let factory = factory();
		let encoder = StorageKeyEncoder::new(&factory);
		let key = encoder.key(&StorageCodingPath::SYSTEM_ACCOUNT, &[alice()]).unwrap();
		assert_eq!(key.len(), 80);
		assert_eq!(key, testing::account_storage_key(&ALICE));
		assert_eq!(&key[48..], &ALICE);
	}

	#[test]
	fn pre_encoded_params_match_dynamic_values() {
		let factory = factory();
		let encoder = StorageKeyEncoder::new(&factory);
		let dynamic = encoder.key(&StorageCodingPath::SYSTEM_ACCOUNT, &[alice()]).unwrap();
		let encoded = encoder.key(&StorageCodingPath::SYSTEM_ACCOUNT, &[KeyParam::encoded(&ALICE)]).unwrap();
		assert_eq!(dynamic, encoded);
	}

	#[test]
	fn key_derivation_is_deterministic() {
		let factory = factory();
		let encoder = StorageKeyEncoder::new(&factory);
		let params = [KeyParam::Value(Value::from(5u32)), KeyParam::Value(Value::from(BOB))];
		let first = encoder.key(&StorageCodingPath::STAKING_ERAS_STAKERS, &params).unwrap();
		let second = encoder.key(&StorageCodingPath::STAKING_ERAS_STAKERS, &params).unwrap();
		assert_eq!(first, second);
	}

	#[test]
	fn double_map_uses_each_components_hasher() {
		let factory = factory();
		let encoder = StorageKeyEncoder::new(&factory);
		let params = [KeyParam::Value(Value::from(5u32)), KeyParam::Value(Value::from(BOB))];
		let key = encoder.key(&StorageCodingPath::STAKING_ERAS_STAKERS, &params).unwrap();
		let era = 5u32.encode();
		let expected = [
			&sp_core::twox_128(b"Staking")[..],
			&sp_core::twox_128(b"ErasStakers")[..],
			&sp_core::twox_64(&era)[..],
			&era[..],
			&sp_core::twox_64(&BOB)[..],
			&BOB[..],
		]
		.concat();
		assert_eq!(key, expected);
	}

	#[test]
	fn unknown_path_fails() {
		let factory = factory();
		let encoder = StorageKeyEncoder::new(&factory);
		let path = StorageCodingPath::new("System", "Nope");
		assert_eq!(encoder.key(&path, &[]), Err(StorageError::InvalidStoragePath(path)));
	}

	#[test]
	fn wrong_arity_fails() {
		let factory = factory();
		let encoder = StorageKeyEncoder::new(&factory);
		assert!(matches!(
			encoder.key(&StorageCodingPath::SYSTEM_ACCOUNT, &[]),
			Err(StorageError::IncompatibleStorageType { .. })
		));
		assert!(matches!(
			encoder.key(&StorageCodingPath::SYSTEM_NUMBER, &[alice()]),
			Err(StorageError::IncompatibleStorageType { .. })
		));
	}

	#[test]
	fn wrong_param_type_is_encode_error() {
		let factory = factory();
		let encoder = StorageKeyEncoder::new(&factory);
		let short = KeyParam::Value(Value::Bytes(vec![1; 20]));
		assert!(matches!(
			encoder.key(&StorageCodingPath::SYSTEM_ACCOUNT, &[short]),
			Err(StorageError::Encode(_))
		));
	}

	#[test]
	fn n_map_keys_follow_row_order() {
		let factory = factory();
		let encoder = StorageKeyEncoder::new(&factory);
		let path = testing::ASSETS_APPROVALS;
		let rows = vec![
			vec![KeyParam::Value(Value::from(1u32)), alice(), KeyParam::Value(Value::from(BOB))],
			vec![KeyParam::Value(Value::from(2u32)), KeyParam::Value(Value::from(BOB)), alice()],
		];
		let keys = encoder.n_map_keys(&path, &NMapKeys::from_rows(rows.clone())).unwrap();
		assert_eq!(keys.len(), 2);
		for (key, row) in keys.iter().zip(&rows) {
			assert_eq!(key, &encoder.key(&path, row).unwrap());
		}
	}

	#[test]
	fn n_map_unequal_columns_fail() {
		let factory = factory();
		let encoder = StorageKeyEncoder::new(&factory);
		let keys = NMapKeys::from_columns(vec![
			vec![KeyParam::Value(Value::from(1u32)), KeyParam::Value(Value::from(2u32))],
			vec![alice()],
			vec![alice()],
		]);
		assert!(matches!(
			encoder.n_map_keys(&testing::ASSETS_APPROVALS, &keys),
			Err(StorageError::IncompatibleStorageType { .. })
		));
	}

	#[test]
	fn concat_suffix_recovers_the_key() {
		let factory = factory();
		let encoder = StorageKeyEncoder::new(&factory);
		let prefix = encoder.prefix(&StorageCodingPath::SYSTEM_ACCOUNT, &[]).unwrap();
		assert_eq!(prefix.as_bytes().len(), 32);
		let key = encoder.key(&StorageCodingPath::SYSTEM_ACCOUNT, &[alice()]).unwrap();
		assert!(key.starts_with(prefix.as_bytes()));
		assert_eq!(encoder.decode_key_suffix(&prefix, &key).unwrap(), Value::from(ALICE));
	}

	#[test]
	fn suffix_after_leading_components() {
		let factory = factory();
		let encoder = StorageKeyEncoder::new(&factory);
		let path = testing::ASSETS_APPROVALS;
		let one = KeyParam::Value(Value::from(1u32));
		let prefix = encoder.prefix(&path, std::slice::from_ref(&one)).unwrap();
		assert_eq!(prefix.remaining_components(), 2);
		let key = encoder.key(&path, &[one, alice(), KeyParam::Value(Value::from(BOB))]).unwrap();
		assert_eq!(
			encoder.decode_key_suffix(&prefix, &key).unwrap(),
			Value::unnamed([Value::from(ALICE), Value::from(BOB)])
		);
	}

	#[test]
	fn opaque_hashers_cannot_be_decoded() {
		let factory = factory();
		let encoder = StorageKeyEncoder::new(&factory);
		let path = testing::SESSION_QUEUED_KEYS_HASH;
		let prefix = encoder.prefix(&path, &[]).unwrap();
		assert!(!prefix.reveals_keys());
		let key = encoder.key(&path, &[KeyParam::Value(Value::from(3u32))]).unwrap();
		assert!(matches!(
			encoder.decode_key_suffix(&prefix, &key),
			Err(StorageError::IncompatibleStorageType { .. })
		));
	}

	#[test]
	fn prefix_of_plain_entry_fails() {
		let factory = factory();
		let encoder = StorageKeyEncoder::new(&factory);
		assert!(matches!(
			encoder.prefix(&StorageCodingPath::SYSTEM_NUMBER, &[]),
			Err(StorageError::IncompatibleStorageType { .. })
		));
	}
}
