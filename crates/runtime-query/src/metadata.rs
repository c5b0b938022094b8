// SPDX-License-Identifier: GPL-3.0

//! Storage and type catalogs of a runtime.

use crate::{
	coder::{TypeDef, TypeId, TypeRegistry},
	error::MetadataError,
	strings::storage::{balances, staking, system},
};
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, collections::HashMap, fmt};
use subxt::{
	Metadata,
	ext::codec::Decode,
	metadata::types::{
		StorageEntryModifier as SubxtModifier, StorageEntryType, StorageHasher as SubxtHasher,
	},
};

/// Identifies a runtime: metadata is only valid for the version it was fetched at.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeVersion {
	pub spec_version: u32,
	pub transaction_version: u32,
}

impl RuntimeVersion {
	pub const fn new(spec_version: u32, transaction_version: u32) -> Self {
		Self { spec_version, transaction_version }
	}
}

impl fmt::Display for RuntimeVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.spec_version, self.transaction_version)
	}
}

/// A `(module, item)` pair naming a storage entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StorageCodingPath {
	module: Cow<'static, str>,
	item: Cow<'static, str>,
}

impl StorageCodingPath {
	pub const SYSTEM_ACCOUNT: Self = Self::from_static(system::MODULE, system::ACCOUNT);
	pub const SYSTEM_NUMBER: Self = Self::from_static(system::MODULE, system::NUMBER);
	pub const BALANCES_TOTAL_ISSUANCE: Self =
		Self::from_static(balances::MODULE, balances::TOTAL_ISSUANCE);
	pub const STAKING_LEDGER: Self = Self::from_static(staking::MODULE, staking::LEDGER);
	pub const STAKING_ERAS_STAKERS: Self = Self::from_static(staking::MODULE, staking::ERAS_STAKERS);

	pub fn new(module: impl Into<String>, item: impl Into<String>) -> Self {
		Self { module: Cow::Owned(module.into()), item: Cow::Owned(item.into()) }
	}

	pub const fn from_static(module: &'static str, item: &'static str) -> Self {
		Self { module: Cow::Borrowed(module), item: Cow::Borrowed(item) }
	}

	pub fn module(&self) -> &str {
		&self.module
	}

	pub fn item(&self) -> &str {
		&self.item
	}
}

impl fmt::Display for StorageCodingPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.module, self.item)
	}
}

/// Hash function applied to a storage key component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageHasher {
	Blake2_128,
	Blake2_256,
	Blake2_128Concat,
	Twox128,
	Twox256,
	Twox64Concat,
	Identity,
}

impl StorageHasher {
	/// Hash an encoded key component. Concat hashers append the input after the digest.
	pub fn hash(&self, encoded: &[u8]) -> Vec<u8> {
		match self {
			StorageHasher::Blake2_128 => sp_core::blake2_128(encoded).to_vec(),
			StorageHasher::Blake2_256 => sp_core::blake2_256(encoded).to_vec(),
			StorageHasher::Blake2_128Concat => [&sp_core::blake2_128(encoded)[..], encoded].concat(),
			StorageHasher::Twox128 => sp_core::twox_128(encoded).to_vec(),
			StorageHasher::Twox256 => sp_core::twox_256(encoded).to_vec(),
			StorageHasher::Twox64Concat => [&sp_core::twox_64(encoded)[..], encoded].concat(),
			StorageHasher::Identity => encoded.to_vec(),
		}
	}

	/// Length of the digest that precedes any appended pre-image.
	pub fn digest_len(&self) -> usize {
		match self {
			StorageHasher::Blake2_128 | StorageHasher::Blake2_128Concat | StorageHasher::Twox128 => 16,
			StorageHasher::Blake2_256 | StorageHasher::Twox256 => 32,
			StorageHasher::Twox64Concat => 8,
			StorageHasher::Identity => 0,
		}
	}

	/// Whether the encoded key can be read back from a hashed key.
	pub fn reveals_key(&self) -> bool {
		matches!(
			self,
			StorageHasher::Blake2_128Concat | StorageHasher::Twox64Concat | StorageHasher::Identity
		)
	}
}

impl From<&SubxtHasher> for StorageHasher {
	fn from(hasher: &SubxtHasher) -> Self {
		match hasher {
			SubxtHasher::Blake2_128 => StorageHasher::Blake2_128,
			SubxtHasher::Blake2_256 => StorageHasher::Blake2_256,
			SubxtHasher::Blake2_128Concat => StorageHasher::Blake2_128Concat,
			SubxtHasher::Twox128 => StorageHasher::Twox128,
			SubxtHasher::Twox256 => StorageHasher::Twox256,
			SubxtHasher::Twox64Concat => StorageHasher::Twox64Concat,
			SubxtHasher::Identity => StorageHasher::Identity,
		}
	}
}

/// Key layout of a storage entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageEntryShape {
	Plain,
	Map { key: TypeId, hasher: StorageHasher },
	DoubleMap { key1: TypeId, hasher1: StorageHasher, key2: TypeId, hasher2: StorageHasher },
	NMap { keys: Vec<TypeId>, hashers: Vec<StorageHasher> },
}

impl StorageEntryShape {
	/// Number of key components.
	pub fn arity(&self) -> usize {
		match self {
			StorageEntryShape::Plain => 0,
			StorageEntryShape::Map { .. } => 1,
			StorageEntryShape::DoubleMap { .. } => 2,
			StorageEntryShape::NMap { keys, .. } => keys.len(),
		}
	}

	/// Key component types paired with their hashers, in key order.
	pub fn components(&self) -> Vec<(TypeId, StorageHasher)> {
		match self {
			StorageEntryShape::Plain => Vec::new(),
			StorageEntryShape::Map { key, hasher } => vec![(*key, *hasher)],
			StorageEntryShape::DoubleMap { key1, hasher1, key2, hasher2 } =>
				vec![(*key1, *hasher1), (*key2, *hasher2)],
			StorageEntryShape::NMap { keys, hashers } =>
				keys.iter().copied().zip(hashers.iter().copied()).collect(),
		}
	}
}

/// What a read of an absent key yields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageEntryModifier {
	/// Absent keys read as nothing.
	Optional,
	/// Absent keys read as the entry's default value.
	Default,
}

/// A storage entry as declared by the runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageEntry {
	pub shape: StorageEntryShape,
	pub value: TypeId,
	pub modifier: StorageEntryModifier,
	/// Encoded default value, used when `modifier` is [`StorageEntryModifier::Default`].
	pub default: Vec<u8>,
}

impl StorageEntry {
	pub fn plain(value: TypeId) -> Self {
		Self::new(StorageEntryShape::Plain, value)
	}

	pub fn map(key: TypeId, hasher: StorageHasher, value: TypeId) -> Self {
		Self::new(StorageEntryShape::Map { key, hasher }, value)
	}

	pub fn double_map(
		(key1, hasher1): (TypeId, StorageHasher),
		(key2, hasher2): (TypeId, StorageHasher),
		value: TypeId,
	) -> Self {
		Self::new(StorageEntryShape::DoubleMap { key1, hasher1, key2, hasher2 }, value)
	}

	pub fn n_map(components: impl IntoIterator<Item = (TypeId, StorageHasher)>, value: TypeId) -> Self {
		let (keys, hashers) = components.into_iter().unzip();
		Self::new(StorageEntryShape::NMap { keys, hashers }, value)
	}

	fn new(shape: StorageEntryShape, value: TypeId) -> Self {
		Self { shape, value, modifier: StorageEntryModifier::Optional, default: Vec::new() }
	}

	/// Mark the entry as defaulted, reading absent keys as `default`.
	pub fn with_default(mut self, default: Vec<u8>) -> Self {
		self.modifier = StorageEntryModifier::Default;
		self.default = default;
		self
	}
}

#[derive(Clone, Debug, Default)]
struct PalletStorage {
	prefix: String,
	entries: HashMap<String, StorageEntry>,
}

/// Immutable metadata snapshot of one runtime version.
#[derive(Clone, Debug)]
pub struct ChainMetadata {
	version: RuntimeVersion,
	types: TypeRegistry,
	pallets: HashMap<String, PalletStorage>,
}

impl ChainMetadata {
	/// Decode a SCALE encoded `RuntimeMetadataPrefixed` blob (V14 or later).
	pub fn from_bytes(mut bytes: &[u8], version: RuntimeVersion) -> Result<Self, MetadataError> {
		let metadata = Metadata::decode(&mut bytes).map_err(|_| MetadataError::DecodeError)?;
		Self::from_subxt(&metadata, version)
	}

	/// Build the catalog from already decoded metadata.
	pub fn from_subxt(metadata: &Metadata, version: RuntimeVersion) -> Result<Self, MetadataError> {
		let types = TypeRegistry::from_portable(metadata.types())?;
		let mut pallets = HashMap::new();
		for pallet in metadata.pallets() {
			let Some(storage) = pallet.storage() else { continue };
			let mut entries = HashMap::new();
			for entry in storage.entries() {
				let (shape, value) = match entry.entry_type() {
					StorageEntryType::Plain(value) => (StorageEntryShape::Plain, TypeId(*value)),
					StorageEntryType::Map { hashers, key_ty, value_ty } =>
						(map_shape(&types, hashers, TypeId(*key_ty))?, TypeId(*value_ty)),
				};
				let modifier = match entry.modifier() {
					SubxtModifier::Optional => StorageEntryModifier::Optional,
					SubxtModifier::Default => StorageEntryModifier::Default,
				};
				entries.insert(
					entry.name().to_owned(),
					StorageEntry { shape, value, modifier, default: entry.default_bytes().to_vec() },
				);
			}
			pallets.insert(
				pallet.name().to_owned(),
				PalletStorage { prefix: storage.prefix().to_owned(), entries },
			);
		}
		Ok(Self { version, types, pallets })
	}

	pub fn version(&self) -> RuntimeVersion {
		self.version
	}

	pub fn types(&self) -> &TypeRegistry {
		&self.types
	}

	/// The storage entry at `path`, if the runtime declares one.
	pub fn storage_entry(&self, path: &StorageCodingPath) -> Option<&StorageEntry> {
		self.pallets.get(path.module())?.entries.get(path.item())
	}

	/// The storage prefix hashed into keys of `module`'s entries.
	pub fn storage_prefix(&self, module: &str) -> Option<&str> {
		self.pallets.get(module).map(|p| p.prefix.as_str())
	}
}

/// Split a map key into its components. Multi-hasher maps key by a tuple.
fn map_shape(
	types: &TypeRegistry,
	hashers: &[SubxtHasher],
	key: TypeId,
) -> Result<StorageEntryShape, MetadataError> {
	let hashers: Vec<StorageHasher> = hashers.iter().map(StorageHasher::from).collect();
	let keys = match hashers.len() {
		0 => return Err(MetadataError::UnsupportedType(format!("map keyed by {key} without hashers"))),
		1 => vec![key],
		n => match types.resolve(key) {
			Some(TypeDef::Struct { fields }) if fields.len() == n && fields.iter().all(|f| f.name.is_none()) =>
				fields.iter().map(|f| f.ty).collect(),
			_ =>
				return Err(MetadataError::UnsupportedType(format!(
					"map key {key} is not a tuple of {n} components"
				))),
		},
	};
	Ok(match (keys.as_slice(), hashers.as_slice()) {
		([key], [hasher]) => StorageEntryShape::Map { key: *key, hasher: *hasher },
		([key1, key2], [hasher1, hasher2]) =>
			StorageEntryShape::DoubleMap { key1: *key1, hasher1: *hasher1, key2: *key2, hasher2: *hasher2 },
		_ => StorageEntryShape::NMap { keys, hashers },
	})
}

/// Assembles a [`ChainMetadata`] without a metadata blob.
#[derive(Debug)]
pub struct ChainMetadataBuilder {
	version: RuntimeVersion,
	types: TypeRegistry,
	pallets: HashMap<String, PalletStorage>,
}

impl ChainMetadataBuilder {
	pub fn new(version: RuntimeVersion) -> Self {
		Self { version, types: TypeRegistry::new(), pallets: HashMap::new() }
	}

	/// Register a named type.
	pub fn register_type(&mut self, name: &str, def: TypeDef) -> TypeId {
		self.types.register_named(name, def)
	}

	/// Register an anonymous type.
	pub fn register_anonymous(&mut self, def: TypeDef) -> TypeId {
		self.types.register(None, def)
	}

	/// Id of a previously registered named type.
	pub fn type_id(&self, name: &str) -> Option<TypeId> {
		self.types.lookup(name).ok()
	}

	/// Declare a storage entry. The module's storage prefix defaults to its name.
	pub fn storage(&mut self, module: &str, item: &str, entry: StorageEntry) -> &mut Self {
		self.pallets
			.entry(module.to_owned())
			.or_insert_with(|| PalletStorage { prefix: module.to_owned(), entries: HashMap::new() })
			.entries
			.insert(item.to_owned(), entry);
		self
	}

	pub fn build(self) -> ChainMetadata {
		ChainMetadata { version: self.version, types: self.types, pallets: self.pallets }
	}
}
