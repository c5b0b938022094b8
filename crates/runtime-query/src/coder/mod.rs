// SPDX-License-Identifier: GPL-3.0

//! Metadata-driven encoding and decoding.
//!
//! A [`RuntimeCoderFactory`] binds one immutable [`ChainMetadata`] snapshot and hands out
//! [`Encoder`]s and [`Decoder`]s that walk its type graph. Factories are never mutated: when a
//! chain upgrades its runtime a new factory replaces the old one, and work that captured the old
//! factory finishes against the old metadata.

mod decode;
mod encode;
mod types;
mod value;

pub use decode::Decoder;
pub use encode::Encoder;
pub use types::{Case, Field, Primitive, TypeDef, TypeId, TypeRegistry};
pub use value::{Composite, Value};

use crate::{
	error::{DecodeError, EncodeError},
	metadata::{ChainMetadata, RuntimeVersion},
};
use scale::DecodeAll;
use std::sync::Arc;

/// Produces encoders and decoders bound to one runtime version.
#[derive(Clone, Debug)]
pub struct RuntimeCoderFactory {
	metadata: Arc<ChainMetadata>,
}

impl RuntimeCoderFactory {
	pub fn new(metadata: ChainMetadata) -> Self {
		Self { metadata: Arc::new(metadata) }
	}

	/// The runtime version the factory was built for.
	pub fn version(&self) -> RuntimeVersion {
		self.metadata.version()
	}

	pub fn metadata(&self) -> &ChainMetadata {
		&self.metadata
	}

	pub fn types(&self) -> &TypeRegistry {
		self.metadata.types()
	}

	/// An empty encoder over this runtime's types.
	pub fn encoder(&self) -> Encoder<'_> {
		Encoder::new(self.metadata.types())
	}

	/// A decoder reading `bytes` against this runtime's types.
	pub fn decoder<'a>(&'a self, bytes: &'a [u8]) -> Decoder<'a> {
		Decoder::new(self.metadata.types(), bytes)
	}

	/// Encode a single value.
	pub fn encode(&self, ty: TypeId, value: &Value) -> Result<Vec<u8>, EncodeError> {
		let mut encoder = self.encoder();
		encoder.encode(ty, value)?;
		Ok(encoder.into_bytes())
	}

	/// Decode a single value that must span all of `bytes`.
	pub fn decode(&self, ty: TypeId, bytes: &[u8]) -> Result<Value, DecodeError> {
		self.decoder(bytes).decode_all(ty)
	}

	/// Decode `bytes` as `T`.
	pub fn decode_as<T: StorageDecode>(&self, ty: TypeId, bytes: &[u8]) -> Result<T, DecodeError> {
		T::decode_storage(self, ty, bytes)
	}
}

/// Types a storage value can be decoded into.
pub trait StorageDecode: Sized {
	/// Decode `bytes`, declared by the metadata as type `ty`.
	fn decode_storage(factory: &RuntimeCoderFactory, ty: TypeId, bytes: &[u8]) -> Result<Self, DecodeError>;
}

impl StorageDecode for Value {
	fn decode_storage(factory: &RuntimeCoderFactory, ty: TypeId, bytes: &[u8]) -> Result<Self, DecodeError> {
		factory.decode(ty, bytes)
	}
}

/// A statically typed storage value decoded with its `parity-scale-codec` implementation.
///
/// The bytes are first validated against the metadata type, so a runtime upgrade that changes
/// the layout surfaces as a [`DecodeError::SchemaMismatch`] rather than a silently misread value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scale<T>(pub T);

impl<T> Scale<T> {
	pub fn into_inner(self) -> T {
		self.0
	}
}

impl<T: scale::Decode> StorageDecode for Scale<T> {
	fn decode_storage(factory: &RuntimeCoderFactory, ty: TypeId, bytes: &[u8]) -> Result<Self, DecodeError> {
		let mut decoder = factory.decoder(bytes);
		decoder.skip(ty)?;
		if !decoder.is_empty() {
			return Err(DecodeError::SchemaMismatch {
				ty,
				detail: format!("{} trailing bytes", decoder.remaining().len()),
			});
		}
		T::decode_all(&mut &bytes[..]).map(Scale).map_err(|e| DecodeError::Codec(e.to_string()))
	}
}
