// SPDX-License-Identifier: GPL-3.0

//! Errors raised while encoding or decoding values against the runtime type graph.

use crate::coder::TypeId;
use thiserror::Error;

/// Errors that can occur when decoding bytes into a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
	/// The byte stream does not fit the shape the type graph describes.
	#[error("Bytes do not match type {ty}: {detail}")]
	SchemaMismatch {
		/// The type being decoded when the mismatch was detected.
		ty: TypeId,
		/// What was wrong with the input.
		detail: String,
	},
	/// A type reference is absent from the type catalog.
	#[error("Unknown type {0}")]
	UnknownType(TypeId),
	/// A named type is absent from the type catalog.
	#[error("Unknown type name `{0}`")]
	UnknownTypeName(String),
	/// The variant index read from the stream is not declared by the type.
	#[error("Invalid variant index {index} for type {ty}")]
	InvalidVariant {
		/// The enum-like type being decoded.
		ty: TypeId,
		/// The index read from the stream.
		index: u8,
	},
	/// A compact integer is malformed, non-canonical or out of range for its type.
	#[error("Invalid compact encoding for type {0}")]
	InvalidCompact(TypeId),
	/// A string or char is not valid UTF-8.
	#[error("Invalid UTF-8 in type {0}")]
	InvalidUtf8(TypeId),
	/// The payload matched the schema but the typed SCALE decode rejected it.
	#[error("Codec error: {0}")]
	Codec(String),
}

/// Errors that can occur when encoding a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
	/// A type reference is absent from the type catalog.
	#[error("Unknown type {0}")]
	UnknownType(TypeId),
	/// The value's kind cannot be encoded as the target type.
	#[error("Value does not match type {ty}: expected {expected}")]
	ValueMismatch {
		/// The target type.
		ty: TypeId,
		/// A short description of the accepted value kind.
		expected: &'static str,
	},
	/// An integer does not fit the target primitive.
	#[error("Value out of range for type {0}")]
	OutOfRange(TypeId),
	/// A variant value names a case the type does not declare.
	#[error("Variant `{name}` not found in type {ty}")]
	VariantNotFound {
		/// The enum-like type.
		ty: TypeId,
		/// The requested variant name.
		name: String,
	},
	/// A struct value lacks one of the declared fields.
	#[error("Missing field `{name}` for type {ty}")]
	MissingField {
		/// The struct type.
		ty: TypeId,
		/// The declared field name.
		name: String,
	},
	/// A fixed-size array or field list received the wrong number of elements.
	#[error("Length mismatch for type {ty}: expected {expected}, got {actual}")]
	LengthMismatch {
		/// The target type.
		ty: TypeId,
		/// Declared length.
		expected: usize,
		/// Supplied length.
		actual: usize,
	},
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decode_error_display() {
		let err = DecodeError::SchemaMismatch { ty: TypeId(4), detail: "need 4 bytes, 1 left".into() };
		assert_eq!(err.to_string(), "Bytes do not match type #4: need 4 bytes, 1 left");
		assert_eq!(DecodeError::UnknownType(TypeId(9)).to_string(), "Unknown type #9");
		assert_eq!(
			DecodeError::InvalidVariant { ty: TypeId(2), index: 7 }.to_string(),
			"Invalid variant index 7 for type #2"
		);
	}

	#[test]
	fn encode_error_display() {
		let err = EncodeError::LengthMismatch { ty: TypeId(1), expected: 32, actual: 20 };
		assert_eq!(err.to_string(), "Length mismatch for type #1: expected 32, got 20");
		let err = EncodeError::VariantNotFound { ty: TypeId(3), name: "Foo".into() };
		assert_eq!(err.to_string(), "Variant `Foo` not found in type #3");
	}
}
