// SPDX-License-Identifier: GPL-3.0

//! Metadata error types.

use thiserror::Error;

/// Errors that can occur when building a chain metadata catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
	/// The metadata blob could not be decoded.
	#[error("Failed to decode metadata")]
	DecodeError,
	/// The metadata declares something the catalog cannot represent.
	#[error("Unsupported metadata: {0}")]
	UnsupportedType(String),
}
