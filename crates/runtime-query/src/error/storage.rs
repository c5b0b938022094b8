// SPDX-License-Identifier: GPL-3.0

//! Storage request error types.

use crate::{
	error::{DecodeError, EncodeError, PoolError, RpcError, RuntimeError},
	metadata::StorageCodingPath,
};
use thiserror::Error;

/// Errors that can occur when building or performing a storage request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
	/// The runtime metadata has no storage entry at this path.
	#[error("Storage entry {0} not found in runtime metadata")]
	InvalidStoragePath(StorageCodingPath),
	/// The request does not fit the storage entry's shape.
	#[error("Storage entry {path} cannot be queried this way: {reason}")]
	IncompatibleStorageType {
		/// The storage entry.
		path: StorageCodingPath,
		/// What did not fit.
		reason: String,
	},
	/// The request carries no key parameters where some are required.
	#[error("Storage entry {0} requires key parameters")]
	MissingRequiredParams(StorageCodingPath),
	/// Decoding a key or value failed.
	#[error(transparent)]
	Decode(#[from] DecodeError),
	/// Encoding a key component failed.
	#[error(transparent)]
	Encode(#[from] EncodeError),
	/// The RPC call failed.
	#[error(transparent)]
	Rpc(#[from] RpcError),
	/// No coder factory is available for the chain.
	#[error(transparent)]
	Runtime(#[from] RuntimeError),
	/// No connection is available for the chain.
	#[error(transparent)]
	Pool(#[from] PoolError),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn error_display() {
		let path = StorageCodingPath::new("System", "Account");
		assert_eq!(
			StorageError::InvalidStoragePath(path.clone()).to_string(),
			"Storage entry System.Account not found in runtime metadata"
		);
		assert_eq!(
			StorageError::MissingRequiredParams(path.clone()).to_string(),
			"Storage entry System.Account requires key parameters"
		);
		let err = StorageError::IncompatibleStorageType { path, reason: "expected 1 key, got 2".into() };
		assert_eq!(
			err.to_string(),
			"Storage entry System.Account cannot be queried this way: expected 1 key, got 2"
		);
		assert_eq!(StorageError::from(RpcError::Cancelled).to_string(), "Request cancelled");
	}
}
