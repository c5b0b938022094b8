// SPDX-License-Identifier: GPL-3.0

//! Runtime provider error types.

use crate::{chain::ChainId, error::MetadataError};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when installing or awaiting a chain's coder factory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
	/// Metadata received for the chain could not be turned into a catalog.
	#[error("Failed to apply metadata for chain {chain_id}: {source}")]
	MetadataDecode {
		/// The chain the metadata belongs to.
		chain_id: ChainId,
		/// The underlying metadata error.
		source: MetadataError,
	},
	/// No coder factory became available within the configured timeout.
	#[error("No runtime available for chain {chain_id} after {after:?}")]
	FactoryUnavailable {
		/// The chain that was awaited.
		chain_id: ChainId,
		/// How long the caller waited.
		after: Duration,
	},
	/// The chain is not registered.
	#[error("Unknown chain {0}")]
	UnknownChain(ChainId),
}
