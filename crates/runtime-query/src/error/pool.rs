// SPDX-License-Identifier: GPL-3.0

//! Connection pool error types.

use crate::chain::ChainId;
use thiserror::Error;

/// Errors that can occur when selecting a node connection for a chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
	/// Every node of the chain is either ignored or has failed.
	#[error("No viable node left for chain {0}")]
	NoViableNode(ChainId),
	/// The chain has never been set up in the pool.
	#[error("Unknown chain {0}")]
	UnknownChain(ChainId),
}
