// SPDX-License-Identifier: GPL-3.0

//! Error types for the query engine.
//!
//! Errors are organized by the layer that raises them:
//!
//! - [`coding::DecodeError`] / [`coding::EncodeError`] - Errors from walking the runtime type graph.
//! - [`metadata::MetadataError`] - Errors from turning raw metadata into a storage/type catalog.
//! - [`rpc::RpcError`] - Errors from the JSON-RPC transport and connection layer.
//! - [`pool::PoolError`] - Errors from choosing a node for a chain.
//! - [`runtime::RuntimeError`] - Errors from installing or awaiting a coder factory.
//! - [`storage::StorageError`] - Errors surfaced by storage requests, wrapping the above.

pub mod coding;
pub mod metadata;
pub mod pool;
pub mod rpc;
pub mod runtime;
pub mod storage;

pub use coding::{DecodeError, EncodeError};
pub use metadata::MetadataError;
pub use pool::PoolError;
pub use rpc::RpcError;
pub use runtime::RuntimeError;
pub use storage::StorageError;
