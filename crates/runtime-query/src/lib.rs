// SPDX-License-Identifier: GPL-3.0

//! Runtime coding and storage queries for Polkadot SDK based chains.
//!
//! The engine keeps one JSON-RPC connection per chain, tracks the runtime each chain currently
//! runs, and turns typed storage requests into `state_*` calls whose results are decoded with the
//! metadata of that runtime.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         ChainRegistry                           │
//! │            (chains, their nodes, runtime syncing)               │
//! └─────────────────────────────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    StorageRequestPerformer                      │
//! │   single / multiple / prefix requests, optional value cache     │
//! └─────────────────────────────────────────────────────────────────┘
//!                 │                                │
//!                 ▼                                ▼
//! ┌───────────────────────────────┐  ┌──────────────────────────────┐
//! │        RuntimeRegistry        │  │        ConnectionPool        │
//! │  per-chain coder factories    │  │  one connection per chain,   │
//! │  (metadata + type registry)   │  │  node failover               │
//! └───────────────────────────────┘  └──────────────────────────────┘
//!                                                  │
//!                                                  ▼
//!                                    ┌──────────────────────────────┐
//!                                    │          Connection          │
//!                                    │  pending table, reconnects,  │
//!                                    │  WebSocket transport         │
//!                                    └──────────────────────────────┘
//! ```

pub mod chain;
pub mod coder;
pub mod config;
pub mod connection;
pub mod error;
pub mod jsonrpc;
pub mod metadata;
pub mod pool;
pub mod runtime;
pub mod state;
pub mod storage;
mod strings;
pub mod testing;
pub mod transport;

pub use chain::{Chain, ChainId, ChainRegistry};
pub use coder::{Composite, RuntimeCoderFactory, Scale, StorageDecode, TypeId, Value};
pub use config::EngineConfig;
pub use connection::{CallHandle, CallOptions, Connection, ConnectionEvent, ConnectionState};
pub use error::{
	DecodeError, EncodeError, MetadataError, PoolError, RpcError, RuntimeError, StorageError,
};
pub use metadata::{ChainMetadata, ChainMetadataBuilder, RuntimeVersion, StorageCodingPath};
pub use pool::ConnectionPool;
pub use runtime::{RuntimeEvent, RuntimeRegistry};
pub use state::StateRpc;
pub use storage::{
	Cardinality, KeyParam, MemoryStorageCache, NMapKeys, StorageCache, StorageParams,
	StorageRequest, StorageRequestPerformer,
};
pub use transport::{Connector, Transport, WsConnector};
