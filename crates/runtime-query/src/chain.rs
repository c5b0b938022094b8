// SPDX-License-Identifier: GPL-3.0

//! Chains and the registry that wires pool, runtimes and performers together.

use crate::{
	coder::RuntimeCoderFactory,
	config::EngineConfig,
	connection::Connection,
	error::{PoolError, StorageError},
	pool::ConnectionPool,
	runtime::RuntimeRegistry,
	state::StateRpc,
	storage::StorageRequestPerformer,
	transport::Connector,
};
use log::info;
use std::{fmt, sync::Arc};
use url::Url;

/// Identifies a chain, typically by its genesis hash.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(String);

impl ChainId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ChainId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for ChainId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

impl From<String> for ChainId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

/// A chain and the nodes serving it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chain {
	pub id: ChainId,
	/// Nodes in order of preference.
	pub nodes: Vec<Url>,
	/// The node the user picked, tried before the others.
	pub selected_node: Option<Url>,
}

impl Chain {
	pub fn new(id: impl Into<ChainId>, nodes: impl IntoIterator<Item = Url>) -> Self {
		Self { id: id.into(), nodes: nodes.into_iter().collect(), selected_node: None }
	}

	pub fn with_selected_node(mut self, node: Url) -> Self {
		self.selected_node = Some(node);
		self
	}
}

/// Known chains plus the shared pool and runtime registry.
///
/// Chain registrations live in the pool, next to the connections they describe.
pub struct ChainRegistry {
	pool: Arc<ConnectionPool>,
	runtimes: Arc<RuntimeRegistry>,
	config: EngineConfig,
}

impl ChainRegistry {
	pub fn new(connector: Arc<dyn Connector>, config: EngineConfig) -> Self {
		Self {
			pool: Arc::new(ConnectionPool::new(connector, config.clone())),
			runtimes: Arc::new(RuntimeRegistry::new(config.factory_timeout)),
			config,
		}
	}

	/// Register a chain, replacing any previous registration with the same id.
	pub async fn add_chain(&self, chain: Chain) {
		info!("Adding chain {} with {} nodes", chain.id, chain.nodes.len());
		self.pool.register_chain(chain).await;
	}

	/// Replace the nodes of a chain. Its connection is reset and reopened on next use.
	pub async fn update_nodes(&self, chain_id: &ChainId, nodes: Vec<Url>) -> Result<(), PoolError> {
		let chain = self.pool.update_nodes(chain_id, nodes).await?;
		info!("Nodes of chain {chain_id} changed to {} nodes, connection reset", chain.nodes.len());
		Ok(())
	}

	/// Forget a chain, its connection and its runtime.
	pub async fn remove_chain(&self, chain_id: &ChainId) -> Option<Chain> {
		let removed = self.pool.remove_chain(chain_id).await;
		self.runtimes.remove(chain_id);
		removed
	}

	pub async fn chain(&self, chain_id: &ChainId) -> Option<Chain> {
		self.pool.chain(chain_id).await
	}

	/// The connection of a chain, opened on first use.
	pub async fn connection(&self, chain_id: &ChainId) -> Result<Arc<Connection>, PoolError> {
		self.pool.acquire(chain_id).await
	}

	/// A performer for storage requests against a chain.
	pub async fn performer(&self, chain_id: &ChainId) -> Result<StorageRequestPerformer, PoolError> {
		if self.chain(chain_id).await.is_none() {
			return Err(PoolError::UnknownChain(chain_id.clone()));
		}
		Ok(StorageRequestPerformer::new(
			chain_id.clone(),
			self.pool.clone(),
			self.runtimes.clone(),
			self.config.clone(),
		))
	}

	/// Fetch the runtime version and metadata from the chain's node and make them current.
	pub async fn sync_runtime(&self, chain_id: &ChainId) -> Result<Arc<RuntimeCoderFactory>, StorageError> {
		let rpc = StateRpc::new(self.connection(chain_id).await?);
		let version = rpc.runtime_version(None).await?;
		if let Some(current) = self.runtimes.current(chain_id).filter(|f| f.version() == version) {
			return Ok(current);
		}
		let metadata = rpc.metadata(None).await?;
		Ok(self.runtimes.apply_metadata(chain_id, &metadata, version)?)
	}

	pub fn pool(&self) -> &Arc<ConnectionPool> {
		&self.pool
	}

	pub fn runtimes(&self) -> &Arc<RuntimeRegistry> {
		&self.runtimes
	}

	pub fn config(&self) -> &EngineConfig {
		&self.config
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		connection::ConnectionState,
		testing::{MockConnector, MockNode, VERSION_1, VERSION_2},
	};

	const NODE_A: &str = "ws://node-a:9944";
	const NODE_B: &str = "ws://node-b:9944";

	fn url(s: &str) -> Url {
		s.parse().unwrap()
	}

	fn registry() -> (Arc<MockConnector>, ChainRegistry) {
		let connector = Arc::new(MockConnector::new());
		connector.add_node(url(NODE_A), MockNode::new());
		connector.add_node(url(NODE_B), MockNode::new());
		let registry = ChainRegistry::new(connector.clone(), EngineConfig::default());
		(connector, registry)
	}

	#[test]
	fn chain_id_display() {
		assert_eq!(ChainId::from("polkadot").to_string(), "polkadot");
		assert_eq!(ChainId::new(String::from("0x91b1")).as_str(), "0x91b1");
	}

	#[tokio::test]
	async fn unknown_chains_are_rejected() {
		let (_connector, registry) = registry();
		let id = ChainId::from("polkadot");
		assert!(matches!(registry.performer(&id).await, Err(PoolError::UnknownChain(_))));
		assert!(matches!(registry.connection(&id).await, Err(PoolError::UnknownChain(_))));
		assert_eq!(registry.update_nodes(&id, vec![]).await, Err(PoolError::UnknownChain(id)));
	}

	#[tokio::test]
	async fn update_nodes_resets_the_connection() {
		let (_connector, registry) = registry();
		let chain = Chain::new("polkadot", [url(NODE_A)]).with_selected_node(url(NODE_A));
		registry.add_chain(chain.clone()).await;
		let first = registry.connection(&chain.id).await.unwrap();
		assert_eq!(first.url(), url(NODE_A));

		registry.update_nodes(&chain.id, vec![url(NODE_B)]).await.unwrap();
		assert_eq!(registry.chain(&chain.id).await.unwrap().selected_node, None);
		assert_eq!(registry.pool().chain(&chain.id).await.unwrap().nodes, vec![url(NODE_B)]);
		first.wait_for_state(ConnectionState::Disconnected).await.unwrap();
		let second = registry.connection(&chain.id).await.unwrap();
		assert_ne!(first.id(), second.id());
		assert_eq!(second.url(), url(NODE_B));
	}

	#[tokio::test]
	async fn remove_chain_forgets_everything() {
		let (_connector, registry) = registry();
		let chain = Chain::new("polkadot", [url(NODE_A)]);
		registry.add_chain(chain.clone()).await;
		registry.runtimes().install(&chain.id, crate::testing::metadata());
		registry.connection(&chain.id).await.unwrap();

		assert_eq!(registry.remove_chain(&chain.id).await, Some(chain.clone()));
		assert!(registry.pool().is_empty().await);
		assert!(registry.runtimes().current(&chain.id).is_none());
		assert!(registry.performer(&chain.id).await.is_err());
		assert!(registry.chain(&chain.id).await.is_none());
	}

	#[tokio::test]
	async fn sync_runtime_skips_the_current_version() {
		let node = MockNode::new();
		node.set_runtime(VERSION_1, vec![]);
		let connector = Arc::new(MockConnector::new());
		connector.add_node(url(NODE_A), node.clone());
		let registry = ChainRegistry::new(connector, EngineConfig::default());
		registry.add_chain(Chain::new("polkadot", [url(NODE_A)])).await;
		let installed = registry.runtimes().install(&"polkadot".into(), crate::testing::metadata());

		let synced = registry.sync_runtime(&"polkadot".into()).await.unwrap();
		assert!(Arc::ptr_eq(&installed, &synced));
		assert_eq!(node.requests(), vec!["state_getRuntimeVersion".to_owned()]);
	}

	#[tokio::test]
	async fn sync_runtime_reports_undecodable_metadata() {
		let node = MockNode::new();
		node.set_runtime(VERSION_2, vec![0xde, 0xad, 0xbe, 0xef]);
		let connector = Arc::new(MockConnector::new());
		connector.add_node(url(NODE_A), node);
		let registry = ChainRegistry::new(connector, EngineConfig::default());
		registry.add_chain(Chain::new("polkadot", [url(NODE_A)])).await;
		registry.runtimes().install(&"polkadot".into(), crate::testing::metadata());

		let err = registry.sync_runtime(&"polkadot".into()).await.unwrap_err();
		assert!(matches!(err, StorageError::Runtime(crate::error::RuntimeError::MetadataDecode { .. })));
		assert_eq!(registry.runtimes().current(&"polkadot".into()).unwrap().version(), VERSION_1);
	}
}
