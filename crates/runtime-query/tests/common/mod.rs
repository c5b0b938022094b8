// SPDX-License-Identifier: GPL-3.0

//! Shared harness: a registry over mock nodes with the fixture runtime installed.

#![allow(dead_code)]

use runtime_query::{
	Chain, ChainId, ChainRegistry, EngineConfig, StorageRequestPerformer,
	testing::{self, MockConnector, MockNode},
};
use std::{sync::Arc, time::Duration};
use url::Url;

pub const CHAIN: &str = "polkadot";
pub const NODE_A: &str = "ws://node-a:9944";
pub const NODE_B: &str = "ws://node-b:9944";

pub fn url(s: &str) -> Url {
	s.parse().unwrap()
}

pub fn config() -> EngineConfig {
	EngineConfig {
		call_timeout: Duration::from_secs(5),
		factory_timeout: Duration::from_secs(1),
		reconnect_attempts: 2,
		reconnect_delay: Duration::from_millis(10),
		..Default::default()
	}
}

pub struct Harness {
	pub connector: Arc<MockConnector>,
	pub registry: ChainRegistry,
	pub chain_id: ChainId,
}

impl Harness {
	/// One chain served by `nodes`, each registered with the connector, running the fixture
	/// runtime.
	pub async fn new(nodes: Vec<(&str, MockNode)>, config: EngineConfig) -> Self {
		let connector = Arc::new(MockConnector::new());
		let urls: Vec<Url> = nodes.iter().map(|(u, _)| url(u)).collect();
		for (u, node) in nodes {
			connector.add_node(url(u), node);
		}
		let registry = ChainRegistry::new(connector.clone(), config);
		let chain_id = ChainId::from(CHAIN);
		registry.add_chain(Chain::new(chain_id.clone(), urls)).await;
		registry.runtimes().install(&chain_id, testing::metadata());
		Self { connector, registry, chain_id }
	}

	/// A single node at [`NODE_A`].
	pub async fn single(node: &MockNode) -> Self {
		Self::new(vec![(NODE_A, node.clone())], config()).await
	}

	pub async fn performer(&self) -> StorageRequestPerformer {
		self.registry.performer(&self.chain_id).await.unwrap()
	}
}
