// SPDX-License-Identifier: GPL-3.0

//! One live connection per chain, with node failover.

use crate::{
	chain::{Chain, ChainId},
	config::EngineConfig,
	connection::{Connection, ConnectionEvent, ConnectionState},
	error::PoolError,
	transport::Connector,
};
use log::{debug, info, warn};
use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
};
use tokio::sync::{RwLock, mpsc};
use url::Url;

struct PoolState {
	connections: HashMap<ChainId, Arc<Connection>>,
	/// Nodes that failed for each chain. Only grows until the chain is reset.
	failed: HashMap<ChainId, HashSet<Url>>,
	/// Registered chains, by id.
	chains: HashMap<ChainId, Chain>,
	events: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl PoolState {
	/// Fold connection events into the failed sets.
	fn drain_events(&mut self) {
		while let Ok(event) = self.events.try_recv() {
			if event.state != ConnectionState::Disconnected || !event.unreachable {
				continue;
			}
			let current =
				self.connections.get(&event.chain_id).is_some_and(|c| c.id() == event.connection_id);
			if current {
				warn!("Node {} of chain {} is unreachable", event.url, event.chain_id);
				self.failed.entry(event.chain_id).or_default().insert(event.url);
			}
		}
	}
}

/// Owns the connections of every chain.
///
/// The map and failed sets are mutated under the write half of the lock; lookups take the read
/// half. Connections are handed out as `Arc`s and stay in the pool until reset or released.
pub struct ConnectionPool {
	connector: Arc<dyn Connector>,
	config: EngineConfig,
	state: RwLock<PoolState>,
	events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ConnectionPool {
	pub fn new(connector: Arc<dyn Connector>, config: EngineConfig) -> Self {
		let (events, events_rx) = mpsc::unbounded_channel();
		let state = PoolState {
			connections: HashMap::new(),
			failed: HashMap::new(),
			chains: HashMap::new(),
			events: events_rx,
		};
		Self { connector, config, state: RwLock::new(state), events }
	}

	/// The connection of `chain`, creating or redirecting it as needed.
	///
	/// Without `ignored`, an existing connection is returned as is. With `ignored`, that node is
	/// recorded as failed and the connection moves to the selected node, or else the first node
	/// that has not failed. The connection keeps its identity when it moves.
	pub async fn setup_connection(&self, chain: &Chain, ignored: Option<&Url>) -> Result<Arc<Connection>, PoolError> {
		let mut state = self.state.write().await;
		self.setup_locked(&mut state, chain, ignored)
	}

	fn setup_locked(
		&self,
		state: &mut PoolState,
		chain: &Chain,
		ignored: Option<&Url>,
	) -> Result<Arc<Connection>, PoolError> {
		state.drain_events();
		state.chains.insert(chain.id.clone(), chain.clone());
		if ignored.is_none() {
			if let Some(connection) = state.connections.get(&chain.id) {
				return Ok(connection.clone());
			}
		}

		let failed = state.failed.entry(chain.id.clone()).or_default();
		if let Some(url) = ignored {
			failed.insert(url.clone());
		}
		let viable = |url: &&Url| Some(*url) != ignored && !failed.contains(*url);
		let url = chain
			.selected_node
			.as_ref()
			.filter(viable)
			.or_else(|| chain.nodes.iter().find(viable))
			.cloned()
			.ok_or_else(|| PoolError::NoViableNode(chain.id.clone()))?;

		if let Some(existing) = state.connections.get(&chain.id) {
			if existing.url() == url {
				return Ok(existing.clone());
			}
			if existing.reconnect(url.clone()) {
				return Ok(existing.clone());
			}
			debug!("Connection for chain {} was shut down, replacing it", chain.id);
		}

		info!("Connecting chain {} to {url}", chain.id);
		let connection = Arc::new(Connection::open_observed(
			chain.id.clone(),
			url,
			self.connector.clone(),
			&self.config,
			self.events.clone(),
		));
		state.connections.insert(chain.id.clone(), connection.clone());
		Ok(connection)
	}

	/// Remember the nodes of a chain without connecting to it.
	pub async fn register_chain(&self, chain: Chain) {
		self.state.write().await.chains.insert(chain.id.clone(), chain);
	}

	/// The registration of a chain.
	pub async fn chain(&self, chain_id: &ChainId) -> Option<Chain> {
		self.state.read().await.chains.get(chain_id).cloned()
	}

	/// Replace the nodes of a registered chain, dropping a selected node that is no longer
	/// listed. The connection and failed nodes are reset; the next use reconnects.
	pub async fn update_nodes(&self, chain_id: &ChainId, nodes: Vec<Url>) -> Result<Chain, PoolError> {
		let mut state = self.state.write().await;
		let chain = state.chains.get_mut(chain_id).ok_or_else(|| PoolError::UnknownChain(chain_id.clone()))?;
		if chain.selected_node.as_ref().is_some_and(|selected| !nodes.contains(selected)) {
			chain.selected_node = None;
		}
		chain.nodes = nodes;
		let chain = chain.clone();
		Self::reset_locked(&mut state, chain_id);
		Ok(chain)
	}

	/// The current connection of a chain, if any.
	pub async fn connection(&self, chain_id: &ChainId) -> Option<Arc<Connection>> {
		self.state.read().await.connections.get(chain_id).cloned()
	}

	/// The connection of a registered chain, set up on first use.
	pub async fn acquire(&self, chain_id: &ChainId) -> Result<Arc<Connection>, PoolError> {
		if let Some(connection) = self.connection(chain_id).await {
			return Ok(connection);
		}
		let mut state = self.state.write().await;
		let chain = state.chains.get(chain_id).cloned().ok_or_else(|| PoolError::UnknownChain(chain_id.clone()))?;
		self.setup_locked(&mut state, &chain, None)
	}

	/// Record that `url` failed for `chain_id` and fail over to another node.
	///
	/// If the connection already moved away from `url`, the current connection is returned.
	pub async fn report_failure(&self, chain_id: &ChainId, url: &Url) -> Result<Arc<Connection>, PoolError> {
		let mut state = self.state.write().await;
		let chain = state.chains.get(chain_id).cloned().ok_or_else(|| PoolError::UnknownChain(chain_id.clone()))?;
		if let Some(connection) = state.connections.get(chain_id) {
			if connection.url() != *url {
				return Ok(connection.clone());
			}
		}
		warn!("Failing over chain {chain_id} away from {url}");
		self.setup_locked(&mut state, &chain, Some(url))
	}

	/// Disconnect a chain and forget its failed nodes. The chain stays registered.
	pub async fn reset_connection(&self, chain_id: &ChainId) {
		Self::reset_locked(&mut *self.state.write().await, chain_id);
	}

	fn reset_locked(state: &mut PoolState, chain_id: &ChainId) {
		state.drain_events();
		if let Some(connection) = state.connections.remove(chain_id) {
			debug!("Resetting connection of chain {chain_id}");
			connection.disconnect();
		}
		state.failed.remove(chain_id);
	}

	/// Disconnect a chain and forget it entirely, returning its registration.
	pub async fn remove_chain(&self, chain_id: &ChainId) -> Option<Chain> {
		let mut state = self.state.write().await;
		Self::reset_locked(&mut state, chain_id);
		state.chains.remove(chain_id)
	}

	/// Drop the connection of a chain if nobody else holds it. Returns whether it was dropped.
	pub async fn release(&self, chain_id: &ChainId) -> bool {
		let mut state = self.state.write().await;
		let unused = state.connections.get(chain_id).is_some_and(|c| Arc::strong_count(c) == 1);
		if unused {
			if let Some(connection) = state.connections.remove(chain_id) {
				connection.disconnect();
			}
		}
		unused
	}

	/// Drop every connection nobody else holds. Returns how many were dropped.
	pub async fn prune(&self) -> usize {
		let mut state = self.state.write().await;
		let unused: Vec<ChainId> = state
			.connections
			.iter()
			.filter(|(_, c)| Arc::strong_count(c) == 1)
			.map(|(id, _)| id.clone())
			.collect();
		for chain_id in &unused {
			if let Some(connection) = state.connections.remove(chain_id) {
				connection.disconnect();
			}
		}
		if !unused.is_empty() {
			debug!("Pruned {} unused connections", unused.len());
		}
		unused.len()
	}

	/// Nodes recorded as failed for a chain.
	pub async fn failed_urls(&self, chain_id: &ChainId) -> HashSet<Url> {
		let mut state = self.state.write().await;
		state.drain_events();
		state.failed.get(chain_id).cloned().unwrap_or_default()
	}

	/// Number of chains with a connection.
	pub async fn len(&self) -> usize {
		self.state.read().await.connections.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.len().await == 0
	}
}
