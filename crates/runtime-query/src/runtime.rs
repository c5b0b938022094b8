// SPDX-License-Identifier: GPL-3.0

//! The current coder factory of every chain.
//!
//! Factories are published through a `watch` channel per chain, so callers can wait for the first
//! one and a runtime upgrade replaces the published factory atomically. Work that already holds a
//! factory keeps using it.

use crate::{
	chain::ChainId,
	coder::RuntimeCoderFactory,
	error::{MetadataError, RuntimeError},
	metadata::{ChainMetadata, RuntimeVersion},
};
use log::{debug, info, warn};
use std::{
	collections::HashMap,
	sync::{Arc, PoisonError, RwLock},
	time::Duration,
};
use tokio::{
	sync::{broadcast, watch},
	time,
};

type FactorySlot = Arc<watch::Sender<Option<Arc<RuntimeCoderFactory>>>>;

const EVENT_CAPACITY: usize = 64;

/// Outcome of applying metadata to a chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuntimeEvent {
	/// A factory for `version` is now current.
	FactoryReady { chain_id: ChainId, version: RuntimeVersion },
	/// Metadata could not be turned into a factory; the previous factory, if any, stays current.
	FactoryFailed { chain_id: ChainId, error: MetadataError },
}

/// Publishes coder factories per chain.
pub struct RuntimeRegistry {
	factories: RwLock<HashMap<ChainId, FactorySlot>>,
	events: broadcast::Sender<RuntimeEvent>,
	timeout: Duration,
}

impl RuntimeRegistry {
	/// A registry whose [`RuntimeRegistry::factory`] waits at most `timeout`.
	pub fn new(timeout: Duration) -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		Self { factories: RwLock::new(HashMap::new()), events, timeout }
	}

	/// Build a factory from a raw metadata blob and make it current.
	///
	/// Metadata for the version that is already current is not rebuilt.
	pub fn apply_metadata(
		&self,
		chain_id: &ChainId,
		bytes: &[u8],
		version: RuntimeVersion,
	) -> Result<Arc<RuntimeCoderFactory>, RuntimeError> {
		if let Some(current) = self.current(chain_id).filter(|f| f.version() == version) {
			debug!("Runtime {version} of chain {chain_id} is already current");
			return Ok(current);
		}
		match ChainMetadata::from_bytes(bytes, version) {
			Ok(metadata) => Ok(self.install(chain_id, metadata)),
			Err(error) => {
				warn!("Failed to apply runtime {version} metadata for chain {chain_id}: {error}");
				let _ = self.events.send(RuntimeEvent::FactoryFailed { chain_id: chain_id.clone(), error: error.clone() });
				Err(RuntimeError::MetadataDecode { chain_id: chain_id.clone(), source: error })
			},
		}
	}

	/// Make a factory over `metadata` current.
	pub fn install(&self, chain_id: &ChainId, metadata: ChainMetadata) -> Arc<RuntimeCoderFactory> {
		let factory = Arc::new(RuntimeCoderFactory::new(metadata));
		let version = factory.version();
		self.slot(chain_id).send_replace(Some(factory.clone()));
		info!("Runtime {version} is current for chain {chain_id}");
		let _ = self.events.send(RuntimeEvent::FactoryReady { chain_id: chain_id.clone(), version });
		factory
	}

	/// The current factory, without waiting.
	pub fn current(&self, chain_id: &ChainId) -> Option<Arc<RuntimeCoderFactory>> {
		let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
		factories.get(chain_id).and_then(|slot| slot.borrow().clone())
	}

	/// The current factory, waiting for one to be installed.
	pub async fn factory(&self, chain_id: &ChainId) -> Result<Arc<RuntimeCoderFactory>, RuntimeError> {
		let mut rx = self.slot(chain_id).subscribe();
		let unavailable = || RuntimeError::FactoryUnavailable { chain_id: chain_id.clone(), after: self.timeout };
		match time::timeout(self.timeout, rx.wait_for(Option::is_some)).await {
			Ok(Ok(factory)) => factory.clone().ok_or_else(unavailable),
			Ok(Err(_)) => Err(RuntimeError::UnknownChain(chain_id.clone())),
			Err(_) => Err(unavailable()),
		}
	}

	/// Factory lifecycle events of every chain.
	pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
		self.events.subscribe()
	}

	/// Forget a chain. Callers waiting for its factory fail with [`RuntimeError::UnknownChain`].
	pub fn remove(&self, chain_id: &ChainId) {
		self.factories.write().unwrap_or_else(PoisonError::into_inner).remove(chain_id);
	}

	fn slot(&self, chain_id: &ChainId) -> FactorySlot {
		let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
		factories.entry(chain_id.clone()).or_insert_with(|| Arc::new(watch::channel(None).0)).clone()
	}
}
