// SPDX-License-Identifier: GPL-3.0

//! A JSON-RPC connection to one node.
//!
//! Each [`Connection`] owns a background driver task that holds the transport:
//!
//! ```text
//!   request()/dispatch()            driver task                     node
//!  ┌──────────────────┐  Send(id)  ┌─────────────────────────┐  frame  ┌──────┐
//!  │ pending table    │──────────▶ │ select! {               │───────▶ │      │
//!  │ id → completion  │            │   commands, transport,  │ ◀────── │      │
//!  └──────────────────┘ ◀──────────│   shutdown }            │  frame  └──────┘
//!           ▲      complete(id)    └─────────────────────────┘
//!           │ remove(id) on timeout / cancel
//!      CallHandle
//! ```
//!
//! A pending entry is removed exactly once, by whichever of response, transport failure,
//! timeout or cancellation gets to it first, and only the remover completes it.
//!
//! The driver walks `Disconnected → Connecting → Connected`. When the transport breaks it moves
//! to `Reconnecting` and retries the same URL a bounded number of times, re-sending the frames of
//! requests still pending. Once the attempts are exhausted it settles in `Disconnected`, fails
//! every pending request with the error of the last connect attempt (usually
//! [`RpcError::DeviceUnreachable`]), and waits for [`Connection::reconnect`] to point it at
//! another URL.

use crate::{
	chain::ChainId,
	config::EngineConfig,
	error::RpcError,
	jsonrpc::{self, Id, Incoming, Request},
	transport::{Connector, Transport},
};
use log::{debug, info, trace, warn};
use serde_json::Value;
use std::{
	collections::HashMap,
	fmt,
	sync::{
		Arc, Mutex, MutexGuard, PoisonError,
		atomic::{AtomicU64, Ordering},
	},
	time::Duration,
};
use tokio::{
	sync::{mpsc, oneshot, watch},
	time,
};
use tokio_util::sync::CancellationToken;
use url::Url;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(0);

/// Lifecycle state of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
	Connecting,
	Connected,
	Reconnecting,
	Disconnected,
}

/// A state transition of a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionEvent {
	pub chain_id: ChainId,
	/// Identity of the connection that changed state.
	pub connection_id: u64,
	pub url: Url,
	pub state: ConnectionState,
	/// Set on the `Disconnected` transition that follows exhausted connect attempts.
	pub unreachable: bool,
}

/// Per-call overrides.
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
	/// Deadline for the response; the connection default when `None`.
	pub timeout: Option<Duration>,
	/// Cancels the call when triggered.
	pub cancel: Option<CancellationToken>,
}

type Completion = oneshot::Sender<Result<Value, RpcError>>;

struct PendingRequest {
	method: String,
	frame: String,
	/// Transport generation the frame was last written to.
	sent_on: Option<u64>,
	completion: Completion,
}

#[derive(Default)]
struct PendingTable {
	requests: Mutex<HashMap<Id, PendingRequest>>,
}

impl PendingTable {
	fn lock(&self) -> MutexGuard<'_, HashMap<Id, PendingRequest>> {
		self.requests.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn insert(&self, id: Id, request: PendingRequest, capacity: usize) -> Result<(), RpcError> {
		let mut requests = self.lock();
		if requests.len() >= capacity {
			return Err(RpcError::Busy(capacity));
		}
		requests.insert(id, request);
		Ok(())
	}

	/// Remove and complete an entry. The completion is sent while the table is locked, so a
	/// caller that fails to remove the entry afterwards is guaranteed to find the outcome.
	fn complete(&self, id: Id, outcome: Result<Value, RpcError>) -> bool {
		let mut requests = self.lock();
		match requests.remove(&id) {
			Some(request) => {
				trace!("Completing {} ({id})", request.method);
				let _ = request.completion.send(outcome);
				true
			},
			None => false,
		}
	}

	fn remove(&self, id: Id) -> bool {
		self.lock().remove(&id).is_some()
	}

	fn fail_all(&self, error: &RpcError) {
		let mut requests = self.lock();
		for (_, request) in requests.drain() {
			let _ = request.completion.send(Err(error.clone()));
		}
	}

	/// The frame of `id` if it was not yet written to transport `generation`.
	fn frame_for(&self, id: Id, generation: u64) -> Option<String> {
		let mut requests = self.lock();
		let request = requests.get_mut(&id)?;
		if request.sent_on == Some(generation) {
			return None;
		}
		request.sent_on = Some(generation);
		Some(request.frame.clone())
	}

	/// Frames not yet written to transport `generation`, oldest first.
	fn unsent(&self, generation: u64) -> Vec<String> {
		let mut requests = self.lock();
		let mut frames: Vec<(Id, String)> = requests
			.iter_mut()
			.filter(|(_, r)| r.sent_on != Some(generation))
			.map(|(id, r)| {
				r.sent_on = Some(generation);
				(*id, r.frame.clone())
			})
			.collect();
		frames.sort_by_key(|(id, _)| *id);
		frames.into_iter().map(|(_, frame)| frame).collect()
	}

	fn len(&self) -> usize {
		self.lock().len()
	}
}

struct Shared {
	id: u64,
	chain_id: ChainId,
	url: Mutex<Url>,
	pending: PendingTable,
	state: watch::Sender<ConnectionState>,
	events: Option<mpsc::UnboundedSender<ConnectionEvent>>,
}

impl Shared {
	fn url(&self) -> Url {
		self.url.lock().unwrap_or_else(PoisonError::into_inner).clone()
	}

	fn set_url(&self, url: Url) {
		*self.url.lock().unwrap_or_else(PoisonError::into_inner) = url;
	}

	fn set_state(&self, state: ConnectionState, unreachable: bool) {
		if self.state.send_replace(state) == state {
			return;
		}
		let url = self.url();
		debug!("Connection to {url} for chain {} is {state:?}", self.chain_id);
		if let Some(events) = &self.events {
			let _ = events.send(ConnectionEvent {
				chain_id: self.chain_id.clone(),
				connection_id: self.id,
				url,
				state,
				unreachable,
			});
		}
	}
}

enum Command {
	Send(Id),
	Reconnect,
	Disconnect,
}

/// A connection to one node of a chain.
///
/// Dropping the connection stops its driver and fails every pending request.
pub struct Connection {
	shared: Arc<Shared>,
	commands: mpsc::UnboundedSender<Command>,
	next_id: AtomicU64,
	call_timeout: Duration,
	capacity: usize,
	shutdown: CancellationToken,
}

impl Connection {
	/// Open a connection to `url`. Connecting happens in the background; requests issued before
	/// the transport is up are sent once it is.
	pub fn open(chain_id: ChainId, url: Url, connector: Arc<dyn Connector>, config: &EngineConfig) -> Self {
		Self::spawn(chain_id, url, connector, config, None)
	}

	/// Like [`Connection::open`], reporting every state transition on `events`.
	pub(crate) fn open_observed(
		chain_id: ChainId,
		url: Url,
		connector: Arc<dyn Connector>,
		config: &EngineConfig,
		events: mpsc::UnboundedSender<ConnectionEvent>,
	) -> Self {
		Self::spawn(chain_id, url, connector, config, Some(events))
	}

	fn spawn(
		chain_id: ChainId,
		url: Url,
		connector: Arc<dyn Connector>,
		config: &EngineConfig,
		events: Option<mpsc::UnboundedSender<ConnectionEvent>>,
	) -> Self {
		let (state, _) = watch::channel(ConnectionState::Disconnected);
		let shared = Arc::new(Shared {
			id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
			chain_id,
			url: Mutex::new(url),
			pending: PendingTable::default(),
			state,
			events,
		});
		let (commands, commands_rx) = mpsc::unbounded_channel();
		let shutdown = CancellationToken::new();
		let driver = Driver {
			shared: shared.clone(),
			connector,
			commands: commands_rx,
			shutdown: shutdown.clone(),
			attempts: config.reconnect_attempts.max(1),
			delay: config.reconnect_delay,
			generation: 0,
		};
		tokio::spawn(driver.run());
		Self {
			shared,
			commands,
			next_id: AtomicU64::new(0),
			call_timeout: config.call_timeout,
			capacity: config.pending_capacity.max(1),
			shutdown,
		}
	}

	/// Unique identity of this connection.
	pub fn id(&self) -> u64 {
		self.shared.id
	}

	pub fn chain_id(&self) -> &ChainId {
		&self.shared.chain_id
	}

	/// The node URL the connection targets.
	pub fn url(&self) -> Url {
		self.shared.url()
	}

	pub fn state(&self) -> ConnectionState {
		*self.shared.state.borrow()
	}

	/// Observe state transitions.
	pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
		self.shared.state.subscribe()
	}

	/// Wait until the connection reaches `state`.
	pub async fn wait_for_state(&self, state: ConnectionState) -> Result<(), RpcError> {
		let mut rx = self.subscribe_state();
		rx.wait_for(|current| *current == state)
			.await
			.map(|_| ())
			.map_err(|_| RpcError::ConnectionUnavailable)
	}

	/// Number of requests awaiting a response.
	pub fn pending_requests(&self) -> usize {
		self.shared.pending.len()
	}

	/// Issue a request and await its response under the default deadline.
	pub async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
		self.request_with(method, params, CallOptions::default()).await
	}

	/// Issue a request and await its response.
	pub async fn request_with(
		&self,
		method: &str,
		params: Value,
		options: CallOptions,
	) -> Result<Value, RpcError> {
		self.dispatch(method, params, options)?.response().await
	}

	/// Issue a request, returning a handle to await or cancel its response.
	pub fn dispatch(&self, method: &str, params: Value, options: CallOptions) -> Result<CallHandle, RpcError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let frame = Request::new(id, method, &params).to_frame()?;
		let (completion, response) = oneshot::channel();
		self.shared.pending.insert(
			id,
			PendingRequest { method: method.to_owned(), frame, sent_on: None, completion },
			self.capacity,
		)?;
		if self.commands.send(Command::Send(id)).is_err() {
			self.shared.pending.remove(id);
			return Err(RpcError::ConnectionUnavailable);
		}
		trace!("Dispatched {method} ({id}) to {}", self.url());
		Ok(CallHandle {
			id,
			method: method.to_owned(),
			response,
			shared: self.shared.clone(),
			timeout: options.timeout.unwrap_or(self.call_timeout),
			cancel: options.cancel,
			settled: false,
		})
	}

	/// Point the connection at another node, keeping its identity. Pending requests are re-sent
	/// to the new node. Returns `false` if the connection was already shut down.
	pub fn reconnect(&self, url: Url) -> bool {
		info!("Switching chain {} from {} to {url}", self.shared.chain_id, self.url());
		self.shared.set_url(url);
		self.commands.send(Command::Reconnect).is_ok()
	}

	/// Close the transport and stop the driver.
	pub fn disconnect(&self) {
		let _ = self.commands.send(Command::Disconnect);
	}
}

impl fmt::Debug for Connection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connection")
			.field("id", &self.shared.id)
			.field("chain_id", &self.shared.chain_id)
			.field("url", &self.url().as_str())
			.field("state", &self.state())
			.finish_non_exhaustive()
	}
}

impl Drop for Connection {
	fn drop(&mut self) {
		self.shutdown.cancel();
	}
}

/// A request in flight.
///
/// Dropping the handle without awaiting it cancels the request.
pub struct CallHandle {
	id: Id,
	method: String,
	response: oneshot::Receiver<Result<Value, RpcError>>,
	shared: Arc<Shared>,
	timeout: Duration,
	cancel: Option<CancellationToken>,
	settled: bool,
}

impl CallHandle {
	pub fn id(&self) -> Id {
		self.id
	}

	/// Withdraw the request. A response arriving later is ignored.
	pub fn cancel(mut self) {
		self.settled = true;
		if self.shared.pending.remove(self.id) {
			trace!("Cancelled {} ({})", self.method, self.id);
		}
	}

	/// Await the response, the deadline or cancellation, whichever comes first.
	pub async fn response(mut self) -> Result<Value, RpcError> {
		let cancel = self.cancel.take().unwrap_or_else(CancellationToken::new);
		let outcome = tokio::select! {
			biased;
			outcome = &mut self.response => outcome.unwrap_or(Err(RpcError::ConnectionUnavailable)),
			_ = cancel.cancelled() => self.settle(RpcError::Cancelled),
			_ = time::sleep(self.timeout) => {
				let error = RpcError::Timeout { method: self.method.clone(), after: self.timeout };
				self.settle(error)
			},
		};
		self.settled = true;
		outcome
	}

	/// Claim the entry for a local outcome, or take the outcome that won the race for it.
	fn settle(&mut self, error: RpcError) -> Result<Value, RpcError> {
		if self.shared.pending.remove(self.id) {
			debug!("{} ({}) settled locally: {error}", self.method, self.id);
			return Err(error);
		}
		self.response.try_recv().unwrap_or(Err(RpcError::ConnectionUnavailable))
	}
}

impl Drop for CallHandle {
	fn drop(&mut self) {
		if !self.settled {
			self.shared.pending.remove(self.id);
		}
	}
}

/// What the driver does after leaving a phase.
enum Next {
	/// The transport broke; retry the same URL.
	Retry,
	/// The URL changed; connect to the new one.
	Switch,
	Stop,
}

enum Attempt {
	Ready(Box<dyn Transport>),
	/// Every attempt failed; carries the last connect error.
	Exhausted(RpcError),
	Interrupted(Next),
}

struct Driver {
	shared: Arc<Shared>,
	connector: Arc<dyn Connector>,
	commands: mpsc::UnboundedReceiver<Command>,
	shutdown: CancellationToken,
	attempts: u32,
	delay: Duration,
	generation: u64,
}

impl Driver {
	async fn run(mut self) {
		let mut state = ConnectionState::Connecting;
		loop {
			self.shared.set_state(state, false);
			let next = match self.connect().await {
				Attempt::Ready(transport) => self.serve(transport).await,
				Attempt::Exhausted(error) => self.park(error).await,
				Attempt::Interrupted(next) => next,
			};
			state = match next {
				Next::Retry => ConnectionState::Reconnecting,
				Next::Switch => ConnectionState::Connecting,
				Next::Stop => break,
			};
		}
		self.shared.set_state(ConnectionState::Disconnected, false);
		self.shared.pending.fail_all(&RpcError::ConnectionUnavailable);
		debug!("Connection driver for chain {} stopped", self.shared.chain_id);
	}

	/// Try the current URL up to `attempts` times.
	async fn connect(&mut self) -> Attempt {
		let mut last_error = RpcError::ConnectionUnavailable;
		for attempt in 1..=self.attempts {
			let url = self.shared.url();
			let result = tokio::select! {
				_ = self.shutdown.cancelled() => return Attempt::Interrupted(Next::Stop),
				result = self.connector.connect(&url) => result,
			};
			match result {
				Ok(transport) => return Attempt::Ready(transport),
				Err(e) => {
					warn!("Connect attempt {attempt}/{} to {url} failed: {e}", self.attempts);
					last_error = e;
				},
			}
			if attempt == self.attempts {
				break;
			}
			let sleep = time::sleep(self.delay);
			tokio::pin!(sleep);
			loop {
				tokio::select! {
					_ = self.shutdown.cancelled() => return Attempt::Interrupted(Next::Stop),
					_ = &mut sleep => break,
					command = self.commands.recv() => match command {
						// Sent once connected.
						Some(Command::Send(_)) => {},
						Some(Command::Reconnect) => return Attempt::Interrupted(Next::Switch),
						Some(Command::Disconnect) | None => return Attempt::Interrupted(Next::Stop),
					},
				}
			}
		}
		Attempt::Exhausted(last_error)
	}

	/// Exchange frames until the transport breaks or the connection is told to move or stop.
	async fn serve(&mut self, mut transport: Box<dyn Transport>) -> Next {
		self.generation += 1;
		let generation = self.generation;
		self.shared.set_state(ConnectionState::Connected, false);
		for frame in self.shared.pending.unsent(generation) {
			if let Err(e) = transport.send(frame).await {
				warn!("Failed to re-send pending request to {}: {e}", self.shared.url());
				return Next::Retry;
			}
		}
		loop {
			tokio::select! {
				_ = self.shutdown.cancelled() => {
					transport.close().await;
					return Next::Stop;
				},
				command = self.commands.recv() => match command {
					Some(Command::Send(id)) => {
						let Some(frame) = self.shared.pending.frame_for(id, generation) else { continue };
						if let Err(e) = transport.send(frame).await {
							warn!("Failed to send request to {}: {e}", self.shared.url());
							return Next::Retry;
						}
					},
					Some(Command::Reconnect) => {
						transport.close().await;
						return Next::Switch;
					},
					Some(Command::Disconnect) | None => {
						transport.close().await;
						return Next::Stop;
					},
				},
				frame = transport.recv() => match frame {
					Some(Ok(frame)) => self.dispatch_frame(&frame),
					Some(Err(e)) => {
						warn!("Transport to {} failed: {e}", self.shared.url());
						return Next::Retry;
					},
					None => {
						warn!("Transport to {} closed by the node", self.shared.url());
						return Next::Retry;
					},
				},
			}
		}
	}

	/// Out of attempts: fail pending requests with `error` and wait for a new URL.
	async fn park(&mut self, error: RpcError) -> Next {
		self.shared.set_state(ConnectionState::Disconnected, true);
		self.shared.pending.fail_all(&error);
		loop {
			tokio::select! {
				_ = self.shutdown.cancelled() => return Next::Stop,
				command = self.commands.recv() => match command {
					Some(Command::Send(id)) => {
						self.shared.pending.complete(id, Err(error.clone()));
					},
					Some(Command::Reconnect) => return Next::Switch,
					Some(Command::Disconnect) | None => return Next::Stop,
				},
			}
		}
	}

	fn dispatch_frame(&self, frame: &str) {
		let incoming = match jsonrpc::parse_frame(frame) {
			Ok(incoming) => incoming,
			Err(e) => {
				warn!("Dropping malformed frame from {}: {e}", self.shared.url());
				return;
			},
		};
		for message in incoming {
			match message {
				Incoming::Response { id, outcome } => {
					if !self.shared.pending.complete(id, outcome.map_err(RpcError::from)) {
						trace!("Dropping response to settled request {id}");
					}
				},
				Incoming::Notification { method } => trace!("Ignoring notification {method}"),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{MockConnector, MockNode};
	use serde_json::json;

	const NODE_A: &str = "ws://node-a:9944";
	const NODE_B: &str = "ws://node-b:9944";

	fn config() -> EngineConfig {
		EngineConfig {
			call_timeout: Duration::from_secs(5),
			reconnect_attempts: 2,
			reconnect_delay: Duration::from_millis(10),
			..Default::default()
		}
	}

	fn url(s: &str) -> Url {
		s.parse().unwrap()
	}

	fn setup(node: &MockNode) -> (Arc<MockConnector>, Connection) {
		let connector = Arc::new(MockConnector::new());
		connector.add_node(url(NODE_A), node.clone());
		let connection = Connection::open("polkadot".into(), url(NODE_A), connector.clone(), &config());
		(connector, connection)
	}

	fn get_storage(key: &[u8]) -> Value {
		json!([format!("0x{}", hex::encode(key))])
	}

	#[tokio::test]
	async fn request_round_trip() {
		let node = MockNode::new();
		node.insert(vec![1, 2], vec![0xaa]);
		let (_connector, connection) = setup(&node);
		let result = connection.request("state_getStorage", get_storage(&[1, 2])).await.unwrap();
		assert_eq!(result, json!("0xaa"));
		assert_eq!(connection.state(), ConnectionState::Connected);
		assert_eq!(connection.pending_requests(), 0);
	}

	#[tokio::test]
	async fn error_responses_are_surfaced() {
		let node = MockNode::new();
		let (_connector, connection) = setup(&node);
		let err = connection.request("author_submitExtrinsic", json!([])).await.unwrap_err();
		assert!(matches!(err, RpcError::Response { code: -32601, .. }));
	}

	#[tokio::test]
	async fn timeout_removes_pending_request() {
		let node = MockNode::new();
		node.mute("state_getStorage");
		let (_connector, connection) = setup(&node);
		let options = CallOptions { timeout: Some(Duration::from_millis(50)), cancel: None };
		let err = connection.request_with("state_getStorage", get_storage(&[1]), options).await.unwrap_err();
		assert!(matches!(err, RpcError::Timeout { ref method, .. } if method == "state_getStorage"));
		assert_eq!(connection.pending_requests(), 0);
	}

	#[tokio::test]
	async fn late_response_after_timeout_is_dropped() {
		let node = MockNode::new();
		node.hold();
		let (_connector, connection) = setup(&node);
		let options = CallOptions { timeout: Some(Duration::from_millis(30)), cancel: None };
		let err = connection.request_with("state_getStorage", get_storage(&[1]), options).await.unwrap_err();
		assert!(matches!(err, RpcError::Timeout { .. }));
		node.release();
		// The connection keeps working after the late response arrives.
		let result = connection.request("state_getStorage", get_storage(&[1])).await.unwrap();
		assert_eq!(result, Value::Null);
		assert_eq!(connection.pending_requests(), 0);
	}

	#[tokio::test]
	async fn cancel_removes_pending_request() {
		let node = MockNode::new();
		node.hold();
		let (_connector, connection) = setup(&node);
		let handle = connection.dispatch("state_getStorage", get_storage(&[1]), CallOptions::default()).unwrap();
		assert_eq!(connection.pending_requests(), 1);
		handle.cancel();
		assert_eq!(connection.pending_requests(), 0);
		node.release();
	}

	#[tokio::test]
	async fn dropped_handle_cancels() {
		let node = MockNode::new();
		node.hold();
		let (_connector, connection) = setup(&node);
		drop(connection.dispatch("state_getStorage", get_storage(&[1]), CallOptions::default()).unwrap());
		assert_eq!(connection.pending_requests(), 0);
	}

	#[tokio::test]
	async fn cancellation_token_settles_with_cancelled() {
		let node = MockNode::new();
		node.hold();
		let (_connector, connection) = setup(&node);
		let token = CancellationToken::new();
		let options = CallOptions { timeout: None, cancel: Some(token.clone()) };
		let handle = connection.dispatch("state_getStorage", get_storage(&[1]), options).unwrap();
		token.cancel();
		assert_eq!(handle.response().await, Err(RpcError::Cancelled));
		assert_eq!(connection.pending_requests(), 0);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn cancel_racing_response_completes_once() {
		let node = MockNode::new();
		node.insert(vec![1], vec![0x01]);
		let (_connector, connection) = setup(&node);
		connection.wait_for_state(ConnectionState::Connected).await.unwrap();
		for _ in 0..200 {
			let token = CancellationToken::new();
			let options = CallOptions { timeout: None, cancel: Some(token.clone()) };
			let handle = connection.dispatch("state_getStorage", get_storage(&[1]), options).unwrap();
			let canceller = tokio::spawn(async move {
				tokio::task::yield_now().await;
				token.cancel();
			});
			let outcome = handle.response().await;
			assert!(
				outcome == Ok(json!("0x01")) || outcome == Err(RpcError::Cancelled),
				"unexpected outcome {outcome:?}"
			);
			canceller.await.unwrap();
			assert_eq!(connection.pending_requests(), 0);
		}
	}

	#[tokio::test]
	async fn pending_capacity_is_enforced() {
		let node = MockNode::new();
		node.hold();
		let connector = Arc::new(MockConnector::new());
		connector.add_node(url(NODE_A), node.clone());
		let config = EngineConfig { pending_capacity: 1, ..config() };
		let connection = Connection::open("polkadot".into(), url(NODE_A), connector, &config);
		let _first = connection.dispatch("state_getStorage", get_storage(&[1]), CallOptions::default()).unwrap();
		let second = connection.dispatch("state_getStorage", get_storage(&[2]), CallOptions::default());
		assert!(matches!(second, Err(RpcError::Busy(1))));
	}

	#[tokio::test]
	async fn in_flight_requests_survive_a_dropped_transport() {
		let node = MockNode::new();
		node.insert(vec![7], vec![0x07]);
		node.hold();
		let (connector, connection) = setup(&node);
		let handle = connection.dispatch("state_getStorage", get_storage(&[7]), CallOptions::default()).unwrap();
		node.wait_for_requests(1).await;
		node.drop_connections();
		node.release();
		assert_eq!(handle.response().await.unwrap(), json!("0x07"));
		assert_eq!(connector.connects(), 2);
	}

	#[tokio::test]
	async fn exhausted_attempts_fail_pending_requests() {
		let connector = Arc::new(MockConnector::new());
		let connection = Connection::open("polkadot".into(), url(NODE_A), connector.clone(), &config());
		let err = connection.request("state_getStorage", get_storage(&[1])).await.unwrap_err();
		assert!(matches!(&err, RpcError::DeviceUnreachable { endpoint, .. } if endpoint.starts_with(NODE_A)), "{err:?}");
		assert!(err.is_transport());
		connection.wait_for_state(ConnectionState::Disconnected).await.unwrap();
		assert_eq!(connector.connects(), 2);
		// Requests issued while parked fail immediately with the same error.
		let err = connection.request("state_getStorage", get_storage(&[1])).await.unwrap_err();
		assert!(matches!(err, RpcError::DeviceUnreachable { .. }), "{err:?}");
	}

	#[tokio::test]
	async fn debug_shows_identity_and_target() {
		let node = MockNode::new();
		let (_connector, connection) = setup(&node);
		let debug = format!("{connection:?}");
		assert!(debug.starts_with("Connection {"), "{debug}");
		assert!(debug.contains(&format!("id: {}", connection.id())), "{debug}");
		assert!(debug.contains("polkadot"), "{debug}");
		assert!(debug.contains("node-a:9944"), "{debug}");
	}

	#[tokio::test]
	async fn reconnect_moves_to_another_node() {
		let node_a = MockNode::new();
		node_a.insert(vec![1], vec![0x0a]);
		let node_b = MockNode::new();
		node_b.insert(vec![1], vec![0x0b]);
		let (connector, connection) = setup(&node_a);
		connector.add_node(url(NODE_B), node_b);
		assert_eq!(connection.request("state_getStorage", get_storage(&[1])).await.unwrap(), json!("0x0a"));

		let id = connection.id();
		assert!(connection.reconnect(url(NODE_B)));
		assert_eq!(connection.request("state_getStorage", get_storage(&[1])).await.unwrap(), json!("0x0b"));
		assert_eq!(connection.id(), id);
		assert_eq!(connection.url(), url(NODE_B));
	}

	#[tokio::test]
	async fn disconnect_stops_the_driver() {
		let node = MockNode::new();
		let (_connector, connection) = setup(&node);
		connection.wait_for_state(ConnectionState::Connected).await.unwrap();
		connection.disconnect();
		connection.wait_for_state(ConnectionState::Disconnected).await.unwrap();
		let err = time::timeout(Duration::from_secs(1), connection.request("state_getStorage", get_storage(&[1])))
			.await
			.unwrap()
			.unwrap_err();
		assert_eq!(err, RpcError::ConnectionUnavailable);
	}

	#[tokio::test]
	async fn state_transitions_are_reported() {
		let node = MockNode::new();
		let connector = Arc::new(MockConnector::new());
		connector.add_node(url(NODE_A), node.clone());
		let (tx, mut rx) = mpsc::unbounded_channel();
		let connection = Connection::open_observed("polkadot".into(), url(NODE_A), connector, &config(), tx);
		assert_eq!(rx.recv().await.unwrap().state, ConnectionState::Connecting);
		let connected = rx.recv().await.unwrap();
		assert_eq!(connected.state, ConnectionState::Connected);
		assert_eq!(connected.connection_id, connection.id());
		assert_eq!(connected.url, url(NODE_A));
	}
}
