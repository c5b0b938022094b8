// SPDX-License-Identifier: GPL-3.0

//! Test fixtures: a small runtime, dev accounts and an in-memory node.
//!
//! [`MockNode`] answers the `state_*` methods from an in-memory key/value store and can be told
//! to hold, mute or drop requests. [`MockConnector`] hands out transports to registered nodes, so
//! connections, pools and performers run unchanged against it.

use crate::{
	coder::{Case, Field, Primitive, TypeDef, Value},
	error::RpcError,
	metadata::{ChainMetadata, ChainMetadataBuilder, RuntimeVersion, StorageCodingPath, StorageEntry, StorageHasher},
	state::{from_hex, to_hex},
	strings::{
		rpc::{methods, protocol},
		storage::{balances, session, staking, system},
	},
	transport::{Connector, Transport},
};
use async_trait::async_trait;
use scale::Encode;
use serde_json::{Value as Json, json};
use std::{
	collections::{BTreeMap, HashMap, HashSet},
	ops::Bound,
	sync::{
		Arc, Mutex, MutexGuard, PoisonError,
		atomic::{AtomicUsize, Ordering},
	},
};
use tokio::sync::{mpsc, watch};
use url::Url;

/// Well-known dev account: Alice.
pub const ALICE: [u8; 32] = [
	0xd4, 0x35, 0x93, 0xc7, 0x15, 0xfd, 0xd3, 0x1c, 0x61, 0x14, 0x1a, 0xbd, 0x04, 0xa9, 0x9f, 0xd6,
	0x82, 0x2c, 0x85, 0x58, 0x85, 0x4c, 0xcd, 0xe3, 0x9a, 0x56, 0x84, 0xe7, 0xa5, 0x6d, 0xa2, 0x7d,
];

/// Well-known dev account: Bob.
pub const BOB: [u8; 32] = [
	0x8e, 0xaf, 0x04, 0x15, 0x16, 0x87, 0x73, 0x63, 0x26, 0xc9, 0xfe, 0xa1, 0x7e, 0x25, 0xfc, 0x52,
	0x87, 0x61, 0x36, 0x93, 0xc9, 0x12, 0x90, 0x9c, 0xb2, 0x26, 0xaa, 0x47, 0x94, 0xf2, 0x6a, 0x48,
];

/// Version of [`metadata`].
pub const VERSION_1: RuntimeVersion = RuntimeVersion::new(1, 1);
/// Version of [`upgraded_metadata`].
pub const VERSION_2: RuntimeVersion = RuntimeVersion::new(2, 1);

/// An n-map keyed by `(asset, owner, delegate)`.
pub const ASSETS_APPROVALS: StorageCodingPath = StorageCodingPath::from_static("Assets", "Approvals");
/// A map whose hasher does not reveal its keys.
pub const SESSION_QUEUED_KEYS_HASH: StorageCodingPath =
	StorageCodingPath::from_static(session::MODULE, "QueuedKeysHash");

/// Encoded length of an `AccountInfo`.
const ACCOUNT_INFO_LEN: usize = 48;

/// The fixture runtime at [`VERSION_1`], where `System::Number` is a `u32`.
pub fn metadata() -> ChainMetadata {
	runtime(VERSION_1, Primitive::U32)
}

/// The fixture runtime at [`VERSION_2`], where `System::Number` widened to a `u64`.
pub fn upgraded_metadata() -> ChainMetadata {
	runtime(VERSION_2, Primitive::U64)
}

fn runtime(version: RuntimeVersion, block_number: Primitive) -> ChainMetadata {
	let mut builder = ChainMetadataBuilder::new(version);
	let u8_ty = builder.register_type("u8", TypeDef::Primitive(Primitive::U8));
	let u32_ty = builder.register_type("u32", TypeDef::Primitive(Primitive::U32));
	let u64_ty = builder.register_type("u64", TypeDef::Primitive(Primitive::U64));
	let u128_ty = builder.register_type("u128", TypeDef::Primitive(Primitive::U128));
	builder.register_type("bool", TypeDef::Primitive(Primitive::Bool));
	builder.register_type("String", TypeDef::Primitive(Primitive::Str));
	let hash = builder.register_type("Hash", TypeDef::Fixed { len: 32, elem: u8_ty });
	let account_id = builder.register_type("AccountId32", TypeDef::Fixed { len: 32, elem: u8_ty });
	builder.register_type("Compact<u128>", TypeDef::Compact(u128_ty));
	builder.register_type("Vec<u32>", TypeDef::Sequence(u32_ty));
	builder.register_type("Option<u32>", TypeDef::Option(u32_ty));
	let account_data = builder.register_type(
		"AccountData",
		TypeDef::Struct { fields: vec![Field::named("free", u128_ty), Field::named("reserved", u128_ty)] },
	);
	let account_info = builder.register_type(
		"AccountInfo",
		TypeDef::Struct {
			fields: vec![
				Field::named("nonce", u32_ty),
				Field::named("consumers", u32_ty),
				Field::named("providers", u32_ty),
				Field::named("sufficients", u32_ty),
				Field::named("data", account_data),
			],
		},
	);
	builder.register_type(
		"Reasons",
		TypeDef::Variant {
			cases: vec![Case::new(0, "Fee", vec![]), Case::new(1, "Misc", vec![]), Case::new(2, "All", vec![])],
		},
	);
	builder.register_type("BitVec", TypeDef::BitSequence { store: u8_ty });
	let number = match block_number {
		Primitive::U32 => u32_ty,
		Primitive::U64 => u64_ty,
		other => builder.register_anonymous(TypeDef::Primitive(other)),
	};
	let number_len = block_number.width().unwrap_or_default();

	builder
		.storage(
			system::MODULE,
			system::ACCOUNT,
			StorageEntry::map(account_id, StorageHasher::Blake2_128Concat, account_info)
				.with_default(vec![0; ACCOUNT_INFO_LEN]),
		)
		.storage(system::MODULE, system::NUMBER, StorageEntry::plain(number).with_default(vec![0; number_len]))
		.storage(balances::MODULE, balances::TOTAL_ISSUANCE, StorageEntry::plain(u128_ty))
		.storage(
			staking::MODULE,
			staking::ERAS_STAKERS,
			StorageEntry::double_map(
				(u32_ty, StorageHasher::Twox64Concat),
				(account_id, StorageHasher::Twox64Concat),
				u128_ty,
			),
		)
		.storage(
			staking::MODULE,
			staking::LEDGER,
			StorageEntry::map(account_id, StorageHasher::Blake2_128Concat, account_data),
		)
		.storage(
			ASSETS_APPROVALS.module(),
			ASSETS_APPROVALS.item(),
			StorageEntry::n_map(
				[
					(u32_ty, StorageHasher::Blake2_128Concat),
					(account_id, StorageHasher::Blake2_128Concat),
					(account_id, StorageHasher::Blake2_128Concat),
				],
				u128_ty,
			),
		)
		.storage(
			SESSION_QUEUED_KEYS_HASH.module(),
			SESSION_QUEUED_KEYS_HASH.item(),
			StorageEntry::map(u32_ty, StorageHasher::Blake2_256, hash),
		);
	builder.build()
}

/// The decoded `AccountInfo` of an account without consumers, providers or sufficients.
pub fn account_info(nonce: u32, free: u128, reserved: u128) -> Value {
	Value::named([
		("nonce", Value::from(nonce)),
		("consumers", Value::from(0u32)),
		("providers", Value::from(0u32)),
		("sufficients", Value::from(0u32)),
		("data", Value::named([("free", Value::from(free)), ("reserved", Value::from(reserved))])),
	])
}

/// The encoding of [`account_info`].
pub fn encode_account_info(nonce: u32, free: u128, reserved: u128) -> Vec<u8> {
	(nonce, 0u32, 0u32, 0u32, free, reserved).encode()
}

/// Compute the `System::Account` storage key for an account (Blake2_128Concat).
pub fn account_storage_key(account: &[u8]) -> Vec<u8> {
	let mut key = Vec::new();
	key.extend(sp_core::twox_128(system::MODULE.as_bytes()));
	key.extend(sp_core::twox_128(system::ACCOUNT.as_bytes()));
	key.extend(sp_core::blake2_128(account));
	key.extend(account);
	key
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct NodeState {
	storage: BTreeMap<Vec<u8>, Vec<u8>>,
	runtime: (RuntimeVersion, Vec<u8>),
	muted: HashSet<String>,
	requests: Vec<String>,
}

struct NodeInner {
	state: Mutex<NodeState>,
	/// `true` while responses are held back.
	held: watch::Sender<bool>,
	/// Bumped to drop every open session.
	epoch: watch::Sender<u64>,
	received: watch::Sender<usize>,
}

/// An in-memory node serving the `state_*` methods.
#[derive(Clone)]
pub struct MockNode {
	inner: Arc<NodeInner>,
}

impl Default for MockNode {
	fn default() -> Self {
		Self::new()
	}
}

impl MockNode {
	pub fn new() -> Self {
		let state = NodeState { runtime: (VERSION_1, Vec::new()), ..Default::default() };
		Self {
			inner: Arc::new(NodeInner {
				state: Mutex::new(state),
				held: watch::Sender::new(false),
				epoch: watch::Sender::new(0),
				received: watch::Sender::new(0),
			}),
		}
	}

	pub fn insert(&self, key: Vec<u8>, value: Vec<u8>) {
		lock(&self.inner.state).storage.insert(key, value);
	}

	pub fn remove(&self, key: &[u8]) -> Option<Vec<u8>> {
		lock(&self.inner.state).storage.remove(key)
	}

	/// Serve `version` and the raw `metadata` bytes.
	pub fn set_runtime(&self, version: RuntimeVersion, metadata: Vec<u8>) {
		lock(&self.inner.state).runtime = (version, metadata);
	}

	/// Hold back every response until [`Self::release`].
	pub fn hold(&self) {
		self.inner.held.send_replace(true);
	}

	pub fn release(&self) {
		self.inner.held.send_replace(false);
	}

	/// Never answer `method`.
	pub fn mute(&self, method: &str) {
		lock(&self.inner.state).muted.insert(method.to_owned());
	}

	/// Methods received so far, in arrival order.
	pub fn requests(&self) -> Vec<String> {
		lock(&self.inner.state).requests.clone()
	}

	/// Wait until at least `count` requests arrived.
	pub async fn wait_for_requests(&self, count: usize) {
		let mut received = self.inner.received.subscribe();
		let _ = received.wait_for(|n| *n >= count).await;
	}

	/// Close every open session. Requests in flight are never answered.
	pub fn drop_connections(&self) {
		self.inner.epoch.send_modify(|epoch| *epoch += 1);
	}

	async fn serve(self, mut frames: mpsc::UnboundedReceiver<String>, responses: mpsc::UnboundedSender<String>) {
		let mut dropped = self.inner.epoch.subscribe();
		let epoch = *dropped.borrow_and_update();
		loop {
			tokio::select! {
				biased;
				_ = epoch_changed(&mut dropped, epoch) => break,
				frame = frames.recv() => match frame {
					Some(frame) => self.accept(frame, epoch, responses.clone()),
					None => break,
				},
			}
		}
	}

	fn accept(&self, frame: String, epoch: u64, responses: mpsc::UnboundedSender<String>) {
		let Ok(request) = serde_json::from_str::<Json>(&frame) else {
			return;
		};
		let method = request["method"].as_str().unwrap_or_default().to_owned();
		let muted = {
			let mut state = lock(&self.inner.state);
			state.requests.push(method.clone());
			state.muted.contains(&method)
		};
		self.inner.received.send_modify(|n| *n += 1);
		if muted {
			return;
		}
		let node = self.clone();
		tokio::spawn(async move {
			let mut dropped = node.inner.epoch.subscribe();
			tokio::select! {
				biased;
				_ = epoch_changed(&mut dropped, epoch) => return,
				_ = released(node.inner.held.subscribe()) => {},
			}
			if *node.inner.epoch.borrow() != epoch {
				return;
			}
			let response = match node.respond(&method, &request["params"]) {
				Ok(result) => json!({"jsonrpc": protocol::VERSION, "id": request["id"], "result": result}),
				Err((code, message)) => json!({
					"jsonrpc": protocol::VERSION,
					"id": request["id"],
					"error": {"code": code, "message": message},
				}),
			};
			let _ = responses.send(response.to_string());
		});
	}

	fn respond(&self, method: &str, params: &Json) -> Result<Json, (i64, String)> {
		let state = lock(&self.inner.state);
		match method {
			methods::STATE_GET_STORAGE => {
				let key = hex_param(&params[0])?;
				Ok(state.storage.get(&key).map(|value| to_hex(value)).into())
			},
			methods::STATE_QUERY_STORAGE_AT => {
				let keys = params[0].as_array().ok_or_else(|| invalid("expected a key list"))?;
				let mut changes = Vec::with_capacity(keys.len());
				for key in keys {
					let key = hex_param(key)?;
					changes.push(json!([to_hex(&key), state.storage.get(&key).map(|value| to_hex(value))]));
				}
				// Nodes do not promise to answer in request order.
				changes.reverse();
				Ok(json!([{"block": to_hex(&[0; 32]), "changes": changes}]))
			},
			methods::STATE_GET_KEYS_PAGED => {
				let prefix = hex_param(&params[0])?;
				let count = params[1].as_u64().ok_or_else(|| invalid("expected a count"))? as usize;
				let start = match &params[2] {
					Json::Null => Bound::Unbounded,
					key => Bound::Excluded(hex_param(key)?),
				};
				let keys: Vec<String> = state
					.storage
					.range((start, Bound::Unbounded))
					.map(|(key, _)| key)
					.filter(|key| key.starts_with(&prefix))
					.take(count)
					.map(|key| to_hex(key))
					.collect();
				Ok(json!(keys))
			},
			methods::STATE_GET_METADATA => Ok(to_hex(&state.runtime.1).into()),
			methods::STATE_GET_RUNTIME_VERSION =>
				serde_json::to_value(state.runtime.0).map_err(|e| invalid(&e.to_string())),
			_ => Err((protocol::METHOD_NOT_FOUND, "Method not found".into())),
		}
	}
}

fn hex_param(value: &Json) -> Result<Vec<u8>, (i64, String)> {
	value.as_str().and_then(|hex| from_hex(hex).ok()).ok_or_else(|| invalid("expected a hex string"))
}

fn invalid(message: &str) -> (i64, String) {
	(protocol::INVALID_PARAMS, message.to_owned())
}

async fn epoch_changed(rx: &mut watch::Receiver<u64>, epoch: u64) {
	let _ = rx.wait_for(|current| *current != epoch).await;
}

async fn released(mut held: watch::Receiver<bool>) {
	let _ = held.wait_for(|held| !held).await;
}

/// Connects to registered [`MockNode`]s.
#[derive(Default)]
pub struct MockConnector {
	nodes: Mutex<HashMap<Url, MockNode>>,
	unreachable: Mutex<HashSet<Url>>,
	connects: AtomicUsize,
	log: Mutex<Vec<Url>>,
}

impl MockConnector {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_node(&self, url: Url, node: MockNode) {
		lock(&self.nodes).insert(url, node);
	}

	/// Refuse (or accept again) connections to `url`.
	pub fn set_unreachable(&self, url: &Url, unreachable: bool) {
		let mut set = lock(&self.unreachable);
		if unreachable {
			set.insert(url.clone());
		} else {
			set.remove(url);
		}
	}

	/// Number of connection attempts, successful or not.
	pub fn connects(&self) -> usize {
		self.connects.load(Ordering::SeqCst)
	}

	/// URLs of every connection attempt, in order.
	pub fn attempts(&self) -> Vec<Url> {
		lock(&self.log).clone()
	}
}

#[async_trait]
impl Connector for MockConnector {
	async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, RpcError> {
		self.connects.fetch_add(1, Ordering::SeqCst);
		lock(&self.log).push(url.clone());
		let node = match lock(&self.nodes).get(url) {
			Some(node) if !lock(&self.unreachable).contains(url) => node.clone(),
			_ =>
				return Err(RpcError::DeviceUnreachable {
					endpoint: url.to_string(),
					message: "connection refused".into(),
				}),
		};
		let (frames_tx, frames_rx) = mpsc::unbounded_channel();
		let (responses_tx, responses_rx) = mpsc::unbounded_channel();
		tokio::spawn(node.serve(frames_rx, responses_tx));
		Ok(Box::new(MockTransport { outgoing: Some(frames_tx), incoming: responses_rx }))
	}
}

struct MockTransport {
	outgoing: Option<mpsc::UnboundedSender<String>>,
	incoming: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for MockTransport {
	async fn send(&mut self, frame: String) -> Result<(), RpcError> {
		let outgoing = self.outgoing.as_ref().ok_or(RpcError::ConnectionUnavailable)?;
		outgoing.send(frame).map_err(|_| RpcError::ConnectionUnavailable)
	}

	async fn recv(&mut self) -> Option<Result<String, RpcError>> {
		self.incoming.recv().await.map(Ok)
	}

	async fn close(&mut self) {
		self.outgoing = None;
		self.incoming.close();
	}
}
