// SPDX-License-Identifier: GPL-3.0

//! JSON-RPC 2.0 envelopes.

use crate::{error::RpcError, strings::rpc::protocol};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation id of a request.
pub type Id = u64;

/// Outgoing request.
#[derive(Clone, Debug, Serialize)]
pub struct Request<'a> {
	pub jsonrpc: &'a str,
	pub id: Id,
	pub method: &'a str,
	pub params: &'a Value,
}

impl<'a> Request<'a> {
	pub fn new(id: Id, method: &'a str, params: &'a Value) -> Self {
		Self { jsonrpc: protocol::VERSION, id, method, params }
	}

	/// Serialize to a text frame.
	pub fn to_frame(&self) -> Result<String, RpcError> {
		serde_json::to_string(self).map_err(|e| RpcError::InvalidResponse(e.to_string()))
	}
}

/// Error object carried by a failed response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
	pub code: i64,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

impl From<ErrorObject> for RpcError {
	fn from(error: ErrorObject) -> Self {
		RpcError::Response { code: error.code, message: error.message }
	}
}

/// Any incoming envelope: a response (with `id`) or a notification (with `method`).
#[derive(Clone, Debug, Deserialize)]
struct Envelope {
	#[serde(default)]
	id: Option<Id>,
	#[serde(default)]
	result: Option<Value>,
	#[serde(default)]
	error: Option<ErrorObject>,
	#[serde(default)]
	method: Option<String>,
}

/// A decoded incoming message.
#[derive(Clone, Debug, PartialEq)]
pub enum Incoming {
	/// Response to the request with this id. A `null` result is `Ok(Value::Null)`.
	Response { id: Id, outcome: Result<Value, ErrorObject> },
	/// Server push without correlation id.
	Notification { method: String },
}

/// Parse a text frame, which may hold one envelope or a batch.
pub fn parse_frame(frame: &str) -> Result<Vec<Incoming>, RpcError> {
	let value: Value =
		serde_json::from_str(frame).map_err(|e| RpcError::InvalidResponse(e.to_string()))?;
	match value {
		Value::Array(items) => items.into_iter().map(parse_envelope).collect(),
		single => Ok(vec![parse_envelope(single)?]),
	}
}

fn parse_envelope(value: Value) -> Result<Incoming, RpcError> {
	let envelope: Envelope =
		serde_json::from_value(value).map_err(|e| RpcError::InvalidResponse(e.to_string()))?;
	match (envelope.id, envelope.method) {
		(Some(id), _) => Ok(Incoming::Response {
			id,
			outcome: match envelope.error {
				Some(error) => Err(error),
				None => Ok(envelope.result.unwrap_or(Value::Null)),
			},
		}),
		(None, Some(method)) => Ok(Incoming::Notification { method }),
		(None, None) => Err(RpcError::InvalidResponse("envelope without id or method".into())),
	}
}
