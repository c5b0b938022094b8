// SPDX-License-Identifier: GPL-3.0

//! RPC transport error types.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when issuing a JSON-RPC request over a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
	/// The connection is closed or gave up reconnecting.
	#[error("Connection unavailable")]
	ConnectionUnavailable,
	/// No response arrived before the deadline.
	#[error("Request {method} timed out after {after:?}")]
	Timeout {
		/// The RPC method that timed out.
		method: String,
		/// The deadline that elapsed.
		after: Duration,
	},
	/// The node could not be reached at all.
	#[error("Failed to connect to {endpoint}: {message}")]
	DeviceUnreachable {
		/// The endpoint URL that failed to connect.
		endpoint: String,
		/// The error message describing the failure.
		message: String,
	},
	/// The caller cancelled the request.
	#[error("Request cancelled")]
	Cancelled,
	/// The pending-request table is full.
	#[error("Too many pending requests (capacity {0})")]
	Busy(usize),
	/// The node answered with a JSON-RPC error object.
	#[error("RPC error {code}: {message}")]
	Response {
		/// JSON-RPC error code.
		code: i64,
		/// JSON-RPC error message.
		message: String,
	},
	/// The node answered with something that is not the expected shape.
	#[error("Invalid RPC response: {0}")]
	InvalidResponse(String),
}

impl RpcError {
	/// Whether the error reflects a broken transport, making the node a failover candidate.
	pub fn is_transport(&self) -> bool {
		matches!(
			self,
			RpcError::ConnectionUnavailable |
				RpcError::Timeout { .. } |
				RpcError::DeviceUnreachable { .. }
		)
	}
}
