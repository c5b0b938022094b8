// SPDX-License-Identifier: GPL-3.0

//! Text-frame transports that carry JSON-RPC envelopes.
//!
//! A [`Connector`] opens a [`Transport`] to a node URL. Connections only see these traits, so the
//! WebSocket transport can be swapped for the in-memory one in [`crate::testing`].

use crate::error::RpcError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use log::{debug, trace};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};
use url::Url;

/// Opens transports to nodes.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
	async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, RpcError>;
}

/// A bidirectional channel of text frames to one node.
#[async_trait]
pub trait Transport: Send {
	async fn send(&mut self, frame: String) -> Result<(), RpcError>;

	/// The next frame, `None` once the node closed the channel.
	async fn recv(&mut self) -> Option<Result<String, RpcError>>;

	async fn close(&mut self);
}

/// Connects over WebSocket (`ws://` and `wss://`).
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
	async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, RpcError> {
		let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await.map_err(|e| {
			RpcError::DeviceUnreachable { endpoint: url.to_string(), message: e.to_string() }
		})?;
		debug!("Connected to {url}");
		Ok(Box::new(WsTransport { stream }))
	}
}

struct WsTransport {
	stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
	async fn send(&mut self, frame: String) -> Result<(), RpcError> {
		self.stream.send(Message::Text(frame)).await.map_err(|e| {
			debug!("WebSocket send failed: {e}");
			RpcError::ConnectionUnavailable
		})
	}

	async fn recv(&mut self) -> Option<Result<String, RpcError>> {
		loop {
			match self.stream.next().await? {
				Ok(Message::Text(text)) => return Some(Ok(text)),
				Ok(Message::Binary(bytes)) =>
					return Some(
						String::from_utf8(bytes).map_err(|e| RpcError::InvalidResponse(e.to_string())),
					),
				Ok(Message::Close(frame)) => {
					debug!("WebSocket closed by peer: {frame:?}");
					return None;
				},
				Ok(other) => trace!("Ignoring WebSocket message {other:?}"),
				Err(e) => {
					debug!("WebSocket receive failed: {e}");
					return Some(Err(RpcError::ConnectionUnavailable));
				},
			}
		}
	}

	async fn close(&mut self) {
		let _ = self.stream.close(None).await;
	}
}
