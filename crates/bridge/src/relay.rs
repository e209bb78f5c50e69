//! Transport lifecycle and frame dispatch.
//!
//! [`ProtocolRelay`] cycles `Disconnected → Connecting → Connected →
//! Disconnected` for as long as the process lives. Each connected phase owns
//! one WebSocket; outbound frames funnel through [`Outbound`], which simply
//! drops frames while no connection is live.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use glider_protocol::{Control, EventFrame, ForwardedEvent, Inbound};

use crate::BridgeConfig;
use crate::error::{Error, Result};
use crate::policy::AttachmentPolicy;
use crate::registry::SessionRegistry;
use crate::router::CommandRouter;

/// Transport connection state, published over a watch channel so the
/// attachment policy can gate its triggers on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
	#[default]
	Disconnected,
	Connecting,
	Connected,
}

/// Cloneable handle for sending frames to the relay.
///
/// Holds the per-connection sender; while disconnected, frames are dropped
/// (the far end has no use for them and the registry is cleared anyway).
#[derive(Clone, Default)]
pub struct Outbound {
	tx: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
}

impl Outbound {
	pub fn new() -> Self {
		Self::default()
	}

	pub(crate) fn install(&self, tx: mpsc::UnboundedSender<String>) {
		*self.tx.lock() = Some(tx);
	}

	pub(crate) fn clear(&self) {
		*self.tx.lock() = None;
	}

	/// Serializes and queues a frame; silently a no-op while disconnected.
	pub fn send<T: Serialize>(&self, frame: &T) {
		let text = match serde_json::to_string(frame) {
			Ok(text) => text,
			Err(err) => {
				warn!(target = "glider.relay", error = %err, "failed to serialize outbound frame");
				return;
			}
		};
		let guard = self.tx.lock();
		match guard.as_ref() {
			Some(tx) => {
				let _ = tx.send(text);
			}
			None => debug!(target = "glider.relay", "dropping frame while disconnected"),
		}
	}

	/// Emits a `forward-event` frame tagged with `session_id`.
	pub fn send_event(&self, session_id: Option<String>, method: &str, params: Value) {
		self.send(&EventFrame::new(ForwardedEvent {
			session_id,
			method: method.to_string(),
			params,
		}));
	}
}

/// Owns the socket connection lifecycle and per-frame dispatch.
pub struct ProtocolRelay {
	config: BridgeConfig,
	registry: Arc<SessionRegistry>,
	router: Arc<CommandRouter>,
	policy: Arc<AttachmentPolicy>,
	outbound: Outbound,
	state_tx: watch::Sender<ConnectionState>,
}

impl ProtocolRelay {
	pub fn new(
		config: BridgeConfig,
		registry: Arc<SessionRegistry>,
		router: Arc<CommandRouter>,
		policy: Arc<AttachmentPolicy>,
		outbound: Outbound,
		state_tx: watch::Sender<ConnectionState>,
	) -> Self {
		Self {
			config,
			registry,
			router,
			policy,
			outbound,
			state_tx,
		}
	}

	/// Runs the connect/serve/reconnect cycle forever.
	pub async fn run(&self) {
		loop {
			self.state_tx.send_replace(ConnectionState::Connecting);
			match connect_async(self.config.relay_url.as_str()).await {
				Ok((socket, _)) => {
					info!(target = "glider.relay", url = %self.config.relay_url, "connected");
					if let Err(err) = self.serve(socket).await {
						warn!(target = "glider.relay", error = %err, "connection lost");
					} else {
						info!(target = "glider.relay", "connection closed");
					}
				}
				Err(err) => {
					debug!(target = "glider.relay", url = %self.config.relay_url, error = %err, "connect failed");
				}
			}

			// Disconnected: every session id the relay knew is now invalid.
			// Native attachments stay live (orphaned) until detached by the
			// host or re-registered on the next connection.
			self.state_tx.send_replace(ConnectionState::Disconnected);
			self.outbound.clear();
			self.registry.forget_all();
			tokio::time::sleep(self.config.reconnect_delay).await;
		}
	}

	async fn serve(&self, socket: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Result<()> {
		let (mut sink, mut stream) = socket.split();

		let (tx, mut rx) = mpsc::unbounded_channel::<String>();
		self.outbound.install(tx);
		let writer = tokio::spawn(async move {
			while let Some(text) = rx.recv().await {
				if sink.send(Message::Text(text)).await.is_err() {
					break;
				}
			}
		});

		self.state_tx.send_replace(ConnectionState::Connected);

		// Let the connection settle before the first auto-attachment pass;
		// inbound frames are served meanwhile.
		{
			let policy = self.policy.clone();
			let settle = self.config.connect_settle;
			tokio::spawn(async move {
				tokio::time::sleep(settle).await;
				policy.ensure_attached().await;
			});
		}

		let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
		heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
		heartbeat.tick().await; // immediate first tick

		let result = loop {
			tokio::select! {
				frame = stream.next() => match frame {
					Some(Ok(Message::Text(text))) => self.handle_frame(&text),
					Some(Ok(Message::Close(_))) | None => break Ok(()),
					Some(Ok(_)) => {}
					Some(Err(err)) => break Err(Error::Transport(err)),
				},
				_ = heartbeat.tick() => {
					self.outbound.send(&Control::ping());
				}
			}
		};

		self.outbound.clear();
		let _ = writer.await;
		result
	}

	/// Handles one inbound text frame. Malformed frames are dropped, `ping`
	/// is answered in place, and requests are dispatched concurrently so a
	/// slow native command never blocks the read loop.
	fn handle_frame(&self, text: &str) {
		let frame: Inbound = match serde_json::from_str(text) {
			Ok(frame) => frame,
			Err(err) => {
				debug!(target = "glider.relay", error = %err, "dropping malformed frame");
				return;
			}
		};

		match frame {
			Inbound::Control(control) if control.is_ping() => {
				self.outbound.send(&Control::pong());
			}
			Inbound::Control(_) => {}
			Inbound::Request(request) => {
				let router = self.router.clone();
				let outbound = self.outbound.clone();
				tokio::spawn(async move {
					let response = router.dispatch(request).await;
					outbound.send(&response);
				});
			}
		}
	}
}
