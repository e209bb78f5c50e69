use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::BridgeConfig;
use crate::adapter::{DebuggerAdapter, DebuggerEvent, TabEvent, TabHost};
use crate::policy::AttachmentPolicy;
use crate::registry::SessionRegistry;
use crate::relay::{ConnectionState, Outbound, ProtocolRelay};
use crate::router::CommandRouter;

/// Owning aggregate of the bridge: one constructed instance per process,
/// no ambient globals. [`run`](Self::run) drives the relay loop and the two
/// event pumps until dropped.
pub struct Bridge {
	registry: Arc<SessionRegistry>,
	policy: Arc<AttachmentPolicy>,
	relay: Arc<ProtocolRelay>,
	outbound: Outbound,
	state_rx: watch::Receiver<ConnectionState>,
	debugger_events: mpsc::UnboundedReceiver<DebuggerEvent>,
	tab_events: mpsc::UnboundedReceiver<TabEvent>,
	scan_interval: std::time::Duration,
}

impl Bridge {
	/// Wires the components around the given collaborators. The two
	/// receivers carry the collaborators' event streams.
	pub fn new(
		config: BridgeConfig,
		adapter: Arc<dyn DebuggerAdapter>,
		tabs: Arc<dyn TabHost>,
		debugger_events: mpsc::UnboundedReceiver<DebuggerEvent>,
		tab_events: mpsc::UnboundedReceiver<TabEvent>,
	) -> Self {
		let outbound = Outbound::new();
		let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

		let registry = Arc::new(SessionRegistry::new(
			adapter.clone(),
			outbound.clone(),
			config.protocol_version.clone(),
		));
		let policy = Arc::new(AttachmentPolicy::new(
			registry.clone(),
			tabs.clone(),
			state_rx.clone(),
			config.eager_attach,
		));
		let router = Arc::new(CommandRouter::new(
			registry.clone(),
			adapter,
			tabs,
			policy.clone(),
			outbound.clone(),
		));
		let scan_interval = config.attach_scan_interval;
		let relay = Arc::new(ProtocolRelay::new(
			config,
			registry.clone(),
			router,
			policy.clone(),
			outbound.clone(),
			state_tx,
		));

		Self {
			registry,
			policy,
			relay,
			outbound,
			state_rx,
			debugger_events,
			tab_events,
			scan_interval,
		}
	}

	/// Observes the transport state, e.g. for a status surface.
	pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
		self.state_rx.clone()
	}

	pub fn session_count(&self) -> usize {
		self.registry.len()
	}

	/// Runs until both collaborator event streams close.
	pub async fn run(mut self) {
		let relay_task = {
			let relay = self.relay.clone();
			tokio::spawn(async move { relay.run().await })
		};
		let scan_task = tokio::spawn(self.policy.clone().run_scan(self.scan_interval));

		loop {
			tokio::select! {
				event = self.debugger_events.recv() => match event {
					Some(DebuggerEvent::Event { tab, method, params }) => {
						// Events for tabs without a session are dropped: the
						// relay has no way to address them.
						match self.registry.session_for(tab) {
							Some(session) => {
								self.outbound.send_event(Some(session), &method, params);
							}
							None => {
								debug!(target = "glider.bridge", tab = %tab, method = %method, "event for unattached tab dropped");
							}
						}
					}
					Some(DebuggerEvent::Detached { tab }) => {
						self.policy.on_debugger_detached(tab).await;
					}
					None => break,
				},
				event = self.tab_events.recv() => match event {
					Some(event) => self.policy.on_tab_event(event).await,
					None => break,
				},
			}
		}

		relay_task.abort();
		scan_task.abort();
	}
}
