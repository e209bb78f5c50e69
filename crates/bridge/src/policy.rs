//! Self-healing attachment policy.
//!
//! Keeps at least one eligible tab attached whenever the transport is
//! connected, so the remote side never has to issue an explicit attach
//! before sending commands. Every trigger is idempotent: a pass is a no-op
//! while any session exists.
//!
//! The conservative "at least one, attach first eligible" policy is the
//! default; `eager_attach` additionally tries the specific tab on
//! creation/update/activation while no session exists.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::adapter::{TabEvent, TabHost, TabId};
use crate::registry::SessionRegistry;
use crate::relay::ConnectionState;

const PRIVILEGED_SCHEMES: [&str; 3] = ["chrome://", "chrome-extension://", "devtools://"];

/// Whether a tab at this address can be debugged. Privileged internal
/// surfaces reject debugger attachment, so every trigger path filters with
/// this one predicate.
pub fn is_debuggable(url: &str) -> bool {
	!PRIVILEGED_SCHEMES
		.iter()
		.any(|scheme| url.starts_with(scheme))
}

pub struct AttachmentPolicy {
	registry: Arc<SessionRegistry>,
	tabs: Arc<dyn TabHost>,
	state: watch::Receiver<ConnectionState>,
	eager: bool,
}

impl AttachmentPolicy {
	pub fn new(
		registry: Arc<SessionRegistry>,
		tabs: Arc<dyn TabHost>,
		state: watch::Receiver<ConnectionState>,
		eager: bool,
	) -> Self {
		Self {
			registry,
			tabs,
			state,
			eager,
		}
	}

	fn connected(&self) -> bool {
		*self.state.borrow() == ConnectionState::Connected
	}

	/// Attaches the first eligible tab in host order, unless a session
	/// already exists. Per-tab attach failures are logged and the search
	/// moves on; an empty result is not an error, the next trigger retries.
	pub async fn ensure_attached(&self) -> usize {
		if !self.registry.is_empty() {
			return self.registry.len();
		}

		let tabs = match self.tabs.list_tabs().await {
			Ok(tabs) => tabs,
			Err(err) => {
				warn!(target = "glider.policy", error = %err, "tab enumeration failed");
				return 0;
			}
		};

		for tab in tabs {
			if !is_debuggable(&tab.url) || self.registry.is_attached(tab.id) {
				continue;
			}
			match self.registry.attach(tab.id).await {
				Ok(handle) => {
					info!(
						target = "glider.policy",
						tab = %tab.id,
						session = %handle.session_id,
						url = %tab.url,
						"auto-attached"
					);
					return 1;
				}
				Err(err) => {
					warn!(target = "glider.policy", tab = %tab.id, error = %err, "attach candidate failed, trying next");
				}
			}
		}

		debug!(target = "glider.policy", "no eligible tab to attach");
		0
	}

	/// Reacts to one tab lifecycle notification.
	pub async fn on_tab_event(&self, event: TabEvent) {
		match event {
			TabEvent::Removed(tab) => {
				let was_attached = self.registry.is_attached(tab);
				if was_attached {
					self.registry.detach(tab).await;
				}
				if was_attached && self.connected() && self.registry.is_empty() {
					self.ensure_attached().await;
				}
			}
			TabEvent::Created(descriptor) | TabEvent::Updated(descriptor) => {
				if self.eager
					&& self.connected()
					&& self.registry.is_empty()
					&& is_debuggable(&descriptor.url)
				{
					if let Err(err) = self.registry.attach(descriptor.id).await {
						debug!(target = "glider.policy", tab = %descriptor.id, error = %err, "eager attach failed");
					}
				}
			}
			TabEvent::Activated(tab) => {
				if self.eager && self.connected() && self.registry.is_empty() {
					self.try_attach_specific(tab).await;
				}
			}
		}
	}

	/// Reacts to the native debugger dropping a tab on its own.
	pub async fn on_debugger_detached(&self, tab: TabId) {
		self.registry.detach(tab).await;
		if self.connected() && self.registry.is_empty() {
			self.ensure_attached().await;
		}
	}

	/// Periodic zero-session scan, independent of the reconnect timer.
	pub async fn run_scan(self: Arc<Self>, interval: Duration) {
		loop {
			tokio::time::sleep(interval).await;
			if self.connected() && self.registry.is_empty() {
				self.ensure_attached().await;
			}
		}
	}

	async fn try_attach_specific(&self, tab: TabId) {
		let descriptor = match self.tabs.list_tabs().await {
			Ok(tabs) => tabs.into_iter().find(|descriptor| descriptor.id == tab),
			Err(_) => None,
		};
		let Some(descriptor) = descriptor else { return };
		if !is_debuggable(&descriptor.url) || self.registry.is_attached(tab) {
			return;
		}
		if let Err(err) = self.registry.attach(tab).await {
			debug!(target = "glider.policy", tab = %tab, error = %err, "eager attach failed");
		}
	}
}

#[cfg(test)]
mod tests {
	use tokio::sync::watch;

	use super::*;
	use crate::adapter::TabDescriptor;
	use crate::relay::Outbound;
	use crate::testing::{MockDebugger, MockTabs};

	struct Fixture {
		policy: Arc<AttachmentPolicy>,
		registry: Arc<SessionRegistry>,
		adapter: Arc<MockDebugger>,
		tabs: Arc<MockTabs>,
		state_tx: watch::Sender<ConnectionState>,
	}

	fn fixture(eager: bool) -> Fixture {
		let adapter = Arc::new(MockDebugger::new());
		let tabs = Arc::new(MockTabs::new());
		let registry = Arc::new(SessionRegistry::new(
			adapter.clone(),
			Outbound::new(),
			"1.3".to_string(),
		));
		let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);
		let policy = Arc::new(AttachmentPolicy::new(
			registry.clone(),
			tabs.clone(),
			state_rx,
			eager,
		));
		Fixture {
			policy,
			registry,
			adapter,
			tabs,
			state_tx,
		}
	}

	#[test]
	fn privileged_schemes_are_not_debuggable() {
		assert!(!is_debuggable("chrome://settings"));
		assert!(!is_debuggable("chrome-extension://abcdef/popup.html"));
		assert!(!is_debuggable("devtools://devtools/bundled/inspector.html"));
		assert!(is_debuggable("https://example.com"));
		assert!(is_debuggable("about:blank"));
	}

	#[tokio::test]
	async fn attaches_exactly_one_eligible_tab_in_host_order() {
		let fx = fixture(false);
		let window = fx.tabs.add_window();
		fx.tabs.add_tab(window, "chrome://newtab");
		let eligible = fx.tabs.add_tab(window, "https://first.example");
		fx.tabs.add_tab(window, "https://second.example");

		assert_eq!(fx.policy.ensure_attached().await, 1);
		assert_eq!(fx.registry.len(), 1);
		assert!(fx.registry.is_attached(eligible));

		// Idempotent: a second pass is a no-op.
		assert_eq!(fx.policy.ensure_attached().await, 1);
		assert_eq!(fx.registry.len(), 1);
	}

	#[tokio::test]
	async fn attaches_nothing_when_only_privileged_tabs_exist() {
		let fx = fixture(false);
		let window = fx.tabs.add_window();
		fx.tabs.add_tab(window, "chrome://settings");
		fx.tabs.add_tab(window, "chrome-extension://abc/index.html");

		assert_eq!(fx.policy.ensure_attached().await, 0);
		assert_eq!(fx.registry.len(), 0);
	}

	#[tokio::test]
	async fn skips_failing_candidate_and_attaches_next() {
		let fx = fixture(false);
		let window = fx.tabs.add_window();
		let refusing = fx.tabs.add_tab(window, "https://locked.example");
		let open = fx.tabs.add_tab(window, "https://open.example");
		fx.adapter.fail_attach(refusing);

		assert_eq!(fx.policy.ensure_attached().await, 1);
		assert!(fx.registry.is_attached(open));
		assert!(!fx.registry.is_attached(refusing));
	}

	#[tokio::test]
	async fn sole_attachment_removed_triggers_reattach() {
		let fx = fixture(false);
		let window = fx.tabs.add_window();
		let first = fx.tabs.add_tab(window, "https://a.example");
		let second = fx.tabs.add_tab(window, "https://b.example");
		fx.policy.ensure_attached().await;
		assert!(fx.registry.is_attached(first));

		fx.tabs.remove_tab(first);
		fx.policy.on_tab_event(TabEvent::Removed(first)).await;

		assert_eq!(fx.registry.len(), 1);
		assert!(fx.registry.is_attached(second));
	}

	#[tokio::test]
	async fn involuntary_detach_of_sole_attachment_triggers_reattach() {
		let fx = fixture(false);
		let window = fx.tabs.add_window();
		let first = fx.tabs.add_tab(window, "https://a.example");
		let second = fx.tabs.add_tab(window, "https://b.example");
		fx.policy.ensure_attached().await;
		assert!(fx.registry.is_attached(first));

		fx.tabs.remove_tab(first);
		fx.policy.on_debugger_detached(first).await;

		assert!(fx.registry.is_attached(second));
	}

	#[tokio::test]
	async fn no_reattach_while_disconnected() {
		let fx = fixture(false);
		let window = fx.tabs.add_window();
		let first = fx.tabs.add_tab(window, "https://a.example");
		fx.tabs.add_tab(window, "https://b.example");
		fx.policy.ensure_attached().await;

		fx.state_tx.send_replace(ConnectionState::Disconnected);
		fx.policy.on_debugger_detached(first).await;

		assert_eq!(fx.registry.len(), 0);
	}

	#[tokio::test]
	async fn eager_mode_attaches_on_activation_only_when_empty() {
		let fx = fixture(true);
		let window = fx.tabs.add_window();
		let first = fx.tabs.add_tab(window, "https://a.example");
		let second = fx.tabs.add_tab(window, "https://b.example");

		fx.policy.on_tab_event(TabEvent::Activated(second)).await;
		assert!(fx.registry.is_attached(second));

		// A session exists now; switching tabs must not attach another.
		fx.policy.on_tab_event(TabEvent::Activated(first)).await;
		assert_eq!(fx.registry.len(), 1);
	}

	#[tokio::test]
	async fn conservative_mode_ignores_activation() {
		let fx = fixture(false);
		let window = fx.tabs.add_window();
		let tab = fx.tabs.add_tab(window, "https://a.example");

		fx.policy.on_tab_event(TabEvent::Activated(tab)).await;
		assert_eq!(fx.registry.len(), 0);
	}

	#[tokio::test]
	async fn eager_mode_skips_privileged_created_tab() {
		let fx = fixture(true);
		let window = fx.tabs.add_window();
		let tab = fx.tabs.add_tab(window, "chrome://history");

		fx.policy
			.on_tab_event(TabEvent::Created(TabDescriptor {
				id: tab,
				window,
				url: "chrome://history".to_string(),
				title: String::new(),
			}))
			.await;
		assert_eq!(fx.registry.len(), 0);
	}
}
