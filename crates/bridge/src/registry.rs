//! Session bookkeeping: the bidirectional mapping between relay session ids
//! and attached tabs.
//!
//! The registry is the only mutable shared state in the bridge. Both maps are
//! mutated together under one lock so no half-entry is ever observable, and
//! the lock is never held across a suspension point.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use glider_protocol::TargetInfo;

use crate::adapter::{DebuggerAdapter, TabId};
use crate::error::{Error, Result};
use crate::relay::Outbound;

/// One attached debuggable tab. Owned exclusively by the registry; callers
/// only ever see clones.
#[derive(Debug, Clone)]
pub struct TargetHandle {
	pub tab: TabId,
	/// Protocol-level target id, synthesized as `tab-{id}` when the native
	/// debugger cannot report one.
	pub target_id: String,
	/// Relay-assigned id, unique for the registry's lifetime.
	pub session_id: String,
	pub title: String,
	pub url: String,
}

impl TargetHandle {
	pub fn target_info(&self) -> TargetInfo {
		TargetInfo {
			target_id: self.target_id.clone(),
			kind: "page".to_string(),
			title: self.title.clone(),
			url: self.url.clone(),
			attached: true,
		}
	}
}

#[derive(Default)]
struct Maps {
	by_tab: HashMap<TabId, TargetHandle>,
	by_session: HashMap<String, TabId>,
	attaching: HashSet<TabId>,
}

/// Single source of truth for "what is currently attached".
pub struct SessionRegistry {
	adapter: Arc<dyn DebuggerAdapter>,
	outbound: Outbound,
	protocol_version: String,
	next_session: AtomicU64,
	maps: Mutex<Maps>,
}

impl SessionRegistry {
	pub fn new(
		adapter: Arc<dyn DebuggerAdapter>,
		outbound: Outbound,
		protocol_version: String,
	) -> Self {
		Self {
			adapter,
			outbound,
			protocol_version,
			next_session: AtomicU64::new(1),
			maps: Mutex::new(Maps::default()),
		}
	}

	/// Attaches the native debugger to `tab` and issues a fresh session.
	///
	/// Any stale entry for the tab is dropped first, and a best-effort native
	/// detach defuses the race with the host's own automatic attachment on
	/// freshly created tabs. On success an `attached` event (with
	/// `waitingForDebugger: false`) goes out to the relay.
	pub async fn attach(&self, tab: TabId) -> Result<TargetHandle> {
		{
			let mut maps = self.maps.lock();
			if !maps.attaching.insert(tab) {
				return Err(Error::AlreadyAttaching(tab));
			}
		}
		let result = self.attach_locked_out(tab).await;
		self.maps.lock().attaching.remove(&tab);
		result
	}

	async fn attach_locked_out(&self, tab: TabId) -> Result<TargetHandle> {
		if let Some(stale) = self.remove_entry(tab) {
			debug!(
				target = "glider.registry",
				tab = %tab,
				session = %stale.session_id,
				"dropping stale entry before re-attach"
			);
		}

		// Ensure detached: target creation can race the host's auto-attach.
		if let Err(err) = self.adapter.detach(tab).await {
			debug!(target = "glider.registry", tab = %tab, error = %err, "pre-attach detach failed");
		}

		self.adapter
			.attach(tab, &self.protocol_version)
			.await
			.map_err(|err| Error::AttachFailed {
				tab,
				reason: err.to_string(),
			})?;

		// Page domain events are what most controllers want first.
		let _ = self.adapter.send_command(tab, "Page.enable", Value::Null).await;

		let mut info = self.fetch_target_info(tab).await;
		info.attached = true;

		let session_id = format!(
			"session-{}",
			self.next_session.fetch_add(1, Ordering::SeqCst)
		);
		let handle = TargetHandle {
			tab,
			target_id: info.target_id.clone(),
			session_id: session_id.clone(),
			title: info.title.clone(),
			url: info.url.clone(),
		};

		{
			let mut maps = self.maps.lock();
			maps.by_tab.insert(tab, handle.clone());
			maps.by_session.insert(session_id.clone(), tab);
		}

		info!(
			target = "glider.registry",
			tab = %tab,
			session = %session_id,
			url = %handle.url,
			"attached"
		);
		self.outbound.send_event(
			None,
			"Target.attachedToTarget",
			json!({
				"sessionId": session_id,
				"targetInfo": info,
				"waitingForDebugger": false,
			}),
		);

		Ok(handle)
	}

	async fn fetch_target_info(&self, tab: TabId) -> TargetInfo {
		let fallback = || TargetInfo {
			target_id: format!("tab-{tab}"),
			kind: "page".to_string(),
			title: String::new(),
			url: String::new(),
			attached: false,
		};
		match self
			.adapter
			.send_command(tab, "Target.getTargetInfo", Value::Null)
			.await
		{
			Ok(result) => serde_json::from_value::<TargetInfo>(result["targetInfo"].clone())
				.unwrap_or_else(|_| fallback()),
			Err(err) => {
				debug!(target = "glider.registry", tab = %tab, error = %err, "getTargetInfo failed, synthesizing");
				fallback()
			}
		}
	}

	/// Removes the tab's session and best-effort releases the native
	/// attachment. No-op when the tab has no entry.
	pub async fn detach(&self, tab: TabId) {
		let Some(handle) = self.remove_entry(tab) else {
			return;
		};

		info!(
			target = "glider.registry",
			tab = %tab,
			session = %handle.session_id,
			"detached"
		);
		self.outbound.send_event(
			None,
			"Target.detachedFromTarget",
			json!({
				"sessionId": handle.session_id,
				"targetId": handle.target_id,
			}),
		);

		// Release is best-effort: the tab may already be gone.
		if let Err(err) = self.adapter.detach(tab).await {
			warn!(target = "glider.registry", tab = %tab, error = %err, "native detach failed, ignoring");
		}
	}

	fn remove_entry(&self, tab: TabId) -> Option<TargetHandle> {
		let mut maps = self.maps.lock();
		let handle = maps.by_tab.remove(&tab)?;
		maps.by_session.remove(&handle.session_id);
		Some(handle)
	}

	/// Drops every session without touching native attachments. Used when
	/// the transport disconnects: the relay can no longer trust any session
	/// id, but the native side may still be live and is left orphaned.
	pub fn forget_all(&self) {
		let mut maps = self.maps.lock();
		let count = maps.by_tab.len();
		maps.by_tab.clear();
		maps.by_session.clear();
		if count > 0 {
			debug!(target = "glider.registry", count, "forgot all sessions");
		}
	}

	pub fn resolve(&self, session_id: &str) -> Option<TabId> {
		self.maps.lock().by_session.get(session_id).copied()
	}

	pub fn resolve_target(&self, target_id: &str) -> Option<TargetHandle> {
		self.maps
			.lock()
			.by_tab
			.values()
			.find(|handle| handle.target_id == target_id)
			.cloned()
	}

	pub fn session_for(&self, tab: TabId) -> Option<String> {
		self.maps
			.lock()
			.by_tab
			.get(&tab)
			.map(|handle| handle.session_id.clone())
	}

	pub fn is_attached(&self, tab: TabId) -> bool {
		self.maps.lock().by_tab.contains_key(&tab)
	}

	pub fn len(&self) -> usize {
		self.maps.lock().by_tab.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn snapshot(&self) -> Vec<TargetHandle> {
		self.maps.lock().by_tab.values().cloned().collect()
	}
}

#[cfg(test)]
mod tests {
	use tokio::sync::mpsc;

	use super::*;
	use crate::testing::MockDebugger;

	fn registry_with_capture() -> (
		Arc<SessionRegistry>,
		Arc<MockDebugger>,
		mpsc::UnboundedReceiver<String>,
	) {
		let adapter = Arc::new(MockDebugger::new());
		let outbound = Outbound::new();
		let (tx, rx) = mpsc::unbounded_channel();
		outbound.install(tx);
		let registry = Arc::new(SessionRegistry::new(
			adapter.clone(),
			outbound,
			"1.3".to_string(),
		));
		(registry, adapter, rx)
	}

	fn next_frame(rx: &mut mpsc::UnboundedReceiver<String>) -> serde_json::Value {
		serde_json::from_str(&rx.try_recv().expect("expected a frame")).unwrap()
	}

	#[tokio::test]
	async fn attach_issues_unique_monotonic_sessions() {
		let (registry, _, _rx) = registry_with_capture();

		let first = registry.attach(TabId(1)).await.unwrap();
		let second = registry.attach(TabId(2)).await.unwrap();
		assert_eq!(first.session_id, "session-1");
		assert_eq!(second.session_id, "session-2");
		assert_eq!(registry.len(), 2);

		// Re-attach replaces the entry but never reuses the old id.
		let third = registry.attach(TabId(1)).await.unwrap();
		assert_eq!(third.session_id, "session-3");
		assert_eq!(registry.len(), 2);
		assert!(registry.resolve(&first.session_id).is_none());
	}

	#[tokio::test]
	async fn attach_emits_attached_event_without_pausing() {
		let (registry, _, mut rx) = registry_with_capture();
		let handle = registry.attach(TabId(5)).await.unwrap();

		let frame = next_frame(&mut rx);
		assert_eq!(frame["method"], "forward-event");
		assert_eq!(frame["params"]["method"], "Target.attachedToTarget");
		assert_eq!(frame["params"]["params"]["sessionId"], handle.session_id);
		assert_eq!(frame["params"]["params"]["waitingForDebugger"], false);
		assert_eq!(frame["params"]["params"]["targetInfo"]["attached"], true);
	}

	#[tokio::test]
	async fn attach_failure_surfaces_and_leaves_no_entry() {
		let (registry, adapter, _rx) = registry_with_capture();
		adapter.fail_attach(TabId(9));

		let err = registry.attach(TabId(9)).await.unwrap_err();
		assert!(matches!(err, Error::AttachFailed { tab: TabId(9), .. }));
		assert_eq!(registry.len(), 0);

		// The attaching guard was released, so a later attempt can run.
		adapter.allow_attach(TabId(9));
		registry.attach(TabId(9)).await.unwrap();
	}

	#[tokio::test]
	async fn detach_is_idempotent_and_swallows_release_failure() {
		let (registry, adapter, mut rx) = registry_with_capture();
		let handle = registry.attach(TabId(3)).await.unwrap();
		let _ = next_frame(&mut rx); // attached event

		adapter.fail_detach();
		registry.detach(TabId(3)).await;
		assert_eq!(registry.len(), 0);
		assert!(registry.resolve(&handle.session_id).is_none());

		let frame = next_frame(&mut rx);
		assert_eq!(frame["params"]["method"], "Target.detachedFromTarget");
		assert_eq!(frame["params"]["params"]["targetId"], handle.target_id);

		// Absent entry: nothing raised, nothing emitted.
		registry.detach(TabId(3)).await;
		registry.detach(TabId(42)).await;
		assert!(rx.try_recv().is_err());
	}

	#[tokio::test]
	async fn forget_all_invalidates_sessions_but_keeps_native_attachment() {
		let (registry, adapter, _rx) = registry_with_capture();
		let a = registry.attach(TabId(1)).await.unwrap();
		let b = registry.attach(TabId(2)).await.unwrap();

		registry.forget_all();

		assert_eq!(registry.len(), 0);
		assert!(registry.resolve(&a.session_id).is_none());
		assert!(registry.resolve(&b.session_id).is_none());
		// Orphaned, not torn down.
		assert!(adapter.is_attached(TabId(1)));
		assert!(adapter.is_attached(TabId(2)));
	}

	#[tokio::test]
	async fn synthesized_target_id_when_native_info_unavailable() {
		let (registry, adapter, _rx) = registry_with_capture();
		adapter.fail_command("Target.getTargetInfo");

		let handle = registry.attach(TabId(7)).await.unwrap();
		assert_eq!(handle.target_id, "tab-7");
		assert_eq!(registry.resolve_target("tab-7").unwrap().tab, TabId(7));
	}
}
