//! Capability traits for the bridge's two external collaborators.
//!
//! The native debugger and the tab lifecycle source are host facilities with
//! fixed contracts; the bridge only ever talks to them through these traits
//! so tests can substitute the in-memory fakes from [`crate::testing`].

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Host-assigned tab identifier, stable for the tab's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabId(pub i64);

impl fmt::Display for TabId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Identifier of the window holding one or more tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub i64);

impl fmt::Display for WindowId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Thin surface over the host's native debugging primitives.
///
/// Attachment is single-controller: `attach` fails if another controller
/// already holds the tab or the tab is gone. `detach` is best-effort and its
/// failure is never fatal to callers.
#[async_trait]
pub trait DebuggerAdapter: Send + Sync {
	async fn attach(&self, tab: TabId, protocol_version: &str) -> Result<()>;

	/// Forwards a native command verbatim; errors carry the host's message.
	async fn send_command(&self, tab: TabId, method: &str, params: Value) -> Result<Value>;

	async fn detach(&self, tab: TabId) -> Result<()>;
}

/// Event emitted by the native debugger, delivered to the bridge over an
/// `mpsc` channel owned by the adapter implementation.
#[derive(Debug, Clone)]
pub enum DebuggerEvent {
	/// A protocol event fired on an attached tab.
	Event {
		tab: TabId,
		method: String,
		params: Value,
	},
	/// The debugger detached involuntarily (user, crash, or host action).
	Detached { tab: TabId },
}

/// Snapshot of one tab as reported by the host.
#[derive(Debug, Clone)]
pub struct TabDescriptor {
	pub id: TabId,
	pub window: WindowId,
	pub url: String,
	pub title: String,
}

/// Tab lifecycle source: enumerate, create, destroy and focus tabs.
#[async_trait]
pub trait TabHost: Send + Sync {
	/// All current tabs in natural host order.
	async fn list_tabs(&self) -> Result<Vec<TabDescriptor>>;

	/// Creates a tab, optionally in a fresh isolated window.
	async fn create_tab(&self, url: &str, new_window: bool) -> Result<TabDescriptor>;

	/// Resolves once the tab has finished its initial load. This replaces
	/// any fixed settle sleep after creation.
	async fn wait_ready(&self, tab: TabId) -> Result<()>;

	async fn close_tab(&self, tab: TabId) -> Result<()>;

	/// Destroys a window and every tab it still holds.
	async fn close_window(&self, window: WindowId) -> Result<()>;

	/// Brings the tab to the foreground.
	async fn activate(&self, tab: TabId) -> Result<()>;
}

/// Tab lifecycle notification, delivered alongside [`DebuggerEvent`]s.
#[derive(Debug, Clone)]
pub enum TabEvent {
	Created(TabDescriptor),
	/// The tab finished a load or its address changed.
	Updated(TabDescriptor),
	Removed(TabId),
	Activated(TabId),
}
