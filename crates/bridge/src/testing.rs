//! In-memory collaborator fakes for tests.
//!
//! [`MockDebugger`] and [`MockTabs`] implement the collaborator traits over
//! plain maps, record every call, and can be told to refuse specific
//! operations. They are deterministic and never sleep.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::adapter::{DebuggerAdapter, TabDescriptor, TabHost, TabId, WindowId};
use crate::error::{Error, Result};

#[derive(Default)]
struct DebuggerState {
	attached: HashSet<TabId>,
	commands: Vec<(TabId, String)>,
	refuse_attach: HashSet<TabId>,
	refuse_commands: HashSet<String>,
	refuse_detach: bool,
	responses: HashMap<String, Value>,
}

/// Fake native debugger.
#[derive(Default)]
pub struct MockDebugger {
	state: Mutex<DebuggerState>,
}

impl MockDebugger {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes `attach` fail for this tab, as if another controller holds it.
	pub fn fail_attach(&self, tab: TabId) {
		self.state.lock().refuse_attach.insert(tab);
	}

	pub fn allow_attach(&self, tab: TabId) {
		self.state.lock().refuse_attach.remove(&tab);
	}

	/// Makes every `detach` fail, e.g. the tab is already gone.
	pub fn fail_detach(&self) {
		self.state.lock().refuse_detach = true;
	}

	/// Makes one command method fail with a native-style error.
	pub fn fail_command(&self, method: &str) {
		self.state.lock().refuse_commands.insert(method.to_string());
	}

	/// Fixes the result returned for one command method.
	pub fn respond_with(&self, method: &str, result: Value) {
		self.state.lock().responses.insert(method.to_string(), result);
	}

	pub fn is_attached(&self, tab: TabId) -> bool {
		self.state.lock().attached.contains(&tab)
	}

	/// Every `(tab, method)` pair sent so far, in order.
	pub fn commands(&self) -> Vec<(TabId, String)> {
		self.state.lock().commands.clone()
	}

	pub fn command_count(&self) -> usize {
		self.state.lock().commands.len()
	}
}

#[async_trait]
impl DebuggerAdapter for MockDebugger {
	async fn attach(&self, tab: TabId, _protocol_version: &str) -> Result<()> {
		let mut state = self.state.lock();
		if state.refuse_attach.contains(&tab) {
			return Err(Error::NativeCommand(format!(
				"Another debugger is already attached to tab {tab}"
			)));
		}
		if !state.attached.insert(tab) {
			return Err(Error::NativeCommand(format!(
				"Debugger is already attached to tab {tab}"
			)));
		}
		Ok(())
	}

	async fn send_command(&self, tab: TabId, method: &str, _params: Value) -> Result<Value> {
		let mut state = self.state.lock();
		state.commands.push((tab, method.to_string()));
		if !state.attached.contains(&tab) {
			return Err(Error::NativeCommand(format!(
				"Debugger is not attached to tab {tab}"
			)));
		}
		if state.refuse_commands.contains(method) {
			return Err(Error::NativeCommand(format!("{method}: command failed")));
		}
		if let Some(result) = state.responses.get(method) {
			return Ok(result.clone());
		}
		if method == "Target.getTargetInfo" {
			return Ok(json!({
				"targetInfo": {
					"targetId": format!("target-{tab}"),
					"type": "page",
					"title": format!("tab {tab}"),
					"url": "",
				}
			}));
		}
		Ok(json!({}))
	}

	async fn detach(&self, tab: TabId) -> Result<()> {
		let mut state = self.state.lock();
		if state.refuse_detach {
			return Err(Error::NativeCommand(format!("Cannot detach tab {tab}")));
		}
		state.attached.remove(&tab);
		Ok(())
	}
}

#[derive(Default)]
struct TabsState {
	tabs: Vec<TabDescriptor>,
	next_tab: i64,
	next_window: i64,
	closed_tabs: Vec<TabId>,
	closed_windows: Vec<WindowId>,
	activated: Vec<TabId>,
	ready_waits: Vec<TabId>,
}

/// Fake tab lifecycle host. Tabs are listed in creation order.
#[derive(Default)]
pub struct MockTabs {
	state: Mutex<TabsState>,
}

impl MockTabs {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_window(&self) -> WindowId {
		let mut state = self.state.lock();
		state.next_window += 1;
		WindowId(state.next_window)
	}

	pub fn add_tab(&self, window: WindowId, url: &str) -> TabId {
		let mut state = self.state.lock();
		state.next_tab += 1;
		let id = TabId(state.next_tab);
		state.tabs.push(TabDescriptor {
			id,
			window,
			url: url.to_string(),
			title: String::new(),
		});
		id
	}

	/// Removes a tab as if the user closed it (no bookkeeping side effects).
	pub fn remove_tab(&self, tab: TabId) {
		self.state.lock().tabs.retain(|descriptor| descriptor.id != tab);
	}

	pub fn closed_tabs(&self) -> Vec<TabId> {
		self.state.lock().closed_tabs.clone()
	}

	pub fn closed_windows(&self) -> Vec<WindowId> {
		self.state.lock().closed_windows.clone()
	}

	pub fn activated(&self) -> Vec<TabId> {
		self.state.lock().activated.clone()
	}

	/// Tabs whose readiness was awaited, in order.
	pub fn ready_waits(&self) -> Vec<TabId> {
		self.state.lock().ready_waits.clone()
	}
}

#[async_trait]
impl TabHost for MockTabs {
	async fn list_tabs(&self) -> Result<Vec<TabDescriptor>> {
		Ok(self.state.lock().tabs.clone())
	}

	async fn create_tab(&self, url: &str, new_window: bool) -> Result<TabDescriptor> {
		let mut state = self.state.lock();
		let window = if new_window || state.tabs.is_empty() {
			state.next_window += 1;
			WindowId(state.next_window)
		} else {
			state.tabs[0].window
		};
		state.next_tab += 1;
		let descriptor = TabDescriptor {
			id: TabId(state.next_tab),
			window,
			url: url.to_string(),
			title: String::new(),
		};
		state.tabs.push(descriptor.clone());
		Ok(descriptor)
	}

	async fn wait_ready(&self, tab: TabId) -> Result<()> {
		let mut state = self.state.lock();
		if !state.tabs.iter().any(|descriptor| descriptor.id == tab) {
			return Err(Error::Host(format!("no such tab: {tab}")));
		}
		state.ready_waits.push(tab);
		Ok(())
	}

	async fn close_tab(&self, tab: TabId) -> Result<()> {
		let mut state = self.state.lock();
		let before = state.tabs.len();
		state.tabs.retain(|descriptor| descriptor.id != tab);
		if state.tabs.len() == before {
			return Err(Error::Host(format!("no such tab: {tab}")));
		}
		state.closed_tabs.push(tab);
		Ok(())
	}

	async fn close_window(&self, window: WindowId) -> Result<()> {
		let mut state = self.state.lock();
		state.tabs.retain(|descriptor| descriptor.window != window);
		state.closed_windows.push(window);
		Ok(())
	}

	async fn activate(&self, tab: TabId) -> Result<()> {
		let mut state = self.state.lock();
		if !state.tabs.iter().any(|descriptor| descriptor.id == tab) {
			return Err(Error::Host(format!("no such tab: {tab}")));
		}
		state.activated.push(tab);
		Ok(())
	}
}
