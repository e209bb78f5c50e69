//! Inbound request dispatch.
//!
//! The remote protocol models multi-target browsing (several independently
//! addressable targets on one transport) while the host's debugging
//! primitive is single-target-attachment-oriented; the router is the
//! translation layer. Target lifecycle commands are handled here as global
//! commands, everything else is forwarded verbatim against the session's
//! tab.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use glider_protocol::{ForwardCommand, Request, Response, method};

use crate::adapter::{DebuggerAdapter, TabHost};
use crate::error::{Error, Result};
use crate::policy::AttachmentPolicy;
use crate::registry::{SessionRegistry, TargetHandle};
use crate::relay::Outbound;

pub struct CommandRouter {
	registry: Arc<SessionRegistry>,
	adapter: Arc<dyn DebuggerAdapter>,
	tabs: Arc<dyn TabHost>,
	policy: Arc<AttachmentPolicy>,
	outbound: Outbound,
}

impl CommandRouter {
	pub fn new(
		registry: Arc<SessionRegistry>,
		adapter: Arc<dyn DebuggerAdapter>,
		tabs: Arc<dyn TabHost>,
		policy: Arc<AttachmentPolicy>,
		outbound: Outbound,
	) -> Self {
		Self {
			registry,
			adapter,
			tabs,
			policy,
			outbound,
		}
	}

	/// Executes one inbound request and produces the response frame,
	/// echoing the request id unchanged. Never panics and never surfaces a
	/// failure beyond the error arm of the response.
	pub async fn dispatch(&self, request: Request) -> Response {
		let id = request.id;
		match request.method.as_str() {
			method::FORWARD_COMMAND => {
				let command: ForwardCommand = match serde_json::from_value(request.params) {
					Ok(command) => command,
					Err(err) => return Response::err(id, format!("Invalid parameters: {err}")),
				};
				debug!(
					target = "glider.router",
					id,
					method = %command.method,
					session = command.session_id.as_deref().unwrap_or("-"),
					"dispatch"
				);
				match self.execute(command).await {
					Ok(result) => Response::ok(id, result),
					Err(err) => Response::err(id, err.to_string()),
				}
			}
			method::ATTACH_ACTIVE_TARGET => {
				self.policy.ensure_attached().await;
				Response::ok(id, json!({"attached": self.registry.len()}))
			}
			other => Response::err(id, format!("Unsupported method: {other}")),
		}
	}

	async fn execute(&self, command: ForwardCommand) -> Result<Value> {
		let method_name = command.method.clone();
		match method_name.as_str() {
			"Target.createTarget" => self.create_target(&command.params).await,
			"Target.closeTarget" => self.close_target(&command.params).await,
			"Target.activateTarget" => self.activate_target(&command.params).await,
			"Target.getTargets" => Ok(self.get_targets()),
			"Target.attachToTarget" => self.resolve_session(&command.params),
			_ => self.forward(command).await,
		}
	}

	/// Creates a tab, waits for it to be ready, then attaches it.
	async fn create_target(&self, params: &Value) -> Result<Value> {
		let url = params["url"].as_str().unwrap_or("about:blank");
		let new_window = params["newWindow"].as_bool().unwrap_or(false);

		let tab = self.tabs.create_tab(url, new_window).await?;
		self.tabs.wait_ready(tab.id).await?;
		// attach() clears any auto-attachment the host raced onto the tab.
		let handle = self.registry.attach(tab.id).await?;

		Ok(json!({"targetId": handle.target_id}))
	}

	/// Detaches and destroys a target; when it was the last tab in its
	/// window, the whole window goes with it.
	async fn close_target(&self, params: &Value) -> Result<Value> {
		let handle = self.require_target(params)?;

		let tabs = self.tabs.list_tabs().await?;
		let window = tabs
			.iter()
			.find(|descriptor| descriptor.id == handle.tab)
			.map(|descriptor| descriptor.window);
		let last_in_window = window.is_some_and(|window| {
			tabs.iter()
				.filter(|descriptor| descriptor.window == window)
				.count()
				<= 1
		});

		// Release before destroy.
		self.registry.detach(handle.tab).await;
		match window {
			Some(window) if last_in_window => self.tabs.close_window(window).await?,
			_ => self.tabs.close_tab(handle.tab).await?,
		}

		self.outbound.send_event(
			None,
			"Target.targetDestroyed",
			json!({"targetId": handle.target_id}),
		);
		Ok(json!({"success": true}))
	}

	async fn activate_target(&self, params: &Value) -> Result<Value> {
		let handle = self.require_target(params)?;
		self.tabs.activate(handle.tab).await?;
		Ok(json!({}))
	}

	fn get_targets(&self) -> Value {
		let infos: Vec<_> = self
			.registry
			.snapshot()
			.iter()
			.map(TargetHandle::target_info)
			.collect();
		json!({"targetInfos": infos})
	}

	/// Returns the existing session for an attached target. Never attaches
	/// implicitly; the caller must have created the target first.
	fn resolve_session(&self, params: &Value) -> Result<Value> {
		let handle = self.require_target(params)?;
		Ok(json!({"sessionId": handle.session_id}))
	}

	/// Session-scoped default: forward verbatim to the native debugger.
	async fn forward(&self, command: ForwardCommand) -> Result<Value> {
		let session_id = command
			.session_id
			.ok_or_else(|| Error::SessionNotFound("(none)".to_string()))?;
		let tab = self
			.registry
			.resolve(&session_id)
			.ok_or(Error::SessionNotFound(session_id))?;

		self.adapter
			.send_command(tab, &command.method, command.params)
			.await
			.map_err(|err| Error::NativeCommand(err.to_string()))
	}

	fn require_target(&self, params: &Value) -> Result<TargetHandle> {
		let target_id = params["targetId"]
			.as_str()
			.ok_or_else(|| Error::InvalidParams("targetId is required".to_string()))?;
		self.registry
			.resolve_target(target_id)
			.ok_or_else(|| Error::TargetNotFound(target_id.to_string()))
	}
}
