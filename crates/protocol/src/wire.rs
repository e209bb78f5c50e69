use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire method names used by the relay protocol.
pub mod method {
	/// Relay asks the bridge to execute a debugging command.
	pub const FORWARD_COMMAND: &str = "forward-command";
	/// Bridge forwards a native debugger event to the relay.
	pub const FORWARD_EVENT: &str = "forward-event";
	/// Relay asks the bridge to ensure an attached target exists.
	pub const ATTACH_ACTIVE_TARGET: &str = "attach-active-target";
	/// Liveness probe, answered with [`PONG`].
	pub const PING: &str = "ping";
	/// Liveness answer.
	pub const PONG: &str = "pong";
}

/// A frame received from the relay.
///
/// Requests carry an `id` and expect a matching [`Response`]; control frames
/// carry only a `method` and are handled inside the relay loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Inbound {
	Request(Request),
	Control(Control),
}

/// A request from the relay: `{id, method, params}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
	pub id: u64,
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

/// An id-less control frame: `{method: "ping"}` or `{method: "pong"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Control {
	pub method: String,
}

impl Control {
	pub fn ping() -> Self {
		Self {
			method: method::PING.to_string(),
		}
	}

	pub fn pong() -> Self {
		Self {
			method: method::PONG.to_string(),
		}
	}

	pub fn is_ping(&self) -> bool {
		self.method == method::PING
	}

	pub fn is_pong(&self) -> bool {
		self.method == method::PONG
	}
}

/// Payload of a `forward-command` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardCommand {
	/// Native debugging method, e.g. `Page.navigate` or `Target.createTarget`.
	pub method: String,
	#[serde(default)]
	pub params: Value,
	/// Present for session-scoped commands, absent for global ones.
	#[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// A response to a [`Request`], echoing its `id` unchanged.
///
/// Exactly one of `result` and `error` is present on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	pub id: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl Response {
	pub fn ok(id: u64, result: Value) -> Self {
		Self {
			id,
			result: Some(result),
			error: None,
		}
	}

	pub fn err(id: u64, message: impl Into<String>) -> Self {
		Self {
			id,
			result: None,
			error: Some(message.into()),
		}
	}
}

/// An event notification from the bridge: `{method: "forward-event", params}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
	pub method: String,
	pub params: ForwardedEvent,
}

impl EventFrame {
	pub fn new(params: ForwardedEvent) -> Self {
		Self {
			method: method::FORWARD_EVENT.to_string(),
			params,
		}
	}
}

/// A native debugger event tagged with its owning session.
///
/// `session_id` is absent for target lifecycle events that are not scoped to
/// a live session (e.g. `Target.attachedToTarget` itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardedEvent {
	#[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

/// Protocol-level description of one debuggable target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetInfo {
	#[serde(rename = "targetId")]
	pub target_id: String,
	#[serde(rename = "type", default = "default_target_type")]
	pub kind: String,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub attached: bool,
}

fn default_target_type() -> String {
	"page".to_string()
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn request_parses_with_default_params() {
		let frame: Inbound =
			serde_json::from_str(r#"{"id": 7, "method": "attach-active-target"}"#).unwrap();
		match frame {
			Inbound::Request(req) => {
				assert_eq!(req.id, 7);
				assert_eq!(req.method, method::ATTACH_ACTIVE_TARGET);
				assert!(req.params.is_null());
			}
			_ => panic!("expected request"),
		}
	}

	#[test]
	fn idless_frame_parses_as_control() {
		let frame: Inbound = serde_json::from_str(r#"{"method": "ping"}"#).unwrap();
		match frame {
			Inbound::Control(ctl) => assert!(ctl.is_ping()),
			_ => panic!("expected control"),
		}
	}

	#[test]
	fn forward_command_session_id_is_camel_case() {
		let cmd: ForwardCommand = serde_json::from_value(json!({
			"method": "Runtime.evaluate",
			"params": {"expression": "1 + 1"},
			"sessionId": "session-3",
		}))
		.unwrap();
		assert_eq!(cmd.session_id.as_deref(), Some("session-3"));

		let global: ForwardCommand =
			serde_json::from_value(json!({"method": "Target.getTargets"})).unwrap();
		assert!(global.session_id.is_none());
		assert!(global.params.is_null());
	}

	#[test]
	fn response_serializes_exactly_one_arm() {
		let ok = serde_json::to_value(Response::ok(4, json!({"targetId": "t1"}))).unwrap();
		assert_eq!(ok, json!({"id": 4, "result": {"targetId": "t1"}}));

		let err = serde_json::to_value(Response::err(5, "Session not found")).unwrap();
		assert_eq!(err, json!({"id": 5, "error": "Session not found"}));
	}

	#[test]
	fn event_frame_shape() {
		let frame = EventFrame::new(ForwardedEvent {
			session_id: Some("session-1".to_string()),
			method: "Page.loadEventFired".to_string(),
			params: json!({"timestamp": 1.0}),
		});
		let value = serde_json::to_value(&frame).unwrap();
		assert_eq!(
			value,
			json!({
				"method": "forward-event",
				"params": {
					"sessionId": "session-1",
					"method": "Page.loadEventFired",
					"params": {"timestamp": 1.0},
				},
			})
		);
	}

	#[test]
	fn target_info_fills_defaults() {
		let info: TargetInfo = serde_json::from_value(json!({"targetId": "tab-12"})).unwrap();
		assert_eq!(info.target_id, "tab-12");
		assert_eq!(info.kind, "page");
		assert!(!info.attached);
	}
}
