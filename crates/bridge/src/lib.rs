//! Session multiplexer and protocol relay for driving a browser's native
//! debugging surface from a remote controller.
//!
//! The bridge sits between two asynchronous event sources: a persistent
//! WebSocket to the relay endpoint, and the host's native debugger. It
//! multiplexes the single socket against many independently addressable
//! debugging sessions (one per tab), forwarding commands inbound and events
//! outbound while keeping session bookkeeping consistent under churn.
//!
//! Component layout, leaf to root:
//!
//! - [`adapter`] — capability traits for the two external collaborators:
//!   the native debugger ([`DebuggerAdapter`]) and the tab lifecycle source
//!   ([`TabHost`]).
//! - [`registry`] — [`SessionRegistry`], the single source of truth for
//!   which tabs are attached and under which relay session id.
//! - [`router`] — [`CommandRouter`], translating inbound requests into
//!   native debugging calls.
//! - [`relay`] — [`ProtocolRelay`], owning the socket lifecycle
//!   (connect, reconnect with delay, heartbeat) and frame dispatch.
//! - [`policy`] — [`AttachmentPolicy`], keeping at least one eligible tab
//!   attached whenever the transport is connected.
//! - [`Bridge`] ties the pieces together and drives the event pumps.
//!
//! Wire types live in the `glider-protocol` crate.

use std::time::Duration;

pub mod adapter;
mod bridge;
pub mod error;
pub mod policy;
pub mod registry;
pub mod relay;
pub mod router;
pub mod testing;

pub use adapter::{
	DebuggerAdapter, DebuggerEvent, TabDescriptor, TabEvent, TabHost, TabId, WindowId,
};
pub use bridge::Bridge;
pub use error::{Error, Result};
pub use policy::AttachmentPolicy;
pub use registry::{SessionRegistry, TargetHandle};
pub use relay::{ConnectionState, ProtocolRelay};
pub use router::CommandRouter;

/// Default relay endpoint, matching the relay server's fixed address.
pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:19988/extension";

/// Native debugging protocol version requested on attach.
pub const DEFAULT_PROTOCOL_VERSION: &str = "1.3";

/// Tunables for one [`Bridge`] instance.
///
/// All timing knobs have conservative defaults; construct with
/// `BridgeConfig { relay_url: ..., ..Default::default() }`.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
	/// WebSocket address of the relay endpoint.
	pub relay_url: String,
	/// Debugging protocol version passed to [`DebuggerAdapter::attach`].
	pub protocol_version: String,
	/// Delay between a disconnect and the next connection attempt.
	pub reconnect_delay: Duration,
	/// Interval between outbound `ping` liveness frames while connected.
	pub heartbeat_interval: Duration,
	/// Interval of the zero-session attachment scan while connected.
	pub attach_scan_interval: Duration,
	/// Grace period after the transport opens before the first
	/// auto-attachment pass runs.
	pub connect_settle: Duration,
	/// Also try to attach on tab creation/update/activation whenever no
	/// session exists. Off by default; the conservative policy only
	/// guarantees "at least one attachment".
	pub eager_attach: bool,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self {
			relay_url: DEFAULT_RELAY_URL.to_string(),
			protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
			reconnect_delay: Duration::from_secs(3),
			heartbeat_interval: Duration::from_secs(30),
			attach_scan_interval: Duration::from_secs(5),
			connect_settle: Duration::from_millis(500),
			eager_attach: false,
		}
	}
}

impl BridgeConfig {
	/// Defaults with runtime overrides from the environment.
	///
	/// `GLIDER_RELAY_URL` replaces the relay endpoint when set.
	pub fn from_env() -> Self {
		let mut config = Self::default();
		if let Ok(url) = std::env::var("GLIDER_RELAY_URL") {
			config.relay_url = url;
		}
		config
	}
}
