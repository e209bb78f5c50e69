use thiserror::Error;

use crate::adapter::TabId;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy of the bridge.
///
/// Everything here is converted to a response-with-error frame at the
/// [`CommandRouter`](crate::CommandRouter) boundary; nothing is fatal to the
/// process. `SessionNotFound` is the common path for commands arriving after
/// a disconnect invalidated the registry and must stay distinguishable from
/// native command failures.
#[derive(Debug, Error)]
pub enum Error {
	#[error("Session not found: {0}")]
	SessionNotFound(String),

	#[error("Target not found: {0}")]
	TargetNotFound(String),

	#[error("Attach already in progress for tab {0}")]
	AlreadyAttaching(TabId),

	#[error("Could not attach to tab {tab}: {reason}")]
	AttachFailed { tab: TabId, reason: String },

	/// Native debugger rejected a forwarded command; message verbatim.
	#[error("{0}")]
	NativeCommand(String),

	#[error("Invalid parameters: {0}")]
	InvalidParams(String),

	/// Tab lifecycle host call failed.
	#[error("Host call failed: {0}")]
	Host(String),

	#[error("transport error: {0}")]
	Transport(#[from] tokio_tungstenite::tungstenite::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}
