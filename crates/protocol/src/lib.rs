//! Wire types for the glider relay protocol.
//!
//! The relay and the bridge exchange single JSON objects over a persistent
//! WebSocket. Every frame is one of:
//!
//! 1. A request from the relay: `{id, method, params}`
//! 2. A response from the bridge: `{id, result}` or `{id, error}`
//! 3. An event from the bridge: `{method: "forward-event", params: {...}}`
//! 4. A control frame in either direction: `{method: "ping"}` / `{method: "pong"}`
//!
//! This crate defines the serde types for those frames and nothing else;
//! all transport and dispatch logic lives in `glider-bridge`.

mod wire;

pub use wire::{
	Control, EventFrame, ForwardCommand, ForwardedEvent, Inbound, Request, Response, TargetInfo,
	method,
};
