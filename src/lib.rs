//! hearthd - Hearth Communication Hub
//!
//! A multi-tenant realtime communication server: text channels, voice rooms
//! with WebRTC signaling relay, and live-video channels authorized for an
//! external RTMP server, all behind one WebSocket protocol.
//!
//! The binary in `main.rs` wires these modules together; they are exposed
//! as a library so the integration suites can drive a full in-process hub.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod handlers;
pub mod http;
pub mod metrics;
pub mod network;
pub mod security;
pub mod state;
pub mod util;
