//! # hearth-proto
//!
//! Wire protocol for the hearthd communication hub.
//!
//! Every message on the persistent client channel is a single JSON frame:
//!
//! ```json
//! {"event": "chat", "data": {"text": "hello"}}
//! ```
//!
//! This crate owns both directions of the alphabet:
//!
//! - [`Command`]: the inbound commands a client may issue, parsed from a
//!   frame's event name and payload.
//! - [`event`]: the outbound event names the server emits, with their typed
//!   payloads in [`types`].
//! - [`ErrorCode`]: the error taxonomy shared by the message channel and the
//!   HTTP surface.
//!
//! The server never sends a frame whose `data` fails to round-trip through
//! the payload types here; clients in other languages can treat this crate's
//! serde output as the schema.

#![deny(clippy::all)]

pub mod command;
pub mod error;
pub mod event;
pub mod frame;
pub mod types;

pub use command::Command;
pub use error::{ErrorCode, ProtocolError};
pub use frame::Frame;
pub use types::{ChannelKind, Role};
