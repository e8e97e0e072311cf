//! Shared server state.
//!
//! Entity types live at this level; the registries that own them live in
//! [`managers`]. [`hub::Hub`] is the central container wiring them together.

pub mod account;
pub mod channel;
pub mod hub;
pub mod managers;
pub mod message;
pub mod persistence;
pub mod session;
pub mod user;

pub use account::{Account, AccountStatus};
pub use channel::{Channel, ChannelGroup, Permissions, ScreenshareSession, StreamSession, VoiceParticipant};
pub use hub::{Hub, HubParams};
pub use message::ChatMessage;
pub use session::Session;
pub use user::{Ban, Capability, User};
