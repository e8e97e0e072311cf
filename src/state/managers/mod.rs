//! Domain managers - the registries that exclusively own server state.

pub mod account;
pub mod channel;
pub mod history;
pub mod lifecycle;
pub mod presence;
pub mod security;
pub mod stats;

pub use account::AccountManager;
pub use channel::ChannelManager;
pub use history::HistoryManager;
pub use lifecycle::{DropReason, LifecycleManager};
pub use presence::PresenceManager;
pub use security::SecurityManager;
pub use stats::StatsManager;
