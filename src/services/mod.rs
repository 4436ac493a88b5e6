//! Hub logic: topic fan-out, connection registry, and presence.

pub mod broadcast;
pub mod presence;
pub mod registry;

pub use broadcast::BroadcastService;
pub use presence::PresenceService;
pub use registry::ConnectionRegistry;
