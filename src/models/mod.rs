//! Data models for realtime frames, topics, and presence.

pub mod event;
pub mod presence;
pub mod topic;

pub use event::*;
pub use presence::*;
pub use topic::*;
