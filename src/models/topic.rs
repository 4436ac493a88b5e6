//! Fan-out topics and their naming conventions.

use std::fmt;

/// A named fan-out point. Connections subscribe to topics; the hub publishes to them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every active order tracker.
    Deliveries,
    /// Watchers of one delivery agent.
    Delivery(String),
    /// Per-user notification room.
    User(String),
}

impl Topic {
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Deliveries => f.write_str("deliveries"),
            Topic::Delivery(id) => write!(f, "delivery:{}", id),
            Topic::User(id) => write!(f, "user:{}", id),
        }
    }
}
