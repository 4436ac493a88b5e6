//! Connection → users registry local to this process.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Remembers which users each live connection has bound, so disconnect cleanup
/// does not need a reverse lookup in the user directory. A connection may speak
/// for several users; each of them stays online until the connection closes.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    bindings: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `socket_id` speaks for `user_id`. Returns false if it already did.
    pub async fn bind(&self, socket_id: &str, user_id: &str) -> bool {
        self.bindings
            .write()
            .await
            .entry(socket_id.to_string())
            .or_default()
            .insert(user_id.to_string())
    }

    pub async fn is_bound(&self, socket_id: &str, user_id: &str) -> bool {
        self.bindings
            .read()
            .await
            .get(socket_id)
            .is_some_and(|users| users.contains(user_id))
    }

    /// Forget the connection, returning every user it was bound to.
    pub async fn remove(&self, socket_id: &str) -> Vec<String> {
        self.bindings
            .write()
            .await
            .remove(socket_id)
            .map(|users| users.into_iter().collect())
            .unwrap_or_default()
    }

    /// Live connections with at least one bound user.
    pub async fn len(&self) -> usize {
        self.bindings.read().await.len()
    }
}
