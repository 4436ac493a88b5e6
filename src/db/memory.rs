//! In-process user directory for local development and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::UserDirectory;
use crate::error::AppResult;
use crate::models::presence::{GeoPoint, PresenceRecord};

/// Keeps presence records in a map. Users must be seeded; the hub never creates them.
#[derive(Clone, Default)]
pub struct MemoryUserDirectory {
    users: Arc<RwLock<HashMap<String, PresenceRecord>>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let users = ids
            .into_iter()
            .map(|id| {
                let id = id.into();
                (id.clone(), PresenceRecord::offline(id))
            })
            .collect();
        Self {
            users: Arc::new(RwLock::new(users)),
        }
    }

    pub async fn insert_user(&self, user_id: &str) {
        self.users
            .write()
            .await
            .entry(user_id.to_string())
            .or_insert_with(|| PresenceRecord::offline(user_id));
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn bind_connection(
        &self,
        user_id: &str,
        socket_id: &str,
    ) -> AppResult<Option<PresenceRecord>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(user_id).map(|r| {
            r.connection_handle = Some(socket_id.to_string());
            r.is_online = true;
            r.clone()
        }))
    }

    async fn update_location(
        &self,
        user_id: &str,
        socket_id: &str,
        point: GeoPoint,
    ) -> AppResult<Option<PresenceRecord>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(user_id).map(|r| {
            r.location = Some(point);
            r.connection_handle = Some(socket_id.to_string());
            r.is_online = true;
            r.clone()
        }))
    }

    async fn clear_connection_if_current(
        &self,
        user_id: &str,
        socket_id: &str,
    ) -> AppResult<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(user_id) {
            Some(r) if r.connection_handle.as_deref() == Some(socket_id) => {
                r.connection_handle = None;
                r.is_online = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn presence(&self, user_id: &str) -> AppResult<Option<PresenceRecord>> {
        Ok(self.users.read().await.get(user_id).cloned())
    }
}
