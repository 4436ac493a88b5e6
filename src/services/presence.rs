//! Presence and location hub: identity binding, location updates, disconnect cleanup.

use crate::config::BroadcastScope;
use crate::db::UserDirectory;
use crate::error::{AppError, AppResult};
use crate::models::event::{DeliveryLocation, LocationUpdate, WsEvent};
use crate::models::presence::PresenceRecord;
use crate::models::topic::Topic;
use crate::services::broadcast::BroadcastService;
use crate::services::registry::ConnectionRegistry;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Hub operations shared by every connection on this process.
#[derive(Clone)]
pub struct PresenceService {
    directory: Arc<dyn UserDirectory>,
    registry: ConnectionRegistry,
    broadcast: BroadcastService,
    scope: BroadcastScope,
}

impl PresenceService {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        broadcast: BroadcastService,
        scope: BroadcastScope,
    ) -> Self {
        Self {
            directory,
            registry: ConnectionRegistry::new(),
            broadcast,
            scope,
        }
    }

    pub fn scope(&self) -> BroadcastScope {
        self.scope
    }

    pub fn broadcast(&self) -> &BroadcastService {
        &self.broadcast
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Topic that carries a delivery agent's location under the configured scope.
    pub fn location_topic(&self, user_id: &str) -> Topic {
        match self.scope {
            BroadcastScope::Global => Topic::Deliveries,
            BroadcastScope::Watchers => Topic::Delivery(user_id.to_string()),
        }
    }

    /// Bind the connection to `user_id` and mark the user online.
    /// The connection stays unbound when the store fails or the user does not exist.
    #[instrument(skip(self))]
    pub async fn bind_identity(&self, socket_id: &str, user_id: &str) -> AppResult<PresenceRecord> {
        let record = self
            .directory
            .bind_connection(user_id, socket_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))?;
        self.track(socket_id, user_id).await;
        info!(socket_id = %socket_id, user_id = %user_id, "identity bound");
        Ok(record)
    }

    /// Persist the coordinate and fan it out. `None` when no user record matched,
    /// in which case nothing is broadcast. Once the write matched, a failed publish
    /// is logged and the update still counts as applied.
    #[instrument(skip(self, update), fields(user_id = %update.user_id))]
    pub async fn update_location(
        &self,
        socket_id: &str,
        update: &LocationUpdate,
    ) -> AppResult<Option<DeliveryLocation>> {
        let matched = self
            .directory
            .update_location(&update.user_id, socket_id, update.point)
            .await?;
        if matched.is_none() {
            debug!(socket_id = %socket_id, "location update matched no user");
            return Ok(None);
        }
        self.track(socket_id, &update.user_id).await;

        let location = DeliveryLocation {
            delivery_boy_id: update.user_id.clone(),
            latitude: update.point.latitude,
            longitude: update.point.longitude,
        };
        let event = WsEvent::delivery_location(&location)?;
        if let Err(e) = self
            .broadcast
            .publish(&self.location_topic(&update.user_id), &event)
            .await
        {
            warn!(socket_id = %socket_id, error = %e, "location stored but not broadcast");
        }
        Ok(Some(location))
    }

    /// Mark every user bound to this connection offline, except those a newer
    /// connection has taken over. Returns how many records were cleared.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, socket_id: &str) -> AppResult<usize> {
        let users = self.registry.remove(socket_id).await;
        let mut cleared = 0;
        let mut failure = None;
        for user_id in users {
            match self
                .directory
                .clear_connection_if_current(&user_id, socket_id)
                .await
            {
                Ok(true) => {
                    cleared += 1;
                    info!(socket_id = %socket_id, user_id = %user_id, "user offline");
                }
                Ok(false) => {
                    debug!(socket_id = %socket_id, user_id = %user_id, "handle already superseded")
                }
                Err(e) => {
                    warn!(socket_id = %socket_id, user_id = %user_id, error = %e, "offline write failed");
                    failure = Some(e);
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(cleared),
        }
    }

    pub async fn presence(&self, user_id: &str) -> AppResult<PresenceRecord> {
        self.directory
            .presence(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
    }

    /// Push an event into a user's notification room.
    pub async fn notify(&self, user_id: &str, event: &WsEvent) -> AppResult<usize> {
        self.broadcast.publish(&Topic::User(user_id.to_string()), event).await
    }

    async fn track(&self, socket_id: &str, user_id: &str) {
        if self.registry.bind(socket_id, user_id).await {
            let live = self.registry.len().await;
            debug!(socket_id = %socket_id, user_id = %user_id, live = live, "connection tracked");
        }
    }
}
