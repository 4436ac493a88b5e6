//! User directory trait: the point writes the hub performs against user records.

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::presence::{GeoPoint, PresenceRecord};

/// Point writes the hub performs against user records.
///
/// Implementations never create or delete users: every write targets an
/// existing record by primary key and returns `None`/`false` when nothing matched.
/// Each call must be a single atomic write; the hub adds no locking on top.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Set `connectionHandle = socket_id` and mark the user online.
    async fn bind_connection(
        &self,
        user_id: &str,
        socket_id: &str,
    ) -> AppResult<Option<PresenceRecord>>;

    /// Store the latest position, mark online and refresh the handle to `socket_id`.
    async fn update_location(
        &self,
        user_id: &str,
        socket_id: &str,
        point: GeoPoint,
    ) -> AppResult<Option<PresenceRecord>>;

    /// Mark the user offline and clear the handle, but only while the stored
    /// handle is still `socket_id`. Returns whether the record changed.
    async fn clear_connection_if_current(&self, user_id: &str, socket_id: &str)
        -> AppResult<bool>;

    async fn presence(&self, user_id: &str) -> AppResult<Option<PresenceRecord>>;
}
