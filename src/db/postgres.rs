//! PostgreSQL-backed user directory (`users` table, presence columns only).

use async_trait::async_trait;
use sqlx::FromRow;

use super::{DbPool, UserDirectory};
use crate::error::AppResult;
use crate::models::presence::{GeoPoint, PresenceRecord};

#[derive(Debug, FromRow)]
struct PresenceRow {
    id: String,
    socket_id: Option<String>,
    is_online: bool,
    location_lng: Option<f64>,
    location_lat: Option<f64>,
}

impl From<PresenceRow> for PresenceRecord {
    fn from(row: PresenceRow) -> Self {
        let location = match (row.location_lng, row.location_lat) {
            (Some(lng), Some(lat)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        };
        PresenceRecord {
            user_id: row.id,
            connection_handle: row.socket_id,
            is_online: row.is_online,
            location,
        }
    }
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: DbPool,
}

impl PgUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn bind_connection(
        &self,
        user_id: &str,
        socket_id: &str,
    ) -> AppResult<Option<PresenceRecord>> {
        let row = sqlx::query_as::<_, PresenceRow>(
            r#"
            UPDATE users
            SET socket_id = $2, is_online = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING id, socket_id, is_online, location_lng, location_lat
            "#,
        )
        .bind(user_id)
        .bind(socket_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn update_location(
        &self,
        user_id: &str,
        socket_id: &str,
        point: GeoPoint,
    ) -> AppResult<Option<PresenceRecord>> {
        let row = sqlx::query_as::<_, PresenceRow>(
            r#"
            UPDATE users
            SET location_lng = $3, location_lat = $4, socket_id = $2, is_online = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING id, socket_id, is_online, location_lng, location_lat
            "#,
        )
        .bind(user_id)
        .bind(socket_id)
        .bind(point.longitude)
        .bind(point.latitude)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn clear_connection_if_current(
        &self,
        user_id: &str,
        socket_id: &str,
    ) -> AppResult<bool> {
        let r = sqlx::query(
            "UPDATE users SET socket_id = NULL, is_online = FALSE, updated_at = NOW() WHERE id = $1 AND socket_id = $2",
        )
        .bind(user_id)
        .bind(socket_id)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() > 0)
    }

    async fn presence(&self, user_id: &str) -> AppResult<Option<PresenceRecord>> {
        let row = sqlx::query_as::<_, PresenceRow>(
            "SELECT id, socket_id, is_online, location_lng, location_lat FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }
}
