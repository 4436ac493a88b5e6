//! HTTP handlers: presence lookup, per-user notify, and health.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use validator::Validate;

use crate::auth::JwtSecret;
use crate::error::AppError;
use crate::middleware::auth::AppKey;
use crate::models::event::{NotifyRequest, WsEvent};
use crate::models::presence::PresenceRecord;
use crate::services::PresenceService;

/// Shared application state for HTTP and WS handlers.
#[derive(Clone)]
pub struct AppState {
    pub app_key: String,
    pub require_auth: bool,
    pub presence_service: PresenceService,
    pub jwt_secret: JwtSecret,
}

impl AppState {
    pub fn jwt_secret(&self) -> &JwtSecret {
        &self.jwt_secret
    }
    pub fn presence_service(&self) -> &PresenceService {
        &self.presence_service
    }
}

/// GET /api/presence/:user_id
pub async fn presence(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PresenceRecord>, AppError> {
    let record = state.presence_service().presence(&user_id).await?;
    Ok(Json(record))
}

/// POST /api/notify — push an event into one user's room (e.g. order status from the REST API).
/// Requires header: x-app-key: <app_key>.
pub async fn notify(
    State(state): State<AppState>,
    _key: AppKey,
    Json(body): Json<NotifyRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    body.validate()?;
    let event = WsEvent::new(body.event.clone(), body.data);
    let count = state
        .presence_service()
        .notify(&body.user_id, &event)
        .await?;

    Ok(Json(json!({
        "ok": true,
        "userId": body.user_id,
        "event": body.event,
        "receivers": count
    })))
}

/// GET /health — liveness probe.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "courier-hub" })),
    )
}
