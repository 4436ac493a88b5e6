//! Event and message models for the realtime socket and the HTTP API.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::presence::GeoPoint;

pub const EVENT_CONNECTION_ESTABLISHED: &str = "connectionEstablished";
pub const EVENT_DELIVERY_LOCATION: &str = "updateDeliveryLocation";
pub const EVENT_PONG: &str = "pong";
pub const EVENT_ERROR: &str = "error";

/// Frame sent over WebSocket to clients: `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEvent {
    pub event: String,
    pub data: serde_json::Value,
}

impl WsEvent {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn connection_established(socket_id: &str) -> Self {
        Self::new(
            EVENT_CONNECTION_ESTABLISHED,
            serde_json::json!({ "socketId": socket_id }),
        )
    }

    pub fn delivery_location(location: &DeliveryLocation) -> AppResult<Self> {
        Ok(Self::new(
            EVENT_DELIVERY_LOCATION,
            serde_json::to_value(location)?,
        ))
    }

    pub fn pong() -> Self {
        Self::new(EVENT_PONG, serde_json::json!({}))
    }

    /// Structured rejection of a client message.
    pub fn error(err: &AppError) -> Self {
        Self::new(
            EVENT_ERROR,
            serde_json::json!({ "message": err.to_string(), "code": err.ws_code() }),
        )
    }

    pub fn to_text(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Payload of `updateDeliveryLocation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLocation {
    pub delivery_boy_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Message sent by a realtime client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    Identity(IdentityPayload),
    UpdateLocation(LocationPayload),
    WatchDelivery(WatchPayload),
    UnwatchDelivery(WatchPayload),
    Ping,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IdentityPayload {
    /// Missing ids deserialize as empty and fail validation instead of failing the parse.
    #[serde(default)]
    #[validate(length(min = 1, max = 128, message = "userId is required"))]
    pub user_id: String,
}

impl IdentityPayload {
    pub fn into_user_id(self) -> AppResult<String> {
        self.validate()?;
        Ok(self.user_id)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LocationPayload {
    #[serde(default)]
    #[validate(length(min = 1, max = 128, message = "userId is required"))]
    pub user_id: String,
    #[serde(default)]
    #[validate(required, range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[serde(default)]
    #[validate(required, range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
}

/// A validated coordinate update.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationUpdate {
    pub user_id: String,
    pub point: GeoPoint,
}

impl LocationPayload {
    pub fn into_update(self) -> AppResult<LocationUpdate> {
        self.validate()?;
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Ok(LocationUpdate {
                user_id: self.user_id,
                point: GeoPoint::new(latitude, longitude),
            }),
            _ => Err(AppError::Validation(
                "latitude and longitude are required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WatchPayload {
    #[serde(default)]
    #[validate(length(min = 1, max = 128, message = "deliveryBoyId is required"))]
    pub delivery_boy_id: String,
}

impl WatchPayload {
    pub fn into_delivery_id(self) -> AppResult<String> {
        self.validate()?;
        Ok(self.delivery_boy_id)
    }
}

/// Body of `POST /api/notify`: push an event into one user's room.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
    #[validate(length(min = 1, max = 64))]
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}
