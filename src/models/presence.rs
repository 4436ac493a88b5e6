//! Presence record: the slice of a user the hub reads and writes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A position stored as GeoJSON (`[longitude, latitude]`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "GeoJsonPoint", try_from = "GeoJsonPoint")]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Coordinates in GeoJSON order.
    pub fn coordinates(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeoJsonPoint {
    #[serde(rename = "type")]
    kind: String,
    coordinates: [f64; 2],
}

impl From<GeoPoint> for GeoJsonPoint {
    fn from(p: GeoPoint) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: p.coordinates(),
        }
    }
}

impl TryFrom<GeoJsonPoint> for GeoPoint {
    type Error = String;

    fn try_from(g: GeoJsonPoint) -> Result<Self, Self::Error> {
        if g.kind != "Point" {
            return Err(format!("unsupported geometry type `{}`", g.kind));
        }
        let [longitude, latitude] = g.coordinates;
        Ok(Self {
            longitude,
            latitude,
        })
    }
}

/// Presence fields of a user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: String,
    /// Socket id of the connection currently bound to this user.
    pub connection_handle: Option<String>,
    pub is_online: bool,
    pub location: Option<GeoPoint>,
}

impl PresenceRecord {
    /// A record that has never been bound: offline, no handle, no location.
    pub fn offline(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            connection_handle: None,
            is_online: false,
            location: None,
        }
    }
}

/// Generate a unique socket/connection id. The pid prefix keeps ids distinct across workers.
pub fn generate_socket_id() -> String {
    format!("{}.{}", std::process::id(), Uuid::new_v4().as_simple())
}
