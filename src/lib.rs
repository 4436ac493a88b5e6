//! Real-time presence and delivery-location hub for a food-delivery marketplace.
//!
//! Realtime clients bind their connection to a user, delivery agents stream
//! coordinates, and the hub persists the latest position and fans it out to
//! observers over topics that can be relayed between worker processes via Redis.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;

pub use config::Config;
pub use error::AppError;
pub use handlers::http::AppState;
pub use services::broadcast::BroadcastService;
pub use services::presence::PresenceService;

use axum::routing::{get, post};
use handlers::http;
use tower_http::trace::TraceLayer;

/// Build the router (ws, presence, notify, health). Used by main and by integration tests.
pub fn create_app(state: AppState) -> axum::Router {
    let api_routes = axum::Router::new()
        .route("/presence/:user_id", get(http::presence))
        .route("/notify", post(http::notify));

    let router = axum::Router::new()
        .route("/ws", get(handlers::ws_handler))
        .route("/health", get(http::health))
        .nest("/api", api_routes)
        .with_state(state);

    middleware::with_security_headers(router).layer(TraceLayer::new_for_http())
}
