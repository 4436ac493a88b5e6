//! Application configuration loaded from environment.

use std::net::SocketAddr;
use std::str::FromStr;

/// Who receives `updateDeliveryLocation` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadcastScope {
    /// Every connection joins the shared `deliveries` topic on connect.
    #[default]
    Global,
    /// Connections only receive agents they asked for with `watchDelivery`.
    Watchers,
}

impl FromStr for BroadcastScope {
    type Err = ConfigLoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(BroadcastScope::Global),
            "watchers" => Ok(BroadcastScope::Watchers),
            other => Err(ConfigLoadError::InvalidBroadcastScope(other.to_string())),
        }
    }
}

/// Application configuration loaded from `.env` and environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g. `0.0.0.0:3000`).
    pub server_addr: SocketAddr,
    /// Redis connection URL. Unset means broadcasts stay inside this process.
    pub redis_url: Option<String>,
    /// PostgreSQL connection URL for the user directory. Unset means an in-memory directory.
    pub database_url: Option<String>,
    /// Pool size for the user directory.
    pub db_max_connections: u32,
    /// Key required in `x-app-key` for `POST /api/notify`.
    pub app_key: String,
    /// JWT signing secret shared with the REST API that issues tokens.
    pub jwt_secret: String,
    /// Reject WebSocket upgrades that carry no valid token.
    pub require_auth: bool,
    pub broadcast_scope: BroadcastScope,
    /// Log level: `error`, `warn`, `info`, `debug`, `trace`.
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment. Call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let server_addr = std::env::var("SERVER_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let server_addr: SocketAddr = server_addr
            .parse()
            .map_err(|_| ConfigLoadError::InvalidServerAddr)?;

        let redis_url = non_empty_var("REDIS_URL");
        let database_url = non_empty_var("DATABASE_URL");
        let db_max_connections = match non_empty_var("DB_MAX_CONNECTIONS") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigLoadError::InvalidNumber("DB_MAX_CONNECTIONS"))?,
            None => 20,
        };
        let app_key = std::env::var("APP_KEY").unwrap_or_else(|_| "courier_key".to_string());
        let jwt_secret = std::env::var("JWT_SECRET")
            .unwrap_or_else(|_| "courier_jwt_secret_change_in_production_32chars".to_string());
        let require_auth = parse_bool(non_empty_var("REQUIRE_AUTH").as_deref())
            .ok_or(ConfigLoadError::InvalidBool("REQUIRE_AUTH"))?;
        let broadcast_scope = match non_empty_var("BROADCAST_SCOPE") {
            Some(v) => v.parse()?,
            None => BroadcastScope::default(),
        };
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            server_addr,
            redis_url,
            database_url,
            db_max_connections,
            app_key,
            jwt_secret,
            require_auth,
            broadcast_scope,
            log_level,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(raw: Option<&str>) -> Option<bool> {
    match raw.map(|s| s.trim().to_ascii_lowercase()) {
        None => Some(false),
        Some(s) => match s.as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        },
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Invalid SERVER_ADDR")]
    InvalidServerAddr,
    #[error("Invalid BROADCAST_SCOPE `{0}` (expected `global` or `watchers`)")]
    InvalidBroadcastScope(String),
    #[error("Invalid number in {0}")]
    InvalidNumber(&'static str),
    #[error("Invalid boolean in {0}")]
    InvalidBool(&'static str),
}
