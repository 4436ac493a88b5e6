//! Entry point: load config, wire dependencies, and run the server.

use courier_hub::auth::JwtSecret;
use courier_hub::config::Config;
use courier_hub::db::{self, MemoryUserDirectory, PgUserDirectory, UserDirectory};
use courier_hub::repositories::RedisRepository;
use courier_hub::services::{BroadcastService, PresenceService};
use courier_hub::{create_app, AppState};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("config: {}", e))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let directory: Arc<dyn UserDirectory> = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url, config.db_max_connections).await?;
            tracing::info!("user directory: postgres");
            Arc::new(PgUserDirectory::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using an empty in-memory user directory");
            Arc::new(MemoryUserDirectory::new())
        }
    };

    let broadcast = match &config.redis_url {
        Some(url) => {
            tracing::info!("broadcast relay: redis");
            BroadcastService::with_redis(RedisRepository::connect(url).await?)
        }
        None => {
            tracing::warn!("REDIS_URL not set; broadcasts only reach this process");
            BroadcastService::local()
        }
    };

    let presence_service = PresenceService::new(directory, broadcast, config.broadcast_scope);

    let state = AppState {
        app_key: config.app_key.clone(),
        require_auth: config.require_auth,
        presence_service,
        jwt_secret: JwtSecret::new(config.jwt_secret.clone()),
    };

    let app = create_app(state).layer(CorsLayer::permissive());

    tracing::info!(addr = %config.server_addr, scope = ?config.broadcast_scope, "listening");
    let listener = tokio::net::TcpListener::bind(config.server_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
