//! ByteBlog - a small multi-user blog

use anyhow::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use byteblog::{
    api,
    cache::create_cache,
    config::Config,
    db::{self, migrations::run_migrations},
    services::{LoginRateLimiter, UserService},
};

/// Interval between rate limiter prunes
const RATE_LIMIT_CLEANUP_SECS: u64 = 300;
/// Interval between expired-session sweeps
const SESSION_CLEANUP_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "byteblog=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ByteBlog...");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.yml"));
    let config = Config::load_with_env(&config_path)?;
    config.validate()?;
    tracing::info!("Configuration loaded from {}", config_path.display());

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    let applied = run_migrations(&pool).await?;
    tracing::info!("Database migrations completed ({} applied)", applied);

    // Initialize cache
    let cache = create_cache(&config.cache);
    tracing::info!("Cache initialized");

    let state = api::build_state(pool, &config, cache)?;

    spawn_rate_limit_cleanup(state.rate_limiter.clone());
    spawn_session_cleanup(state.user_service.clone());

    // Build router
    let app = api::build_router(state, &config.server.cors_origin)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn spawn_rate_limit_cleanup(limiter: Arc<LoginRateLimiter>) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(RATE_LIMIT_CLEANUP_SECS));
        loop {
            interval.tick().await;
            limiter.cleanup().await;
        }
    });
}

fn spawn_session_cleanup(user_service: Arc<UserService>) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(SESSION_CLEANUP_SECS));
        loop {
            interval.tick().await;
            match user_service.cleanup_expired_sessions().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Removed {} expired session(s)", n),
                Err(e) => tracing::warn!("Session cleanup failed: {}", e),
            }
        }
    });
}
