use bridge_service::{
    build_router,
    config::BridgeConfig,
    db::Database,
    mcp::{McpServer, SessionRegistry},
    services::{AccessResolver, NotionClient, OAuthService},
    AppState,
};
use service_core::middleware::rate_limit::create_string_keyed_rate_limiter;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = BridgeConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting bridge service"
    );

    let db = Arc::new(Database::connect(&config.database.url).await?);
    db.run_migrations().await?;
    tracing::info!("Database initialized");

    let notion = Arc::new(NotionClient::new(config.notion.token.clone()));
    let resolver = AccessResolver::new(db.clone(), notion.clone());
    let oauth = OAuthService::new(
        db.clone(),
        config.oauth.client_id.clone(),
        config.oauth.client_secret.clone(),
    );
    let mcp = McpServer::new(db.clone(), notion, resolver);
    let sessions = SessionRegistry::new();

    let mcp_rate_limiter =
        create_string_keyed_rate_limiter(config.rate_limit.mcp_requests_per_minute, 60);
    tracing::info!(
        per_minute = config.rate_limit.mcp_requests_per_minute,
        "MCP rate limiter initialized"
    );

    let state = AppState {
        config: config.clone(),
        db,
        oauth,
        mcp,
        sessions: sessions.clone(),
        mcp_rate_limiter,
    };

    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Drop every live session so attached streams end before exit.
    sessions.close_all();

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
