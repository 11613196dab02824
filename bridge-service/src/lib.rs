pub mod config;
pub mod db;
pub mod handlers;
pub mod mcp;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::BridgeConfig;
use crate::db::Database;
use crate::mcp::{McpServer, SessionRegistry};
use crate::middleware::{mcp_guard_middleware, McpGuard};
use crate::services::OAuthService;
use service_core::axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::rate_limit::StringKeyedRateLimiter;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Clone)]
pub struct AppState {
    pub config: BridgeConfig,
    pub db: Arc<Database>,
    pub oauth: OAuthService,
    pub mcp: McpServer,
    pub sessions: SessionRegistry,
    pub mcp_rate_limiter: StringKeyedRateLimiter,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let guard = McpGuard {
        oauth: state.oauth.clone(),
        limiter: state.mcp_rate_limiter.clone(),
    };

    let mcp_routes = Router::new()
        .route(
            "/mcp",
            post(handlers::mcp::post)
                .get(handlers::mcp::get)
                .delete(handlers::mcp::delete),
        )
        .route_layer(from_fn_with_state(guard, mcp_guard_middleware));

    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/.well-known/oauth-authorization-server",
            get(handlers::well_known::oauth_metadata),
        )
        .route(
            "/oauth/authorize",
            get(handlers::oauth::authorize_page).post(handlers::oauth::authorize_submit),
        )
        .route("/oauth/token", post(handlers::oauth::token))
        .merge(mcp_routes)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            },
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    Ok(app)
}
