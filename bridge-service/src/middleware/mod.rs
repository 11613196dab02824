//! MCP endpoint middleware: bearer validation and the per-identity throttle.
//!
//! Every request to `/mcp` passes through here. The throttle is keyed by the
//! authenticated user id so one noisy connector cannot starve the rest; a
//! request that fails authentication is charged against its source IP
//! before the 401 goes out.

use crate::services::OAuthService;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::clock::{Clock, DefaultClock};
use service_core::error::AppError;
use service_core::middleware::rate_limit::StringKeyedRateLimiter;

#[derive(Clone)]
pub struct McpGuard {
    pub oauth: OAuthService,
    pub limiter: StringKeyedRateLimiter,
}

/// Authenticate and throttle. On success the resolved user is attached to
/// the request extensions for the handler.
pub async fn mcp_guard_middleware(
    State(guard): State<McpGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    let user = match bearer {
        Some(token) => guard
            .oauth
            .validate_access_token(&token)
            .await
            .map_err(AppError::from)?,
        None => None,
    };

    let key = match &user {
        Some(user) => format!("user:{}", user.id),
        None => format!("ip:{}", source_ip(&request)),
    };

    if let Err(negative) = guard.limiter.check_key(&key) {
        let wait_time = negative.wait_time_from(DefaultClock::default().now());
        return Err(AppError::TooManyRequests(
            "Too many requests. Please try again in a moment.".to_string(),
            Some(wait_time.as_secs()),
        ));
    }

    let Some(user) = user else {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Missing or invalid bearer token"
        )));
    };

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

fn source_ip(request: &Request) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| {
            request
                .extensions()
                .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
                .map(|axum::extract::ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}
