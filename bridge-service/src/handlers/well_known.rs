//! RFC 8414 authorization server metadata.

use crate::AppState;
use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde_json::json;
use service_core::error::AppError;

pub async fn oauth_metadata(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let base = &state.config.base_url;
    let metadata = json!({
        "issuer": base,
        "authorization_endpoint": format!("{base}/oauth/authorize"),
        "token_endpoint": format!("{base}/oauth/token"),
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "token_endpoint_auth_methods_supported": ["client_secret_post"],
        "code_challenge_methods_supported": ["S256"],
    });

    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        Json(metadata),
    ))
}
