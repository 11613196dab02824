//! OAuth authorization and token endpoints.
//!
//! `/oauth/authorize` serves a minimal login form and redirects back to the
//! connector with a single-use code. `/oauth/token` speaks the standard
//! OAuth error vocabulary: `invalid_client` is a 401, everything else about
//! the grant is a 400 with an `error` field.

use crate::services::ServiceError;
use crate::AppState;
use axum::{
    extract::{Form, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use service_core::error::AppError;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub state: Option<String>,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Show the login form after validating the client half of the request.
pub async fn authorize_page(
    State(state): State<AppState>,
    Query(params): Query<AuthorizeParams>,
) -> Result<Html<String>, AppError> {
    state
        .oauth
        .begin_authorization(&params.client_id, &params.response_type)
        .map_err(authorize_error)?;

    Ok(Html(login_form(&params, None)))
}

/// Verify credentials and redirect back with an authorization code.
pub async fn authorize_submit(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let result = state
        .oauth
        .complete_authorization(
            &form.client_id,
            &form.response_type,
            &form.redirect_uri,
            &form.email,
            &form.password,
        )
        .await;

    match result {
        Ok(code) => {
            let mut query = vec![("code", code.as_str())];
            if let Some(csrf_state) = form.state.as_deref() {
                query.push(("state", csrf_state));
            }
            // Percent-encode so reserved characters in `state` survive the
            // round trip instead of splitting the query.
            let query = serde_urlencoded::to_string(&query).map_err(|e| {
                AppError::InternalError(anyhow::anyhow!("Failed to encode redirect: {}", e))
            })?;
            let separator = if form.redirect_uri.contains('?') { '&' } else { '?' };
            let location = format!("{}{}{}", form.redirect_uri, separator, query);
            Ok(Redirect::to(&location).into_response())
        }
        Err(ServiceError::InvalidCredentials) => {
            // Re-render the form instead of failing the whole flow.
            let params = AuthorizeParams {
                client_id: form.client_id,
                redirect_uri: form.redirect_uri,
                response_type: form.response_type,
                state: form.state,
            };
            Ok(Html(login_form(&params, Some("Invalid email or password."))).into_response())
        }
        Err(e) => Err(authorize_error(e)),
    }
}

/// The browser-facing authorize endpoint reports a bad `client_id` as a 400;
/// the 401 `invalid_client` convention belongs to the token endpoint.
fn authorize_error(e: ServiceError) -> AppError {
    match e {
        ServiceError::InvalidClient => AppError::BadRequest(anyhow::anyhow!("Unknown client_id")),
        other => other.into(),
    }
}

/// Exchange a code or refresh token for a fresh token pair.
pub async fn token(
    State(state): State<AppState>,
    Form(request): Form<TokenRequest>,
) -> Response {
    match handle_token_grant(&state, &request).await {
        Ok(pair) => Json(TokenResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: pair.expires_in,
        })
        .into_response(),
        Err(e) => token_error(e),
    }
}

async fn handle_token_grant(
    state: &AppState,
    request: &TokenRequest,
) -> Result<crate::db::IssuedTokenPair, ServiceError> {
    let client_id = request
        .client_id
        .as_deref()
        .ok_or_else(|| ServiceError::BadRequest("client_id is required".to_string()))?;
    let client_secret = request
        .client_secret
        .as_deref()
        .ok_or_else(|| ServiceError::BadRequest("client_secret is required".to_string()))?;

    match request.grant_type.as_str() {
        "authorization_code" => {
            let code = request
                .code
                .as_deref()
                .ok_or_else(|| ServiceError::BadRequest("code is required".to_string()))?;
            let redirect_uri = request
                .redirect_uri
                .as_deref()
                .ok_or_else(|| ServiceError::BadRequest("redirect_uri is required".to_string()))?;

            let pair = state
                .oauth
                .exchange_code(client_id, client_secret, code, redirect_uri)
                .await?;
            info!("Authorization code exchanged");
            Ok(pair)
        }
        "refresh_token" => {
            let refresh_token = request
                .refresh_token
                .as_deref()
                .ok_or_else(|| ServiceError::BadRequest("refresh_token is required".to_string()))?;

            state
                .oauth
                .refresh(client_id, client_secret, refresh_token)
                .await
        }
        other => Err(ServiceError::BadRequest(format!(
            "unsupported grant_type: {other}"
        ))),
    }
}

/// OAuth error responses carry an `error` code and a human description.
fn token_error(e: ServiceError) -> Response {
    let (status, code, description) = match &e {
        ServiceError::InvalidClient => (
            StatusCode::UNAUTHORIZED,
            "invalid_client",
            "Client authentication failed".to_string(),
        ),
        ServiceError::InvalidGrant => (
            StatusCode::BAD_REQUEST,
            "invalid_grant",
            "The grant is invalid, expired, or already used".to_string(),
        ),
        ServiceError::BadRequest(msg) => {
            let code = if msg.starts_with("unsupported grant_type") {
                "unsupported_grant_type"
            } else {
                "invalid_request"
            };
            (StatusCode::BAD_REQUEST, code, msg.clone())
        }
        _ => {
            tracing::error!(error = %e, "Token endpoint failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "Internal server error".to_string(),
            )
        }
    };

    (
        status,
        Json(json!({ "error": code, "error_description": description })),
    )
        .into_response()
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn login_form(params: &AuthorizeParams, error: Option<&str>) -> String {
    let error_html = error
        .map(|msg| format!(r#"<p class="error">{msg}</p>"#))
        .unwrap_or_default();
    let csrf_state = escape_attr(params.state.as_deref().unwrap_or_default());

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <title>Sign in</title>
  <style>
    body {{ font-family: sans-serif; max-width: 22rem; margin: 4rem auto; }}
    input {{ display: block; width: 100%; margin: 0.5rem 0; padding: 0.5rem; }}
    .error {{ color: #b00; }}
  </style>
</head>
<body>
  <h1>Sign in to Notion Bridge</h1>
  {error_html}
  <form method="post" action="/oauth/authorize">
    <input type="hidden" name="client_id" value="{client_id}">
    <input type="hidden" name="redirect_uri" value="{redirect_uri}">
    <input type="hidden" name="response_type" value="{response_type}">
    <input type="hidden" name="state" value="{csrf_state}">
    <input type="email" name="email" placeholder="Email" required>
    <input type="password" name="password" placeholder="Password" required>
    <button type="submit">Sign in</button>
  </form>
</body>
</html>"#,
        client_id = escape_attr(&params.client_id),
        redirect_uri = escape_attr(&params.redirect_uri),
        response_type = escape_attr(&params.response_type),
    )
}
