//! MCP transport endpoint: JSON-RPC over POST, an SSE push stream over GET,
//! and explicit session teardown over DELETE.
//!
//! Authentication happens in middleware; by the time a handler runs the
//! request carries an `AuthenticatedUser` extension. Failure ordering is
//! fixed: missing/invalid bearer is a 401 (middleware), session lifecycle
//! violations are 400, and a session owned by a different user is a 403.

use crate::mcp::session::SessionRegistry;
use crate::services::AuthenticatedUser;
use crate::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Extension, Json,
};
use futures::stream::Stream;
use serde_json::Value;
use service_core::error::AppError;
use std::convert::Infallible;
use tracing::debug;

pub const SESSION_HEADER: &str = "mcp-session-id";

fn session_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Resolve and authorize the session named by the request headers.
fn require_session(
    sessions: &SessionRegistry,
    headers: &HeaderMap,
    user: &AuthenticatedUser,
) -> Result<String, AppError> {
    let session_id = session_header(headers)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing mcp-session-id header")))?;

    let owner = sessions
        .owner(&session_id)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown or expired session")))?;

    if owner != user.id {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Session belongs to a different user"
        )));
    }
    Ok(session_id)
}

pub async fn post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> Result<Response, AppError> {
    let is_initialize = request.get("method").and_then(Value::as_str) == Some("initialize");

    if is_initialize {
        // A client re-initializing over an existing session gets a fresh one;
        // reap the old entry so reconnects do not grow the registry.
        if let Some(previous) = session_header(&headers) {
            if state.sessions.owner(&previous).as_deref() == Some(user.id.as_str()) {
                state.sessions.remove(&previous);
            }
        }

        let session_id = state.sessions.create(&user.id);
        let response = state.mcp.handle_request(&user, request).await;
        let body = response.unwrap_or(Value::Null);
        return Ok(([(SESSION_HEADER, session_id)], Json(body)).into_response());
    }

    require_session(&state.sessions, &headers, &user)?;

    match state.mcp.handle_request(&user, request).await {
        Some(response) => Ok(Json(response).into_response()),
        // Notifications get no body.
        None => Ok(StatusCode::ACCEPTED.into_response()),
    }
}

/// Removes the session when its SSE stream is dropped, however the
/// disconnect happens.
struct StreamGuard {
    sessions: SessionRegistry,
    session_id: String,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        debug!(session_id = %self.session_id, "SSE stream closed");
        self.sessions.remove(&self.session_id);
    }
}

pub async fn get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let session_id = require_session(&state.sessions, &headers, &user)?;

    let rx = state
        .sessions
        .take_receiver(&session_id)
        .await
        .ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Session already has an attached stream"))
        })?;

    let guard = StreamGuard {
        sessions: state.sessions.clone(),
        session_id,
    };

    let stream = futures::stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let message = rx.recv().await?;
        let event = Event::default().event("message").data(message.to_string());
        Some((Ok(event), (rx, guard)))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let session_id = require_session(&state.sessions, &headers, &user)?;
    state.sessions.remove(&session_id);
    Ok(StatusCode::NO_CONTENT)
}
