//! Session registry for the MCP endpoint.
//!
//! A session is created by `initialize` and binds a generated id to the
//! authenticated user. Server-initiated messages go through a per-session
//! channel whose receiver is handed to at most one SSE stream.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::info;
use uuid::Uuid;

/// Outbound buffer before a slow SSE consumer starts losing pushes.
const PUSH_BUFFER: usize = 64;

struct SessionEntry {
    user_id: String,
    push_tx: mpsc::Sender<Value>,
    /// Taken by the first GET stream; never returned.
    push_rx: Mutex<Option<mpsc::Receiver<Value>>>,
}

/// Shared, clonable registry of live MCP sessions.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Arc<SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for a user and return its id.
    pub fn create(&self, user_id: &str) -> String {
        let session_id = Uuid::new_v4().to_string();
        let (push_tx, push_rx) = mpsc::channel(PUSH_BUFFER);
        self.sessions.insert(
            session_id.clone(),
            Arc::new(SessionEntry {
                user_id: user_id.to_string(),
                push_tx,
                push_rx: Mutex::new(Some(push_rx)),
            }),
        );
        info!(session_id = %session_id, user_id = %user_id, "Session created");
        session_id
    }

    /// Owner of a session, if the session exists.
    pub fn owner(&self, session_id: &str) -> Option<String> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.user_id.clone())
    }

    /// Take the push receiver for an SSE stream. `None` when the session is
    /// unknown or a stream has already claimed it.
    pub async fn take_receiver(&self, session_id: &str) -> Option<mpsc::Receiver<Value>> {
        let entry = self.sessions.get(session_id)?.clone();
        let mut slot = entry.push_rx.lock().await;
        slot.take()
    }

    /// Queue a server-initiated message. Returns false when the session is
    /// gone or its buffer is full.
    pub fn push(&self, session_id: &str, message: Value) -> bool {
        match self.sessions.get(session_id) {
            Some(entry) => entry.push_tx.try_send(message).is_ok(),
            None => false,
        }
    }

    /// Remove a session. Dropping the sender ends any attached SSE stream.
    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            info!(session_id = %session_id, "Session terminated");
        }
        removed
    }

    /// Tear down every session, ending all attached streams. Used during
    /// shutdown and after a user-wide revocation.
    pub fn close_all(&self) {
        let count = self.sessions.len();
        self.sessions.clear();
        if count > 0 {
            info!(count, "All sessions closed");
        }
    }

    /// Drop every session belonging to a user.
    pub fn close_for_user(&self, user_id: &str) {
        self.sessions.retain(|_, entry| entry.user_id != user_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
