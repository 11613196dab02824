//! JSON-RPC dispatch for the MCP endpoint.

use crate::db::Database;
use crate::mcp::tools;
use crate::services::{AccessResolver, AuthenticatedUser, DocumentStore, ServiceError};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{instrument, warn};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "notion-bridge";

pub(crate) fn ok_result(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

pub(crate) fn tool_ok(id: Value, text: impl Into<String>) -> Value {
    ok_result(
        id,
        json!({
            "content": [{"type": "text", "text": text.into()}]
        }),
    )
}

pub(crate) fn tool_error(id: Value, text: impl Into<String>) -> Value {
    ok_result(
        id,
        json!({
            "content": [{"type": "text", "text": text.into()}],
            "isError": true
        }),
    )
}

pub(crate) fn rpc_error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message.into()
        }
    })
}

/// Executes JSON-RPC requests on behalf of an authenticated user. Stateless
/// apart from its handles; session bookkeeping lives in `SessionRegistry`.
#[derive(Clone)]
pub struct McpServer {
    pub(crate) db: Arc<Database>,
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) resolver: AccessResolver,
}

impl McpServer {
    pub fn new(db: Arc<Database>, store: Arc<dyn DocumentStore>, resolver: AccessResolver) -> Self {
        Self {
            db,
            store,
            resolver,
        }
    }

    /// Route a request to its handler. Notifications yield `None` (no
    /// response body is sent).
    #[instrument(skip(self, user, request), fields(user_id = %user.id))]
    pub async fn handle_request(
        &self,
        user: &AuthenticatedUser,
        request: Value,
    ) -> Option<Value> {
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = match request.get("method").and_then(Value::as_str) {
            Some(m) => m.to_string(),
            None => return Some(rpc_error(id, -32600, "missing method")),
        };
        let params = request
            .get("params")
            .cloned()
            .unwrap_or(Value::Object(Default::default()));

        match method.as_str() {
            "initialize" => Some(self.handle_initialize(id)),
            "tools/list" => Some(self.handle_tools_list(id)),
            "tools/call" => Some(self.handle_tools_call(id, user, &params).await),
            "ping" => Some(ok_result(id, json!({}))),
            m if m.starts_with("notifications/") => None,
            _ => Some(rpc_error(id, -32601, format!("method not found: {method}"))),
        }
    }

    fn handle_initialize(&self, id: Value) -> Value {
        ok_result(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    fn handle_tools_list(&self, id: Value) -> Value {
        ok_result(id, json!({ "tools": tools::tool_schemas() }))
    }

    async fn handle_tools_call(&self, id: Value, user: &AuthenticatedUser, params: &Value) -> Value {
        let tool_name = match params.get("name").and_then(Value::as_str) {
            Some(name) => name,
            None => return rpc_error(id, -32602, "missing tool name"),
        };
        let args = params
            .get("arguments")
            .cloned()
            .unwrap_or(Value::Object(Default::default()));

        match tools::call_tool(self, user, tool_name, &args).await {
            Ok(text) => tool_ok(id, text),
            Err(ServiceError::BadRequest(msg)) => rpc_error(id, -32602, msg),
            Err(e @ (ServiceError::Database(_) | ServiceError::Internal(_))) => {
                warn!(tool = tool_name, error = %e, "Tool failed");
                rpc_error(id, -32603, "internal error")
            }
            // Access denials and upstream failures are tool-level outcomes,
            // not protocol errors.
            Err(e) => tool_error(id, e.to_string()),
        }
    }
}
