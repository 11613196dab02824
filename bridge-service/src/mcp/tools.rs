//! Tool surface exposed over MCP. Every tool runs as an authenticated user,
//! goes through the access resolver before touching Notion, and leaves an
//! audit row on success.

use crate::mcp::server::McpServer;
use crate::services::oauth::AuthenticatedUser;
use crate::services::{ParentKind, ServiceError};
use serde_json::{json, Value};

/// Schemas advertised by `tools/list`.
pub fn tool_schemas() -> Vec<Value> {
    vec![
        json!({
            "name": "search",
            "description": "Search across approved Notion pages. Returns titles and IDs of pages you have access to.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search term" }
                },
                "required": ["query"]
            }
        }),
        json!({
            "name": "read_page",
            "description": "Fetch the content of a Notion page as a plain-text outline. Provide either a Notion page URL or page ID.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "page_id": { "type": "string", "description": "Notion page URL or page ID" }
                },
                "required": ["page_id"]
            }
        }),
        json!({
            "name": "read_database",
            "description": "Query a Notion database. Returns entries matching an optional filter/sort.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "database_id": { "type": "string", "description": "Notion database URL or database ID" },
                    "filter": { "type": "string", "description": "Optional Notion filter as a JSON string" },
                    "sort": { "type": "string", "description": "Optional Notion sort as a JSON string" }
                },
                "required": ["database_id"]
            }
        }),
        json!({
            "name": "update_page",
            "description": "Update properties of a Notion page and/or append content blocks. Requires write access.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "page_id": { "type": "string", "description": "Notion page URL or page ID" },
                    "properties": { "type": "string", "description": "Properties to update as a JSON string" },
                    "content": { "type": "string", "description": "Blocks to append as a JSON array string" }
                },
                "required": ["page_id"]
            }
        }),
        json!({
            "name": "create_page",
            "description": "Create a new page under an approved page or database. Requires write access to the parent.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "parent_id": { "type": "string", "description": "Parent page or database URL/ID" },
                    "title": { "type": "string", "description": "Title for the new page" },
                    "properties": { "type": "string", "description": "Page properties as a JSON string (database entries)" },
                    "content": { "type": "string", "description": "Content blocks as a JSON array string" }
                },
                "required": ["parent_id", "title"]
            }
        }),
        json!({
            "name": "add_comment",
            "description": "Add a comment to a Notion page. The comment is prefixed with your name for attribution.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "page_id": { "type": "string", "description": "Notion page URL or page ID" },
                    "comment": { "type": "string", "description": "Comment text to add" }
                },
                "required": ["page_id", "comment"]
            }
        }),
    ]
}

pub async fn call_tool(
    server: &McpServer,
    user: &AuthenticatedUser,
    name: &str,
    args: &Value,
) -> Result<String, ServiceError> {
    match name {
        "search" => search(server, user, args).await,
        "read_page" => read_page(server, user, args).await,
        "read_database" => read_database(server, user, args).await,
        "update_page" => update_page(server, user, args).await,
        "create_page" => create_page(server, user, args).await,
        "add_comment" => add_comment(server, user, args).await,
        other => Err(ServiceError::BadRequest(format!("unknown tool: {other}"))),
    }
}

fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ServiceError> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServiceError::BadRequest(format!("missing argument: {key}")))
}

/// Parse an optional argument carried as a JSON string.
fn optional_json(args: &Value, key: &str) -> Result<Option<Value>, ServiceError> {
    match args.get(key).and_then(Value::as_str) {
        None => Ok(None),
        Some(raw) => serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| ServiceError::BadRequest(format!("invalid JSON in '{key}': {e}"))),
    }
}

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

async fn search(
    server: &McpServer,
    user: &AuthenticatedUser,
    args: &Value,
) -> Result<String, ServiceError> {
    let query = require_str(args, "query")?;

    let hits = server.store.search(query).await?;
    let allowed = server.resolver.filter_approved(hits).await?;

    server
        .db
        .log_audit(
            &user.id,
            &user.name,
            "search",
            None,
            Some(json!({ "query": query, "result_count": allowed.len() })),
        )
        .await?;

    if allowed.is_empty() {
        return Ok(format!("No results found for \"{query}\" in approved pages."));
    }

    let listing = allowed
        .iter()
        .map(|hit| format!("- {} (ID: {})", hit.title, hit.id))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(format!(
        "Found {} result(s) for \"{query}\":\n\n{listing}",
        allowed.len()
    ))
}

async fn read_page(
    server: &McpServer,
    user: &AuthenticatedUser,
    args: &Value,
) -> Result<String, ServiceError> {
    let input = require_str(args, "page_id")?;
    let access = server.resolver.check_access(input, false).await?;

    let page = server.store.get_page(&access.page_id).await?;
    let lines = server.store.get_blocks(&access.page_id).await?;

    server
        .db
        .log_audit(
            &user.id,
            &user.name,
            "read_page",
            Some(&access.page_id),
            Some(json!({ "title": page.title })),
        )
        .await?;

    let mut out = format!("# {}\n\n", page.title);
    if !page.properties.is_empty() {
        out.push_str("## Properties\n");
        for (name, value) in &page.properties {
            out.push_str(&format!("{name}: {value}\n"));
        }
        out.push('\n');
    }
    out.push_str("## Content\n");
    out.push_str(&lines.join("\n"));
    Ok(out)
}

async fn read_database(
    server: &McpServer,
    user: &AuthenticatedUser,
    args: &Value,
) -> Result<String, ServiceError> {
    let input = require_str(args, "database_id")?;
    let access = server.resolver.check_access(input, false).await?;

    let filter = optional_json(args, "filter")?;
    let sorts = optional_json(args, "sort")?;

    let info = server.store.get_database(&access.page_id).await?;
    let rows = server
        .store
        .query_database(&access.page_id, filter, sorts)
        .await?;

    server
        .db
        .log_audit(
            &user.id,
            &user.name,
            "read_database",
            Some(&access.page_id),
            Some(json!({ "title": info.title, "result_count": rows.len() })),
        )
        .await?;

    let entries = rows
        .iter()
        .map(|page| {
            let props = page
                .properties
                .iter()
                .map(|(name, value)| format!("{name}: {value}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!("### {} (ID: {})\n{}", page.title, page.id, props)
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    Ok(format!(
        "# {}\n\n{} entries found.\n\n{entries}",
        info.title,
        rows.len()
    ))
}

async fn update_page(
    server: &McpServer,
    user: &AuthenticatedUser,
    args: &Value,
) -> Result<String, ServiceError> {
    let input = require_str(args, "page_id")?;
    let access = server.resolver.check_access(input, true).await?;

    let properties = optional_json(args, "properties")?;
    let content = optional_json(args, "content")?;
    if properties.is_none() && content.is_none() {
        return Err(ServiceError::BadRequest(
            "at least one of 'properties' or 'content' must be provided".to_string(),
        ));
    }

    if let Some(properties) = properties.clone() {
        server
            .store
            .update_properties(&access.page_id, properties)
            .await?;
    }
    if let Some(content) = content.clone() {
        let blocks = content.as_array().cloned().ok_or_else(|| {
            ServiceError::BadRequest("'content' must be a JSON array of blocks".to_string())
        })?;
        server.store.append_blocks(&access.page_id, blocks).await?;
    }

    server
        .store
        .add_comment(
            &access.page_id,
            &format!("Updated by {} via notion-bridge on {}", user.name, today()),
        )
        .await?;

    server
        .db
        .log_audit(
            &user.id,
            &user.name,
            "update_page",
            Some(&access.page_id),
            Some(json!({
                "has_properties": properties.is_some(),
                "has_content": content.is_some(),
            })),
        )
        .await?;

    Ok("Page updated successfully. Attribution comment added.".to_string())
}

async fn create_page(
    server: &McpServer,
    user: &AuthenticatedUser,
    args: &Value,
) -> Result<String, ServiceError> {
    let parent = require_str(args, "parent_id")?;
    let title = require_str(args, "title")?;
    let access = server.resolver.check_access(parent, true).await?;

    let properties = optional_json(args, "properties")?;
    let content = optional_json(args, "content")?
        .map(|v| {
            v.as_array().cloned().ok_or_else(|| {
                ServiceError::BadRequest("'content' must be a JSON array of blocks".to_string())
            })
        })
        .transpose()?;

    // A bare id does not say whether the parent is a page or database entry
    // container; probe the databases endpoint to find out.
    let parent_kind = match server.store.get_database(&access.page_id).await {
        Ok(_) => ParentKind::Database,
        Err(_) => ParentKind::Page,
    };

    let page = server
        .store
        .create_page(&access.page_id, parent_kind, title, properties, content)
        .await?;

    server
        .store
        .add_comment(
            &page.id,
            &format!("Created by {} via notion-bridge on {}", user.name, today()),
        )
        .await?;

    server
        .db
        .log_audit(
            &user.id,
            &user.name,
            "create_page",
            Some(&page.id),
            Some(json!({ "parent_id": access.page_id, "title": title })),
        )
        .await?;

    Ok(format!(
        "Page \"{title}\" created successfully (ID: {}). Attribution comment added.",
        page.id
    ))
}

async fn add_comment(
    server: &McpServer,
    user: &AuthenticatedUser,
    args: &Value,
) -> Result<String, ServiceError> {
    let input = require_str(args, "page_id")?;
    let comment = require_str(args, "comment")?;
    let access = server.resolver.check_access(input, false).await?;

    server
        .store
        .add_comment(&access.page_id, &format!("{}: {comment}", user.name))
        .await?;

    server
        .db
        .log_audit(
            &user.id,
            &user.name,
            "add_comment",
            Some(&access.page_id),
            Some(json!({ "comment_length": comment.len() })),
        )
        .await?;

    Ok("Comment added successfully to the page.".to_string())
}
