//! Notion REST client behind the `DocumentStore` trait.
//!
//! The bridge only ever touches Notion through this trait so tests can swap
//! in an in-memory store, and so the access resolver's parent walk stays
//! independent of the wire client.

use crate::services::ServiceError;
use crate::utils::notion_url::format_notion_id;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::instrument;

const NOTION_API_BASE: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";
/// Notion caps children/results at 100 per request.
const PAGE_SIZE: usize = 100;

/// Parent of a page or database in the Notion hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    Page(String),
    Database(String),
    WorkspaceRoot,
    Unknown,
}

impl ParentRef {
    /// The parent's id, when it has one. The workspace root terminates the
    /// ancestry walk and has no id.
    pub fn id(&self) -> Option<&str> {
        match self {
            ParentRef::Page(id) | ParentRef::Database(id) => Some(id),
            ParentRef::WorkspaceRoot | ParentRef::Unknown => None,
        }
    }
}

/// Kind of parent a new page is created under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentKind {
    Page,
    Database,
}

#[derive(Debug, Clone)]
pub struct NotionPage {
    pub id: String,
    pub title: String,
    /// Human-readable property summaries, in source order.
    pub properties: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct NotionDatabase {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
}

/// The document-store operations the bridge consumes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_page(&self, page_id: &str) -> Result<NotionPage, ServiceError>;

    /// Child block contents as plain text lines.
    async fn get_blocks(&self, page_id: &str) -> Result<Vec<String>, ServiceError>;

    async fn get_database(&self, database_id: &str) -> Result<NotionDatabase, ServiceError>;

    async fn query_database(
        &self,
        database_id: &str,
        filter: Option<Value>,
        sorts: Option<Value>,
    ) -> Result<Vec<NotionPage>, ServiceError>;

    async fn update_properties(&self, page_id: &str, properties: Value)
        -> Result<(), ServiceError>;

    async fn append_blocks(&self, page_id: &str, children: Vec<Value>)
        -> Result<(), ServiceError>;

    async fn create_page(
        &self,
        parent_id: &str,
        parent_kind: ParentKind,
        title: &str,
        properties: Option<Value>,
        children: Option<Vec<Value>>,
    ) -> Result<NotionPage, ServiceError>;

    async fn add_comment(&self, page_id: &str, text: &str) -> Result<(), ServiceError>;

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ServiceError>;

    /// Resolve the parent of a page or database. Errors are surfaced, but
    /// callers in the resolver treat them as "no parent" (fail closed).
    async fn parent_of(&self, id: &str) -> Result<ParentRef, ServiceError>;
}

/// reqwest-backed client for the Notion 2022-06-28 API.
#[derive(Clone)]
pub struct NotionClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl NotionClient {
    pub fn new(token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            base_url: NOTION_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(token: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            base_url,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value, ServiceError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ServiceError::Upstream(format!("request failed: {}", e)))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::Upstream(format!("invalid response body: {}", e)))?;

        if !status.is_success() {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(ServiceError::Upstream(format!(
                "Notion returned {}: {}",
                status, message
            )));
        }

        Ok(body)
    }
}

/// Pull the title out of a page object's properties.
fn extract_title(page: &Value) -> String {
    let Some(properties) = page.get("properties").and_then(Value::as_object) else {
        return "Untitled".to_string();
    };
    for prop in properties.values() {
        if prop.get("type").and_then(Value::as_str) == Some("title") {
            let text = rich_text_to_plain(prop.get("title"));
            if !text.is_empty() {
                return text;
            }
        }
    }
    "Untitled".to_string()
}

fn rich_text_to_plain(rich_text: Option<&Value>) -> String {
    rich_text
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("plain_text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

/// One-line display value for a property, by type.
fn property_summary(prop: &Value) -> Option<String> {
    let kind = prop.get("type").and_then(Value::as_str)?;
    let value = match kind {
        "title" => rich_text_to_plain(prop.get("title")),
        "rich_text" => rich_text_to_plain(prop.get("rich_text")),
        "number" => prop.get("number").and_then(Value::as_f64).map(|n| n.to_string()).unwrap_or_default(),
        "select" => prop
            .pointer("/select/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        "multi_select" => prop
            .get("multi_select")
            .and_then(Value::as_array)
            .map(|opts| {
                opts.iter()
                    .filter_map(|o| o.get("name").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default(),
        "date" => {
            let start = prop.pointer("/date/start").and_then(Value::as_str).unwrap_or_default();
            match prop.pointer("/date/end").and_then(Value::as_str) {
                Some(end) => format!("{} to {}", start, end),
                None => start.to_string(),
            }
        }
        "checkbox" => match prop.get("checkbox").and_then(Value::as_bool) {
            Some(true) => "Yes".to_string(),
            _ => "No".to_string(),
        },
        "url" => prop.get("url").and_then(Value::as_str).unwrap_or_default().to_string(),
        "email" => prop.get("email").and_then(Value::as_str).unwrap_or_default().to_string(),
        "phone_number" => prop
            .get("phone_number")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        "status" => prop
            .pointer("/status/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        other => format!("[{}]", other),
    };
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn page_from_value(value: &Value) -> NotionPage {
    let id = value.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
    let title = extract_title(value);
    let properties = value
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .filter_map(|(name, prop)| property_summary(prop).map(|v| (name.clone(), v)))
                .collect()
        })
        .unwrap_or_default();
    NotionPage { id, title, properties }
}

fn parent_from_value(parent: Option<&Value>) -> ParentRef {
    let Some(parent) = parent else {
        return ParentRef::Unknown;
    };
    match parent.get("type").and_then(Value::as_str) {
        Some("page_id") => parent
            .get("page_id")
            .and_then(Value::as_str)
            .map(|id| ParentRef::Page(id.to_string()))
            .unwrap_or(ParentRef::Unknown),
        Some("database_id") => parent
            .get("database_id")
            .and_then(Value::as_str)
            .map(|id| ParentRef::Database(id.to_string()))
            .unwrap_or(ParentRef::Unknown),
        Some("workspace") => ParentRef::WorkspaceRoot,
        _ => ParentRef::Unknown,
    }
}

/// Flatten a block to a plain text line, by type. Unsupported block kinds
/// collapse to their text content when they carry any.
fn block_to_line(block: &Value) -> Option<String> {
    let kind = block.get("type").and_then(Value::as_str)?;
    let text = rich_text_to_plain(block.get(kind).and_then(|b| b.get("rich_text")));
    if text.is_empty() {
        return None;
    }
    let line = match kind {
        "heading_1" => format!("# {}", text),
        "heading_2" => format!("## {}", text),
        "heading_3" => format!("### {}", text),
        "bulleted_list_item" | "numbered_list_item" => format!("- {}", text),
        "to_do" => format!("[ ] {}", text),
        "quote" => format!("> {}", text),
        _ => text,
    };
    Some(line)
}

#[async_trait]
impl DocumentStore for NotionClient {
    #[instrument(skip(self))]
    async fn get_page(&self, page_id: &str) -> Result<NotionPage, ServiceError> {
        let path = format!("/pages/{}", format_notion_id(page_id));
        let body = self.send(self.request(reqwest::Method::GET, &path)).await?;
        Ok(page_from_value(&body))
    }

    #[instrument(skip(self))]
    async fn get_blocks(&self, page_id: &str) -> Result<Vec<String>, ServiceError> {
        let id = format_notion_id(page_id);
        let mut lines = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut path = format!("/blocks/{}/children?page_size={}", id, PAGE_SIZE);
            if let Some(c) = &cursor {
                path.push_str(&format!("&start_cursor={}", c));
            }
            let body = self.send(self.request(reqwest::Method::GET, &path)).await?;

            if let Some(results) = body.get("results").and_then(Value::as_array) {
                lines.extend(results.iter().filter_map(block_to_line));
            }

            cursor = body
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }

        Ok(lines)
    }

    #[instrument(skip(self))]
    async fn get_database(&self, database_id: &str) -> Result<NotionDatabase, ServiceError> {
        let path = format!("/databases/{}", format_notion_id(database_id));
        let body = self.send(self.request(reqwest::Method::GET, &path)).await?;

        let title = rich_text_to_plain(body.get("title"));
        Ok(NotionDatabase {
            id: body.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
            title: if title.is_empty() { "Untitled Database".to_string() } else { title },
        })
    }

    #[instrument(skip(self, filter, sorts))]
    async fn query_database(
        &self,
        database_id: &str,
        filter: Option<Value>,
        sorts: Option<Value>,
    ) -> Result<Vec<NotionPage>, ServiceError> {
        let path = format!("/databases/{}/query", format_notion_id(database_id));
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut payload = json!({ "page_size": PAGE_SIZE });
            if let Some(f) = &filter {
                payload["filter"] = f.clone();
            }
            if let Some(s) = &sorts {
                payload["sorts"] = s.clone();
            }
            if let Some(c) = &cursor {
                payload["start_cursor"] = json!(c);
            }

            let body = self
                .send(self.request(reqwest::Method::POST, &path).json(&payload))
                .await?;

            if let Some(results) = body.get("results").and_then(Value::as_array) {
                pages.extend(results.iter().map(page_from_value));
            }

            cursor = body
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }

        Ok(pages)
    }

    #[instrument(skip(self, properties))]
    async fn update_properties(
        &self,
        page_id: &str,
        properties: Value,
    ) -> Result<(), ServiceError> {
        let path = format!("/pages/{}", format_notion_id(page_id));
        self.send(
            self.request(reqwest::Method::PATCH, &path)
                .json(&json!({ "properties": properties })),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, children))]
    async fn append_blocks(
        &self,
        page_id: &str,
        children: Vec<Value>,
    ) -> Result<(), ServiceError> {
        let path = format!("/blocks/{}/children", format_notion_id(page_id));
        for batch in children.chunks(PAGE_SIZE) {
            self.send(
                self.request(reqwest::Method::PATCH, &path)
                    .json(&json!({ "children": batch })),
            )
            .await?;
        }
        Ok(())
    }

    #[instrument(skip(self, properties, children))]
    async fn create_page(
        &self,
        parent_id: &str,
        parent_kind: ParentKind,
        title: &str,
        properties: Option<Value>,
        children: Option<Vec<Value>>,
    ) -> Result<NotionPage, ServiceError> {
        let dashed = format_notion_id(parent_id);
        let parent = match parent_kind {
            ParentKind::Database => json!({ "database_id": dashed }),
            ParentKind::Page => json!({ "page_id": dashed }),
        };

        let mut props = match (parent_kind, properties) {
            (ParentKind::Database, Some(Value::Object(map))) => Value::Object(map),
            _ => json!({}),
        };
        props["title"] = json!({ "title": [{ "text": { "content": title } }] });

        let mut payload = json!({ "parent": parent, "properties": props });
        if let Some(children) = children {
            if !children.is_empty() {
                payload["children"] = Value::Array(children);
            }
        }

        let body = self
            .send(self.request(reqwest::Method::POST, "/pages").json(&payload))
            .await?;
        Ok(page_from_value(&body))
    }

    #[instrument(skip(self, text))]
    async fn add_comment(&self, page_id: &str, text: &str) -> Result<(), ServiceError> {
        let payload = json!({
            "parent": { "page_id": format_notion_id(page_id) },
            "rich_text": [{ "type": "text", "text": { "content": text } }],
        });
        self.send(self.request(reqwest::Method::POST, "/comments").json(&payload))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ServiceError> {
        let payload = json!({ "query": query, "page_size": PAGE_SIZE });
        let body = self
            .send(self.request(reqwest::Method::POST, "/search").json(&payload))
            .await?;

        let hits = body
            .get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .filter_map(|r| {
                        let id = r.get("id").and_then(Value::as_str)?;
                        Some(SearchHit {
                            id: id.to_string(),
                            title: extract_title(r),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(hits)
    }

    /// A bare id can name either a page or a database; try pages first,
    /// then fall back to databases, matching how Notion partitions the API.
    #[instrument(skip(self))]
    async fn parent_of(&self, id: &str) -> Result<ParentRef, ServiceError> {
        let dashed = format_notion_id(id);

        let page = self
            .send(self.request(reqwest::Method::GET, &format!("/pages/{}", dashed)))
            .await;
        if let Ok(body) = page {
            return Ok(parent_from_value(body.get("parent")));
        }

        let db = self
            .send(self.request(reqwest::Method::GET, &format!("/databases/{}", dashed)))
            .await?;
        Ok(parent_from_value(db.get("parent")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_from_value_maps_all_kinds() {
        let page = json!({ "type": "page_id", "page_id": "abc" });
        assert_eq!(parent_from_value(Some(&page)), ParentRef::Page("abc".into()));

        let db = json!({ "type": "database_id", "database_id": "def" });
        assert_eq!(parent_from_value(Some(&db)), ParentRef::Database("def".into()));

        let ws = json!({ "type": "workspace", "workspace": true });
        assert_eq!(parent_from_value(Some(&ws)), ParentRef::WorkspaceRoot);

        let odd = json!({ "type": "block_id", "block_id": "xyz" });
        assert_eq!(parent_from_value(Some(&odd)), ParentRef::Unknown);
        assert_eq!(parent_from_value(None), ParentRef::Unknown);
    }

    #[test]
    fn extract_title_prefers_title_property() {
        let page = json!({
            "id": "abc",
            "properties": {
                "Name": {
                    "type": "title",
                    "title": [{ "plain_text": "Quarterly Plan" }]
                },
                "Owner": { "type": "rich_text", "rich_text": [{ "plain_text": "sam" }] }
            }
        });
        assert_eq!(extract_title(&page), "Quarterly Plan");

        let untitled = json!({ "id": "abc", "properties": {} });
        assert_eq!(extract_title(&untitled), "Untitled");
    }

    #[test]
    fn block_lines_carry_structure() {
        let heading = json!({
            "type": "heading_1",
            "heading_1": { "rich_text": [{ "plain_text": "Overview" }] }
        });
        assert_eq!(block_to_line(&heading).as_deref(), Some("# Overview"));

        let bullet = json!({
            "type": "bulleted_list_item",
            "bulleted_list_item": { "rich_text": [{ "plain_text": "first" }] }
        });
        assert_eq!(block_to_line(&bullet).as_deref(), Some("- first"));

        let empty = json!({ "type": "divider", "divider": {} });
        assert_eq!(block_to_line(&empty), None);
    }
}
