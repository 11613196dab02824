//! Shared fixtures: in-memory database, a scriptable document store, and an
//! app builder wired the same way `main` does it.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use bridge_service::config::{
    BridgeConfig, DatabaseConfig, Environment, NotionConfig, OAuthClientConfig, RateLimitConfig,
};
use bridge_service::db::Database;
use bridge_service::mcp::{McpServer, SessionRegistry};
use bridge_service::models::{AccessLevel, ApprovedPageCreate, Role, User, UserCreate};
use bridge_service::services::notion::{
    DocumentStore, NotionDatabase, NotionPage, ParentKind, ParentRef, SearchHit,
};
use bridge_service::services::{AccessResolver, OAuthService, ServiceError};
use bridge_service::AppState;
use serde_json::Value;
use service_core::middleware::rate_limit::create_string_keyed_rate_limiter;
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;

pub const TEST_CLIENT_ID: &str = "notion-bridge";
pub const TEST_CLIENT_SECRET: &str = "test-secret";
pub const TEST_REDIRECT_URI: &str = "https://connector.example/callback";

pub async fn setup_db() -> Arc<Database> {
    // A single connection keeps every query on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    let db = Database::from_pool(pool);
    db.run_migrations().await.expect("Migrations failed");
    Arc::new(db)
}

pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        common: service_core::config::Config { port: 3847 },
        environment: Environment::Dev,
        service_name: "bridge-service".to_string(),
        service_version: "test".to_string(),
        log_level: "warn".to_string(),
        base_url: "http://localhost:3847".to_string(),
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
        },
        oauth: OAuthClientConfig {
            client_id: TEST_CLIENT_ID.to_string(),
            client_secret: TEST_CLIENT_SECRET.to_string(),
        },
        notion: NotionConfig {
            token: "test-token".to_string(),
        },
        rate_limit: RateLimitConfig {
            mcp_requests_per_minute: 1000,
        },
    }
}

/// Scriptable in-memory document store. Parent edges and search results are
/// configured up front; external-call counts are observable.
#[derive(Default)]
pub struct MockDocumentStore {
    pub parents: Mutex<HashMap<String, ParentRef>>,
    pub databases: Mutex<HashSet<String>>,
    pub search_results: Mutex<Vec<SearchHit>>,
    pub parent_calls: AtomicUsize,
    pub comments: Mutex<Vec<(String, String)>>,
    pub fail_parent_lookups: Mutex<HashSet<String>>,
}

impl MockDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_parent(&self, id: &str, parent: ParentRef) {
        self.parents.lock().unwrap().insert(id.to_string(), parent);
    }

    pub fn add_search_hit(&self, id: &str, title: &str) {
        self.search_results.lock().unwrap().push(SearchHit {
            id: id.to_string(),
            title: title.to_string(),
        });
    }

    pub fn fail_parent_lookup(&self, id: &str) {
        self.fail_parent_lookups
            .lock()
            .unwrap()
            .insert(id.to_string());
    }

    pub fn parent_call_count(&self) -> usize {
        self.parent_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MockDocumentStore {
    async fn get_page(&self, page_id: &str) -> Result<NotionPage, ServiceError> {
        Ok(NotionPage {
            id: page_id.to_string(),
            title: format!("Page {page_id}"),
            properties: vec![],
        })
    }

    async fn get_blocks(&self, _page_id: &str) -> Result<Vec<String>, ServiceError> {
        Ok(vec!["Hello from the mock store.".to_string()])
    }

    async fn get_database(&self, database_id: &str) -> Result<NotionDatabase, ServiceError> {
        if self.databases.lock().unwrap().contains(database_id) {
            Ok(NotionDatabase {
                id: database_id.to_string(),
                title: format!("Database {database_id}"),
            })
        } else {
            Err(ServiceError::Upstream("not a database".to_string()))
        }
    }

    async fn query_database(
        &self,
        _database_id: &str,
        _filter: Option<Value>,
        _sorts: Option<Value>,
    ) -> Result<Vec<NotionPage>, ServiceError> {
        Ok(vec![])
    }

    async fn update_properties(
        &self,
        _page_id: &str,
        _properties: Value,
    ) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn append_blocks(
        &self,
        _page_id: &str,
        _children: Vec<Value>,
    ) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn create_page(
        &self,
        parent_id: &str,
        _parent_kind: ParentKind,
        _title: &str,
        _properties: Option<Value>,
        _children: Option<Vec<Value>>,
    ) -> Result<NotionPage, ServiceError> {
        Ok(NotionPage {
            id: format!("{parent_id}-child"),
            title: "created".to_string(),
            properties: vec![],
        })
    }

    async fn add_comment(&self, page_id: &str, text: &str) -> Result<(), ServiceError> {
        self.comments
            .lock()
            .unwrap()
            .push((page_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, ServiceError> {
        Ok(self.search_results.lock().unwrap().clone())
    }

    async fn parent_of(&self, id: &str) -> Result<ParentRef, ServiceError> {
        self.parent_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_parent_lookups.lock().unwrap().contains(id) {
            return Err(ServiceError::Upstream("lookup failed".to_string()));
        }
        Ok(self
            .parents
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or(ParentRef::Unknown))
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MockDocumentStore>,
}

pub async fn build_app(db: Arc<Database>) -> TestApp {
    build_app_with_rate_limit(db, 1000).await
}

pub async fn build_app_with_rate_limit(db: Arc<Database>, per_minute: u32) -> TestApp {
    let config = test_config();
    let store = Arc::new(MockDocumentStore::new());
    let resolver = AccessResolver::new(db.clone(), store.clone());
    let oauth = OAuthService::new(
        db.clone(),
        config.oauth.client_id.clone(),
        config.oauth.client_secret.clone(),
    );
    let mcp = McpServer::new(db.clone(), store.clone(), resolver);

    let state = AppState {
        config,
        db,
        oauth,
        mcp,
        sessions: SessionRegistry::new(),
        mcp_rate_limiter: create_string_keyed_rate_limiter(per_minute, 60),
    };

    TestApp { state, store }
}

impl TestApp {
    pub async fn router(&self) -> axum::Router {
        bridge_service::build_router(self.state.clone())
            .await
            .expect("Failed to build router")
    }

    pub async fn request(&self, request: Request<Body>) -> Response<axum::body::Body> {
        self.router()
            .await
            .oneshot(request)
            .await
            .expect("Request failed")
    }
}

pub async fn create_user(db: &Database, email: &str, password: &str, role: Role) -> User {
    db.create_user(&UserCreate {
        email: email.to_string(),
        name: email.split('@').next().unwrap_or("user").to_string(),
        password: password.to_string(),
        role,
        invited_by: None,
    })
    .await
    .expect("Failed to create user")
}

pub async fn approve_page(db: &Database, page_id: &str, level: AccessLevel, added_by: &str) {
    db.add_approved_page(&ApprovedPageCreate {
        notion_page_id: page_id.to_string(),
        notion_url: format!("https://notion.so/{page_id}"),
        title: format!("Approved {page_id}"),
        access_level: level,
        added_by: added_by.to_string(),
    })
    .await
    .expect("Failed to approve page");
}

pub async fn body_json(response: Response<axum::body::Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body was not JSON")
}

/// Run the full authorize + exchange flow and return (access, refresh).
pub async fn obtain_tokens(app: &TestApp, email: &str, password: &str) -> (String, String) {
    let form = serde_urlencoded::to_string([
        ("client_id", TEST_CLIENT_ID),
        ("redirect_uri", TEST_REDIRECT_URI),
        ("response_type", "code"),
        ("state", "xyz"),
        ("email", email),
        ("password", password),
    ])
    .unwrap();

    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/oauth/authorize")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("Missing redirect location")
        .to_string();
    let code = location
        .split("code=")
        .nth(1)
        .and_then(|s| s.split('&').next())
        .expect("Missing code in redirect")
        .to_string();

    let form = serde_urlencoded::to_string([
        ("grant_type", "authorization_code"),
        ("client_id", TEST_CLIENT_ID),
        ("client_secret", TEST_CLIENT_SECRET),
        ("code", code.as_str()),
        ("redirect_uri", TEST_REDIRECT_URI),
    ])
    .unwrap();

    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/oauth/token")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    (
        body["access_token"].as_str().unwrap().to_string(),
        body["refresh_token"].as_str().unwrap().to_string(),
    )
}
