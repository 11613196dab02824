//! Row types for the bridge store.

use serde::{Deserialize, Serialize};

/// Role assigned to a bridge user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

/// Account status. Disabling a user must revoke their tokens synchronously;
/// that is enforced by the OAuth service, not by the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Disabled,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: i64,
    pub invited_by: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserCreate {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Role,
    pub invited_by: Option<String>,
}

/// Grant level for an approved page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum AccessLevel {
    ReadWrite,
    ReadOnly,
}

/// Allow-list entry. `notion_page_id` is the canonical dash-stripped form
/// and is the lookup key for the access resolver.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ApprovedPage {
    pub id: String,
    pub notion_page_id: String,
    pub notion_url: String,
    pub title: String,
    pub access_level: AccessLevel,
    pub added_by: String,
    pub added_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApprovedPageCreate {
    pub notion_page_id: String,
    pub notion_url: String,
    pub title: String,
    pub access_level: AccessLevel,
    pub added_by: String,
}

/// Single-use OAuth authorization code. Never updated after consumption.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthorizationCode {
    pub code: String,
    pub user_id: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub expires_at: i64,
    pub used: bool,
    pub created_at: i64,
}

/// Persisted token pair. Only salted digests are stored; the plaintext
/// access/refresh tokens exist only in the token endpoint response.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OAuthToken {
    pub id: String,
    pub user_id: String,
    pub access_token_hash: String,
    pub refresh_token_hash: String,
    pub expires_at: i64,
    pub created_at: i64,
    pub revoked: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuditLogEntry {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub action: String,
    pub notion_page_id: Option<String>,
    pub detail: Option<String>,
    pub timestamp: i64,
}
