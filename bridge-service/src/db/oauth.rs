//! Token ledger: authorization codes and access/refresh token pairs.
//!
//! Plaintext tokens are never stored. Every lookup goes through a SHA-256
//! digest so a copy of this table cannot be replayed against the bridge.

use super::{now_epoch, Database};
use crate::models::{OAuthToken, UserStatus};
use service_core::error::AppError;
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use tracing::{info, instrument};
use uuid::Uuid;

/// Authorization codes are valid for ten minutes.
const AUTH_CODE_TTL_SECS: i64 = 10 * 60;
/// Access tokens are valid for one hour.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 60 * 60;
/// Refresh tokens are valid for thirty days from pair creation.
const REFRESH_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Plaintext token pair returned to the client exactly once.
#[derive(Debug, Clone)]
pub struct IssuedTokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Result of a hashed access-token lookup joined with the owning user.
#[derive(Debug, Clone, FromRow)]
pub struct AccessTokenRow {
    pub user_id: String,
    pub expires_at: i64,
    pub revoked: bool,
    pub status: UserStatus,
}

#[derive(Debug, Clone, FromRow)]
struct RefreshTokenRow {
    id: String,
    user_id: String,
    created_at: i64,
    revoked: bool,
    status: UserStatus,
}

pub(crate) fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// 256 bits of OS entropy, hex encoded.
pub(crate) fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl Database {
    /// Mint and persist an authorization code for a completed login.
    #[instrument(skip(self))]
    pub async fn create_authorization_code(
        &self,
        user_id: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<String, AppError> {
        let code = generate_token();
        let now = now_epoch();

        sqlx::query(
            r#"
            INSERT INTO oauth_authorization_codes (code, user_id, client_id, redirect_uri, expires_at, used, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
            "#,
        )
        .bind(&code)
        .bind(user_id)
        .bind(client_id)
        .bind(redirect_uri)
        .bind(now + AUTH_CODE_TTL_SECS)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to store code: {}", e)))?;

        info!(user_id = %user_id, "Authorization code issued");
        Ok(code)
    }

    /// Exchange an authorization code for a token pair. The conditional
    /// consume (keyed on the unused flag and the expiry, so two concurrent
    /// exchanges resolve to exactly one winner), the owner status re-check,
    /// and the pair insert all run in one transaction: a fault mid-exchange
    /// rolls back instead of burning the code with no tokens issued.
    #[instrument(skip(self, code))]
    pub async fn exchange_authorization_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<Option<IssuedTokenPair>, AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let row: Option<(String,)> = sqlx::query_as(
            r#"
            UPDATE oauth_authorization_codes
            SET used = 1
            WHERE code = ?1 AND client_id = ?2 AND redirect_uri = ?3
              AND used = 0 AND expires_at > ?4
            RETURNING user_id
            "#,
        )
        .bind(code)
        .bind(client_id)
        .bind(redirect_uri)
        .bind(now_epoch())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to consume code: {}", e)))?;

        let Some((user_id,)) = row else {
            return Ok(None);
        };

        // The code may outlive its owner's standing; returning here drops the
        // transaction, so the code stays unconsumed.
        let status: Option<(UserStatus,)> = sqlx::query_as("SELECT status FROM users WHERE id = ?1")
            .bind(&user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load owner: {}", e)))?;
        match status {
            Some((UserStatus::Active,)) => {}
            _ => return Ok(None),
        }

        let pair = insert_token_pair(&mut *tx, &user_id).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit exchange: {}", e))
        })?;

        info!(user_id = %user_id, "Authorization code exchanged");
        Ok(Some(pair))
    }

    /// Hashed access-token lookup. One indexed query joined with the owning
    /// user so revocation and account status are re-checked on every call.
    pub async fn find_access_token(
        &self,
        access_token: &str,
    ) -> Result<Option<AccessTokenRow>, AppError> {
        sqlx::query_as::<_, AccessTokenRow>(
            r#"
            SELECT t.user_id, t.expires_at, t.revoked, u.status
            FROM oauth_tokens t
            JOIN users u ON u.id = t.user_id
            WHERE t.access_token_hash = ?1
            "#,
        )
        .bind(hash_token(access_token))
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to look up token: {}", e)))
    }

    /// Rotate a refresh token: revoke the old pair and issue a new one for
    /// the same user, atomically. Returns `None` for any invalid, revoked,
    /// expired, or disabled-owner token.
    #[instrument(skip(self, refresh_token))]
    pub async fn rotate_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<IssuedTokenPair>, AppError> {
        let now = now_epoch();

        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let row: Option<RefreshTokenRow> = sqlx::query_as(
            r#"
            SELECT t.id, t.user_id, t.created_at, t.revoked, u.status
            FROM oauth_tokens t
            JOIN users u ON u.id = t.user_id
            WHERE t.refresh_token_hash = ?1
            "#,
        )
        .bind(hash_token(refresh_token))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to look up token: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        if row.revoked
            || row.status != UserStatus::Active
            || row.created_at + REFRESH_TOKEN_TTL_SECS <= now
        {
            return Ok(None);
        }

        // Revoke-if-unrevoked: a concurrent rotation of the same token loses
        // here and rolls back with no new pair minted.
        let revoked = sqlx::query("UPDATE oauth_tokens SET revoked = 1 WHERE id = ?1 AND revoked = 0")
            .bind(&row.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to revoke pair: {}", e)))?;

        if revoked.rows_affected() == 0 {
            return Ok(None);
        }

        let pair = insert_token_pair(&mut *tx, &row.user_id).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit rotation: {}", e))
        })?;

        info!(user_id = %row.user_id, "Refresh token rotated");
        Ok(Some(pair))
    }

    /// Revoke every token pair belonging to a user. Invoked synchronously
    /// when an account is disabled or deleted.
    #[instrument(skip(self))]
    pub async fn revoke_user_tokens(&self, user_id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE oauth_tokens SET revoked = 1 WHERE user_id = ?1")
            .bind(user_id)
            .execute(self.pool())
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to revoke tokens: {}", e)))?;

        info!(user_id = %user_id, "All tokens revoked");
        Ok(())
    }

    /// Fetch a token pair row by id (admin/audit views).
    pub async fn find_token_pair(&self, id: &str) -> Result<Option<OAuthToken>, AppError> {
        sqlx::query_as::<_, OAuthToken>("SELECT * FROM oauth_tokens WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load pair: {}", e)))
    }
}

async fn insert_token_pair<'e, E>(executor: E, user_id: &str) -> Result<IssuedTokenPair, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let id = Uuid::new_v4().to_string();
    let access_token = generate_token();
    let refresh_token = generate_token();
    let now = now_epoch();

    sqlx::query(
        r#"
        INSERT INTO oauth_tokens (id, user_id, access_token_hash, refresh_token_hash, expires_at, created_at, revoked)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(hash_token(&access_token))
    .bind(hash_token(&refresh_token))
    .bind(now + ACCESS_TOKEN_TTL_SECS)
    .bind(now)
    .execute(executor)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to store pair: {}", e)))?;

    Ok(IssuedTokenPair {
        access_token,
        refresh_token,
        expires_in: ACCESS_TOKEN_TTL_SECS,
    })
}
