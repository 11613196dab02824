//! Credential store. Administrative mutations live here; the admin surface
//! calls these directly rather than going through the MCP endpoint.

use super::{now_epoch, Database};
use crate::models::{Role, User, UserCreate, UserStatus};
use crate::utils::password::{hash_password, Password};
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

impl Database {
    /// Create a user. Email is stored case-folded so lookups are
    /// case-insensitive.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create_user(&self, input: &UserCreate) -> Result<User, AppError> {
        let id = Uuid::new_v4().to_string();
        let password_hash = hash_password(&Password::new(input.password.clone()))
            .map_err(AppError::InternalError)?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, name, password_hash, role, status, created_at, invited_by)
            VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?7)
            RETURNING id, email, name, password_hash, role, status, created_at, invited_by
            "#,
        )
        .bind(&id)
        .bind(input.email.to_lowercase())
        .bind(&input.name)
        .bind(password_hash.as_str())
        .bind(input.role)
        .bind(now_epoch())
        .bind(&input.invited_by)
        .fetch_one(self.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create user: {}", e)),
        })?;

        info!(user_id = %user.id, "User created");
        Ok(user)
    }

    /// Create the bootstrap admin account, or leave an existing account with
    /// that email untouched. Returns `None` in the already-exists case so the
    /// seed binary can report which happened.
    #[instrument(skip(self, password))]
    pub async fn seed_admin_user(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<Option<User>, AppError> {
        if self.find_user_by_email(email).await?.is_some() {
            return Ok(None);
        }

        let user = self
            .create_user(&UserCreate {
                email: email.to_string(),
                name: name.to_string(),
                password: password.to_string(),
                role: Role::Admin,
                invited_by: None,
            })
            .await?;
        Ok(Some(user))
    }

    pub async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load user: {}", e)))
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?1")
            .bind(email.to_lowercase())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load user: {}", e)))
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC")
            .fetch_all(self.pool())
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list users: {}", e)))
    }

    /// Flip a user's status. Callers that disable a user must follow up with
    /// `revoke_user_tokens` before reporting success; `OAuthService::set_user_status`
    /// does both.
    #[instrument(skip(self))]
    pub async fn update_user_status(&self, id: &str, status: UserStatus) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET status = ?1 WHERE id = ?2")
            .bind(status)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update status: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("User not found")));
        }
        info!(user_id = %id, ?status, "User status updated");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn update_user_role(&self, id: &str, role: Role) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET role = ?1 WHERE id = ?2")
            .bind(role)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update role: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("User not found")));
        }
        Ok(())
    }

    pub async fn update_user_password(&self, id: &str, new_password: &str) -> Result<(), AppError> {
        let password_hash = hash_password(&Password::new(new_password.to_string()))
            .map_err(AppError::InternalError)?;

        sqlx::query("UPDATE users SET password_hash = ?1 WHERE id = ?2")
            .bind(password_hash.as_str())
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update password: {}", e))
            })?;
        Ok(())
    }

    /// Delete a user. Tokens are revoked first so the ledger keeps its
    /// audit trail; the rows are never cascaded away.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        sqlx::query("UPDATE oauth_tokens SET revoked = 1 WHERE user_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to revoke tokens: {}", e)))?;

        sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete user: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        info!(user_id = %id, "User deleted and tokens revoked");
        Ok(())
    }
}
