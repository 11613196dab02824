//! Append-only audit trail of tool invocations and admin actions.

use super::{now_epoch, Database};
use crate::models::AuditLogEntry;
use service_core::error::AppError;
use uuid::Uuid;

impl Database {
    pub async fn log_audit(
        &self,
        user_id: &str,
        user_name: &str,
        action: &str,
        notion_page_id: Option<&str>,
        detail: Option<serde_json::Value>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (id, user_id, user_name, action, notion_page_id, detail, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(user_name)
        .bind(action)
        .bind(notion_page_id)
        .bind(detail.map(|d| d.to_string()))
        .bind(now_epoch())
        .execute(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to write audit row: {}", e)))?;
        Ok(())
    }

    pub async fn recent_audit_entries(&self, limit: i64) -> Result<Vec<AuditLogEntry>, AppError> {
        sqlx::query_as::<_, AuditLogEntry>(
            "SELECT * FROM audit_log ORDER BY timestamp DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to read audit log: {}", e)))
    }
}
