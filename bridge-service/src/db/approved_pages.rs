//! Access grant store: the allow-list of approved Notion pages.

use super::{now_epoch, Database};
use crate::models::{AccessLevel, ApprovedPage, ApprovedPageCreate};
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

impl Database {
    /// Add a grant. `notion_page_id` must already be in canonical
    /// (dash-stripped) form; the unique index rejects duplicates.
    #[instrument(skip(self, input), fields(notion_page_id = %input.notion_page_id))]
    pub async fn add_approved_page(
        &self,
        input: &ApprovedPageCreate,
    ) -> Result<ApprovedPage, AppError> {
        let id = Uuid::new_v4().to_string();

        let page = sqlx::query_as::<_, ApprovedPage>(
            r#"
            INSERT INTO approved_pages (id, notion_page_id, notion_url, title, access_level, added_by, added_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING id, notion_page_id, notion_url, title, access_level, added_by, added_at
            "#,
        )
        .bind(&id)
        .bind(&input.notion_page_id)
        .bind(&input.notion_url)
        .bind(&input.title)
        .bind(input.access_level)
        .bind(&input.added_by)
        .bind(now_epoch())
        .fetch_one(self.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Page is already approved"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to add approved page: {}", e)),
        })?;

        info!(page_id = %page.notion_page_id, level = ?page.access_level, "Page approved");
        Ok(page)
    }

    pub async fn find_approved_page(
        &self,
        notion_page_id: &str,
    ) -> Result<Option<ApprovedPage>, AppError> {
        sqlx::query_as::<_, ApprovedPage>(
            "SELECT * FROM approved_pages WHERE notion_page_id = ?1",
        )
        .bind(notion_page_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load grant: {}", e)))
    }

    pub async fn list_approved_pages(&self) -> Result<Vec<ApprovedPage>, AppError> {
        sqlx::query_as::<_, ApprovedPage>("SELECT * FROM approved_pages ORDER BY added_at DESC")
            .fetch_all(self.pool())
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list grants: {}", e)))
    }

    /// The full canonical-id set, used as the resolver's root set.
    pub async fn approved_page_ids(&self) -> Result<Vec<String>, AppError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT notion_page_id FROM approved_pages")
                .fetch_all(self.pool())
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to list grant ids: {}", e))
                })?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    #[instrument(skip(self))]
    pub async fn update_page_access_level(
        &self,
        id: &str,
        access_level: AccessLevel,
    ) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE approved_pages SET access_level = ?1 WHERE id = ?2")
            .bind(access_level)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update grant: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Approved page not found")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove_approved_page(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM approved_pages WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to remove grant: {}", e)))?;
        Ok(())
    }
}
