use anyhow::Result;
use async_trait::async_trait;

use crate::backend::storage::sqlite::connection::DbConnection;
use crate::backend::storage::traits::GuardianStore;

/// Repository for guardian-to-student links.
#[derive(Clone)]
pub struct GuardianRepository {
    db: DbConnection,
}

impl GuardianRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GuardianStore for GuardianRepository {
    async fn link(&self, guardian_id: &str, student_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO guardian_links (guardian_id, student_id)
            VALUES (?, ?)
            "#,
        )
        .bind(guardian_id)
        .bind(student_id)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn is_linked(&self, guardian_id: &str, student_id: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM guardian_links
            WHERE guardian_id = ? AND student_id = ?
            LIMIT 1
            "#,
        )
        .bind(guardian_id)
        .bind(student_id)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.is_some())
    }
}
