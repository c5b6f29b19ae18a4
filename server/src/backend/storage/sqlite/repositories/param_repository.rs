use anyhow::Result;
use async_trait::async_trait;
use sqlx::Row;
use std::collections::HashMap;

use crate::backend::storage::sqlite::connection::DbConnection;
use crate::backend::storage::traits::ParamStore;

/// Repository for system parameters.
#[derive(Clone)]
pub struct ParamRepository {
    db: DbConnection,
}

impl ParamRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ParamStore for ParamRepository {
    async fn set_param(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO params (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn get_param(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM params WHERE key = ?")
            .bind(key)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.map(|r| r.get("value")))
    }

    async fn get_params(&self, keys: &[String]) -> Result<HashMap<String, String>> {
        // The table holds a handful of rows; filter in memory.
        let rows = sqlx::query("SELECT key, value FROM params")
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows
            .iter()
            .map(|r| (r.get::<String, _>("key"), r.get::<String, _>("value")))
            .filter(|(key, _)| keys.is_empty() || keys.iter().any(|k| k == key))
            .collect())
    }
}
