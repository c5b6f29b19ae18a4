use anyhow::Result;
use async_trait::async_trait;
use shared::{Concept, PriceRecord};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::backend::domain::util::parse_concept;
use crate::backend::storage::sqlite::connection::DbConnection;
use crate::backend::storage::traits::PriceStore;

/// Repository for the append-only price histories.
#[derive(Clone)]
pub struct PriceRepository {
    db: DbConnection,
}

impl PriceRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }
}

/// Rows whose concept column is not a known billing concept are dropped at
/// the boundary so the domain math never sees them.
fn map_price(row: &SqliteRow) -> Option<PriceRecord> {
    let concept = parse_concept(&row.get::<String, _>("concept"))?;
    Some(PriceRecord {
        id: row.get("id"),
        student_id: row.get("student_id"),
        concept,
        effective_from: row.get("effective_from"),
        base_amount: row.get("base_amount"),
        notes: row.get("notes"),
    })
}

#[async_trait]
impl PriceStore for PriceRepository {
    async fn insert_price(&self, record: &PriceRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_records (student_id, concept, effective_from, base_amount, notes)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.student_id)
        .bind(record.concept.as_str())
        .bind(record.effective_from)
        .bind(record.base_amount)
        .bind(&record.notes)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn list_prices(
        &self,
        student_id: &str,
        concept: Option<Concept>,
    ) -> Result<Vec<PriceRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, student_id, concept, effective_from, base_amount, notes
            FROM price_records
            WHERE student_id = ?
            ORDER BY effective_from DESC, id DESC
            "#,
        )
        .bind(student_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .iter()
            .filter_map(map_price)
            .filter(|r| concept.map_or(true, |c| r.concept == c))
            .collect())
    }

    async fn list_all_prices(&self) -> Result<Vec<PriceRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, student_id, concept, effective_from, base_amount, notes
            FROM price_records
            ORDER BY effective_from DESC, id DESC
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().filter_map(map_price).collect())
    }
}
