use anyhow::Result;
use async_trait::async_trait;
use shared::{Allocation, AllocationHistoryEntry};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::backend::storage::sqlite::connection::DbConnection;
use crate::backend::storage::traits::AllocationStore;

/// Repository for payment-to-period applications.
#[derive(Clone)]
pub struct AllocationRepository {
    db: DbConnection,
}

impl AllocationRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }
}

fn map_allocation(row: &SqliteRow) -> Allocation {
    Allocation {
        id: row.get("id"),
        payment_id: row.get("payment_id"),
        student_id: row.get("student_id"),
        cycle_id: row.get("cycle_id"),
        period: row.get("period"),
        amount: row.get("amount"),
    }
}

#[async_trait]
impl AllocationStore for AllocationRepository {
    async fn insert_allocations(&self, rows: &[Allocation]) -> Result<()> {
        // All rows of a payment land together or not at all; the payment
        // service compensates by deleting the payment when this fails.
        let mut tx = self.db.pool().begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO payment_allocations (payment_id, student_id, cycle_id, period, amount)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.payment_id)
            .bind(&row.student_id)
            .bind(row.cycle_id)
            .bind(&row.period)
            .bind(row.amount)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_for_student(&self, student_id: &str, cycle_id: i64) -> Result<Vec<Allocation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payment_id, student_id, cycle_id, period, amount
            FROM payment_allocations
            WHERE student_id = ? AND cycle_id = ?
            "#,
        )
        .bind(student_id)
        .bind(cycle_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(map_allocation).collect())
    }

    async fn list_for_cycle(&self, cycle_id: i64) -> Result<Vec<Allocation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payment_id, student_id, cycle_id, period, amount
            FROM payment_allocations
            WHERE cycle_id = ?
            "#,
        )
        .bind(cycle_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(map_allocation).collect())
    }

    async fn list_history(
        &self,
        student_id: &str,
        cycle_id: i64,
    ) -> Result<Vec<AllocationHistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT a.period, a.amount, p.paid_on, p.method
            FROM payment_allocations a
            JOIN payments p ON p.id = a.payment_id
            WHERE a.student_id = ? AND a.cycle_id = ?
            ORDER BY p.paid_on DESC
            "#,
        )
        .bind(student_id)
        .bind(cycle_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .iter()
            .map(|row| AllocationHistoryEntry {
                period: row.get("period"),
                amount: row.get("amount"),
                paid_on: row.get("paid_on"),
                method: row.get("method"),
            })
            .collect())
    }
}
