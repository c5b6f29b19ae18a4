use anyhow::Result;
use async_trait::async_trait;
use shared::{Payment, PaymentKind};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::backend::domain::util::parse_payment_kind;
use crate::backend::storage::sqlite::connection::DbConnection;
use crate::backend::storage::traits::PaymentStore;

/// Repository for cash receipts.
#[derive(Clone)]
pub struct PaymentRepository {
    db: DbConnection,
}

impl PaymentRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }
}

fn map_payment(row: &SqliteRow) -> Payment {
    let kind = row
        .get::<Option<String>, _>("kind")
        .map(|raw| parse_payment_kind(&raw))
        .unwrap_or(PaymentKind::Other);
    Payment {
        id: row.get("id"),
        student_id: row.get("student_id"),
        cycle_id: row.get("cycle_id"),
        paid_on: row.get("paid_on"),
        amount: row.get("amount"),
        kind,
        method: row.get("method"),
        received_by: row.get("received_by"),
        notes: row.get("notes"),
        origin: row.get("origin"),
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments
                (id, student_id, cycle_id, paid_on, amount, kind, method, received_by, notes, origin)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.student_id)
        .bind(payment.cycle_id)
        .bind(payment.paid_on)
        .bind(payment.amount)
        .bind(payment.kind.as_str())
        .bind(&payment.method)
        .bind(&payment.received_by)
        .bind(&payment.notes)
        .bind(&payment.origin)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn delete_payment(&self, payment_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM payments WHERE id = ?")
            .bind(payment_id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn list_payments(
        &self,
        student_id: &str,
        cycle_id: i64,
        limit: Option<u32>,
    ) -> Result<Vec<Payment>> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query(
            r#"
            SELECT id, student_id, cycle_id, paid_on, amount, kind, method, received_by, notes, origin
            FROM payments
            WHERE student_id = ? AND cycle_id = ?
            ORDER BY paid_on DESC
            LIMIT ?
            "#,
        )
        .bind(student_id)
        .bind(cycle_id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(map_payment).collect())
    }

    async fn list_cycle_payments(&self, cycle_id: i64) -> Result<Vec<Payment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, student_id, cycle_id, paid_on, amount, kind, method, received_by, notes, origin
            FROM payments
            WHERE cycle_id = ?
            ORDER BY paid_on ASC
            "#,
        )
        .bind(cycle_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(map_payment).collect())
    }
}
