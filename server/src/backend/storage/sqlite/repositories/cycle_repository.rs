use anyhow::Result;
use async_trait::async_trait;
use shared::{Concept, Cycle, Period};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::backend::domain::util::parse_concept;
use crate::backend::storage::sqlite::connection::DbConnection;
use crate::backend::storage::traits::CycleStore;

/// Repository for cycles and their billing calendars.
#[derive(Clone)]
pub struct CycleRepository {
    db: DbConnection,
}

impl CycleRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }
}

fn map_cycle(row: &SqliteRow) -> Cycle {
    Cycle {
        id: row.get("id"),
        label: row.get("label"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
    }
}

fn map_period(row: &SqliteRow) -> Period {
    // Anything that is not an enrollment row bills as tuition.
    let kind = parse_concept(&row.get::<String, _>("kind")).unwrap_or(Concept::Tuition);
    Period {
        cycle_id: row.get("cycle_id"),
        label: row.get("label"),
        kind,
        multiplier: row.get("multiplier"),
        due_date: row.get("due_date"),
        position: row.get("position"),
    }
}

#[async_trait]
impl CycleStore for CycleRepository {
    async fn insert_cycle(&self, cycle: &Cycle) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO cycles (label, start_date, end_date)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&cycle.label)
        .bind(cycle.start_date)
        .bind(cycle.end_date)
        .execute(self.db.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn get_cycle(&self, label: &str) -> Result<Option<Cycle>> {
        let row = sqlx::query(
            r#"
            SELECT id, label, start_date, end_date
            FROM cycles
            WHERE label = ?
            "#,
        )
        .bind(label)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(map_cycle))
    }

    async fn insert_period(&self, period: &Period) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cycle_calendar (cycle_id, label, kind, multiplier, due_date, position)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(period.cycle_id)
        .bind(&period.label)
        .bind(period.kind.as_str())
        .bind(period.multiplier)
        .bind(period.due_date)
        .bind(period.position)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn list_periods(&self, cycle_id: i64) -> Result<Vec<Period>> {
        let rows = sqlx::query(
            r#"
            SELECT cycle_id, label, kind, multiplier, due_date, position
            FROM cycle_calendar
            WHERE cycle_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(cycle_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(map_period).collect())
    }
}
