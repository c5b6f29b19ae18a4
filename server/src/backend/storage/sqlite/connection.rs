//! SQLite connection management and schema setup.

use anyhow::Result;
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};
use std::sync::Arc;

const DATABASE_URL: &str = "sqlite:tuition.db";

/// Owns the connection pool and the schema. Cloning shares the pool.
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
}

impl DbConnection {
    /// Connect to `url`, creating the database and schema when missing.
    pub async fn new(url: &str) -> Result<Self> {
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url).await?;
        }

        let pool = SqlitePool::connect(url).await?;
        Self::setup_schema(&pool).await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Open the production database.
    pub async fn init() -> Result<Self> {
        Self::new(DATABASE_URL).await
    }

    /// In-memory database with a unique name, one per test.
    #[cfg(test)]
    pub async fn init_test() -> Result<Self> {
        let test_id = uuid::Uuid::new_v4().to_string();
        let url = format!("file:memdb_{}?mode=memory&cache=shared", test_id);
        Self::new(&url).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn setup_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS students (
                id TEXT PRIMARY KEY,
                code TEXT,
                full_name TEXT NOT NULL,
                sex TEXT NOT NULL DEFAULT 'H',
                level TEXT NOT NULL,
                grade INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'Activo',
                official INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id TEXT NOT NULL,
                concept TEXT NOT NULL,
                effective_from TEXT NOT NULL,
                base_amount REAL NOT NULL,
                notes TEXT
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_price_records_student
            ON price_records(student_id, effective_from DESC);
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cycles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                label TEXT NOT NULL UNIQUE,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cycle_calendar (
                cycle_id INTEGER NOT NULL,
                label TEXT NOT NULL,
                kind TEXT NOT NULL,
                multiplier REAL NOT NULL DEFAULT 1,
                due_date TEXT,
                position INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS payments (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL,
                cycle_id INTEGER NOT NULL,
                paid_on TEXT NOT NULL,
                amount REAL NOT NULL,
                kind TEXT,
                method TEXT,
                received_by TEXT,
                notes TEXT,
                origin TEXT NOT NULL DEFAULT 'UI'
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_payments_student_cycle
            ON payments(student_id, cycle_id, paid_on DESC);
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS payment_allocations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                payment_id TEXT NOT NULL,
                student_id TEXT NOT NULL,
                cycle_id INTEGER NOT NULL,
                period TEXT NOT NULL,
                amount REAL NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_allocations_student_cycle
            ON payment_allocations(student_id, cycle_id);
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS params (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS guardian_links (
                guardian_id TEXT NOT NULL,
                student_id TEXT NOT NULL,
                PRIMARY KEY (guardian_id, student_id)
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_setup_is_idempotent_on_a_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuition-test.db");
        let url = format!("sqlite:{}", path.display());

        let db = DbConnection::new(&url).await.unwrap();
        // Re-opening must not fail on the already-created tables.
        DbConnection::new(&url).await.unwrap();

        sqlx::query("SELECT COUNT(*) FROM students")
            .fetch_one(db.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn in_memory_databases_are_isolated() {
        let a = DbConnection::init_test().await.unwrap();
        let b = DbConnection::init_test().await.unwrap();

        sqlx::query("INSERT INTO params (key, value) VALUES ('ciclo_actual', '2024-2025')")
            .execute(a.pool())
            .await
            .unwrap();

        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM params")
            .fetch_one(b.pool())
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }
}
