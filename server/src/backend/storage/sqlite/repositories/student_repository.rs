use anyhow::Result;
use async_trait::async_trait;
use shared::Student;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::backend::domain::util::parse_level;
use crate::backend::storage::sqlite::connection::DbConnection;
use crate::backend::storage::traits::StudentStore;

/// Repository for student directory operations.
#[derive(Clone)]
pub struct StudentRepository {
    db: DbConnection,
}

impl StudentRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }
}

fn map_student(row: &SqliteRow) -> Student {
    Student {
        id: row.get("id"),
        code: row.get("code"),
        full_name: row.get("full_name"),
        sex: row.get("sex"),
        level: parse_level(&row.get::<String, _>("level")),
        grade: row.get("grade"),
        status: row.get("status"),
        official: row.get("official"),
    }
}

#[async_trait]
impl StudentStore for StudentRepository {
    async fn insert_student(&self, student: &Student) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO students (id, code, full_name, sex, level, grade, status, official)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&student.id)
        .bind(&student.code)
        .bind(&student.full_name)
        .bind(&student.sex)
        .bind(student.level.as_str())
        .bind(student.grade)
        .bind(&student.status)
        .bind(student.official)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn get_student(&self, student_id: &str) -> Result<Option<Student>> {
        let row = sqlx::query(
            r#"
            SELECT id, code, full_name, sex, level, grade, status, official
            FROM students
            WHERE id = ?
            "#,
        )
        .bind(student_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(map_student))
    }

    async fn list_students(&self) -> Result<Vec<Student>> {
        let rows = sqlx::query(
            r#"
            SELECT id, code, full_name, sex, level, grade, status, official
            FROM students
            ORDER BY level ASC, grade ASC, full_name ASC
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(map_student).collect())
    }
}
