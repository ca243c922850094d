use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::{common::parse_uuid, programs::refresh_projection};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{CourseRepo, ListParams, ListResult, ProjectionTarget},
    },
    models::{Course, CreateCourse, UpdateCourse},
};

pub struct SqliteCourseRepo {
    pool: SqlitePool,
}

impl SqliteCourseRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn course_from_row(row: &SqliteRow) -> DbResult<Course> {
    Ok(Course {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        code: row.get("code"),
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl CourseRepo for SqliteCourseRepo {
    async fn create(&self, input: &CreateCourse) -> DbResult<Course> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO courses (id, code, name, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&input.code)
        .bind(&input.name)
        .bind(&input.description)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(format!("Course with code '{}' already exists", input.code))
            }
            _ => DbError::from(e),
        })?;

        Ok(Course {
            id,
            code: input.code.clone(),
            name: input.name.clone(),
            description: input.description.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Course>> {
        let row = sqlx::query(
            "SELECT id, code, name, description, created_at, updated_at FROM courses WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(course_from_row).transpose()
    }

    async fn list(&self, params: &ListParams) -> DbResult<ListResult<Course>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT id, code, name, description, created_at, updated_at
            FROM courses
            ORDER BY {}
            LIMIT ? OFFSET ?
            "#,
            params.order_by()
        ))
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .iter()
            .map(course_from_row)
            .collect::<DbResult<Vec<_>>>()?;

        Ok(ListResult::new(items, total, params))
    }

    async fn update(&self, id: Uuid, input: &UpdateCourse) -> DbResult<Course> {
        let mut course = self.get_by_id(id).await?.ok_or(DbError::NotFound)?;
        let renamed = input.name.as_ref().is_some_and(|name| *name != course.name);

        if let Some(name) = &input.name {
            course.name = name.clone();
        }
        if let Some(description) = &input.description {
            course.description = description.clone();
        }
        course.updated_at = chrono::Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE courses SET name = ?, description = ?, updated_at = ? WHERE id = ?")
            .bind(&course.name)
            .bind(&course.description)
            .bind(course.updated_at)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        if renamed {
            refresh_projection(&mut tx, ProjectionTarget::Course(id)).await?;
        }

        tx.commit().await?;

        Ok(course)
    }

    async fn delete(&self, id: Uuid) -> DbResult<()> {
        let assigned = sqlx::query("SELECT 1 FROM program_courses WHERE course_id = ? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        if assigned.is_some() {
            return Err(DbError::Conflict(
                "Course is still assigned to programs".to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM courses WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }
}
