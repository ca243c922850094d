use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::programs::refresh_projection;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{CourseRepo, ListParams, ListResult, ProjectionTarget},
    },
    models::{Course, CreateCourse, UpdateCourse},
};

pub struct PostgresCourseRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresCourseRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }
}

fn course_from_row(row: &PgRow) -> Course {
    Course {
        id: row.get("id"),
        code: row.get("code"),
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl CourseRepo for PostgresCourseRepo {
    async fn create(&self, input: &CreateCourse) -> DbResult<Course> {
        let row = sqlx::query(
            r#"
            INSERT INTO courses (id, code, name, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            RETURNING id, code, name, description, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.code)
        .bind(&input.name)
        .bind(&input.description)
        .fetch_one(&self.write_pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(format!("Course with code '{}' already exists", input.code))
            }
            _ => DbError::from(e),
        })?;

        Ok(course_from_row(&row))
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Course>> {
        let row = sqlx::query(
            "SELECT id, code, name, description, created_at, updated_at FROM courses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.read_pool)
        .await?;

        Ok(row.as_ref().map(course_from_row))
    }

    async fn list(&self, params: &ListParams) -> DbResult<ListResult<Course>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
            .fetch_one(&self.read_pool)
            .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT id, code, name, description, created_at, updated_at
            FROM courses
            ORDER BY {}
            LIMIT $1 OFFSET $2
            "#,
            params.order_by()
        ))
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.read_pool)
        .await?;

        Ok(ListResult::new(
            rows.iter().map(course_from_row).collect(),
            total,
            params,
        ))
    }

    async fn update(&self, id: Uuid, input: &UpdateCourse) -> DbResult<Course> {
        let mut tx = self.write_pool.begin().await?;

        let row = sqlx::query(
            "SELECT id, code, name, description, created_at, updated_at FROM courses WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;
        let mut course = course_from_row(&row);
        let renamed = input.name.as_ref().is_some_and(|name| *name != course.name);

        if let Some(name) = &input.name {
            course.name = name.clone();
        }
        if let Some(description) = &input.description {
            course.description = description.clone();
        }
        course.updated_at = chrono::Utc::now();

        sqlx::query("UPDATE courses SET name = $1, description = $2, updated_at = $3 WHERE id = $4")
            .bind(&course.name)
            .bind(&course.description)
            .bind(course.updated_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if renamed {
            refresh_projection(&mut tx, ProjectionTarget::Course(id)).await?;
        }

        tx.commit().await?;

        Ok(course)
    }

    async fn delete(&self, id: Uuid) -> DbResult<()> {
        let assigned = sqlx::query("SELECT 1 FROM program_courses WHERE course_id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&self.write_pool)
            .await?;
        if assigned.is_some() {
            return Err(DbError::Conflict(
                "Course is still assigned to programs".to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(&self.write_pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }
}
