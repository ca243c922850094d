use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::programs::refresh_projection;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{ListParams, ListResult, ProjectionTarget, TermRepo},
    },
    models::{CreateTerm, Term, UpdateTerm},
};

pub struct PostgresTermRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresTermRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }
}

fn term_from_row(row: &PgRow) -> Term {
    Term {
        id: row.get("id"),
        name: row.get("name"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl TermRepo for PostgresTermRepo {
    async fn create(&self, input: &CreateTerm) -> DbResult<Term> {
        let row = sqlx::query(
            r#"
            INSERT INTO terms (id, name, start_date, end_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            RETURNING id, name, start_date, end_date, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(input.start_date)
        .bind(input.end_date)
        .fetch_one(&self.write_pool)
        .await?;

        Ok(term_from_row(&row))
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Term>> {
        let row = sqlx::query(
            "SELECT id, name, start_date, end_date, created_at, updated_at FROM terms WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.read_pool)
        .await?;

        Ok(row.as_ref().map(term_from_row))
    }

    async fn list(&self, params: &ListParams) -> DbResult<ListResult<Term>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM terms")
            .fetch_one(&self.read_pool)
            .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT id, name, start_date, end_date, created_at, updated_at
            FROM terms
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
            rows.iter().map(term_from_row).collect(),
            total,
            params,
        ))
    }

    async fn update(&self, id: Uuid, input: &UpdateTerm) -> DbResult<Term> {
        let mut tx = self.write_pool.begin().await?;

        let row = sqlx::query(
            "SELECT id, name, start_date, end_date, created_at, updated_at FROM terms WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;
        let mut term = term_from_row(&row);
        let renamed = input.name.as_ref().is_some_and(|name| *name != term.name);

        if let Some(name) = &input.name {
            term.name = name.clone();
        }
        if let Some(start_date) = input.start_date {
            term.start_date = start_date;
        }
        if let Some(end_date) = input.end_date {
            term.end_date = end_date;
        }
        if term.start_date >= term.end_date {
            return Err(DbError::Validation(
                "start_date must be before end_date".to_string(),
            ));
        }
        term.updated_at = chrono::Utc::now();

        sqlx::query(
            "UPDATE terms SET name = $1, start_date = $2, end_date = $3, updated_at = $4 WHERE id = $5",
        )
        .bind(&term.name)
        .bind(term.start_date)
        .bind(term.end_date)
        .bind(term.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if renamed {
            refresh_projection(&mut tx, ProjectionTarget::Term(id)).await?;
        }

        tx.commit().await?;

        Ok(term)
    }

    async fn delete(&self, id: Uuid) -> DbResult<()> {
        let referenced = sqlx::query("SELECT 1 FROM programs WHERE term_id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&self.write_pool)
            .await?;
        if referenced.is_some() {
            return Err(DbError::Conflict(
                "Term is still referenced by programs".to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM terms WHERE id = $1")
            .bind(id)
            .execute(&self.write_pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }
}
