use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::{common::parse_uuid, programs::refresh_projection};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{ListParams, ListResult, ProjectionTarget, TermRepo},
    },
    models::{CreateTerm, Term, UpdateTerm},
};

pub struct SqliteTermRepo {
    pool: SqlitePool,
}

impl SqliteTermRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn term_from_row(row: &SqliteRow) -> DbResult<Term> {
    Ok(Term {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        name: row.get("name"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl TermRepo for SqliteTermRepo {
    async fn create(&self, input: &CreateTerm) -> DbResult<Term> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO terms (id, name, start_date, end_date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&input.name)
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Term {
            id,
            name: input.name.clone(),
            start_date: input.start_date,
            end_date: input.end_date,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Term>> {
        let row = sqlx::query(
            "SELECT id, name, start_date, end_date, created_at, updated_at FROM terms WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(term_from_row).transpose()
    }

    async fn list(&self, params: &ListParams) -> DbResult<ListResult<Term>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM terms")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT id, name, start_date, end_date, created_at, updated_at
            FROM terms
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
            .map(term_from_row)
            .collect::<DbResult<Vec<_>>>()?;

        Ok(ListResult::new(items, total, params))
    }

    async fn update(&self, id: Uuid, input: &UpdateTerm) -> DbResult<Term> {
        let mut term = self.get_by_id(id).await?.ok_or(DbError::NotFound)?;
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

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE terms SET name = ?, start_date = ?, end_date = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&term.name)
        .bind(term.start_date)
        .bind(term.end_date)
        .bind(term.updated_at)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        if renamed {
            refresh_projection(&mut tx, ProjectionTarget::Term(id)).await?;
        }

        tx.commit().await?;

        Ok(term)
    }

    async fn delete(&self, id: Uuid) -> DbResult<()> {
        let referenced = sqlx::query("SELECT 1 FROM programs WHERE term_id = ? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        if referenced.is_some() {
            return Err(DbError::Conflict(
                "Term is still referenced by programs".to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM terms WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }
}
