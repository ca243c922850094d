//! Shared tests for TermRepo implementations

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
    db::{
        error::DbError,
        repos::{ListParams, TERM_SORT, TermRepo},
    },
    models::{CreateTerm, UpdateTerm},
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn create_term_input(name: &str) -> CreateTerm {
    CreateTerm {
        name: name.to_string(),
        start_date: date(2025, 9, 1),
        end_date: date(2026, 1, 31),
    }
}

pub struct TermTestContext<'a> {
    pub repo: &'a dyn TermRepo,
}

pub async fn test_create_and_get(ctx: &TermTestContext<'_>) {
    let created = ctx
        .repo
        .create(&create_term_input("Fall 2025"))
        .await
        .expect("Failed to create term");

    let fetched = ctx
        .repo
        .get_by_id(created.id)
        .await
        .unwrap()
        .expect("term should exist");

    assert_eq!(fetched.name, "Fall 2025");
    assert_eq!(fetched.start_date, date(2025, 9, 1));
    assert_eq!(fetched.end_date, date(2026, 1, 31));
}

pub async fn test_get_not_found(ctx: &TermTestContext<'_>) {
    assert!(ctx.repo.get_by_id(Uuid::new_v4()).await.unwrap().is_none());
}

pub async fn test_list_sorted_by_name(ctx: &TermTestContext<'_>) {
    for name in ["Spring", "Fall", "Summer"] {
        ctx.repo.create(&create_term_input(name)).await.unwrap();
    }

    let params = ListParams::resolve(&TERM_SORT, None, None, Some("name"), Some("asc"), 20, 100);
    let result = ctx.repo.list(&params).await.unwrap();

    assert_eq!(result.total, 3);
    let names: Vec<_> = result.items.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Fall", "Spring", "Summer"]);
}

pub async fn test_update_partial(ctx: &TermTestContext<'_>) {
    let term = ctx.repo.create(&create_term_input("Draft")).await.unwrap();

    let updated = ctx
        .repo
        .update(
            term.id,
            &UpdateTerm {
                name: Some("Final".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.name, "Final");
    assert_eq!(updated.start_date, term.start_date);
}

pub async fn test_update_rejects_inverted_range(ctx: &TermTestContext<'_>) {
    let term = ctx.repo.create(&create_term_input("Range")).await.unwrap();

    let result = ctx
        .repo
        .update(
            term.id,
            &UpdateTerm {
                end_date: Some(date(2025, 8, 1)),
                ..Default::default()
            },
        )
        .await;

    assert!(matches!(result, Err(DbError::Validation(_))));
}

pub async fn test_update_not_found(ctx: &TermTestContext<'_>) {
    let result = ctx
        .repo
        .update(Uuid::new_v4(), &UpdateTerm::default())
        .await;
    assert!(matches!(result, Err(DbError::NotFound)));
}

pub async fn test_delete(ctx: &TermTestContext<'_>) {
    let term = ctx.repo.create(&create_term_input("Gone")).await.unwrap();

    ctx.repo.delete(term.id).await.unwrap();
    assert!(ctx.repo.get_by_id(term.id).await.unwrap().is_none());

    let again = ctx.repo.delete(term.id).await;
    assert!(matches!(again, Err(DbError::NotFound)));
}

#[cfg(all(test, feature = "database-sqlite"))]
mod sqlite_tests {
    use super::*;
    use crate::db::{
        sqlite::SqliteTermRepo,
        tests::harness::{create_sqlite_pool, run_sqlite_migrations},
    };

    macro_rules! sqlite_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let pool = create_sqlite_pool().await;
                run_sqlite_migrations(&pool).await;
                let repo = SqliteTermRepo::new(pool);
                let ctx = TermTestContext { repo: &repo };
                super::$name(&ctx).await;
            }
        };
    }

    sqlite_test!(test_create_and_get);
    sqlite_test!(test_get_not_found);
    sqlite_test!(test_list_sorted_by_name);
    sqlite_test!(test_update_partial);
    sqlite_test!(test_update_rejects_inverted_range);
    sqlite_test!(test_update_not_found);
    sqlite_test!(test_delete);
}

#[cfg(all(test, feature = "database-postgres"))]
mod postgres_tests {
    use super::*;
    use crate::db::{
        postgres::PostgresTermRepo,
        tests::harness::postgres::{create_isolated_postgres_pool, run_postgres_migrations},
    };

    macro_rules! postgres_test {
        ($name:ident) => {
            #[tokio::test]
            #[ignore = "Requires Docker - run with `cargo test -- --ignored`"]
            async fn $name() {
                let pool = create_isolated_postgres_pool().await;
                run_postgres_migrations(&pool).await;
                let repo = PostgresTermRepo::new(pool, None);
                let ctx = TermTestContext { repo: &repo };
                super::$name(&ctx).await;
            }
        };
    }

    postgres_test!(test_create_and_get);
    postgres_test!(test_get_not_found);
    postgres_test!(test_list_sorted_by_name);
    postgres_test!(test_update_partial);
    postgres_test!(test_update_rejects_inverted_range);
    postgres_test!(test_update_not_found);
    postgres_test!(test_delete);
}
