//! Repository suites shared by both backends.
//!
//! Each file holds `async fn`s over `&dyn <Aggregate>Repo` (plus direct SQL
//! probes where an invariant lives below the trait, such as specialization
//! rows or roster atomicity). `sqlite_test!` runs them on a migrated
//! in-memory database; `postgres_test!` runs them against a testcontainers
//! schema and is `#[ignore]`d, so `cargo test -- --ignored` needs Docker.

mod identities;
mod programs;
mod terms;
