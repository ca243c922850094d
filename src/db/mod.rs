mod error;
#[cfg(feature = "database-postgres")]
pub mod postgres;
pub mod repos;
#[cfg(feature = "database-sqlite")]
pub mod sqlite;

#[cfg(all(test, any(feature = "database-sqlite", feature = "database-postgres")))]
pub mod tests;

use std::sync::Arc;

pub use error::{DbError, DbResult};
pub use repos::*;

use crate::config::DatabaseConfig;

/// Primary pool plus the optional replica used by list queries.
#[cfg(feature = "database-postgres")]
pub struct PgPoolPair {
    pub write: sqlx::PgPool,
    pub read: Option<sqlx::PgPool>,
}

/// One repository per aggregate, built once per pool.
struct CachedRepos {
    identities: Arc<dyn IdentityRepo>,
    programs: Arc<dyn ProgramRepo>,
    terms: Arc<dyn TermRepo>,
    courses: Arc<dyn CourseRepo>,
}

impl CachedRepos {
    #[cfg(feature = "database-sqlite")]
    fn sqlite(pool: &sqlx::SqlitePool) -> Self {
        Self {
            identities: Arc::new(sqlite::SqliteIdentityRepo::new(pool.clone())),
            programs: Arc::new(sqlite::SqliteProgramRepo::new(pool.clone())),
            terms: Arc::new(sqlite::SqliteTermRepo::new(pool.clone())),
            courses: Arc::new(sqlite::SqliteCourseRepo::new(pool.clone())),
        }
    }

    #[cfg(feature = "database-postgres")]
    fn postgres(write_pool: &sqlx::PgPool, read_pool: &Option<sqlx::PgPool>) -> Self {
        Self {
            identities: Arc::new(postgres::PostgresIdentityRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            programs: Arc::new(postgres::PostgresProgramRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            terms: Arc::new(postgres::PostgresTermRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            courses: Arc::new(postgres::PostgresCourseRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
        }
    }
}

enum PoolStorage {
    #[cfg(feature = "database-sqlite")]
    Sqlite(sqlx::SqlitePool),
    #[cfg(feature = "database-postgres")]
    Postgres(PgPoolPair),
    #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
    _None(std::convert::Infallible),
}

/// Storage handle shared by the services.
///
/// Hands out the identity, program, term and course repositories for
/// whichever backend the config selected.
pub struct DbPool {
    inner: PoolStorage,
    repos: CachedRepos,
}

impl DbPool {
    /// Wrap an already-open pool; tests use this with `:memory:`.
    #[cfg(feature = "database-sqlite")]
    pub fn from_sqlite(pool: sqlx::SqlitePool) -> Self {
        DbPool {
            repos: CachedRepos::sqlite(&pool),
            inner: PoolStorage::Sqlite(pool),
        }
    }

    #[cfg(feature = "database-postgres")]
    pub fn from_postgres(write_pool: sqlx::PgPool, read_pool: Option<sqlx::PgPool>) -> Self {
        DbPool {
            repos: CachedRepos::postgres(&write_pool, &read_pool),
            inner: PoolStorage::Postgres(PgPoolPair {
                write: write_pool,
                read: read_pool,
            }),
        }
    }

    pub async fn from_config(config: &DatabaseConfig) -> DbResult<Self> {
        match config {
            DatabaseConfig::None => Err(DbError::NotConfigured),
            #[cfg(feature = "database-sqlite")]
            DatabaseConfig::Sqlite(cfg) => {
                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(cfg.max_connections)
                    .connect_with(
                        sqlx::sqlite::SqliteConnectOptions::new()
                            .filename(&cfg.path)
                            .create_if_missing(cfg.create_if_missing)
                            .foreign_keys(true)
                            .journal_mode(if cfg.wal_mode {
                                sqlx::sqlite::SqliteJournalMode::Wal
                            } else {
                                sqlx::sqlite::SqliteJournalMode::Delete
                            })
                            .busy_timeout(std::time::Duration::from_millis(cfg.busy_timeout_ms)),
                    )
                    .await?;

                Ok(Self::from_sqlite(pool))
            }
            #[cfg(feature = "database-postgres")]
            DatabaseConfig::Postgres(cfg) => {
                let write_pool = sqlx::postgres::PgPoolOptions::new()
                    .min_connections(cfg.min_connections)
                    .max_connections(cfg.max_connections)
                    .acquire_timeout(std::time::Duration::from_secs(cfg.connect_timeout_secs))
                    .idle_timeout(std::time::Duration::from_secs(cfg.idle_timeout_secs))
                    .connect(&cfg.url)
                    .await?;

                let read_pool = if let Some(read_url) = &cfg.read_url {
                    tracing::info!("Using read replica for list queries");
                    Some(
                        sqlx::postgres::PgPoolOptions::new()
                            .min_connections(cfg.min_connections)
                            .max_connections(cfg.max_connections)
                            .acquire_timeout(std::time::Duration::from_secs(
                                cfg.connect_timeout_secs,
                            ))
                            .idle_timeout(std::time::Duration::from_secs(cfg.idle_timeout_secs))
                            .connect(read_url)
                            .await?,
                    )
                } else {
                    None
                };

                Ok(Self::from_postgres(write_pool, read_pool))
            }
        }
    }

    /// Apply `migrations_sqlx/<backend>` on the primary pool.
    pub async fn run_migrations(&self) -> DbResult<()> {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => {
                sqlx::migrate!("./migrations_sqlx/sqlite").run(pool).await?;
                tracing::info!(backend = "sqlite", "Schema up to date");
                Ok(())
            }
            #[cfg(feature = "database-postgres")]
            PoolStorage::Postgres(pools) => {
                sqlx::migrate!("./migrations_sqlx/postgres")
                    .run(&pools.write)
                    .await?;
                tracing::info!(backend = "postgres", "Schema up to date");
                Ok(())
            }
            #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
            PoolStorage::_None(infallible) => match *infallible {},
        }
    }

    /// Base identities plus their role specializations.
    pub fn identities(&self) -> Arc<dyn IdentityRepo> {
        Arc::clone(&self.repos.identities)
    }

    /// Program slots and their rosters.
    pub fn programs(&self) -> Arc<dyn ProgramRepo> {
        Arc::clone(&self.repos.programs)
    }

    pub fn terms(&self) -> Arc<dyn TermRepo> {
        Arc::clone(&self.repos.terms)
    }

    pub fn courses(&self) -> Arc<dyn CourseRepo> {
        Arc::clone(&self.repos.courses)
    }

    /// `SELECT 1` against every pool; backs `GET /health`.
    pub async fn health_check(&self) -> DbResult<()> {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
                Ok(())
            }
            #[cfg(feature = "database-postgres")]
            PoolStorage::Postgres(pools) => {
                sqlx::query("SELECT 1").execute(&pools.write).await?;
                if let Some(read) = &pools.read {
                    sqlx::query("SELECT 1").execute(read).await?;
                }
                Ok(())
            }
            #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
            PoolStorage::_None(infallible) => match *infallible {},
        }
    }
}
