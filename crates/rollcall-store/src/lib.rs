//! PostgreSQL persistence adapter for Rollcall.
//!
//! Implements [`rollcall_core::traits::MemberStore`] over a `sqlx` Postgres
//! pool, with embedded migrations. Upserts are idempotent on the composite
//! primary key `(channel_id, member_id)` and never overwrite an existing
//! value with NULL, so re-harvests and concurrent jobs are harmless.

pub mod repository;

pub use repository::MemberRepository;

use rollcall_core::error::AppError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connects to the database and applies pending migrations.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| AppError::Generic(format!("Migration failed: {}", e)))?;

    Ok(pool)
}
