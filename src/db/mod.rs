//! Connection pool setup.
//!
//! Owns the one `PgPool` the whole server shares. Migrations run from here
//! so a schema mismatch fails startup instead of the first query.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Connect, size the pool, and bring the schema up to date.
///
/// The pool holds 5 connections unless `DB_MAX_CONNECTIONS` overrides it.
///
/// # Errors
///
/// Fails if the database is unreachable or a migration cannot be applied.
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let max_connections = std::env::var("DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("src/db/migrations").run(&pool).await?;
    Ok(pool)
}
