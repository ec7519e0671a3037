//! # Database Migrations
//!
//! The schema ships inside the binary via `sqlx::migrate!`.
//!
//! ```text
//! migrations/sqlite/
//! └── 001_initial_schema.sql   customers, tools, kardex (+ append-only
//!                              triggers), loans, loan_items, settings
//! ```
//!
//! Applied migrations are tracked in `_sqlx_migrations` by checksum, so an
//! edited file fails startup. Schema changes go in a new `NNN_*.sql` file.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies pending migrations in file order, each in its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let before = applied_count(pool).await?;
    MIGRATOR.run(pool).await?;
    let after = applied_count(pool).await?;

    info!(
        applied = after - before,
        total = MIGRATOR.migrations.len(),
        "Schema up to date"
    );
    Ok(())
}

/// `(embedded, applied)` migration counts.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();
    let applied = applied_count(pool).await?;

    debug!(total, applied, "Migration status");
    Ok((total, applied))
}

async fn applied_count(pool: &SqlitePool) -> DbResult<usize> {
    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations')",
    )
    .fetch_one(pool)
    .await?;
    if !table_exists {
        return Ok(0);
    }

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await?;
    Ok(applied.max(0) as usize)
}
