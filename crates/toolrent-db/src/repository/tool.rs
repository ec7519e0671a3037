//! # Tool Bucket Repository
//!
//! Row-level operations on the `tools` table. Every mutating function takes a
//! `&mut SqliteConnection` so it runs inside the caller's transaction; the
//! engine rules live in [`crate::inventory`].
//!
//! ## Why conditional updates?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Lost update (read, then write):                                        │
//! │    T1 reads qty=1      T2 reads qty=1                                   │
//! │    T1 writes qty=0     T2 writes qty=0   → one unit moved twice ❌      │
//! │                                                                         │
//! │  Conditional decrement (single statement):                              │
//! │    UPDATE tools SET quantity = quantity - 1                             │
//! │     WHERE id = ? AND quantity > 0                                       │
//! │    T1: 1 row  ✓         T2: 0 rows → InsufficientStock ✓                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use toolrent_core::{NameCategory, ToolBucket, ToolState};

/// Read-side repository for tool buckets.
#[derive(Debug, Clone)]
pub struct ToolRepository {
    pool: SqlitePool,
}

impl ToolRepository {
    /// Creates a new ToolRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ToolRepository { pool }
    }

    /// Gets a bucket by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<ToolBucket>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// First bucket (in insertion order) with exactly this name.
    pub async fn find_by_name(&self, name: &str) -> DbResult<Option<ToolBucket>> {
        debug!(name = %name, "Finding tool by name");

        let bucket = sqlx::query_as::<_, ToolBucket>(
            "SELECT * FROM tools WHERE name = ?1 ORDER BY rowid LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(bucket)
    }

    /// Every (name, category) pair ever received, in first-seen order.
    pub async fn names_with_category(&self) -> DbResult<Vec<NameCategory>> {
        let pairs = sqlx::query_as::<_, NameCategory>(
            r#"
            SELECT name, category
            FROM tools
            GROUP BY name, category
            ORDER BY MIN(rowid)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(pairs)
    }

    /// Buckets in `state`. With `in_stock_only`, zero-quantity rows are skipped.
    pub async fn list_by_state(
        &self,
        state: ToolState,
        in_stock_only: bool,
    ) -> DbResult<Vec<ToolBucket>> {
        debug!(state = %state, in_stock_only, "Listing tool buckets");

        let sql = if in_stock_only {
            "SELECT * FROM tools WHERE state = ?1 AND quantity > 0 ORDER BY rowid"
        } else {
            "SELECT * FROM tools WHERE state = ?1 ORDER BY rowid"
        };

        let buckets = sqlx::query_as::<_, ToolBucket>(sql)
            .bind(state)
            .fetch_all(&self.pool)
            .await?;

        Ok(buckets)
    }

    /// Total units of a tool type across all states.
    pub async fn total_units(&self, name: &str, category: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM tools WHERE name = ?1 AND category = ?2",
        )
        .bind(name)
        .bind(category)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<ToolBucket>> {
    let bucket = sqlx::query_as::<_, ToolBucket>("SELECT * FROM tools WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(bucket)
}

/// Takes one unit out of `id` unless it is empty or already in `target`.
///
/// Returns the source row after the decrement, or `None` when nothing was
/// taken (the caller works out why).
pub(crate) async fn take_one(
    conn: &mut SqliteConnection,
    id: &str,
    target: ToolState,
    now: DateTime<Utc>,
) -> DbResult<Option<ToolBucket>> {
    let source = sqlx::query_as::<_, ToolBucket>(
        r#"
        UPDATE tools
        SET quantity = quantity - 1, updated_at = ?3
        WHERE id = ?1 AND quantity > 0 AND state <> ?2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(target)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(source)
}

/// Adds `amount` to the first (name, category, state) bucket.
///
/// `replacement_value` overwrites the stored value when given. Returns `None`
/// if no such bucket exists yet.
pub(crate) async fn add_to_first(
    conn: &mut SqliteConnection,
    name: &str,
    category: &str,
    state: ToolState,
    amount: i64,
    replacement_value: Option<i64>,
    now: DateTime<Utc>,
) -> DbResult<Option<ToolBucket>> {
    let bucket = sqlx::query_as::<_, ToolBucket>(
        r#"
        UPDATE tools
        SET quantity = quantity + ?4,
            replacement_value = COALESCE(?5, replacement_value),
            updated_at = ?6
        WHERE id = (
            SELECT id FROM tools
            WHERE name = ?1 AND category = ?2 AND state = ?3
            ORDER BY rowid
            LIMIT 1
        )
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(category)
    .bind(state)
    .bind(amount)
    .bind(replacement_value)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(bucket)
}

pub(crate) async fn insert(conn: &mut SqliteConnection, bucket: &ToolBucket) -> DbResult<()> {
    debug!(id = %bucket.id, name = %bucket.name, state = %bucket.state, "Inserting tool bucket");

    sqlx::query(
        r#"
        INSERT INTO tools (
            id, name, category, state,
            replacement_value, quantity, is_available,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&bucket.id)
    .bind(&bucket.name)
    .bind(&bucket.category)
    .bind(bucket.state)
    .bind(bucket.replacement_value)
    .bind(bucket.quantity)
    .bind(bucket.is_available)
    .bind(bucket.created_at)
    .bind(bucket.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Overwrites the quantity. Returns the updated row, `None` if absent.
pub(crate) async fn set_quantity(
    conn: &mut SqliteConnection,
    id: &str,
    quantity: i64,
    now: DateTime<Utc>,
) -> DbResult<Option<ToolBucket>> {
    let bucket = sqlx::query_as::<_, ToolBucket>(
        "UPDATE tools SET quantity = ?2, updated_at = ?3 WHERE id = ?1 RETURNING *",
    )
    .bind(id)
    .bind(quantity)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(bucket)
}

/// Overwrites the replacement value. Returns the updated row, `None` if absent.
pub(crate) async fn set_replacement_value(
    conn: &mut SqliteConnection,
    id: &str,
    value: i64,
    now: DateTime<Utc>,
) -> DbResult<Option<ToolBucket>> {
    let bucket = sqlx::query_as::<_, ToolBucket>(
        "UPDATE tools SET replacement_value = ?2, updated_at = ?3 WHERE id = ?1 RETURNING *",
    )
    .bind(id)
    .bind(value)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(bucket)
}
