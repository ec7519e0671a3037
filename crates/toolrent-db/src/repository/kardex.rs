//! # Kardex Repository
//!
//! Append-only movement log. Rows are only ever inserted (triggers in the
//! schema abort any UPDATE or DELETE) and always read back in insertion order.

use chrono::{NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use toolrent_core::{KardexEntry, MovementType};

/// Search criteria for the movement log. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct KardexFilter {
    pub tool_id: Option<String>,
    pub customer_rut: Option<String>,
    /// Matched case-insensitively, e.g. `"statechange:loaned"`.
    pub movement_type: Option<String>,
    /// Inclusive.
    pub from: Option<NaiveDate>,
    /// Inclusive.
    pub to: Option<NaiveDate>,
    /// Case-insensitive substring of the bucket's tool name.
    pub tool_name: Option<String>,
    /// Case-insensitive substring of the bucket's category.
    pub category: Option<String>,
}

impl KardexFilter {
    pub fn for_tool(tool_id: impl Into<String>) -> Self {
        KardexFilter {
            tool_id: Some(tool_id.into()),
            ..Default::default()
        }
    }

    pub fn for_customer(rut: impl Into<String>) -> Self {
        KardexFilter {
            customer_rut: Some(rut.into()),
            ..Default::default()
        }
    }

    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        KardexFilter {
            from: Some(from),
            to: Some(to),
            ..Default::default()
        }
    }
}

/// Repository for reading the movement log.
#[derive(Debug, Clone)]
pub struct KardexRepository {
    pool: SqlitePool,
}

impl KardexRepository {
    /// Creates a new KardexRepository.
    pub fn new(pool: SqlitePool) -> Self {
        KardexRepository { pool }
    }

    /// The whole log in insertion order.
    pub async fn list_all(&self) -> DbResult<Vec<KardexEntry>> {
        self.search(&KardexFilter::default()).await
    }

    /// Entries matching every set field of `filter`, in insertion order.
    pub async fn search(&self, filter: &KardexFilter) -> DbResult<Vec<KardexEntry>> {
        debug!(?filter, "Searching kardex");

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT k.id, k.tool_id, k.customer_rut, k.movement_type,
                   k.movement_date, k.stock, k.created_at
            FROM kardex k
            JOIN tools t ON t.id = k.tool_id
            WHERE 1 = 1
            "#,
        );

        if let Some(tool_id) = &filter.tool_id {
            qb.push(" AND k.tool_id = ").push_bind(tool_id.clone());
        }
        if let Some(rut) = &filter.customer_rut {
            qb.push(" AND k.customer_rut = ").push_bind(rut.clone());
        }
        if let Some(kind) = &filter.movement_type {
            qb.push(" AND k.movement_type = ")
                .push_bind(kind.trim().to_string())
                .push(" COLLATE NOCASE");
        }
        if let Some(from) = filter.from {
            qb.push(" AND k.movement_date >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND k.movement_date <= ").push_bind(to);
        }
        if let Some(name) = &filter.tool_name {
            qb.push(" AND lower(t.name) LIKE '%' || lower(")
                .push_bind(name.trim().to_string())
                .push(") || '%'");
        }
        if let Some(category) = &filter.category {
            qb.push(" AND lower(t.category) LIKE '%' || lower(")
                .push_bind(category.trim().to_string())
                .push(") || '%'");
        }

        qb.push(" ORDER BY k.rowid");

        let entries = qb
            .build_query_as::<KardexEntry>()
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// Number of entries in the log.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kardex")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Appends one entry.
pub(crate) async fn append(
    conn: &mut SqliteConnection,
    tool_id: &str,
    customer_rut: &str,
    movement_type: MovementType,
    movement_date: NaiveDate,
    stock: i64,
) -> DbResult<KardexEntry> {
    let entry = KardexEntry {
        id: Uuid::new_v4().to_string(),
        tool_id: tool_id.to_string(),
        customer_rut: customer_rut.to_string(),
        movement_type,
        movement_date,
        stock,
        created_at: Utc::now(),
    };

    debug!(tool_id = %tool_id, movement = %movement_type, stock, "Appending kardex entry");

    sqlx::query(
        r#"
        INSERT INTO kardex (
            id, tool_id, customer_rut, movement_type,
            movement_date, stock, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.tool_id)
    .bind(&entry.customer_rut)
    .bind(entry.movement_type.to_string())
    .bind(entry.movement_date)
    .bind(entry.stock)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(entry)
}
