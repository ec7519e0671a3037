//! # Settings Repository
//!
//! Key/value store. Only the daily rental rate lives here today.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use toolrent_core::DAILY_RATE_KEY;

/// Repository for settings.
#[derive(Debug, Clone)]
pub struct SettingRepository {
    pool: SqlitePool,
}

impl SettingRepository {
    /// Creates a new SettingRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SettingRepository { pool }
    }

    /// Raw value for `key`.
    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let mut conn = self.pool.acquire().await?;
        get(&mut conn, key).await
    }

    /// Stored daily rate, or `default` when none has been set.
    pub async fn daily_rate(&self, default: i64) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        daily_rate(&mut conn, default).await
    }

    /// Stores the daily rate.
    ///
    /// Callers validate the value first (negatives are rejected in
    /// `LendingService::set_daily_rate`).
    pub async fn set_daily_rate(&self, value: i64) -> DbResult<()> {
        debug!(value, "Setting daily rate");
        self.set(DAILY_RATE_KEY, &value.to_string()).await
    }

    /// Upserts `key`.
    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub(crate) async fn get(conn: &mut SqliteConnection, key: &str) -> DbResult<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(value)
}

pub(crate) async fn daily_rate(conn: &mut SqliteConnection, default: i64) -> DbResult<i64> {
    match get(conn, DAILY_RATE_KEY).await? {
        Some(raw) => raw.trim().parse().map_err(|_| {
            warn!(value = %raw, "Stored daily rate is not an integer");
            DbError::Internal(format!("invalid {} value: {}", DAILY_RATE_KEY, raw))
        }),
        None => Ok(default),
    }
}
