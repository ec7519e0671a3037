//! # Inventory Bucket Engine
//!
//! Holds per-(name, category, state) unit counters and moves units between
//! them, one at a time, with one kardex entry per mutation.
//!
//! ## Transition
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  transition(bucket "Drill/Electric/Available" qty 3, Loaned)            │
//! │                                                                         │
//! │  1. take one from source          Available  3 → 2                      │
//! │     (0 left → InsufficientStock)                                        │
//! │  2. first (Drill, Electric, Loaned) bucket, or a new one               │
//! │  3. add one to target             Loaned     0 → 1                      │
//! │  4. kardex: target id, "StateChange:Loaned", stock = 1                 │
//! │                                                                         │
//! │  Returns the TARGET row. Callers keep that id as the unit's location.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The target is looked up by (name, category, state), never by id: several
//! rows may share a state over time, and the first one wins.

use chrono::{Local, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::repository::{kardex, tool};
use toolrent_core::validation::{validate_non_negative, validate_receive, validate_tool_name};
use toolrent_core::{
    CoreError, MovementType, NameCategory, ReceiveTool, ToolBucket, ToolState,
    ValidationError,
};

/// Result of moving one unit.
#[derive(Debug, Clone)]
pub(crate) struct UnitMove {
    /// Source row after the decrement.
    pub source: ToolBucket,
    /// Target row after the increment.
    pub target: ToolBucket,
}

/// Moves one unit from `bucket_id` into the (name, category, `target`) bucket.
///
/// Runs on the caller's connection; the caller owns the transaction.
pub(crate) async fn move_one_unit(
    conn: &mut SqliteConnection,
    bucket_id: &str,
    target: ToolState,
    actor: &str,
    date: NaiveDate,
) -> ServiceResult<UnitMove> {
    let now = Utc::now();

    let source = match tool::take_one(conn, bucket_id, target, now).await? {
        Some(source) => source,
        None => {
            let err: ServiceError = match tool::fetch(conn, bucket_id).await? {
                None => CoreError::not_found("Tool", bucket_id).into(),
                Some(bucket) if bucket.state == target => ValidationError::SameState {
                    tool_id: bucket.id,
                    state: target,
                }
                .into(),
                Some(bucket) => CoreError::InsufficientStock {
                    bucket_id: bucket.id,
                    name: bucket.name,
                    state: bucket.state,
                }
                .into(),
            };
            return Err(err);
        }
    };

    let target_bucket = match tool::add_to_first(
        conn,
        &source.name,
        &source.category,
        target,
        1,
        None,
        now,
    )
    .await?
    {
        Some(bucket) => bucket,
        None => {
            // Created already holding the moved unit.
            let bucket = ToolBucket {
                id: Uuid::new_v4().to_string(),
                name: source.name.clone(),
                category: source.category.clone(),
                state: target,
                replacement_value: source.replacement_value,
                quantity: 1,
                is_available: target.is_available(),
                created_at: now,
                updated_at: now,
            };
            tool::insert(conn, &bucket).await?;
            bucket
        }
    };

    kardex::append(
        conn,
        &target_bucket.id,
        actor,
        MovementType::StateChange(target),
        date,
        target_bucket.quantity,
    )
    .await?;

    Ok(UnitMove {
        source,
        target: target_bucket,
    })
}

/// Inventory engine service.
///
/// Every mutating operation is one SQLite transaction whose first statement
/// is a write, so the write lock is held from the start.
#[derive(Debug, Clone)]
pub struct InventoryService {
    pool: SqlitePool,
    today: Option<NaiveDate>,
}

impl InventoryService {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryService { pool, today: None }
    }

    /// Fixes the date stamped on kardex entries (tests, replays).
    pub fn pin_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Receives units into the first matching bucket or a new one.
    ///
    /// The replacement value is overwritten with the one supplied. The kardex
    /// `Receipt` entry records the amount added, not the bucket total.
    pub async fn receive(&self, input: &ReceiveTool, actor: &str) -> ServiceResult<ToolBucket> {
        let state = validate_receive(input)?;
        let name = input.name.trim();
        let category = input.category.trim();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let bucket = match tool::add_to_first(
            &mut tx,
            name,
            category,
            state,
            input.quantity,
            Some(input.replacement_value),
            now,
        )
        .await?
        {
            Some(bucket) => bucket,
            None => {
                let bucket = ToolBucket {
                    id: Uuid::new_v4().to_string(),
                    name: name.to_string(),
                    category: category.to_string(),
                    state,
                    replacement_value: input.replacement_value,
                    quantity: input.quantity,
                    is_available: state.is_available(),
                    created_at: now,
                    updated_at: now,
                };
                tool::insert(&mut tx, &bucket).await?;
                bucket
            }
        };

        kardex::append(
            &mut tx,
            &bucket.id,
            actor,
            MovementType::Receipt,
            self.today(),
            input.quantity,
        )
        .await?;

        tx.commit().await?;

        info!(
            id = %bucket.id,
            name = %bucket.name,
            state = %bucket.state,
            added = input.quantity,
            quantity = bucket.quantity,
            "Tools received"
        );

        Ok(bucket)
    }

    /// Moves one unit of `bucket_id` into `target`. Returns the target row.
    ///
    /// Moving a unit into the state its bucket already has is rejected with
    /// [`ValidationError::SameState`]; an empty source fails with
    /// [`CoreError::InsufficientStock`]. Neither writes anything.
    pub async fn transition(
        &self,
        bucket_id: &str,
        target: ToolState,
        actor: &str,
    ) -> ServiceResult<ToolBucket> {
        let mut tx = self.pool.begin().await?;

        let moved = move_one_unit(&mut tx, bucket_id, target, actor, self.today())
            .await
            .inspect_err(|e| warn!(bucket_id = %bucket_id, target = %target, error = %e, "Transition rejected"))?;

        tx.commit().await?;

        info!(
            from = %moved.source.id,
            to = %moved.target.id,
            state = %target,
            quantity = moved.target.quantity,
            "Tool unit moved"
        );

        Ok(moved.target)
    }

    /// Like [`transition`](Self::transition), with the target state given by name.
    pub async fn transition_to(
        &self,
        bucket_id: &str,
        target: &str,
        actor: &str,
    ) -> ServiceResult<ToolBucket> {
        let target: ToolState = target.parse()?;
        self.transition(bucket_id, target, actor).await
    }

    /// Administrative quantity override. No kardex entry.
    pub async fn set_quantity(&self, bucket_id: &str, quantity: i64) -> ServiceResult<ToolBucket> {
        validate_non_negative("quantity", quantity)?;

        let mut conn = self.pool.acquire().await?;
        let bucket = tool::set_quantity(&mut conn, bucket_id, quantity, Utc::now())
            .await?
            .ok_or_else(|| CoreError::not_found("Tool", bucket_id))?;

        info!(id = %bucket_id, quantity, "Tool quantity overridden");
        Ok(bucket)
    }

    /// Administrative replacement value override. No kardex entry.
    pub async fn set_replacement_value(
        &self,
        bucket_id: &str,
        value: i64,
    ) -> ServiceResult<ToolBucket> {
        validate_non_negative("replacement value", value)?;

        let mut conn = self.pool.acquire().await?;
        let bucket = tool::set_replacement_value(&mut conn, bucket_id, value, Utc::now())
            .await?
            .ok_or_else(|| CoreError::not_found("Tool", bucket_id))?;

        info!(id = %bucket_id, value, "Tool replacement value overridden");
        Ok(bucket)
    }

    pub async fn get(&self, bucket_id: &str) -> ServiceResult<ToolBucket> {
        let mut conn = self.pool.acquire().await?;
        let bucket = tool::fetch(&mut conn, bucket_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Tool", bucket_id))?;
        Ok(bucket)
    }

    /// First bucket with this exact name.
    pub async fn find_by_name(&self, name: &str) -> ServiceResult<ToolBucket> {
        validate_tool_name(name)?;
        let name = name.trim();

        let bucket = tool::ToolRepository::new(self.pool.clone())
            .find_by_name(name)
            .await?
            .ok_or_else(|| CoreError::not_found("Tool", name))?;
        Ok(bucket)
    }

    /// Every distinct (name, category), in first-seen order.
    pub async fn names_with_category(&self) -> ServiceResult<Vec<NameCategory>> {
        Ok(tool::ToolRepository::new(self.pool.clone())
            .names_with_category()
            .await?)
    }

    /// Buckets in `state` that still hold units (e.g. tools available to loan).
    pub async fn list_in_stock(&self, state: ToolState) -> ServiceResult<Vec<ToolBucket>> {
        Ok(tool::ToolRepository::new(self.pool.clone())
            .list_by_state(state, true)
            .await?)
    }

    /// Every bucket in `state`, empty ones included.
    pub async fn list_by_state(&self, state: ToolState) -> ServiceResult<Vec<ToolBucket>> {
        Ok(tool::ToolRepository::new(self.pool.clone())
            .list_by_state(state, false)
            .await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
