//! # Customer Repository
//!
//! Minimal customer registry plus the bookkeeping the lending orchestrator
//! performs on a customer row (open-loan counter, `active` flag).

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use toolrent_core::{Customer, DebtStatus, Loan, NewCustomer};

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Registers a customer. New customers start active with no loans.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation` if the rut is already registered.
    pub async fn insert(&self, input: &NewCustomer) -> DbResult<Customer> {
        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            rut: input.rut.trim().to_string(),
            name: input.name.trim().to_string(),
            email: input.email.as_ref().map(|e| e.trim().to_string()),
            active_loans: 0,
            active: true,
            created_at: now,
            updated_at: now,
        };

        debug!(rut = %customer.rut, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, rut, name, email, active_loans, active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.rut)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(customer.active_loans)
        .bind(customer.active)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("rut", customer.rut.clone()),
            other => other,
        })?;

        Ok(customer)
    }

    /// Gets a customer by rut.
    pub async fn find_by_rut(&self, rut: &str) -> DbResult<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_rut(&mut conn, rut).await
    }

    /// All customers in registration order.
    pub async fn list(&self) -> DbResult<Vec<Customer>> {
        let customers =
            sqlx::query_as::<_, Customer>("SELECT * FROM customers ORDER BY rowid")
                .fetch_all(&self.pool)
                .await?;

        Ok(customers)
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

pub(crate) async fn fetch_by_rut(
    conn: &mut SqliteConnection,
    rut: &str,
) -> DbResult<Option<Customer>> {
    let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE rut = ?1")
        .bind(rut)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(customer)
}

/// No-op write on the customer row.
///
/// Issued first in every lending transaction so the write lock is held before
/// any eligibility read. Returns the number of rows matched (0 = no customer).
pub(crate) async fn touch(conn: &mut SqliteConnection, rut: &str) -> DbResult<u64> {
    let result = sqlx::query("UPDATE customers SET updated_at = updated_at WHERE rut = ?1")
        .bind(rut)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

/// Adds `delta` to the open-loan counter, never going below zero.
pub(crate) async fn adjust_active_loans(
    conn: &mut SqliteConnection,
    rut: &str,
    delta: i64,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE customers
        SET active_loans = MAX(active_loans + ?2, 0), updated_at = ?3
        WHERE rut = ?1
        "#,
    )
    .bind(rut)
    .bind(delta)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Customer", rut));
    }

    Ok(())
}

/// Loads the customer's loans that can still carry debt (open, or closed
/// with an unpaid positive amount) and evaluates them with
/// [`DebtStatus::from_loans`].
pub(crate) async fn debt_status(
    conn: &mut SqliteConnection,
    rut: &str,
    today: NaiveDate,
) -> DbResult<DebtStatus> {
    let loans = sqlx::query_as::<_, Loan>(
        r#"
        SELECT * FROM loans
        WHERE customer_rut = ?1
          AND (
            actual_return_date IS NULL
            OR (late_fine > 0 AND late_fine_paid = 0)
            OR (damage_penalty > 0 AND damage_penalty_paid = 0)
          )
        ORDER BY rowid
        "#,
    )
    .bind(rut)
    .fetch_all(&mut *conn)
    .await?;

    Ok(DebtStatus::from_loans(&loans, today))
}

/// Recomputes and stores the `active` flag. Returns the new value.
pub(crate) async fn recompute_active(
    conn: &mut SqliteConnection,
    rut: &str,
    today: NaiveDate,
) -> DbResult<bool> {
    let active = debt_status(conn, rut, today).await?.is_active();

    let result = sqlx::query("UPDATE customers SET active = ?2, updated_at = ?3 WHERE rut = ?1")
        .bind(rut)
        .bind(active)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Customer", rut));
    }

    debug!(rut = %rut, active, "Customer activation recomputed");
    Ok(active)
}
