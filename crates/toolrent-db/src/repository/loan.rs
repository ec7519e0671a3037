//! # Loan Repository
//!
//! Loans and their line items.
//!
//! ## Loan Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Loan Lifecycle                                    │
//! │                                                                         │
//! │  1. CREATE (open)                                                      │
//! │     └── insert() + insert_item() per tool                              │
//! │         actual_return_date = NULL                                      │
//! │                                                                         │
//! │  2. RETURN (closed)                                                    │
//! │     └── repoint_item() per tool → current_tool_id follows the unit     │
//! │     └── close() → actual_return_date, late_fine, damage_penalty        │
//! │                                                                         │
//! │  3. PAY FINES (closed, flags only)                                     │
//! │     └── set_paid()                                                     │
//! │                                                                         │
//! │  Loans are never deleted.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use toolrent_core::{Loan, LoanItem};

/// Read-side repository for loans.
#[derive(Debug, Clone)]
pub struct LoanRepository {
    pool: SqlitePool,
}

impl LoanRepository {
    /// Creates a new LoanRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LoanRepository { pool }
    }

    /// Gets a loan with its items.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Loan>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Open loans of one customer, oldest first.
    pub async fn open_for_customer(&self, rut: &str) -> DbResult<Vec<Loan>> {
        let mut conn = self.pool.acquire().await?;
        let mut loans = sqlx::query_as::<_, Loan>(
            r#"
            SELECT * FROM loans
            WHERE customer_rut = ?1 AND actual_return_date IS NULL
            ORDER BY rowid
            "#,
        )
        .bind(rut)
        .fetch_all(&mut *conn)
        .await?;

        attach_items(&mut conn, &mut loans).await?;
        Ok(loans)
    }

    /// All open loans.
    pub async fn all_open(&self) -> DbResult<Vec<Loan>> {
        let mut conn = self.pool.acquire().await?;
        let mut loans = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE actual_return_date IS NULL ORDER BY rowid",
        )
        .fetch_all(&mut *conn)
        .await?;

        attach_items(&mut conn, &mut loans).await?;
        Ok(loans)
    }

    /// Open loans whose agreed return date is before `today`.
    pub async fn overdue(&self, today: NaiveDate) -> DbResult<Vec<Loan>> {
        let mut conn = self.pool.acquire().await?;
        let mut loans = sqlx::query_as::<_, Loan>(
            r#"
            SELECT * FROM loans
            WHERE actual_return_date IS NULL AND return_date < ?1
            ORDER BY return_date, rowid
            "#,
        )
        .bind(today)
        .fetch_all(&mut *conn)
        .await?;

        attach_items(&mut conn, &mut loans).await?;
        Ok(loans)
    }

    /// Loans with a positive, unpaid late fine or damage penalty.
    pub async fn with_unpaid_debt(&self) -> DbResult<Vec<Loan>> {
        let mut conn = self.pool.acquire().await?;
        let mut loans = sqlx::query_as::<_, Loan>(
            r#"
            SELECT * FROM loans
            WHERE (late_fine > 0 AND late_fine_paid = 0)
               OR (damage_penalty > 0 AND damage_penalty_paid = 0)
            ORDER BY rowid
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;

        attach_items(&mut conn, &mut loans).await?;
        Ok(loans)
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

async fn attach_items(conn: &mut SqliteConnection, loans: &mut [Loan]) -> DbResult<()> {
    for loan in loans.iter_mut() {
        loan.items = items_of(conn, &loan.id).await?;
    }
    Ok(())
}

async fn items_of(conn: &mut SqliteConnection, loan_id: &str) -> DbResult<Vec<LoanItem>> {
    let items = sqlx::query_as::<_, LoanItem>(
        "SELECT * FROM loan_items WHERE loan_id = ?1 ORDER BY rowid",
    )
    .bind(loan_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

/// Gets a loan with its items.
pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Loan>> {
    let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match loan {
        Some(mut loan) => {
            loan.items = items_of(conn, &loan.id).await?;
            Ok(Some(loan))
        }
        None => Ok(None),
    }
}

/// No-op write on the loan row so the write lock is held before the loan is
/// read. Returns rows matched (0 = no such loan).
pub(crate) async fn touch(conn: &mut SqliteConnection, id: &str) -> DbResult<u64> {
    let result = sqlx::query("UPDATE loans SET updated_at = updated_at WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

pub(crate) async fn count_open(conn: &mut SqliteConnection, rut: &str) -> DbResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM loans WHERE customer_rut = ?1 AND actual_return_date IS NULL",
    )
    .bind(rut)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count)
}

/// Whether an open loan of `rut` holds a `Loaned` unit of (name, category).
pub(crate) async fn holds_tool_type(
    conn: &mut SqliteConnection,
    rut: &str,
    name: &str,
    category: &str,
) -> DbResult<bool> {
    let held: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM loan_items li
            JOIN loans l ON l.id = li.loan_id
            WHERE l.customer_rut = ?1
              AND l.actual_return_date IS NULL
              AND li.tool_id IN (
                  SELECT id FROM tools
                  WHERE name = ?2 AND category = ?3 AND state = 'loaned'
              )
        )
        "#,
    )
    .bind(rut)
    .bind(name)
    .bind(category)
    .fetch_one(&mut *conn)
    .await?;

    Ok(held)
}

pub(crate) async fn insert(conn: &mut SqliteConnection, loan: &Loan) -> DbResult<()> {
    debug!(id = %loan.id, rut = %loan.customer_rut, "Inserting loan");

    sqlx::query(
        r#"
        INSERT INTO loans (
            id, customer_rut, reservation_date, return_date, actual_return_date,
            total, late_fine, damage_penalty, late_fine_paid, damage_penalty_paid,
            tool_count, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&loan.id)
    .bind(&loan.customer_rut)
    .bind(loan.reservation_date)
    .bind(loan.return_date)
    .bind(loan.actual_return_date)
    .bind(loan.total)
    .bind(loan.late_fine)
    .bind(loan.damage_penalty)
    .bind(loan.late_fine_paid)
    .bind(loan.damage_penalty_paid)
    .bind(loan.tool_count)
    .bind(loan.created_at)
    .bind(loan.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn insert_item(conn: &mut SqliteConnection, item: &LoanItem) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO loan_items (id, loan_id, tool_id, current_tool_id, tool_name_snapshot)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&item.id)
    .bind(&item.loan_id)
    .bind(&item.tool_id)
    .bind(&item.current_tool_id)
    .bind(&item.tool_name_snapshot)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Points a line item at the bucket its unit now sits in.
pub(crate) async fn repoint_item(
    conn: &mut SqliteConnection,
    item_id: &str,
    current_tool_id: &str,
) -> DbResult<()> {
    sqlx::query("UPDATE loan_items SET current_tool_id = ?2 WHERE id = ?1")
        .bind(item_id)
        .bind(current_tool_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Persists the return fields of a loan.
pub(crate) async fn close(conn: &mut SqliteConnection, loan: &Loan) -> DbResult<()> {
    debug!(id = %loan.id, late_fine = loan.late_fine, damage_penalty = loan.damage_penalty, "Closing loan");

    sqlx::query(
        r#"
        UPDATE loans
        SET actual_return_date = ?2,
            late_fine = ?3,
            damage_penalty = ?4,
            late_fine_paid = ?5,
            damage_penalty_paid = ?6,
            updated_at = ?7
        WHERE id = ?1
        "#,
    )
    .bind(&loan.id)
    .bind(loan.actual_return_date)
    .bind(loan.late_fine)
    .bind(loan.damage_penalty)
    .bind(loan.late_fine_paid)
    .bind(loan.damage_penalty_paid)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn set_paid(
    conn: &mut SqliteConnection,
    id: &str,
    late_fine_paid: bool,
    damage_penalty_paid: bool,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE loans
        SET late_fine_paid = ?2, damage_penalty_paid = ?3, updated_at = ?4
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(late_fine_paid)
    .bind(damage_penalty_paid)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}
