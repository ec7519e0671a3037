//! # Loan Lifecycle Orchestrator
//!
//! Create, return and pay-fines operations, each one SQLite transaction that
//! drives the inventory engine and ends by recomputing the customer's
//! `active` flag.
//!
//! ## CreateLoan
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   touch customer row ───────────── write lock held from here           │
//! │   1. dates present, return >= reservation, items non-empty              │
//! │   2. customer exists                                                    │
//! │   3. active (recomputed now)                                            │
//! │   4. open loans < max                                                   │
//! │   5. per line: tool id, quantity 1, no repeats                          │
//! │   6. tool in an Available bucket with stock                             │
//! │   7. customer holds no open loan of the same (name, category)           │
//! │   ─── every check passed, now mutate ───                                │
//! │   insert loan; per line: Available → Loaned, insert line item          │
//! │   active_loans += 1; recompute active                                   │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ReturnLoan
//! ```text
//!   line in irreparable  →  Loaned → Decommissioned   penalty += replacement value
//!   line in damaged      →  Loaned → InRepair         penalty += repair cost (or 0)
//!   otherwise            →  Loaned → Available
//!   late fine = max(0, days late) × max(0, fine/day)
//! ```
//!
//! Dates on the "today" side (overdue checks, kardex dates) come from the
//! local clock unless pinned with [`LendingService::pin_today`].

use chrono::{Local, NaiveDate, Utc};
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::LendingConfig;
use crate::error::{DbError, ServiceError, ServiceResult};
use crate::inventory::move_one_unit;
use crate::repository::{customer, loan, setting, tool, CustomerRepository, LoanRepository};
use toolrent_core::fines::{damage_penalty, late_fine, rental_cost};
use toolrent_core::validation::{
    validate_customer_name, validate_loan_lines, validate_loan_window, validate_non_negative,
    validate_return_sets, validate_rut,
};
use toolrent_core::{
    CoreError, CreateLoan, Customer, Loan, LoanItem, Money, NewCustomer, ReturnLoan, ToolState,
    ValidationError,
};

/// Loan lifecycle service.
#[derive(Debug, Clone)]
pub struct LendingService {
    pool: SqlitePool,
    config: LendingConfig,
    today: Option<NaiveDate>,
}

impl LendingService {
    pub fn new(pool: SqlitePool, config: LendingConfig) -> Self {
        LendingService {
            pool,
            config,
            today: None,
        }
    }

    /// Fixes "today" for overdue checks and kardex dates.
    pub fn pin_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn config(&self) -> &LendingConfig {
        &self.config
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    fn loans(&self) -> LoanRepository {
        LoanRepository::new(self.pool.clone())
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Opens a loan. See the module docs for the check order.
    pub async fn create_loan(&self, request: &CreateLoan) -> ServiceResult<Loan> {
        self.try_create_loan(request).await.inspect_err(|e| {
            warn!(rut = %request.customer_rut, error = %e, "Loan rejected");
        })
    }

    async fn try_create_loan(&self, request: &CreateLoan) -> ServiceResult<Loan> {
        // 1
        let (reservation_date, return_date) =
            validate_loan_window(request.reservation_date, request.return_date)?;
        if request.items.is_empty() {
            return Err(ValidationError::NoItems.into());
        }
        validate_rut(&request.customer_rut)?;
        let rut = request.customer_rut.trim();
        let today = self.today();

        let mut tx = self.pool.begin().await?;

        // 2
        if customer::touch(&mut tx, rut).await? == 0 {
            return Err(ValidationError::UnknownCustomer {
                rut: rut.to_string(),
            }
            .into());
        }

        // 3
        if !customer::recompute_active(&mut tx, rut, today).await? {
            return Err(ValidationError::CustomerInactive {
                rut: rut.to_string(),
            }
            .into());
        }

        // 4
        if loan::count_open(&mut tx, rut).await? >= self.config.max_active_loans {
            return Err(ValidationError::TooManyActiveLoans {
                rut: rut.to_string(),
                max: self.config.max_active_loans,
            }
            .into());
        }

        // 5
        let tool_ids = validate_loan_lines(&request.items)?;

        // 6
        let mut sources = Vec::with_capacity(tool_ids.len());
        let mut tool_types = HashSet::with_capacity(tool_ids.len());
        for tool_id in &tool_ids {
            let bucket = tool::fetch(&mut tx, tool_id)
                .await?
                .ok_or_else(|| ValidationError::UnknownTool {
                    tool_id: tool_id.clone(),
                })?;

            if !bucket.state.is_available() {
                return Err(ValidationError::ToolNotAvailable {
                    tool_id: tool_id.clone(),
                    state: bucket.state,
                }
                .into());
            }
            if bucket.quantity < 1 {
                return Err(ValidationError::ToolOutOfStock {
                    tool_id: tool_id.clone(),
                }
                .into());
            }
            if !tool_types.insert(bucket.tool_type()) {
                return Err(ValidationError::RepeatedToolType {
                    name: bucket.name,
                    category: bucket.category,
                }
                .into());
            }
            sources.push(bucket);
        }

        // 7
        for bucket in &sources {
            if loan::holds_tool_type(&mut tx, rut, &bucket.name, &bucket.category).await? {
                return Err(ValidationError::ToolAlreadyLoaned {
                    rut: rut.to_string(),
                    name: bucket.name.clone(),
                    category: bucket.category.clone(),
                }
                .into());
            }
        }

        let daily_rate = setting::daily_rate(&mut tx, self.config.default_daily_rate).await?;
        let total = rental_cost(reservation_date, return_date, Money::from_units(daily_rate))?;

        let now = Utc::now();
        let mut new_loan = Loan {
            id: Uuid::new_v4().to_string(),
            customer_rut: rut.to_string(),
            reservation_date,
            return_date,
            actual_return_date: None,
            total: total.units(),
            late_fine: 0,
            damage_penalty: 0,
            late_fine_paid: false,
            damage_penalty_paid: false,
            tool_count: sources.len() as i64,
            created_at: now,
            updated_at: now,
            items: Vec::with_capacity(sources.len()),
        };
        loan::insert(&mut tx, &new_loan).await?;

        for bucket in &sources {
            let moved = move_one_unit(&mut tx, &bucket.id, ToolState::Loaned, rut, today).await?;
            let item = LoanItem {
                id: Uuid::new_v4().to_string(),
                loan_id: new_loan.id.clone(),
                tool_id: moved.target.id.clone(),
                current_tool_id: moved.target.id,
                tool_name_snapshot: bucket.name.clone(),
            };
            loan::insert_item(&mut tx, &item).await?;
            new_loan.items.push(item);
        }

        customer::adjust_active_loans(&mut tx, rut, 1).await?;
        customer::recompute_active(&mut tx, rut, today).await?;

        tx.commit().await?;

        info!(
            id = %new_loan.id,
            rut = %rut,
            tools = new_loan.tool_count,
            total = %total,
            "Loan created"
        );

        Ok(new_loan)
    }

    // =========================================================================
    // Return
    // =========================================================================

    /// Closes a loan, moving every unit back and assessing fines.
    pub async fn return_loan(&self, loan_id: &str, request: &ReturnLoan) -> ServiceResult<Loan> {
        self.try_return_loan(loan_id, request).await.inspect_err(|e| {
            warn!(loan_id = %loan_id, error = %e, "Return rejected");
        })
    }

    async fn try_return_loan(&self, loan_id: &str, request: &ReturnLoan) -> ServiceResult<Loan> {
        let today = self.today();
        let mut tx = self.pool.begin().await?;

        if loan::touch(&mut tx, loan_id).await? == 0 {
            return Err(CoreError::not_found("Loan", loan_id).into());
        }
        let mut current = loan::fetch(&mut tx, loan_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Loan", loan_id))?;

        if !current.is_open() {
            return Err(ValidationError::LoanClosed {
                loan_id: loan_id.to_string(),
            }
            .into());
        }
        validate_return_sets(request, &current.line_tool_ids())?;

        let fine_per_day = request
            .fine_per_day
            .unwrap_or(self.config.default_fine_per_day);
        let late = late_fine(
            current.return_date,
            request.actual_return_date,
            Money::from_units(fine_per_day),
        )?;

        let rut = current.customer_rut.clone();
        let mut replacement_values = Vec::new();
        let mut repair_costs = Vec::new();

        for item in current.items.iter_mut() {
            let target = if request.irreparable.contains(&item.tool_id) {
                ToolState::Decommissioned
            } else if request.damaged.contains(&item.tool_id) {
                ToolState::InRepair
            } else {
                ToolState::Available
            };

            let moved = move_one_unit(&mut tx, &item.current_tool_id, target, &rut, today).await?;

            match target {
                ToolState::Decommissioned => {
                    replacement_values.push(moved.source.replacement());
                }
                ToolState::InRepair => {
                    let cost = request.repair_costs.get(&item.tool_id).copied().unwrap_or(0);
                    repair_costs.push(Money::from_units(cost));
                }
                _ => {}
            }

            loan::repoint_item(&mut tx, &item.id, &moved.target.id).await?;
            item.current_tool_id = moved.target.id;
        }

        // Dropping `tx` on error rolls the unit moves back.
        let damage = damage_penalty(replacement_values, repair_costs)?;

        current.actual_return_date = Some(request.actual_return_date);
        current.late_fine = late.units();
        current.damage_penalty = damage.units();
        if late.is_positive() {
            current.late_fine_paid = false;
        }
        if damage.is_positive() {
            current.damage_penalty_paid = false;
        }
        current.updated_at = Utc::now();
        loan::close(&mut tx, &current).await?;

        customer::adjust_active_loans(&mut tx, &rut, -1).await?;
        customer::recompute_active(&mut tx, &rut, today).await?;

        tx.commit().await?;

        info!(
            id = %current.id,
            rut = %rut,
            late_fine = %late,
            damage_penalty = %damage,
            "Loan returned"
        );

        Ok(current)
    }

    // =========================================================================
    // Pay fines
    // =========================================================================

    /// Marks fines as paid. Flags only flip for positive amounts; repeating
    /// the call changes nothing.
    pub async fn pay_fines(
        &self,
        loan_id: &str,
        pay_late_fine: bool,
        pay_damage_penalty: bool,
    ) -> ServiceResult<Loan> {
        let today = self.today();
        let mut tx = self.pool.begin().await?;

        if loan::touch(&mut tx, loan_id).await? == 0 {
            return Err(CoreError::not_found("Loan", loan_id).into());
        }
        let mut current = loan::fetch(&mut tx, loan_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Loan", loan_id))?;

        if pay_late_fine && current.late_fine > 0 {
            current.late_fine_paid = true;
        }
        if pay_damage_penalty && current.damage_penalty > 0 {
            current.damage_penalty_paid = true;
        }

        loan::set_paid(
            &mut tx,
            loan_id,
            current.late_fine_paid,
            current.damage_penalty_paid,
        )
        .await?;
        let active = customer::recompute_active(&mut tx, &current.customer_rut, today).await?;

        tx.commit().await?;

        info!(
            id = %loan_id,
            late_fine_paid = current.late_fine_paid,
            damage_penalty_paid = current.damage_penalty_paid,
            customer_active = active,
            "Fines paid"
        );

        Ok(current)
    }

    // =========================================================================
    // Customer status and settings
    // =========================================================================

    /// Registers a customer. New customers start active with no loans.
    pub async fn register_customer(&self, input: &NewCustomer) -> ServiceResult<Customer> {
        validate_rut(&input.rut)?;
        validate_customer_name(&input.name)?;

        let created = CustomerRepository::new(self.pool.clone())
            .insert(input)
            .await
            .map_err(|e| -> ServiceError {
                match e {
                    DbError::UniqueViolation { value, .. } => ValidationError::Duplicate {
                        field: "rut".to_string(),
                        value,
                    }
                    .into(),
                    other => other.into(),
                }
            })?;

        info!(rut = %created.rut, "Customer registered");
        Ok(created)
    }

    pub async fn find_customer(&self, rut: &str) -> ServiceResult<Customer> {
        let rut = rut.trim();
        let found = CustomerRepository::new(self.pool.clone())
            .find_by_rut(rut)
            .await?
            .ok_or_else(|| CoreError::not_found("Customer", rut))?;
        Ok(found)
    }

    pub async fn list_customers(&self) -> ServiceResult<Vec<Customer>> {
        Ok(CustomerRepository::new(self.pool.clone()).list().await?)
    }

    /// Recomputes and stores a customer's `active` flag outside any loan
    /// operation (e.g. a nightly sweep for loans that just became overdue).
    pub async fn recompute_customer_status(&self, rut: &str) -> ServiceResult<bool> {
        let rut = rut.trim();
        let mut tx = self.pool.begin().await?;

        if customer::touch(&mut tx, rut).await? == 0 {
            return Err(CoreError::not_found("Customer", rut).into());
        }
        let active = customer::recompute_active(&mut tx, rut, self.today()).await?;

        tx.commit().await?;
        Ok(active)
    }

    /// Current daily rate (stored value or configured default).
    pub async fn daily_rate(&self) -> ServiceResult<Money> {
        let rate = setting::SettingRepository::new(self.pool.clone())
            .daily_rate(self.config.default_daily_rate)
            .await?;
        Ok(Money::from_units(rate))
    }

    pub async fn set_daily_rate(&self, rate: i64) -> ServiceResult<()> {
        validate_non_negative("daily rate", rate)?;
        setting::SettingRepository::new(self.pool.clone())
            .set_daily_rate(rate)
            .await?;
        info!(rate, "Daily rate updated");
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get(&self, loan_id: &str) -> ServiceResult<Loan> {
        let found = self
            .loans()
            .get_by_id(loan_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Loan", loan_id))?;
        Ok(found)
    }

    /// Open loans of one customer.
    pub async fn active_loans(&self, rut: &str) -> ServiceResult<Vec<Loan>> {
        Ok(self.loans().open_for_customer(rut.trim()).await?)
    }

    /// Every open loan.
    pub async fn all_active(&self) -> ServiceResult<Vec<Loan>> {
        Ok(self.loans().all_open().await?)
    }

    /// Open loans past their agreed return date.
    pub async fn overdue(&self) -> ServiceResult<Vec<Loan>> {
        Ok(self.loans().overdue(self.today()).await?)
    }

    /// Loans with a positive unpaid late fine or damage penalty.
    pub async fn with_unpaid_debt(&self) -> ServiceResult<Vec<Loan>> {
        Ok(self.loans().with_unpaid_debt().await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::inventory::InventoryService;
    use crate::pool::{Database, DbConfig};
    use crate::repository::KardexFilter;
    use toolrent_core::{LoanLineRequest, LoanStatus, MovementType, ReceiveTool, ToolBucket};

    const C1: &str = "11.111.111-1";
    const C2: &str = "22.222.222-2";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Fixture {
        db: Database,
        lending: LendingService,
        inventory: InventoryService,
    }

    async fn setup() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let lending = db.lending(LendingConfig::default()).pin_today(date(2025, 10, 1));
        let inventory = db.inventory().pin_today(date(2025, 10, 1));

        for (rut, name) in [(C1, "Ana"), (C2, "Bruno")] {
            lending
                .register_customer(&NewCustomer {
                    rut: rut.to_string(),
                    name: name.to_string(),
                    email: None,
                })
                .await
                .unwrap();
        }

        Fixture {
            db,
            lending,
            inventory,
        }
    }

    async fn receive(f: &Fixture, name: &str, quantity: i64) -> ToolBucket {
        f.inventory
            .receive(
                &ReceiveTool {
                    name: name.to_string(),
                    category: "Electric".to_string(),
                    state: "Available".to_string(),
                    replacement_value: 50_000,
                    quantity,
                },
                "admin",
            )
            .await
            .unwrap()
    }

    fn request(rut: &str, from: NaiveDate, to: NaiveDate, tool_ids: &[&str]) -> CreateLoan {
        CreateLoan {
            customer_rut: rut.to_string(),
            reservation_date: Some(from),
            return_date: Some(to),
            items: tool_ids.iter().map(|id| LoanLineRequest::one(*id)).collect(),
        }
    }

    fn october(from: u32, to: u32, rut: &str, tool_ids: &[&str]) -> CreateLoan {
        request(rut, date(2025, 10, from), date(2025, 10, to), tool_ids)
    }

    fn validation(err: &ServiceError) -> &ValidationError {
        err.as_validation()
            .unwrap_or_else(|| panic!("expected a validation error, got {:?}", err))
    }

    // -------------------------------------------------------------------------
    // CreateLoan
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_loan_moves_unit_and_prices_days() {
        let f = setup().await;
        f.lending.set_daily_rate(2000).await.unwrap();
        let drill = receive(&f, "Drill", 3).await;

        let loan = f
            .lending
            .create_loan(&october(1, 4, C1, &[&drill.id]))
            .await
            .unwrap();

        assert_eq!(loan.total, 6000);
        assert_eq!(loan.status(), LoanStatus::Open);
        assert_eq!(loan.tool_count, 1);
        assert_eq!(f.inventory.get(&drill.id).await.unwrap().quantity, 2);

        let loaned = f.inventory.list_by_state(ToolState::Loaned).await.unwrap();
        assert_eq!(loaned.len(), 1);
        assert_eq!(loaned[0].quantity, 1);
        assert_eq!(loan.items[0].tool_id, loaned[0].id);
        assert_eq!(loan.items[0].current_tool_id, loaned[0].id);
        assert_eq!(loan.items[0].tool_name_snapshot, "Drill");

        let moves = f
            .db
            .kardex()
            .search(&KardexFilter {
                movement_type: Some("StateChange:Loaned".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].customer_rut, C1);

        let customer = f.lending.find_customer(C1).await.unwrap();
        assert_eq!(customer.active_loans, 1);
        assert!(customer.active);

        let stored = f.lending.get(&loan.id).await.unwrap();
        assert_eq!(stored.items, loan.items);
        assert_eq!(stored.total, loan.total);
    }

    #[tokio::test]
    async fn test_default_daily_rate_and_same_day_loan() {
        let f = setup().await;
        let drill = receive(&f, "Drill", 1).await;

        assert_eq!(f.lending.daily_rate().await.unwrap().units(), 2500);
        let loan = f
            .lending
            .create_loan(&october(1, 1, C1, &[&drill.id]))
            .await
            .unwrap();
        assert_eq!(loan.total, 2500);
    }

    #[tokio::test]
    async fn test_sixth_loan_is_rejected_without_side_effects() {
        let f = setup().await;
        let mut tools = Vec::new();
        for i in 0..6 {
            tools.push(receive(&f, &format!("Tool{}", i), 1).await);
        }
        for tool in &tools[..5] {
            f.lending
                .create_loan(&october(1, 4, C1, &[&tool.id]))
                .await
                .unwrap();
        }
        let kardex_before = f.db.kardex().count().await.unwrap();

        let err = f
            .lending
            .create_loan(&october(1, 4, C1, &[&tools[5].id]))
            .await
            .unwrap_err();

        assert!(matches!(
            validation(&err),
            ValidationError::TooManyActiveLoans { max: 5, .. }
        ));
        assert!(err.to_string().contains("already has 5 active loans"));
        assert_eq!(f.inventory.get(&tools[5].id).await.unwrap().quantity, 1);
        assert_eq!(f.db.kardex().count().await.unwrap(), kardex_before);
        assert_eq!(f.lending.active_loans(C1).await.unwrap().len(), 5);
        assert_eq!(f.lending.find_customer(C1).await.unwrap().active_loans, 5);
    }

    #[tokio::test]
    async fn test_request_shape_rules() {
        let f = setup().await;
        let drill = receive(&f, "Drill", 2).await;

        let err = f
            .lending
            .create_loan(&october(4, 1, C1, &[&drill.id]))
            .await
            .unwrap_err();
        assert!(matches!(validation(&err), ValidationError::ReturnBeforeReservation));

        let mut no_date = october(1, 4, C1, &[&drill.id]);
        no_date.return_date = None;
        let err = f.lending.create_loan(&no_date).await.unwrap_err();
        assert!(matches!(validation(&err), ValidationError::Required { .. }));

        let err = f.lending.create_loan(&october(1, 4, C1, &[])).await.unwrap_err();
        assert!(matches!(validation(&err), ValidationError::NoItems));

        let mut two_units = october(1, 4, C1, &[]);
        two_units.items.push(LoanLineRequest {
            tool_id: Some(drill.id.clone()),
            quantity: Some(2),
        });
        let err = f.lending.create_loan(&two_units).await.unwrap_err();
        assert!(matches!(validation(&err), ValidationError::QuantityMustBeOne { .. }));

        let err = f
            .lending
            .create_loan(&october(1, 4, C1, &[&drill.id, &drill.id]))
            .await
            .unwrap_err();
        assert!(matches!(validation(&err), ValidationError::RepeatedTool { .. }));

        assert_eq!(f.inventory.get(&drill.id).await.unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_customer_and_tool_rules() {
        let f = setup().await;
        let drill = receive(&f, "Drill", 1).await;

        let err = f
            .lending
            .create_loan(&october(1, 4, "99.999.999-9", &[&drill.id]))
            .await
            .unwrap_err();
        assert!(matches!(validation(&err), ValidationError::UnknownCustomer { .. }));

        let err = f
            .lending
            .create_loan(&october(1, 4, C1, &["missing-tool"]))
            .await
            .unwrap_err();
        assert!(matches!(validation(&err), ValidationError::UnknownTool { .. }));

        let loan = f
            .lending
            .create_loan(&october(1, 4, C2, &[&drill.id]))
            .await
            .unwrap();

        // The Loaned bucket itself cannot be loaned.
        let err = f
            .lending
            .create_loan(&october(1, 4, C1, &[&loan.items[0].tool_id]))
            .await
            .unwrap_err();
        assert!(matches!(validation(&err), ValidationError::ToolNotAvailable { .. }));

        // The Available pool is now empty.
        let err = f
            .lending
            .create_loan(&october(1, 4, C1, &[&drill.id]))
            .await
            .unwrap_err();
        assert!(matches!(validation(&err), ValidationError::ToolOutOfStock { .. }));
    }

    #[tokio::test]
    async fn test_same_tool_type_rules() {
        let f = setup().await;
        let drill = receive(&f, "Drill", 3).await;

        f.lending
            .create_loan(&october(1, 4, C1, &[&drill.id]))
            .await
            .unwrap();

        let err = f
            .lending
            .create_loan(&october(1, 4, C1, &[&drill.id]))
            .await
            .unwrap_err();
        assert!(matches!(validation(&err), ValidationError::ToolAlreadyLoaned { .. }));
        assert!(err.to_string().contains("already has 'Drill' (Electric)"));

        // Another customer may take one.
        f.lending
            .create_loan(&october(1, 4, C2, &[&drill.id]))
            .await
            .unwrap();

        // A stray second Available row of the same type, in one request.
        let stray = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO tools (id, name, category, state, replacement_value, quantity,
                               is_available, created_at, updated_at)
            VALUES (?1, 'Drill', 'Electric', 'available', 50000, 1, 1, ?2, ?2)
            "#,
        )
        .bind(&stray)
        .bind(Utc::now())
        .execute(f.db.pool())
        .await
        .unwrap();
        let third = receive(&f, "Saw", 1).await;

        let err = f
            .lending
            .create_loan(&october(1, 4, C2, &[&third.id, &drill.id, &stray]))
            .await
            .unwrap_err();
        assert!(matches!(validation(&err), ValidationError::RepeatedToolType { .. }));
    }

    #[tokio::test]
    async fn test_overdue_customer_becomes_inactive() {
        let f = setup().await;
        let drill = receive(&f, "Drill", 1).await;
        let saw = receive(&f, "Saw", 1).await;
        f.lending
            .create_loan(&october(1, 4, C1, &[&drill.id]))
            .await
            .unwrap();

        let later = f.db.lending(LendingConfig::default()).pin_today(date(2025, 10, 10));
        assert_eq!(later.overdue().await.unwrap().len(), 1);

        let err = later
            .create_loan(&october(10, 12, C1, &[&saw.id]))
            .await
            .unwrap_err();
        assert!(matches!(validation(&err), ValidationError::CustomerInactive { .. }));
        assert!(err.to_string().contains("inactive"));
        assert_eq!(f.inventory.get(&saw.id).await.unwrap().quantity, 1);

        assert!(!later.recompute_customer_status(C1).await.unwrap());
        assert!(!later.find_customer(C1).await.unwrap().active);
    }

    // -------------------------------------------------------------------------
    // ReturnLoan / PayFines
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_return_irreparable_and_late() {
        let f = setup().await;
        let drill = receive(&f, "Drill", 1).await;
        let loan = f
            .lending
            .create_loan(&october(1, 4, C1, &[&drill.id]))
            .await
            .unwrap();
        let loaned_id = loan.items[0].tool_id.clone();

        let mut ret = ReturnLoan::on(date(2025, 10, 7));
        ret.irreparable.insert(loaned_id.clone());
        ret.fine_per_day = Some(500);
        let closed = f.lending.return_loan(&loan.id, &ret).await.unwrap();

        assert_eq!(closed.late_fine, 1500);
        assert_eq!(closed.damage_penalty, 50_000);
        assert!(!closed.late_fine_paid && !closed.damage_penalty_paid);
        assert_eq!(closed.status(), LoanStatus::Closed);

        let decommissioned = f.inventory.list_by_state(ToolState::Decommissioned).await.unwrap();
        assert_eq!(decommissioned.len(), 1);
        assert_eq!(decommissioned[0].quantity, 1);
        assert_eq!(closed.items[0].current_tool_id, decommissioned[0].id);
        assert_eq!(closed.items[0].tool_id, loaned_id);
        assert_eq!(f.inventory.get(&loaned_id).await.unwrap().quantity, 0);

        let customer = f.lending.find_customer(C1).await.unwrap();
        assert_eq!(customer.active_loans, 0);
        assert!(!customer.active, "unpaid fines block borrowing");
        assert_eq!(f.lending.with_unpaid_debt().await.unwrap().len(), 1);
        let stored = f.lending.get(&loan.id).await.unwrap();
        assert_eq!(stored.items, closed.items);
        assert_eq!(stored.actual_return_date, Some(date(2025, 10, 7)));
    }

    #[tokio::test]
    async fn test_return_damaged_and_clean_lines() {
        let f = setup().await;
        let drill = receive(&f, "Drill", 1).await;
        let saw = receive(&f, "Saw", 1).await;
        let loan = f
            .lending
            .create_loan(&october(1, 4, C1, &[&drill.id, &saw.id]))
            .await
            .unwrap();
        let drill_line = loan.items[0].tool_id.clone();

        let mut ret = ReturnLoan::on(date(2025, 10, 3));
        ret.damaged.insert(drill_line.clone());
        ret.repair_costs.insert(drill_line.clone(), 800);
        let closed = f.lending.return_loan(&loan.id, &ret).await.unwrap();

        assert_eq!(closed.late_fine, 0, "early return");
        assert_eq!(closed.damage_penalty, 800);

        let repair = f.inventory.list_in_stock(ToolState::InRepair).await.unwrap();
        assert_eq!(repair.len(), 1);
        assert_eq!(repair[0].name, "Drill");
        assert_eq!(f.inventory.get(&saw.id).await.unwrap().quantity, 1);
        assert_eq!(closed.items[1].current_tool_id, saw.id);
        assert!(f.inventory.list_in_stock(ToolState::Loaned).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_return_defaults_fine_rate_from_config() {
        let f = setup().await;
        let drill = receive(&f, "Drill", 1).await;
        let loan = f
            .lending
            .create_loan(&october(1, 4, C1, &[&drill.id]))
            .await
            .unwrap();

        let closed = f
            .lending
            .return_loan(&loan.id, &ReturnLoan::on(date(2025, 10, 9)))
            .await
            .unwrap();
        assert_eq!(closed.late_fine, 0);
        assert!(f.lending.find_customer(C1).await.unwrap().active);

        let strict = LendingConfig {
            default_fine_per_day: 300,
            ..LendingConfig::default()
        };
        let lending = f.db.lending(strict).pin_today(date(2025, 10, 1));
        let loan = lending
            .create_loan(&october(1, 4, C1, &[&drill.id]))
            .await
            .unwrap();
        let closed = lending
            .return_loan(&loan.id, &ReturnLoan::on(date(2025, 10, 6)))
            .await
            .unwrap();
        assert_eq!(closed.late_fine, 600);
    }

    #[tokio::test]
    async fn test_return_rules() {
        let f = setup().await;
        let drill = receive(&f, "Drill", 1).await;
        let loan = f
            .lending
            .create_loan(&october(1, 4, C1, &[&drill.id]))
            .await
            .unwrap();
        let line = loan.items[0].tool_id.clone();

        let err = f
            .lending
            .return_loan("missing-loan", &ReturnLoan::on(date(2025, 10, 4)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let mut both = ReturnLoan::on(date(2025, 10, 4));
        both.damaged.insert(line.clone());
        both.irreparable.insert(line.clone());
        let err = f.lending.return_loan(&loan.id, &both).await.unwrap_err();
        assert!(matches!(validation(&err), ValidationError::DamagedAndIrreparable { .. }));

        let mut foreign = ReturnLoan::on(date(2025, 10, 4));
        foreign.irreparable.insert(drill.id.clone());
        let err = f.lending.return_loan(&loan.id, &foreign).await.unwrap_err();
        assert!(err.to_string().contains(&drill.id));
        assert!(matches!(validation(&err), ValidationError::IrreparableNotInLoan { .. }));

        let mut foreign = ReturnLoan::on(date(2025, 10, 4));
        foreign.damaged.insert("nope".to_string());
        let err = f.lending.return_loan(&loan.id, &foreign).await.unwrap_err();
        assert!(matches!(validation(&err), ValidationError::DamagedNotInLoan { .. }));

        // Rejections left the loan open.
        assert!(f.lending.get(&loan.id).await.unwrap().is_open());

        f.lending
            .return_loan(&loan.id, &ReturnLoan::on(date(2025, 10, 4)))
            .await
            .unwrap();
        let err = f
            .lending
            .return_loan(&loan.id, &ReturnLoan::on(date(2025, 10, 4)))
            .await
            .unwrap_err();
        assert!(matches!(validation(&err), ValidationError::LoanClosed { .. }));
    }

    #[tokio::test]
    async fn test_pay_fines_is_idempotent_and_reactivates() {
        let f = setup().await;
        let drill = receive(&f, "Drill", 1).await;
        let loan = f
            .lending
            .create_loan(&october(1, 4, C1, &[&drill.id]))
            .await
            .unwrap();
        let mut ret = ReturnLoan::on(date(2025, 10, 7));
        ret.irreparable.insert(loan.items[0].tool_id.clone());
        ret.fine_per_day = Some(500);
        f.lending.return_loan(&loan.id, &ret).await.unwrap();

        let partly = f.lending.pay_fines(&loan.id, true, false).await.unwrap();
        assert!(partly.late_fine_paid && !partly.damage_penalty_paid);
        assert!(!f.lending.find_customer(C1).await.unwrap().active);

        let once = f.lending.pay_fines(&loan.id, true, true).await.unwrap();
        let twice = f.lending.pay_fines(&loan.id, true, true).await.unwrap();
        assert!(once.late_fine_paid && once.damage_penalty_paid);
        assert_eq!(
            (twice.late_fine_paid, twice.damage_penalty_paid),
            (once.late_fine_paid, once.damage_penalty_paid)
        );
        assert!(f.lending.find_customer(C1).await.unwrap().active);
        assert!(f.lending.with_unpaid_debt().await.unwrap().is_empty());

        let err = f.lending.pay_fines("missing-loan", true, true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_pay_fines_ignores_zero_amounts() {
        let f = setup().await;
        let drill = receive(&f, "Drill", 1).await;
        let loan = f
            .lending
            .create_loan(&october(1, 4, C1, &[&drill.id]))
            .await
            .unwrap();
        f.lending
            .return_loan(&loan.id, &ReturnLoan::on(date(2025, 10, 4)))
            .await
            .unwrap();

        let paid = f.lending.pay_fines(&loan.id, true, true).await.unwrap();
        assert!(!paid.late_fine_paid && !paid.damage_penalty_paid);
    }

    #[tokio::test]
    async fn test_oversized_loan_total_is_rejected() {
        let f = setup().await;
        f.lending.set_daily_rate(i64::MAX / 2).await.unwrap();
        let drill = receive(&f, "Drill", 1).await;
        let kardex_before = f.db.kardex().count().await.unwrap();

        let err = f
            .lending
            .create_loan(&october(1, 4, C1, &[&drill.id]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(matches!(
            validation(&err),
            ValidationError::AmountTooLarge { field } if field == "loan total"
        ));

        assert_eq!(f.inventory.get(&drill.id).await.unwrap().quantity, 1);
        assert!(f.inventory.list_by_state(ToolState::Loaned).await.unwrap().is_empty());
        assert_eq!(f.db.kardex().count().await.unwrap(), kardex_before);
        assert_eq!(f.lending.find_customer(C1).await.unwrap().active_loans, 0);
        assert!(f.lending.active_loans(C1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_return_amounts_leave_loan_open() {
        let f = setup().await;
        let drill = receive(&f, "Drill", 1).await;
        let saw = receive(&f, "Saw", 1).await;
        let loan = f
            .lending
            .create_loan(&october(1, 4, C1, &[&drill.id, &saw.id]))
            .await
            .unwrap();
        let drill_line = loan.items[0].tool_id.clone();
        let saw_line = loan.items[1].tool_id.clone();
        let kardex_before = f.db.kardex().count().await.unwrap();

        let mut late = ReturnLoan::on(date(2025, 10, 7));
        late.fine_per_day = Some(i64::MAX / 2);
        let err = f.lending.return_loan(&loan.id, &late).await.unwrap_err();
        assert!(matches!(
            validation(&err),
            ValidationError::AmountTooLarge { field } if field == "late fine"
        ));

        let mut broken = ReturnLoan::on(date(2025, 10, 4));
        broken.irreparable.insert(drill_line.clone());
        broken.damaged.insert(saw_line.clone());
        broken.repair_costs.insert(saw_line.clone(), i64::MAX);
        let err = f.lending.return_loan(&loan.id, &broken).await.unwrap_err();
        assert!(matches!(
            validation(&err),
            ValidationError::AmountTooLarge { field } if field == "damage penalty"
        ));

        // Neither attempt moved a unit or wrote the loan.
        let stored = f.lending.get(&loan.id).await.unwrap();
        assert_eq!(stored.status(), LoanStatus::Open);
        assert_eq!(stored.items, loan.items);
        assert!(f.inventory.list_in_stock(ToolState::Decommissioned).await.unwrap().is_empty());
        assert!(f.inventory.list_in_stock(ToolState::InRepair).await.unwrap().is_empty());
        assert_eq!(f.db.kardex().count().await.unwrap(), kardex_before);
        assert_eq!(f.lending.find_customer(C1).await.unwrap().active_loans, 1);

        broken.repair_costs.insert(saw_line, 800);
        let closed = f.lending.return_loan(&loan.id, &broken).await.unwrap();
        assert_eq!(closed.damage_penalty, 50_800);
    }

    // -------------------------------------------------------------------------
    // Invariants
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_full_cycle_keeps_counts_and_audit_complete() {
        let f = setup().await;
        let drill = receive(&f, "Drill", 2).await;
        let saw = receive(&f, "Saw", 1).await;
        let tools = f.db.tools();

        let a = f
            .lending
            .create_loan(&october(1, 4, C1, &[&drill.id, &saw.id]))
            .await
            .unwrap();
        let b = f
            .lending
            .create_loan(&october(1, 4, C2, &[&drill.id]))
            .await
            .unwrap();

        let mut ret = ReturnLoan::on(date(2025, 10, 4));
        ret.damaged.insert(a.items[0].tool_id.clone());
        f.lending.return_loan(&a.id, &ret).await.unwrap();
        let mut ret = ReturnLoan::on(date(2025, 10, 4));
        ret.irreparable.insert(b.items[0].tool_id.clone());
        f.lending.return_loan(&b.id, &ret).await.unwrap();

        assert_eq!(tools.total_units("Drill", "Electric").await.unwrap(), 2);
        assert_eq!(tools.total_units("Saw", "Electric").await.unwrap(), 1);

        for state in ToolState::ALL {
            for bucket in f.inventory.list_by_state(state).await.unwrap() {
                assert!(bucket.quantity >= 0);
                assert_eq!(bucket.is_available, state == ToolState::Available);
            }
        }

        // 2 receipts + 3 loans-out + 3 returns.
        let entries = f.db.kardex().list_all().await.unwrap();
        assert_eq!(entries.len(), 8);
        let receipts = entries
            .iter()
            .filter(|e| e.movement_type == MovementType::Receipt)
            .count();
        assert_eq!(receipts, 2);

        // Every state-change entry was stamped with its target's quantity at
        // the time; the final entry per bucket matches the bucket now.
        for state in ToolState::ALL {
            for bucket in f.inventory.list_by_state(state).await.unwrap() {
                let last = f
                    .db
                    .kardex()
                    .search(&KardexFilter {
                        tool_id: Some(bucket.id.clone()),
                        movement_type: Some(MovementType::StateChange(state).to_string()),
                        ..Default::default()
                    })
                    .await
                    .unwrap()
                    .pop();
                if let Some(entry) = last {
                    if state != ToolState::Available && state != ToolState::Loaned {
                        assert_eq!(entry.stock, bucket.quantity);
                    }
                }
            }
        }

        assert!(f.lending.all_active().await.unwrap().is_empty());
        assert_eq!(f.lending.find_customer(C1).await.unwrap().active_loans, 0);
        assert_eq!(f.lending.find_customer(C2).await.unwrap().active_loans, 0);
    }

    #[tokio::test]
    async fn test_register_customer_rules() {
        let f = setup().await;

        let err = f
            .lending
            .register_customer(&NewCustomer {
                rut: C1.to_string(),
                name: "Ana again".to_string(),
                email: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(validation(&err), ValidationError::Duplicate { .. }));

        let err = f
            .lending
            .register_customer(&NewCustomer {
                rut: " ".to_string(),
                name: "Nobody".to_string(),
                email: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(f.lending.list_customers().await.unwrap().len(), 2);
        assert_eq!(
            f.lending.find_customer("nobody").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            f.lending.set_daily_rate(-5).await.unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    // -------------------------------------------------------------------------
    // Concurrency
    // -------------------------------------------------------------------------

    struct TempDb {
        path: std::path::PathBuf,
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            for suffix in ["", "-wal", "-shm"] {
                let mut p = self.path.clone().into_os_string();
                p.push(suffix);
                let _ = std::fs::remove_file(p);
            }
        }
    }

    async fn file_database() -> (TempDb, Database) {
        let path = std::env::temp_dir().join(format!("toolrent-test-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(4))
            .await
            .unwrap();
        (TempDb { path }, db)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_transitions_take_the_last_unit_once() {
        let (_guard, db) = file_database().await;
        let inventory = db.inventory();
        let drill = inventory
            .receive(
                &ReceiveTool {
                    name: "Drill".to_string(),
                    category: "Electric".to_string(),
                    state: "Available".to_string(),
                    replacement_value: 50_000,
                    quantity: 1,
                },
                "admin",
            )
            .await
            .unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let inventory = inventory.clone();
                let id = drill.id.clone();
                tokio::spawn(async move { inventory.transition(&id, ToolState::InRepair, "U1").await })
            })
            .collect();

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert!(matches!(
                    e.kind(),
                    ErrorKind::InsufficientStock | ErrorKind::Conflict
                )),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(inventory.get(&drill.id).await.unwrap().quantity, 0);
        assert_eq!(db.tools().total_units("Drill", "Electric").await.unwrap(), 1);
        assert_eq!(db.kardex().count().await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_loans_respect_the_cap() {
        let (_guard, db) = file_database().await;
        let config = LendingConfig {
            max_active_loans: 1,
            ..LendingConfig::default()
        };
        let lending = db.lending(config).pin_today(date(2025, 10, 1));
        lending
            .register_customer(&NewCustomer {
                rut: C1.to_string(),
                name: "Ana".to_string(),
                email: None,
            })
            .await
            .unwrap();

        let mut ids = Vec::new();
        for name in ["Drill", "Saw"] {
            let bucket = db
                .inventory()
                .receive(
                    &ReceiveTool {
                        name: name.to_string(),
                        category: "Electric".to_string(),
                        state: "Available".to_string(),
                        replacement_value: 10_000,
                        quantity: 1,
                    },
                    "admin",
                )
                .await
                .unwrap();
            ids.push(bucket.id);
        }

        let handles: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let lending = lending.clone();
                tokio::spawn(async move { lending.create_loan(&october(1, 4, C1, &[&id])).await })
            })
            .collect();

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert!(matches!(e.kind(), ErrorKind::Validation | ErrorKind::Conflict)),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(lending.active_loans(C1).await.unwrap().len(), 1);
        assert_eq!(lending.find_customer(C1).await.unwrap().active_loans, 1);
    }
}
