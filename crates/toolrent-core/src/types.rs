//! # Domain Types
//!
//! Core domain types used throughout the tool rental engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   ToolBucket    │   │      Loan       │   │    Customer     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  name/category  │◄──│  items[]        │   │  rut (business) │       │
//! │  │  state          │   │  total / fines  │   │  active_loans   │       │
//! │  │  quantity       │   │  paid flags     │   │  active         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │          ▲                                                              │
//! │          │                                                              │
//! │  ┌───────┴─────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  KardexEntry    │   │   ToolState     │   │  MovementType   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  tool_id (FK)   │   │  Available      │   │  Receipt        │       │
//! │  │  movement_type  │   │  Loaned         │   │  StateChange:X  │       │
//! │  │  stock          │   │  InRepair       │   └─────────────────┘       │
//! │  └─────────────────┘   │  Decommissioned │                             │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID where one exists (customer `rut`)
//!
//! ## Bucket Identity
//! A tool bucket is a *counter*, not a physical unit. The row that holds a given
//! unit changes on every transition, which is why loan lines keep their own
//! pointers instead of a stable per-unit id.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Tool State
// =============================================================================

/// The state a group of tool units is in.
///
/// ## State Machine
/// ```text
///                 CreateLoan
///   Available ───────────────► Loaned
///       ▲                        │
///       │  return (ok)           │ return (damaged)      return (irreparable)
///       ├────────────────────────┤────────────► InRepair    ───────► Decommissioned
///       │                        │                 │
///       └────── repaired ────────┼─────────────────┘
///                                └────────────────────────────────► Decommissioned
/// ```
/// The engine itself allows any state → any *other* state; the orchestrator
/// decides which transitions a loan or return performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
pub enum ToolState {
    /// On the shelf, can be loaned.
    Available,
    /// Out with a customer.
    Loaned,
    /// Returned damaged, waiting for repair.
    InRepair,
    /// Irreparable or lost. Units stay counted here forever.
    Decommissioned,
}

impl ToolState {
    /// Every valid state, in lifecycle order.
    pub const ALL: [ToolState; 4] = [
        ToolState::Available,
        ToolState::Loaned,
        ToolState::InRepair,
        ToolState::Decommissioned,
    ];

    /// Canonical display name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ToolState::Available => "Available",
            ToolState::Loaned => "Loaned",
            ToolState::InRepair => "InRepair",
            ToolState::Decommissioned => "Decommissioned",
        }
    }

    /// Only units in `Available` can be loaned.
    #[inline]
    pub const fn is_available(&self) -> bool {
        matches!(self, ToolState::Available)
    }
}

impl fmt::Display for ToolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ToolState {
    type Err = ValidationError;

    /// Accepts the canonical names plus the snake_case storage form,
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | ' ' | '-'))
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "available" => Ok(ToolState::Available),
            "loaned" => Ok(ToolState::Loaned),
            "inrepair" => Ok(ToolState::InRepair),
            "decommissioned" => Ok(ToolState::Decommissioned),
            _ => Err(ValidationError::NotAllowed {
                field: "state".to_string(),
                allowed: ToolState::ALL.iter().map(|s| s.to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Tool Bucket
// =============================================================================

/// A counter of tool units sharing (name, category, state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ToolBucket {
    /// Surrogate identifier (UUID v4).
    pub id: String,

    /// Display name, e.g. "Drill".
    pub name: String,

    /// Category, e.g. "Electric".
    pub category: String,

    /// State all units in this bucket share.
    pub state: ToolState,

    /// Replacement value per unit, in integer currency units.
    pub replacement_value: i64,

    /// Number of units. Never negative.
    pub quantity: i64,

    /// True only when `state == Available`.
    pub is_available: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl ToolBucket {
    /// Returns the replacement value as Money.
    #[inline]
    pub fn replacement(&self) -> Money {
        Money::from_units(self.replacement_value)
    }

    /// The (name, category) key this bucket belongs to.
    pub fn tool_type(&self) -> NameCategory {
        NameCategory {
            name: self.name.clone(),
            category: self.category.clone(),
        }
    }
}

/// A distinct tool type: (name, category).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct NameCategory {
    pub name: String,
    pub category: String,
}

/// Input for receiving inventory.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveTool {
    pub name: String,
    pub category: String,
    /// Raw state name; parsed with [`ToolState::from_str`].
    pub state: String,
    pub replacement_value: i64,
    pub quantity: i64,
}

// =============================================================================
// Audit (Kardex)
// =============================================================================

/// Kind of inventory movement.
///
/// Stored and displayed as `Receipt` or `StateChange:<state>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum MovementType {
    /// Units entered the inventory.
    Receipt,
    /// One unit moved into a bucket of the given state.
    StateChange(ToolState),
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MovementType::Receipt => f.write_str("Receipt"),
            MovementType::StateChange(state) => write!(f, "StateChange:{}", state),
        }
    }
}

impl FromStr for MovementType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("receipt") {
            return Ok(MovementType::Receipt);
        }

        match s.split_once(':') {
            Some((kind, state)) if kind.trim().eq_ignore_ascii_case("statechange") => {
                Ok(MovementType::StateChange(state.parse()?))
            }
            _ => Err(ValidationError::InvalidFormat {
                field: "movement_type".to_string(),
                reason: format!("expected 'Receipt' or 'StateChange:<state>', got '{}'", s),
            }),
        }
    }
}

impl From<MovementType> for String {
    fn from(value: MovementType) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for MovementType {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Immutable record of one quantity-affecting event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct KardexEntry {
    pub id: String,

    /// Bucket affected (the *target* bucket for state changes).
    pub tool_id: String,

    /// Customer identifier (rut) the movement was made for/by.
    pub customer_rut: String,

    #[cfg_attr(feature = "sqlx", sqlx(try_from = "String"))]
    #[ts(as = "String")]
    pub movement_type: MovementType,

    #[ts(as = "String")]
    pub movement_date: NaiveDate,

    /// Receipt: units added. State change: target quantity after the move.
    pub stock: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Customer
// =============================================================================

/// A customer as seen by the lending core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,

    /// Unique external identifier (national id).
    pub rut: String,

    pub name: String,

    pub email: Option<String>,

    /// Number of currently open loans (bookkeeping counter).
    pub active_loans: i64,

    /// Derived borrowing eligibility. Overwritten on every recompute.
    pub active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Input for registering a customer.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCustomer {
    pub rut: String,
    pub name: String,
    pub email: Option<String>,
}

// =============================================================================
// Loan
// =============================================================================

/// Derived loan state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// Tools are out; `actual_return_date` is absent.
    Open,
    /// Returned. Only the paid flags can still change.
    Closed,
}

/// One rental transaction for one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Loan {
    pub id: String,

    pub customer_rut: String,

    #[ts(as = "String")]
    pub reservation_date: NaiveDate,

    /// Agreed return date.
    #[ts(as = "String")]
    pub return_date: NaiveDate,

    /// Actual return date; `None` while the loan is open.
    #[ts(as = "Option<String>")]
    pub actual_return_date: Option<NaiveDate>,

    /// Rental cost computed at creation.
    pub total: i64,

    pub late_fine: i64,

    pub damage_penalty: i64,

    pub late_fine_paid: bool,

    pub damage_penalty_paid: bool,

    /// Number of distinct tool lines.
    pub tool_count: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<LoanItem>,
}

impl Loan {
    /// Open or Closed, derived from the actual return date.
    pub fn status(&self) -> LoanStatus {
        if self.actual_return_date.is_none() {
            LoanStatus::Open
        } else {
            LoanStatus::Closed
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.status() == LoanStatus::Open
    }

    /// Open and past its agreed return date as of `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_open() && self.return_date < today
    }

    pub fn has_unpaid_late_fine(&self) -> bool {
        self.late_fine > 0 && !self.late_fine_paid
    }

    pub fn has_unpaid_damage_penalty(&self) -> bool {
        self.damage_penalty > 0 && !self.damage_penalty_paid
    }

    /// Bucket ids the loan's lines were loaned from (the `Loaned` rows).
    pub fn line_tool_ids(&self) -> BTreeSet<String> {
        self.items.iter().map(|item| item.tool_id.clone()).collect()
    }
}

/// One tool unit committed within a loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LoanItem {
    pub id: String,

    pub loan_id: String,

    /// The `Loaned` bucket that held the unit when it was loaned.
    pub tool_id: String,

    /// Where the unit sits now. Equals `tool_id` until the loan is returned.
    pub current_tool_id: String,

    /// Tool display name at loan time (frozen).
    pub tool_name_snapshot: String,
}

/// One requested line of a new loan.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LoanLineRequest {
    /// Id of the Available bucket to loan from.
    pub tool_id: Option<String>,
    /// Must be 1 when present; absent means 1.
    pub quantity: Option<i64>,
}

impl LoanLineRequest {
    /// Convenience constructor for a single-unit line.
    pub fn one(tool_id: impl Into<String>) -> Self {
        LoanLineRequest {
            tool_id: Some(tool_id.into()),
            quantity: Some(1),
        }
    }
}

/// Input for CreateLoan.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CreateLoan {
    pub customer_rut: String,
    #[ts(as = "Option<String>")]
    pub reservation_date: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub return_date: Option<NaiveDate>,
    pub items: Vec<LoanLineRequest>,
}

/// Input for ReturnLoan.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReturnLoan {
    #[ts(as = "String")]
    pub actual_return_date: NaiveDate,
    /// Line bucket ids returned damaged but repairable.
    #[serde(default)]
    pub damaged: BTreeSet<String>,
    /// Line bucket ids returned irreparable or lost.
    #[serde(default)]
    pub irreparable: BTreeSet<String>,
    /// Late fine per day; absent falls back to configuration.
    pub fine_per_day: Option<i64>,
    /// Repair cost per damaged line bucket id; missing ids cost 0.
    #[serde(default)]
    pub repair_costs: HashMap<String, i64>,
}

impl ReturnLoan {
    /// A clean return: everything back to Available, no fine rate override.
    pub fn on(actual_return_date: NaiveDate) -> Self {
        ReturnLoan {
            actual_return_date,
            damaged: BTreeSet::new(),
            irreparable: BTreeSet::new(),
            fine_per_day: None,
            repair_costs: HashMap::new(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn loan(return_date: NaiveDate, actual: Option<NaiveDate>) -> Loan {
        let now = Utc::now();
        Loan {
            id: "l-1".to_string(),
            customer_rut: "1-9".to_string(),
            reservation_date: return_date,
            return_date,
            actual_return_date: actual,
            total: 0,
            late_fine: 0,
            damage_penalty: 0,
            late_fine_paid: false,
            damage_penalty_paid: false,
            tool_count: 0,
            created_at: now,
            updated_at: now,
            items: Vec::new(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_tool_state_parsing() {
        assert_eq!("Available".parse::<ToolState>().unwrap(), ToolState::Available);
        assert_eq!("loaned".parse::<ToolState>().unwrap(), ToolState::Loaned);
        assert_eq!("in_repair".parse::<ToolState>().unwrap(), ToolState::InRepair);
        assert_eq!("InRepair".parse::<ToolState>().unwrap(), ToolState::InRepair);
        assert_eq!(
            "DECOMMISSIONED".parse::<ToolState>().unwrap(),
            ToolState::Decommissioned
        );
        assert!("Broken".parse::<ToolState>().is_err());
        assert!("".parse::<ToolState>().is_err());
    }

    #[test]
    fn test_movement_type_text_form() {
        assert_eq!(MovementType::Receipt.to_string(), "Receipt");
        assert_eq!(
            MovementType::StateChange(ToolState::Loaned).to_string(),
            "StateChange:Loaned"
        );
        assert_eq!(
            "StateChange:InRepair".parse::<MovementType>().unwrap(),
            MovementType::StateChange(ToolState::InRepair)
        );
        assert!("StateChange:Lost".parse::<MovementType>().is_err());
        assert!("Sale".parse::<MovementType>().is_err());
    }

    #[test]
    fn test_movement_type_serializes_as_string() {
        let json = serde_json::to_string(&MovementType::StateChange(ToolState::Available)).unwrap();
        assert_eq!(json, "\"StateChange:Available\"");
    }

    #[test]
    fn test_loan_status_and_overdue() {
        let agreed = date(2025, 10, 4);
        let open = loan(agreed, None);
        assert_eq!(open.status(), LoanStatus::Open);
        assert!(!open.is_overdue(agreed));
        assert!(open.is_overdue(date(2025, 10, 5)));

        let closed = loan(agreed, Some(date(2025, 10, 9)));
        assert_eq!(closed.status(), LoanStatus::Closed);
        assert!(!closed.is_overdue(date(2025, 12, 1)));
    }

    #[test]
    fn test_unpaid_flags_ignore_paid_and_zero_amounts() {
        let mut l = loan(date(2025, 10, 4), Some(date(2025, 10, 7)));
        assert!(!l.has_unpaid_late_fine() && !l.has_unpaid_damage_penalty());

        l.late_fine = 1500;
        l.damage_penalty = 50_000;
        assert!(l.has_unpaid_late_fine() && l.has_unpaid_damage_penalty());

        l.late_fine_paid = true;
        assert!(!l.has_unpaid_late_fine());
        assert!(l.has_unpaid_damage_penalty());
    }
}
