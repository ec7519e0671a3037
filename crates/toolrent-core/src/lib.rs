//! # toolrent-core: Pure Business Logic for ToolRent
//!
//! Domain types and rules of the tool rental engine, as pure functions with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        ToolRent Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Façades (HTTP, auth, identity) - external          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        toolrent-db: InventoryService, LendingService            │   │
//! │  │        SQLite transactions, repositories, migrations            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ toolrent-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   fines   │  │activation │  │ validation│  │   │
//! │  │   │ToolBucket │  │rental cost│  │ DebtStatus│  │   rules   │  │   │
//! │  │   │   Loan    │  │ late fine │  │           │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (ToolBucket, KardexEntry, Loan, Customer)
//! - [`money`] - Integer money
//! - [`fines`] - Rental cost and late fine calculator
//! - [`activation`] - Customer borrowing eligibility
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use toolrent_core::{fines, Money};
//!
//! let agreed = NaiveDate::from_ymd_opt(2025, 10, 4).unwrap();
//! let actual = NaiveDate::from_ymd_opt(2025, 10, 7).unwrap();
//!
//! let fine = fines::late_fine(agreed, actual, Money::from_units(500)).unwrap();
//! assert_eq!(fine.units(), 1500);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod activation;
pub mod error;
pub mod fines;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use activation::DebtStatus;
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of open loans per customer.
pub const MAX_ACTIVE_LOANS: i64 = 5;

/// Daily rental rate used when none has been stored in the settings table.
pub const DEFAULT_DAILY_RATE: i64 = 2500;

/// Settings key holding the current daily rental rate.
pub const DAILY_RATE_KEY: &str = "daily_rent_price";

/// Acting identifier recorded on kardex entries that no customer triggered
/// (administrative receipts).
pub const SYSTEM_ACTOR: &str = "system";
