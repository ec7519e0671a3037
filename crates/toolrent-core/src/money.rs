//! # Money Module
//!
//! Provides the `Money` type for rental charges, fines and replacement values.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  Rental prices here have no minor unit (daily rate 2500, fine 500),    │
//! │  so every amount is a whole number of currency units.                  │
//! │                                                                         │
//! │  OUR SOLUTION: i64 whole units, nothing else                            │
//! │    rate × days, fine × days, Σ repair costs   → exact, always          │
//! │                                                                         │
//! │  Products and sums are checked: an amount past i64 is None, never a    │
//! │  wrapped or panicking value.                                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use toolrent_core::money::Money;
//!
//! let rate = Money::from_units(2500);
//! let total = rate.checked_mul(3).unwrap();   // 7500
//! let with_repair = total.checked_add(Money::from_units(800)).unwrap();
//! assert_eq!(with_repair.units(), 8300);
//!
//! assert_eq!(Money::from_units(i64::MAX).checked_mul(2), None);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in whole currency units.
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  settings.daily_rent_price ──► rental_cost() ──► Loan.total             │
/// │                                                                         │
/// │  fine_per_day ──► late_fine() ──► Loan.late_fine                        │
/// │                                                                         │
/// │  repair costs + ToolBucket.replacement_value ──► Loan.damage_penalty    │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from whole currency units.
    ///
    /// ## Example
    /// ```rust
    /// use toolrent_core::money::Money;
    ///
    /// let rate = Money::from_units(2500);
    /// assert_eq!(rate.units(), 2500);
    /// ```
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Money(units)
    }

    /// Returns the raw value in currency units.
    #[inline]
    pub const fn units(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Clamps negative amounts to zero.
    ///
    /// Fines never go below zero, even when a caller passes a negative rate.
    #[inline]
    pub const fn non_negative(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            *self
        }
    }

    /// Multiplies by a count of days. `None` when the product leaves i64.
    #[inline]
    pub const fn checked_mul(&self, count: i64) -> Option<Self> {
        match self.0.checked_mul(count) {
            Some(product) => Some(Money(product)),
            None => None,
        }
    }

    /// `None` when the sum leaves i64.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) => Some(Money(sum)),
            None => None,
        }
    }

    /// Sums `amounts`, stopping at the first overflow.
    pub fn checked_sum<I>(amounts: I) -> Option<Self>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |total, amount| total.checked_add(amount))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows the amount with a currency sign and thousands separators.
///
/// `Money::from_units(1250000)` → `$1.250.000`
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let digits = self.0.unsigned_abs().to_string();

        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }

        write!(f, "{}${}", sign, grouped)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
