//! # Customer Activation Rule
//!
//! A customer may borrow only while nothing is owed:
//!
//! ```text
//! active = NOT ( any open loan past its agreed return date
//!              OR any unpaid late fine > 0
//!              OR any unpaid damage penalty > 0 )
//! ```
//!
//! The stored `customers.active` column is a cache of this predicate. It is
//! overwritten at the end of every operation that can change one of the inputs
//! (create loan, return loan, pay fines) and never set anywhere else.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::Loan;

/// The three facts the activation rule depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DebtStatus {
    pub has_overdue_loan: bool,
    pub has_unpaid_late_fine: bool,
    pub has_unpaid_damage_penalty: bool,
}

impl DebtStatus {
    /// Evaluates the predicate over `loans`. The stored `active` flag is
    /// computed here too, from the customer's loans that can carry debt.
    pub fn from_loans(loans: &[Loan], today: NaiveDate) -> Self {
        DebtStatus {
            has_overdue_loan: loans.iter().any(|l| l.is_overdue(today)),
            has_unpaid_late_fine: loans.iter().any(Loan::has_unpaid_late_fine),
            has_unpaid_damage_penalty: loans.iter().any(Loan::has_unpaid_damage_penalty),
        }
    }

    /// Borrowing eligibility.
    #[inline]
    pub fn is_active(&self) -> bool {
        !(self.has_overdue_loan || self.has_unpaid_late_fine || self.has_unpaid_damage_penalty)
    }
}
