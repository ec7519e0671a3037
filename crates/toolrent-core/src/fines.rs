//! # Fine & Cost Calculator
//!
//! Pure functions turning dates and rates into amounts.
//!
//! ```text
//!  reservation ──────────── agreed return ────────── actual return
//!      │◄──── rental_cost ────►│◄────── late_fine ──────►│
//!      max(1, days) × rate       max(0, days) × max(0, fine/day)
//! ```
//!
//! Damage penalties are summed by the orchestrator from replacement values
//! and repair costs; see [`damage_penalty`].
//!
//! Amounts that do not fit in an i64 are rejected with
//! [`ValidationError::AmountTooLarge`] before anything is stored.

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::money::Money;
use crate::validation::ValidationResult;

fn too_large(field: &str) -> ValidationError {
    ValidationError::AmountTooLarge {
        field: field.to_string(),
    }
}

/// Whole days from `from` to `to`. Negative when `to` precedes `from`.
#[inline]
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Rental cost of a loan. A same-day loan is billed as one day.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use toolrent_core::{fines::rental_cost, Money};
///
/// let from = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
/// let to = NaiveDate::from_ymd_opt(2025, 10, 4).unwrap();
/// assert_eq!(rental_cost(from, to, Money::from_units(2000)).unwrap().units(), 6000);
/// ```
pub fn rental_cost(
    reservation_date: NaiveDate,
    return_date: NaiveDate,
    daily_rate: Money,
) -> ValidationResult<Money> {
    let days = days_between(reservation_date, return_date).max(1);
    daily_rate.checked_mul(days).ok_or_else(|| too_large("loan total"))
}

/// Late fine for a return. Early returns and negative rates yield zero.
pub fn late_fine(
    agreed_return_date: NaiveDate,
    actual_return_date: NaiveDate,
    fine_per_day: Money,
) -> ValidationResult<Money> {
    let days_late = days_between(agreed_return_date, actual_return_date).max(0);
    fine_per_day
        .non_negative()
        .checked_mul(days_late)
        .ok_or_else(|| too_large("late fine"))
}

/// Sums a return's damage penalty.
///
/// `replacement_values` are the replacement values of the irreparable units,
/// `repair_costs` the costs of the repairable ones (missing costs already
/// resolved to zero by the caller).
pub fn damage_penalty<I, J>(replacement_values: I, repair_costs: J) -> ValidationResult<Money>
where
    I: IntoIterator<Item = Money>,
    J: IntoIterator<Item = Money>,
{
    Money::checked_sum(replacement_values.into_iter().chain(repair_costs))
        .ok_or_else(|| too_large("damage penalty"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_rental_cost_counts_days() {
        let cost = rental_cost(date(2025, 10, 1), date(2025, 10, 4), Money::from_units(2000)).unwrap();
        assert_eq!(cost.units(), 6000);
    }

    #[test]
    fn test_same_day_loan_bills_one_day() {
        let d = date(2025, 10, 1);
        assert_eq!(rental_cost(d, d, Money::from_units(2500)).unwrap().units(), 2500);
    }

    #[test]
    fn test_late_fine_three_days() {
        let fine = late_fine(date(2025, 10, 4), date(2025, 10, 7), Money::from_units(500)).unwrap();
        assert_eq!(fine.units(), 1500);
    }

    #[test]
    fn test_late_fine_zero_on_time_or_early() {
        let agreed = date(2025, 10, 4);
        assert!(late_fine(agreed, agreed, Money::from_units(500)).unwrap().is_zero());
        assert!(late_fine(agreed, date(2025, 10, 2), Money::from_units(500)).unwrap().is_zero());
    }

    #[test]
    fn test_late_fine_negative_rate_clamped() {
        let fine = late_fine(date(2025, 10, 4), date(2025, 10, 9), Money::from_units(-100)).unwrap();
        assert!(fine.is_zero());
    }

    #[test]
    fn test_late_fine_strictly_increasing() {
        let agreed = date(2025, 10, 4);
        let rate = Money::from_units(500);
        let mut previous = Money::zero();
        for delta in 1..=30 {
            let fine = late_fine(agreed, agreed + chrono::Duration::days(delta), rate).unwrap();
            assert!(fine > previous, "fine must grow at delta {}", delta);
            previous = fine;
        }
    }

    #[test]
    fn test_damage_penalty_sums_both_sources() {
        let penalty = damage_penalty(
            [Money::from_units(50_000)],
            [Money::from_units(800), Money::zero()],
        )
        .unwrap();
        assert_eq!(penalty.units(), 50_800);
    }

    #[test]
    fn test_rental_cost_too_large() {
        let err = rental_cost(date(2025, 10, 1), date(2025, 10, 4), Money::from_units(i64::MAX / 2))
            .unwrap_err();
        assert!(matches!(err, ValidationError::AmountTooLarge { ref field } if field == "loan total"));
        assert_eq!(err.to_string(), "loan total is too large");

        // One day at the largest rate still fits.
        let d = date(2025, 10, 1);
        assert_eq!(rental_cost(d, d, Money::from_units(i64::MAX)).unwrap().units(), i64::MAX);
    }

    #[test]
    fn test_late_fine_too_large() {
        let err = late_fine(date(2025, 10, 4), date(2025, 10, 7), Money::from_units(i64::MAX / 2))
            .unwrap_err();
        assert!(matches!(err, ValidationError::AmountTooLarge { ref field } if field == "late fine"));

        // On time, so no multiplication by a day count.
        let agreed = date(2025, 10, 4);
        assert!(late_fine(agreed, agreed, Money::from_units(i64::MAX)).unwrap().is_zero());
    }

    #[test]
    fn test_damage_penalty_too_large() {
        let err = damage_penalty([Money::from_units(i64::MAX)], [Money::from_units(1)]).unwrap_err();
        assert!(matches!(err, ValidationError::AmountTooLarge { ref field } if field == "damage penalty"));

        let err = damage_penalty(
            std::iter::empty(),
            [Money::from_units(i64::MAX / 2 + 1), Money::from_units(i64::MAX / 2 + 1)],
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::AmountTooLarge { .. }));
    }
}
