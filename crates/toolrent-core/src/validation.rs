//! # Validation Module
//!
//! Input validation for the inventory engine and the lending orchestrator.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Façade (HTTP)                                                │
//! │  └── Request parsing, type shape                                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (pure, no I/O)                                   │
//! │  ├── Field rules: names, values, quantities                            │
//! │  └── Request rules: loan window, loan lines, return sets               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Services (toolrent-db, inside the transaction)               │
//! │  └── Rules that need state: customer exists, stock, open loans         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: Database (SQLite)                                            │
//! │  └── CHECK (quantity >= 0), UNIQUE, foreign keys                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use toolrent_core::validation::{validate_tool_name, validate_replacement_value};
//!
//! assert!(validate_tool_name("Drill").is_ok());
//! assert!(validate_replacement_value(0).is_err());
//! ```

use std::collections::{BTreeSet, HashSet};

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::types::{LoanLineRequest, ReceiveTool, ReturnLoan, ToolState};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

fn validate_required_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates a tool name.
///
/// ## Rules
/// - Must not be blank
/// - At most 200 characters
pub fn validate_tool_name(name: &str) -> ValidationResult<()> {
    validate_required_text("name", name, 200)
}

/// Validates a tool category.
pub fn validate_category(category: &str) -> ValidationResult<()> {
    validate_required_text("category", category, 100)
}

/// Validates a customer rut (external identifier).
///
/// Format checking (check digit) belongs to identity provisioning; here the
/// rut only has to be present and reasonably short.
pub fn validate_rut(rut: &str) -> ValidationResult<()> {
    validate_required_text("rut", rut, 20)
}

/// Validates a customer display name.
pub fn validate_customer_name(name: &str) -> ValidationResult<()> {
    validate_required_text("customer name", name, 200)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Replacement value on receipt must be strictly positive.
pub fn validate_replacement_value(value: i64) -> ValidationResult<()> {
    if value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "replacement value".to_string(),
        });
    }
    Ok(())
}

/// Received quantity must be strictly positive.
pub fn validate_receive_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Administrative overrides (quantity, replacement value, daily rate) only
/// reject negatives.
pub fn validate_non_negative(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Request Validators
// =============================================================================

/// Validates a receipt and returns its parsed state.
///
/// ## Order
/// name → category → replacement value → quantity → state
pub fn validate_receive(input: &ReceiveTool) -> ValidationResult<ToolState> {
    validate_tool_name(&input.name)?;
    validate_category(&input.category)?;
    validate_replacement_value(input.replacement_value)?;
    validate_receive_quantity(input.quantity)?;
    input.state.parse()
}

/// Validates the loan window (check 1, dates part).
///
/// Both dates must be present and `return_date >= reservation_date`.
/// Returns the unwrapped pair.
pub fn validate_loan_window(
    reservation_date: Option<NaiveDate>,
    return_date: Option<NaiveDate>,
) -> ValidationResult<(NaiveDate, NaiveDate)> {
    let reservation = reservation_date.ok_or_else(|| ValidationError::Required {
        field: "reservation date".to_string(),
    })?;
    let ret = return_date.ok_or_else(|| ValidationError::Required {
        field: "return date".to_string(),
    })?;

    if ret < reservation {
        return Err(ValidationError::ReturnBeforeReservation);
    }

    Ok((reservation, ret))
}

/// Validates the shape of the requested lines (check 5).
///
/// ## Rules (per line, in request order)
/// - `tool_id` present and not blank
/// - quantity exactly 1 (absent counts as 1)
/// - the same tool id does not appear twice
///
/// Returns the trimmed tool ids in request order.
pub fn validate_loan_lines(lines: &[LoanLineRequest]) -> ValidationResult<Vec<String>> {
    if lines.is_empty() {
        return Err(ValidationError::NoItems);
    }

    let mut seen = HashSet::with_capacity(lines.len());
    let mut ids = Vec::with_capacity(lines.len());

    for line in lines {
        let tool_id = line
            .tool_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ValidationError::Required {
                field: "tool id".to_string(),
            })?;

        let quantity = line.quantity.unwrap_or(1);
        if quantity != 1 {
            return Err(ValidationError::QuantityMustBeOne {
                tool_id: tool_id.to_string(),
                quantity,
            });
        }

        if !seen.insert(tool_id) {
            return Err(ValidationError::RepeatedTool {
                tool_id: tool_id.to_string(),
            });
        }

        ids.push(tool_id.to_string());
    }

    Ok(ids)
}

/// Validates the damaged/irreparable sets of a return against the loan's
/// line bucket ids.
///
/// ## Rules
/// 1. The two sets are disjoint.
/// 2. Every damaged id is a line of the loan.
/// 3. Every irreparable id is a line of the loan.
/// 4. Repair costs are not negative.
///
/// Offending ids are reported sorted.
pub fn validate_return_sets(
    request: &ReturnLoan,
    line_tool_ids: &BTreeSet<String>,
) -> ValidationResult<()> {
    let both: Vec<String> = request
        .damaged
        .intersection(&request.irreparable)
        .cloned()
        .collect();
    if !both.is_empty() {
        return Err(ValidationError::DamagedAndIrreparable { ids: both });
    }

    let bad_damaged: Vec<String> = request.damaged.difference(line_tool_ids).cloned().collect();
    if !bad_damaged.is_empty() {
        return Err(ValidationError::DamagedNotInLoan { ids: bad_damaged });
    }

    let bad_irreparable: Vec<String> = request
        .irreparable
        .difference(line_tool_ids)
        .cloned()
        .collect();
    if !bad_irreparable.is_empty() {
        return Err(ValidationError::IrreparableNotInLoan {
            ids: bad_irreparable,
        });
    }

    for cost in request.repair_costs.values() {
        validate_non_negative("repair cost", *cost)?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
