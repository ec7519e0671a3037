//! # Error Types
//!
//! Domain-specific error types for toolrent-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  toolrent-core errors (this file)                                      │
//! │  ├── CoreError        - Domain errors (4 caller-visible categories)    │
//! │  └── ValidationError  - Input / business-rule violations               │
//! │                                                                         │
//! │  toolrent-db errors (separate crate)                                   │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── ServiceError     - What façades see (CoreError | Storage)         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ServiceError → façade response    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (rut, tool id, etc.)
//! 3. Errors are enum variants, never String
//! 4. Each validation variant carries one distinct user-facing message

use thiserror::Error;

use crate::types::ToolState;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// The four variants are the caller-visible error categories of the engine.
/// Storage faults are NOT represented here; they live in `toolrent-db`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad input shape or a violated business rule. User-correctable.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A transition tried to take a unit out of an empty bucket.
    ///
    /// ## When This Occurs
    /// ```text
    /// Transition(bucket "Drill/Electric/Loaned", Available)
    ///      │
    ///      ▼
    /// bucket.quantity == 0
    ///      │
    ///      ▼
    /// InsufficientStock { bucket_id, name: "Drill", state: Loaned }
    /// ```
    #[error("Insufficient stock in bucket {bucket_id} ({name}, {state}): no units left to move")]
    InsufficientStock {
        bucket_id: String,
        name: String,
        state: ToolState,
    },

    /// Concurrent modification detected at commit. Callers may retry.
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation and business-rule errors.
///
/// Every variant maps to exactly one message so the façade can surface it
/// verbatim as a client error.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be greater than 0")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} cannot be negative")]
    Negative { field: String },

    /// A computed amount does not fit in an i64.
    #[error("{field} is too large")]
    AmountTooLarge { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g., an already registered rut).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    // -------------------------------------------------------------------------
    // Inventory rules
    // -------------------------------------------------------------------------
    /// Transition whose target equals the bucket's current state.
    #[error("Tool {tool_id} is already in state {state}")]
    SameState { tool_id: String, state: ToolState },

    // -------------------------------------------------------------------------
    // Loan creation rules (checked in this order)
    // -------------------------------------------------------------------------
    /// Agreed return date precedes the reservation date.
    #[error("Return date cannot be before reservation date")]
    ReturnBeforeReservation,

    /// A loan needs at least one line.
    #[error("At least one item is required")]
    NoItems,

    /// No customer with that rut.
    #[error("Customer (rut) not found: {rut}")]
    UnknownCustomer { rut: String },

    /// Customer is blocked by overdue loans or unpaid debts.
    #[error("Customer {rut} is inactive: overdue loans or unpaid fines must be settled first")]
    CustomerInactive { rut: String },

    /// Open-loan cap reached.
    #[error("Customer {rut} already has {max} active loans")]
    TooManyActiveLoans { rut: String, max: i64 },

    /// A line requested more than one unit.
    #[error("Only one unit per tool is allowed (tool {tool_id}, quantity {quantity})")]
    QuantityMustBeOne { tool_id: String, quantity: i64 },

    /// The same tool id appears twice in one request.
    #[error("Tool repeated in the same loan: {tool_id}")]
    RepeatedTool { tool_id: String },

    /// Two different tool ids in one request resolve to the same tool type.
    #[error("Tool '{name}' ({category}) requested more than once in the same loan")]
    RepeatedToolType { name: String, category: String },

    /// Requested tool id does not exist.
    #[error("Tool not found (id={tool_id})")]
    UnknownTool { tool_id: String },

    /// Requested tool is not in the Available state.
    #[error("Tool {tool_id} is not available (state: {state})")]
    ToolNotAvailable { tool_id: String, state: ToolState },

    /// Requested tool's Available bucket is empty.
    #[error("Not enough stock for tool {tool_id}: available 0")]
    ToolOutOfStock { tool_id: String },

    /// Customer already holds this tool type in an open loan.
    #[error("Customer {rut} already has '{name}' ({category}) in an active loan")]
    ToolAlreadyLoaned {
        rut: String,
        name: String,
        category: String,
    },

    // -------------------------------------------------------------------------
    // Loan return rules
    // -------------------------------------------------------------------------
    /// Loan has already been returned.
    #[error("Loan {loan_id} is already returned (closed)")]
    LoanClosed { loan_id: String },

    /// A tool was flagged both damaged and irreparable.
    #[error("A tool cannot be both damaged and irreparable: {ids:?}")]
    DamagedAndIrreparable { ids: Vec<String> },

    /// Damaged ids that are not lines of the loan.
    #[error("Damaged IDs not in this loan: {ids:?}")]
    DamagedNotInLoan { ids: Vec<String> },

    /// Irreparable ids that are not lines of the loan.
    #[error("Irreparable IDs not in this loan: {ids:?}")]
    IrreparableNotInLoan { ids: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
