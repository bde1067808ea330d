//! # Error Types
//!
//! Domain-specific error types for mend-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  mend-core errors (this file)                                          │
//! │  ├── CoreError        - Business rule / invariant violations           │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  mend-db errors (separate crate)                                       │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── EngineError      - CoreError | DbError, returned by operations    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (part name, ids, amounts)
//! 3. Errors are enum variants, never String
//! 4. Each variant maps to one actionable user-facing message
//! 5. A detected violation aborts the whole transaction; nothing is
//!    silently corrected

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations or missing referenced
/// entities. They are detected synchronously inside the operation that would
/// violate the invariant, and the surrounding transaction is rolled back.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Referenced customer does not exist.
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// Referenced repair order does not exist.
    #[error("Repair order not found: {0}")]
    OrderNotFound(String),

    /// Referenced catalog service does not exist.
    #[error("Repair service not found: {0}")]
    ServiceNotFound(String),

    /// Referenced catalog spare part does not exist.
    #[error("Spare part not found: {0}")]
    PartNotFound(String),

    /// Referenced service line item does not exist (or was already detached).
    #[error("Order service line not found: {0}")]
    ServiceLineNotFound(String),

    /// Referenced part line item does not exist (or was already detached).
    ///
    /// ## Why Not a Silent No-Op
    /// Detach restores stock. Treating a repeated detach as success would
    /// double-restore the part's stock, so a missing line is always an error.
    #[error("Order part line not found: {0}")]
    PartLineNotFound(String),

    /// Referenced payment does not exist.
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// Requested quantity exceeds available stock.
    ///
    /// ## User Workflow
    /// ```text
    /// AttachPart (qty: 5)
    ///      │
    ///      ▼
    /// Guarded decrement: stock_qty >= 5?  available = 3
    ///      │
    ///      ▼
    /// InsufficientStock { part: "OLED panel", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// UI shows: "Only 3 OLED panel in stock"
    /// ```
    #[error("Insufficient stock for {part}: available {available}, requested {requested}")]
    InsufficientStock {
        part: String,
        available: i64,
        requested: i64,
    },

    /// Structural edit attempted on a completed order.
    ///
    /// ## When This Occurs
    /// - Attaching a service or part after completion
    /// - Detaching a line item after completion
    #[error("Repair order {order_id} is completed and no longer accepts edits")]
    OrderClosed { order_id: String },

    /// A status was moved outside its allowed-transition table.
    ///
    /// ## When This Occurs
    /// - Settling a payment that is not `pending`
    /// - Refunding a payment that is not `paid` (incl. a second refund)
    /// - Skipping or reversing an order workflow step
    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Refund amount is non-positive or exceeds the original payment.
    #[error("Invalid refund amount: requested {requested_cents} cents against a {paid_cents} cent payment")]
    InvalidRefundAmount {
        requested_cents: i64,
        paid_cents: i64,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when caller input doesn't meet requirements. Used for early
/// validation before any database work starts.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: &'static str },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: &'static str },

    /// Value must not be negative (zero is allowed).
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: &'static str },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            part: "OLED panel".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for OLED panel: available 3, requested 5"
        );

        let err = CoreError::InvalidTransition {
            entity: "payment",
            from: "refunded".to_string(),
            to: "refunded".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid payment transition: refunded -> refunded"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required { field: "name" };
        assert_eq!(err.to_string(), "name is required");

        let err = ValidationError::MustBePositive { field: "quantity" };
        assert_eq!(err.to_string(), "quantity must be positive");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required { field: "name" };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
