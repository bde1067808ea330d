//! # Validation Module
//!
//! Input validation for the repair engine.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request layer (out of scope)                                 │
//! │  ├── Required fields, formats, authentication                          │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - business rule validation                       │
//! │  ├── Positive quantities and amounts                                   │
//! │  └── Refund bounds                                                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints (stock_qty >= 0, quantity >= 1)      │
//! │  └── Foreign key constraints                                           │
//! │                                                                         │
//! │  Defense in depth: Multiple layers catch different errors              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, ValidationError};
use crate::money::Money;
use crate::MAX_PART_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an entity display name (customer, service, part).
///
/// ## Rules
/// - Must not be empty after trimming
/// - Must be at most 200 characters
///
/// ## Returns
/// The trimmed name.
pub fn validate_name(name: &str) -> ValidationResult<String> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required { field: "name" });
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "name",
            max: 200,
        });
    }

    Ok(name.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a part quantity for an attach operation.
///
/// ## Rules
/// - Must be at least 1 (attaching zero parts is meaningless)
/// - Must not exceed [`MAX_PART_QUANTITY`]
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity < 1 {
        return Err(ValidationError::MustBePositive { field: "quantity" });
    }

    if quantity > MAX_PART_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity",
            min: 1,
            max: MAX_PART_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a stock level (initial stock at part creation).
///
/// ## Rules
/// - Must not be negative; an empty shelf (zero) is fine
///
/// Catching this here keeps the database's `stock_qty >= 0` CHECK as a
/// last-resort backstop rather than the error the caller sees.
pub fn validate_stock_qty(stock_qty: i64) -> ValidationResult<()> {
    if stock_qty < 0 {
        return Err(ValidationError::MustNotBeNegative { field: "stock_qty" });
    }

    Ok(())
}

/// Validates a captured payment amount.
///
/// ## Rules
/// - Must be strictly positive (refunds travel through the refund fields,
///   never as negative captures)
pub fn validate_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive { field: "amount" });
    }

    Ok(())
}

/// Validates a refund against the original payment amount.
///
/// ## Rules
/// - Refund must be strictly positive
/// - Refund must not exceed the original amount
///
/// Returns `CoreError::InvalidRefundAmount` (not a plain validation error)
/// because the bound depends on the payment being refunded.
pub fn validate_refund(refund: Money, paid: Money) -> Result<(), CoreError> {
    if !refund.is_positive() || refund > paid {
        return Err(CoreError::InvalidRefundAmount {
            requested_cents: refund.cents(),
            paid_cents: paid.cents(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  Screen replacement ").unwrap(), "Screen replacement");
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(201)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(matches!(
            validate_quantity(0),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(matches!(
            validate_quantity(-3),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(matches!(
            validate_quantity(1000),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_validate_stock_qty() {
        assert!(validate_stock_qty(0).is_ok());
        assert!(validate_stock_qty(500).is_ok());

        assert!(matches!(
            validate_stock_qty(-1),
            Err(ValidationError::MustNotBeNegative { .. })
        ));
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(Money::from_cents(1)).is_ok());
        assert!(validate_amount(Money::zero()).is_err());
        assert!(validate_amount(Money::from_cents(-100)).is_err());
    }

    #[test]
    fn test_validate_refund_bounds() {
        let paid = Money::from_cents(1_000);

        assert!(validate_refund(Money::from_cents(600), paid).is_ok());
        assert!(validate_refund(paid, paid).is_ok()); // full refund allowed

        assert!(matches!(
            validate_refund(Money::from_cents(1_001), paid),
            Err(CoreError::InvalidRefundAmount { .. })
        ));
        assert!(matches!(
            validate_refund(Money::zero(), paid),
            Err(CoreError::InvalidRefundAmount { .. })
        ));
        assert!(matches!(
            validate_refund(Money::from_cents(-1), paid),
            Err(CoreError::InvalidRefundAmount { .. })
        ));
    }
}
