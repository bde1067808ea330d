//! # Order Total & Balance Math
//!
//! The single computation path for the two derived monetary values in the
//! system: an order's total price and its outstanding balance.
//!
//! ## Why One Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  INVARIANT 1                                                            │
//! │                                                                         │
//! │  RepairOrder.total_price ==                                             │
//! │      Σ over services (                                                  │
//! │          service_price + Σ over parts (unit_price × quantity)           │
//! │      )                                                                  │
//! │                                                                         │
//! │  The engine's recompute step loads the line-item tree and calls         │
//! │  order_total(). No other code writes total_price. The invariant is     │
//! │  therefore provable: there is exactly one writer and one formula.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The outstanding balance is never stored at all; it is recomputed from the
//! ledger on demand so it cannot drift from it.

use crate::money::Money;
use crate::types::{Payment, PaymentStatus, RepairOrderPart, RepairOrderService};

/// A service line together with its part lines, as loaded from storage.
///
/// The engine walks the ownership tree strictly root to leaves: order holds
/// service lines, each service line holds its part lines.
#[derive(Debug, Clone)]
pub struct ServiceLine {
    pub service: RepairOrderService,
    pub parts: Vec<RepairOrderPart>,
}

impl ServiceLine {
    /// This line's contribution: snapshot service price plus all part lines.
    pub fn line_total(&self) -> Money {
        self.service.service_price() + self.parts.iter().map(|p| p.line_total()).sum()
    }
}

/// Re-derives an order's total price from its line items.
///
/// This is the pure core of `RecomputeTotal`: the db layer loads the tree,
/// calls this, and persists the result inside the mutating transaction.
/// Exposed publicly for reconciliation tooling that wants to verify a stored
/// total against an independently recomputed one.
pub fn order_total(lines: &[ServiceLine]) -> Money {
    lines.iter().map(|l| l.line_total()).sum()
}

/// Derives the outstanding balance of an order from its payment ledger.
///
/// ## Formula
/// ```text
/// outstanding = total
///             - Σ amount    (payments settled: paid or later refunded)
///             + Σ refund    (payments refunded)
/// ```
///
/// A refunded payment was settled before the refund, so its captured amount
/// still counts as received; only the refunded portion is owed again.
/// Payments still `pending` contribute nothing until they settle.
///
/// The result may be negative: overpayment is allowed and surfaces as a
/// negative balance (credit).
pub fn outstanding_balance(total: Money, payments: &[Payment]) -> Money {
    let settled: Money = payments
        .iter()
        .filter(|p| matches!(p.status, PaymentStatus::Paid | PaymentStatus::Refunded))
        .map(|p| p.amount())
        .sum();
    let refunded: Money = payments
        .iter()
        .filter(|p| p.status == PaymentStatus::Refunded)
        .map(|p| p.refund_amount())
        .sum();

    total - settled + refunded
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentMethod;
    use chrono::Utc;

    fn service_line(price_cents: i64, parts: &[(i64, i64)]) -> ServiceLine {
        let now = Utc::now();
        ServiceLine {
            service: RepairOrderService {
                id: "svc-line".into(),
                order_id: "order".into(),
                service_id: "svc".into(),
                service_price_cents: price_cents,
                created_at: now,
            },
            parts: parts
                .iter()
                .map(|&(unit_price_cents, quantity)| RepairOrderPart {
                    id: "part-line".into(),
                    order_service_id: "svc-line".into(),
                    part_id: "part".into(),
                    quantity,
                    unit_price_cents,
                    created_at: now,
                })
                .collect(),
        }
    }

    fn payment(amount_cents: i64, status: PaymentStatus, refund_cents: Option<i64>) -> Payment {
        let now = Utc::now();
        Payment {
            id: "pay".into(),
            repair_order_id: "order".into(),
            amount_cents,
            method: PaymentMethod::Cash,
            status,
            refund_amount_cents: refund_cents,
            refund_reason: refund_cents.map(|_| "customer request".to_string()),
            refunded_by: refund_cents.map(|_| "user-1".to_string()),
            refunded_at: refund_cents.map(|_| now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn empty_order_totals_zero() {
        assert_eq!(order_total(&[]), Money::zero());
    }

    #[test]
    fn total_sums_services_and_parts() {
        // One service at $500.00 with one part at $1500.00 × 1  → $2000.00
        let lines = vec![service_line(50_000, &[(150_000, 1)])];
        assert_eq!(order_total(&lines).cents(), 200_000);
    }

    #[test]
    fn total_multiplies_part_quantities() {
        let lines = vec![
            service_line(10_000, &[(250, 4), (1_000, 2)]), // 10000 + 1000 + 2000
            service_line(5_000, &[]),                      // 5000
        ];
        assert_eq!(order_total(&lines).cents(), 18_000);
    }

    #[test]
    fn balance_ignores_pending_payments() {
        let total = Money::from_cents(10_000);
        let payments = vec![payment(4_000, PaymentStatus::Pending, None)];
        assert_eq!(outstanding_balance(total, &payments).cents(), 10_000);
    }

    #[test]
    fn balance_subtracts_settled_payments() {
        let total = Money::from_cents(10_000);
        let payments = vec![
            payment(4_000, PaymentStatus::Paid, None),
            payment(3_000, PaymentStatus::Paid, None),
        ];
        assert_eq!(outstanding_balance(total, &payments).cents(), 3_000);
    }

    #[test]
    fn balance_adds_back_refunds() {
        // Paid $10.00 in full, then refunded $6.00: customer owes $6.00 again.
        let total = Money::from_cents(1_000);
        let payments = vec![payment(1_000, PaymentStatus::Refunded, Some(600))];
        assert_eq!(outstanding_balance(total, &payments).cents(), 600);
    }

    #[test]
    fn overpayment_yields_negative_balance() {
        let total = Money::from_cents(1_000);
        let payments = vec![payment(1_500, PaymentStatus::Paid, None)];
        assert_eq!(outstanding_balance(total, &payments).cents(), -500);
    }
}
