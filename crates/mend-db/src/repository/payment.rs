//! # Payment Ledger
//!
//! Database operations for payments against repair orders.
//!
//! ## Payment Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Payment Lifecycle                                  │
//! │                                                                         │
//! │  1. CAPTURE                                                             │
//! │     └── capture() → Payment { status: Paid }      (cash / card)        │
//! │     └── capture() → Payment { status: Pending }   (online)             │
//! │                                                                         │
//! │  2. SETTLE (online only)                                                │
//! │     └── settle() → { status: Paid }                                    │
//! │                                                                         │
//! │  3. (OPTIONAL) REFUND - one-way, terminal                               │
//! │     └── refund(amount, reason, by) → { status: Refunded,               │
//! │             refund_amount, refund_reason, refunded_by, refunded_at }   │
//! │         All four refund fields are written exactly once.               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The ledger reads the order's total (for the outstanding-balance view) but
//! never writes it; the composition engine owns `total_price_cents`.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult, EngineResult};
use mend_core::validation::{validate_amount, validate_refund};
use mend_core::{
    totals, CoreError, Money, Payment, PaymentMethod, PaymentStatus, RepairOrder,
};

/// Repository for the payment ledger.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Captures a payment against an order.
    ///
    /// Cash and card settle immediately (`Paid`); online captures start
    /// `Pending` until the confirmation callback settles them.
    ///
    /// Overpayment is allowed: the ledger records what was received and the
    /// outstanding balance simply goes negative. It is logged so the shop
    /// can spot it.
    pub async fn capture(
        &self,
        order_id: &str,
        amount: Money,
        method: PaymentMethod,
    ) -> EngineResult<Payment> {
        validate_amount(amount).map_err(CoreError::from)?;

        self.order_or_err(order_id).await?;

        let status = if method.settles_immediately() {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Pending
        };

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            repair_order_id: order_id.to_string(),
            amount_cents: amount.cents(),
            method,
            status,
            refund_amount_cents: None,
            refund_reason: None,
            refunded_by: None,
            refunded_at: None,
            created_at: now,
            updated_at: now,
        };

        debug!(
            id = %payment.id,
            order_id = %order_id,
            amount = %amount,
            status = payment.status.as_str(),
            "Capturing payment"
        );

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, repair_order_id, amount_cents, method, status,
                refund_amount_cents, refund_reason, refunded_by, refunded_at,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.repair_order_id)
        .bind(payment.amount_cents)
        .bind(payment.method)
        .bind(payment.status)
        .bind(payment.refund_amount_cents)
        .bind(&payment.refund_reason)
        .bind(&payment.refunded_by)
        .bind(payment.refunded_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        if status == PaymentStatus::Paid {
            let balance = self.outstanding_balance(order_id).await?;
            if balance.is_negative() {
                warn!(
                    order_id = %order_id,
                    balance = %balance,
                    "Order is overpaid"
                );
            }
        }

        Ok(payment)
    }

    /// Settles a pending payment (`pending -> paid`).
    ///
    /// ## Errors
    /// `CoreError::InvalidTransition` when the payment is not `pending`.
    pub async fn settle(&self, payment_id: &str) -> EngineResult<Payment> {
        debug!(id = %payment_id, "Settling payment");

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'paid', updated_at = ?2
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(payment_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(payment_id, PaymentStatus::Paid).await?);
        }

        self.get_or_err(payment_id).await
    }

    /// Refunds a settled payment (`paid -> refunded`), writing the four
    /// refund fields exactly once.
    ///
    /// ## Errors
    /// - `CoreError::InvalidRefundAmount` when the refund is non-positive or
    ///   exceeds the original amount
    /// - `CoreError::InvalidTransition` when the payment is not `paid`
    ///   (including a second refund attempt)
    pub async fn refund(
        &self,
        payment_id: &str,
        refund_amount: Money,
        reason: &str,
        refunded_by: &str,
    ) -> EngineResult<Payment> {
        let payment = self.get_or_err(payment_id).await?;

        // Bounds check first: an out-of-range amount is the caller's bug
        // regardless of the payment's current status.
        validate_refund(refund_amount, payment.amount())?;

        debug!(
            id = %payment_id,
            refund = %refund_amount,
            refunded_by = %refunded_by,
            "Refunding payment"
        );

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'refunded',
                refund_amount_cents = ?2,
                refund_reason = ?3,
                refunded_by = ?4,
                refunded_at = ?5,
                updated_at = ?5
            WHERE id = ?1 AND status = 'paid'
            "#,
        )
        .bind(payment_id)
        .bind(refund_amount.cents())
        .bind(reason)
        .bind(refunded_by)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        if result.rows_affected() == 0 {
            return Err(self
                .transition_error(payment_id, PaymentStatus::Refunded)
                .await?);
        }

        self.get_or_err(payment_id).await
    }

    /// Gets a payment by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, repair_order_id, amount_cents, method, status,
                   refund_amount_cents, refund_reason, refunded_by, refunded_at,
                   created_at, updated_at
            FROM payments
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Gets all payments for an order, oldest first.
    pub async fn list_for_order(&self, order_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, repair_order_id, amount_cents, method, status,
                   refund_amount_cents, refund_reason, refunded_by, refunded_at,
                   created_at, updated_at
            FROM payments
            WHERE repair_order_id = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Derives the order's outstanding balance from the ledger.
    ///
    /// Never stored; see [`mend_core::totals::outstanding_balance`] for the
    /// formula. A negative result means the order is overpaid.
    pub async fn outstanding_balance(&self, order_id: &str) -> EngineResult<Money> {
        let order = self.order_or_err(order_id).await?;
        let payments = self.list_for_order(order_id).await?;

        Ok(totals::outstanding_balance(order.total_price(), &payments))
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    async fn get_or_err(&self, payment_id: &str) -> EngineResult<Payment> {
        self.get_by_id(payment_id)
            .await?
            .ok_or_else(|| CoreError::PaymentNotFound(payment_id.to_string()).into())
    }

    async fn order_or_err(&self, order_id: &str) -> EngineResult<RepairOrder> {
        let order = sqlx::query_as::<_, RepairOrder>(
            r#"
            SELECT id, customer_id, status, total_price_cents, notes,
                   created_at, updated_at, completed_at
            FROM repair_orders
            WHERE id = ?1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        order.ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()).into())
    }

    /// Builds the precise error after a guarded transition missed.
    async fn transition_error(
        &self,
        payment_id: &str,
        to: PaymentStatus,
    ) -> Result<crate::error::EngineError, DbError> {
        let payment = self.get_by_id(payment_id).await?;

        Ok(match payment {
            None => CoreError::PaymentNotFound(payment_id.to_string()).into(),
            Some(p) => CoreError::InvalidTransition {
                entity: "payment",
                from: p.status.as_str().to_string(),
                to: to.as_str().to_string(),
            }
            .into(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
