//! # Domain Types
//!
//! Core domain types for the Mendshop repair engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Catalog (read-mostly)              Order aggregate (ownership tree)   │
//! │  ┌─────────────────┐                ┌──────────────────────────┐       │
//! │  │  RepairService  │                │       RepairOrder        │       │
//! │  │  SparePart      │                │  └─ RepairOrderService   │       │
//! │  └─────────────────┘                │       └─ RepairOrderPart │       │
//! │                                     └──────────────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Customer     │   │     Payment     │   │  Status enums   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  OrderStatus    │       │
//! │  │  id (UUID)      │   │  amount_cents   │   │  PaymentStatus  │       │
//! │  │  name, contact  │   │  refund fields  │   │  PaymentMethod  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! `RepairOrderService.service_price_cents` and
//! `RepairOrderPart.unit_price_cents` are copies taken at attach time. Later
//! catalog repricing never rewrites an existing order's line items or total.
//!
//! ## Status Machines
//! `OrderStatus` and `PaymentStatus` carry an explicit allowed-transition
//! table. Any transition not in the table is rejected by the db layer, which
//! rules out the "skip a state" class of bug by construction.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Customer
// =============================================================================

/// A customer who brings devices in for repair.
///
/// Identity is immutable after creation; only the contact fields are
/// expected to change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Customer display name.
    pub name: String,

    /// Optional phone number.
    pub phone: Option<String>,

    /// Optional email address.
    pub email: Option<String>,

    /// When the customer record was created.
    pub created_at: DateTime<Utc>,

    /// When the contact details were last updated.
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Catalog: Repair Services & Spare Parts
// =============================================================================

/// A catalog repair service (e.g., "Screen replacement").
///
/// `base_price_cents` is the *current* catalog price. Orders never reference
/// it live; they snapshot it at attach time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RepairService {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown to the front desk and on invoices.
    pub name: String,

    /// Current catalog price in cents.
    pub base_price_cents: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RepairService {
    /// Returns the current catalog price as a Money type.
    #[inline]
    pub fn base_price(&self) -> Money {
        Money::from_cents(self.base_price_cents)
    }
}

/// A catalog spare part with live stock.
///
/// `stock_qty` is the contended resource of the whole engine: it is mutated
/// only through the attach/detach operations, never clamped, never negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SparePart {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name (e.g., "iPhone 13 OLED panel").
    pub name: String,

    /// Units currently on hand. Invariant: `stock_qty >= 0` at all times.
    pub stock_qty: i64,

    /// Current catalog price per unit, in cents.
    pub unit_price_cents: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SparePart {
    /// Returns the current catalog unit price as a Money type.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Checks if the requested quantity is available right now.
    ///
    /// ## Note
    /// This is a convenience read for UI hints. The authoritative check is
    /// the guarded decrement inside the attach transaction; stock may change
    /// between this call and the attach.
    #[inline]
    pub fn has_stock(&self, quantity: i64) -> bool {
        self.stock_qty >= quantity
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// The workflow status of a repair order.
///
/// ## Transition Table
/// ```text
/// pending ──► in_progress ──► completed (terminal)
/// ```
/// Forward-only, one step at a time. `completed` freezes the order: no
/// structural edits (attach/detach) are accepted afterwards, preserving the
/// historical total used for final invoicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order created at intake, work not started.
    Pending,
    /// A technician is working on the device.
    InProgress,
    /// Work finished; order is frozen for invoicing.
    Completed,
}

impl OrderStatus {
    /// The explicit allowed-transition table.
    ///
    /// Everything not listed here is rejected, including same-state
    /// transitions and skips like `pending -> completed`.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::InProgress)
                | (OrderStatus::InProgress, OrderStatus::Completed)
        )
    }

    /// Whether line items may still be attached/detached in this status.
    #[inline]
    pub fn allows_edits(self) -> bool {
        !matches!(self, OrderStatus::Completed)
    }

    /// Whether this is a terminal state (no further transitions).
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed)
    }

    /// Stable string form, matching the database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Completed => "completed",
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

// =============================================================================
// Repair Order (aggregate root)
// =============================================================================

/// A repair order: the aggregate root owning service and part line items.
///
/// `total_price_cents` is authoritative but derived: the engine's recompute
/// step is the only code path that writes it, and after every operation it
/// equals the sum over the line-item tree (see [`crate::totals::order_total`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RepairOrder {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// The customer this order belongs to.
    pub customer_id: String,

    /// Workflow status (forward-only).
    pub status: OrderStatus,

    /// Authoritative order total in cents. Written only by the recompute step.
    pub total_price_cents: i64,

    /// Free-form intake notes (device condition, fault description).
    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set exactly once, when the order transitions to `completed`.
    pub completed_at: Option<DateTime<Utc>>,
}

impl RepairOrder {
    /// Returns the order total as a Money type.
    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }

    /// Whether structural edits (attach/detach) are currently allowed.
    #[inline]
    pub fn is_editable(&self) -> bool {
        self.status.allows_edits()
    }

    /// Derived overdue view: open for longer than `max_age`.
    ///
    /// ## Why Derived?
    /// "Overdue" is a property of elapsed time, not a workflow state. Storing
    /// it would require a background job to flip a flag; deriving it keeps a
    /// single source of truth.
    pub fn is_overdue(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        !self.status.is_terminal() && now - self.created_at > max_age
    }
}

// =============================================================================
// Line Items
// =============================================================================

/// A service line on a repair order.
///
/// ## Snapshot Pattern
/// `service_price_cents` is copied from the catalog's `base_price_cents` at
/// attach time and never updated. This preserves order history even if the
/// catalog is repriced later.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RepairOrderService {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Owning repair order.
    pub order_id: String,

    /// The catalog service this line was created from.
    pub service_id: String,

    /// Price snapshot taken at attach time, in cents. Immutable.
    pub service_price_cents: i64,

    pub created_at: DateTime<Utc>,
}

impl RepairOrderService {
    /// Returns the snapshotted service price as a Money type.
    #[inline]
    pub fn service_price(&self) -> Money {
        Money::from_cents(self.service_price_cents)
    }
}

/// A spare-part line under a service line.
///
/// Created atomically with the stock decrement; `unit_price_cents` is a
/// snapshot of the part's catalog price at attach time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RepairOrderPart {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Owning service line.
    pub order_service_id: String,

    /// The catalog part this line consumes.
    pub part_id: String,

    /// Units consumed. Invariant: `quantity >= 1`.
    pub quantity: i64,

    /// Price snapshot taken at attach time, in cents. Immutable.
    pub unit_price_cents: i64,

    pub created_at: DateTime<Utc>,
}

impl RepairOrderPart {
    /// Returns the snapshotted unit price as a Money type.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// This line's contribution to the order total.
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price().multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Card payment at the counter.
    Card,
    /// Online payment awaiting a confirmation callback.
    Online,
}

impl PaymentMethod {
    /// Whether a capture with this method settles immediately.
    ///
    /// Cash and card settle at the counter; online captures start `pending`
    /// until the (out-of-scope) confirmation callback settles them.
    #[inline]
    pub fn settles_immediately(self) -> bool {
        matches!(self, PaymentMethod::Cash | PaymentMethod::Card)
    }
}

// =============================================================================
// Payment Status
// =============================================================================

/// The settlement status of a payment.
///
/// ## Transition Table
/// ```text
/// pending ──► paid ──► refunded (terminal)
/// ```
/// `refunded` is reachable only from `paid`; no transition skips a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Captured but not yet settled (online flow).
    Pending,
    /// Settled; the money has been received.
    Paid,
    /// Refunded (fully or partially). Terminal.
    Refunded,
}

impl PaymentStatus {
    /// The explicit allowed-transition table.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Paid)
                | (PaymentStatus::Paid, PaymentStatus::Refunded)
        )
    }

    /// Whether this is a terminal state (no further transitions).
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Refunded)
    }

    /// Stable string form, matching the database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

// =============================================================================
// Payment
// =============================================================================

/// A payment recorded against a repair order.
///
/// Payments hold a weak reference to their order: they outlive line-item
/// edits and are never cascaded away. The four `refund_*` fields are written
/// exactly once, by the `paid -> refunded` transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Payment {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// The order this payment settles against.
    pub repair_order_id: String,

    /// Captured amount in cents. Always positive.
    pub amount_cents: i64,

    /// How the payment was made.
    pub method: PaymentMethod,

    /// Settlement status (`pending -> paid -> refunded`).
    pub status: PaymentStatus,

    /// Refunded amount in cents. Write-once; `<= amount_cents`.
    pub refund_amount_cents: Option<i64>,

    /// Why the refund was issued. Write-once.
    pub refund_reason: Option<String>,

    /// Who authorized the refund. Write-once.
    pub refunded_by: Option<String>,

    /// When the refund happened. Write-once.
    pub refunded_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Returns the captured amount as a Money type.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// Returns the refunded amount as a Money type (zero if never refunded).
    #[inline]
    pub fn refund_amount(&self) -> Money {
        Money::from_cents(self.refund_amount_cents.unwrap_or(0))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
