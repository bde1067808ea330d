//! # Repair Order Repository
//!
//! Database operations for repair orders and their status workflow.
//!
//! ## Status Workflow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Order Lifecycle                                    │
//! │                                                                         │
//! │  1. INTAKE                                                              │
//! │     └── create() → RepairOrder { status: Pending, total: $0.00 }       │
//! │                                                                         │
//! │  2. COMPOSE (engine.rs, allowed in Pending and InProgress)             │
//! │     └── attach_service() / attach_part() / detach_*()                  │
//! │                                                                         │
//! │  3. WORK                                                               │
//! │     └── start_work() → { status: InProgress }                          │
//! │                                                                         │
//! │  4. FINISH                                                             │
//! │     └── complete() → { status: Completed, completed_at }               │
//! │         Order is frozen: engine rejects further structural edits       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transitions are enforced with guarded UPDATEs (`WHERE status = ...` plus a
//! `rows_affected` check), so a lost race surfaces as `InvalidTransition`
//! rather than silently overwriting a concurrent change.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult, EngineResult};
use mend_core::totals::ServiceLine;
use mend_core::{
    CoreError, OrderStatus, RepairOrder, RepairOrderPart, RepairOrderService,
};

/// Repository for repair-order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Creates an empty repair order at intake.
    ///
    /// ## Errors
    /// `CoreError::CustomerNotFound` when the customer id is unknown.
    pub async fn create(&self, customer_id: &str, notes: Option<&str>) -> EngineResult<RepairOrder> {
        // Explicit existence check: a foreign-key failure would be opaque.
        let exists: Option<String> =
            sqlx::query_scalar("SELECT id FROM customers WHERE id = ?1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(DbError::from)?;

        if exists.is_none() {
            return Err(CoreError::CustomerNotFound(customer_id.to_string()).into());
        }

        let now = Utc::now();
        let order = RepairOrder {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.to_string(),
            status: OrderStatus::Pending,
            total_price_cents: 0,
            notes: notes.map(str::to_string),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        debug!(id = %order.id, customer_id = %customer_id, "Creating repair order");

        sqlx::query(
            r#"
            INSERT INTO repair_orders (
                id, customer_id, status, total_price_cents, notes,
                created_at, updated_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&order.id)
        .bind(&order.customer_id)
        .bind(order.status)
        .bind(order.total_price_cents)
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.completed_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(order)
    }

    /// Gets a repair order by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<RepairOrder>> {
        let order = sqlx::query_as::<_, RepairOrder>(
            r#"
            SELECT id, customer_id, status, total_price_cents, notes,
                   created_at, updated_at, completed_at
            FROM repair_orders
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// Lists orders for a customer, newest first.
    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<RepairOrder>> {
        let orders = sqlx::query_as::<_, RepairOrder>(
            r#"
            SELECT id, customer_id, status, total_price_cents, notes,
                   created_at, updated_at, completed_at
            FROM repair_orders
            WHERE customer_id = ?1
            ORDER BY created_at DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Loads an order's line-item tree: service lines with their part lines,
    /// insertion-ordered.
    pub async fn get_lines(&self, order_id: &str) -> DbResult<Vec<ServiceLine>> {
        let services = sqlx::query_as::<_, RepairOrderService>(
            r#"
            SELECT id, order_id, service_id, service_price_cents, created_at
            FROM repair_order_services
            WHERE order_id = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        let mut lines = Vec::with_capacity(services.len());
        for service in services {
            let parts = sqlx::query_as::<_, RepairOrderPart>(
                r#"
                SELECT id, order_service_id, part_id, quantity, unit_price_cents, created_at
                FROM repair_order_parts
                WHERE order_service_id = ?1
                ORDER BY created_at, id
                "#,
            )
            .bind(&service.id)
            .fetch_all(&self.pool)
            .await?;

            lines.push(ServiceLine { service, parts });
        }

        Ok(lines)
    }

    /// Moves an order from `pending` to `in_progress` (technician starts).
    pub async fn start_work(&self, order_id: &str) -> EngineResult<()> {
        debug!(order_id = %order_id, "Starting work on order");
        self.transition(order_id, OrderStatus::Pending, OrderStatus::InProgress)
            .await
    }

    /// Moves an order from `in_progress` to `completed` (technician finishes).
    ///
    /// Sets `completed_at` and freezes the order: the engine will reject
    /// structural edits from here on.
    pub async fn complete(&self, order_id: &str) -> EngineResult<()> {
        debug!(order_id = %order_id, "Completing order");

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE repair_orders
            SET status = 'completed', completed_at = ?2, updated_at = ?2
            WHERE id = ?1 AND status = 'in_progress'
            "#,
        )
        .bind(order_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        if result.rows_affected() == 0 {
            return Err(self
                .transition_error(order_id, OrderStatus::Completed)
                .await?);
        }

        Ok(())
    }

    /// Guarded single-step transition without side fields.
    async fn transition(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
    ) -> EngineResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE repair_orders
            SET status = ?3, updated_at = ?4
            WHERE id = ?1 AND status = ?2
            "#,
        )
        .bind(order_id)
        .bind(from)
        .bind(to)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(order_id, to).await?);
        }

        Ok(())
    }

    /// Builds the precise error after a guarded transition missed:
    /// either the order does not exist, or its current status disallows
    /// the requested step.
    async fn transition_error(
        &self,
        order_id: &str,
        to: OrderStatus,
    ) -> Result<crate::error::EngineError, DbError> {
        let order = self.get_by_id(order_id).await?;

        Ok(match order {
            None => CoreError::OrderNotFound(order_id.to_string()).into(),
            Some(o) => CoreError::InvalidTransition {
                entity: "order",
                from: o.status.as_str().to_string(),
                to: to.as_str().to_string(),
            }
            .into(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn customer_id(db: &Database) -> String {
        db.customers()
            .create("Test Customer", None, None)
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn create_starts_pending_with_zero_total() {
        let db = test_db().await;
        let customer = customer_id(&db).await;

        let order = db
            .orders()
            .create(&customer, Some("cracked screen"))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_price_cents, 0);
        assert!(order.completed_at.is_none());

        let fetched = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(fetched.notes.as_deref(), Some("cracked screen"));
    }

    #[tokio::test]
    async fn create_requires_existing_customer() {
        let db = test_db().await;

        let err = db.orders().create("ghost", None).await.unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::CustomerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn lifecycle_moves_forward_one_step_at_a_time() {
        let db = test_db().await;
        let customer = customer_id(&db).await;
        let orders = db.orders();

        let order = orders.create(&customer, None).await.unwrap();

        // Skipping pending -> completed is rejected.
        let err = orders.complete(&order.id).await.unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::InvalidTransition { .. })
        ));

        orders.start_work(&order.id).await.unwrap();
        let fetched = orders.get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, OrderStatus::InProgress);

        // start_work twice is rejected.
        let err = orders.start_work(&order.id).await.unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::InvalidTransition { .. })
        ));

        orders.complete(&order.id).await.unwrap();
        let fetched = orders.get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, OrderStatus::Completed);
        assert!(fetched.completed_at.is_some());

        // Terminal: nothing moves a completed order.
        let err = orders.complete(&order.id).await.unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn transitions_on_missing_order_report_not_found() {
        let db = test_db().await;

        let err = db.orders().start_work("ghost").await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn get_lines_on_empty_order_is_empty() {
        let db = test_db().await;
        let customer = customer_id(&db).await;
        let order = db.orders().create(&customer, None).await.unwrap();

        assert!(db.orders().get_lines(&order.id).await.unwrap().is_empty());
    }
}
