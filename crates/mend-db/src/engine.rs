//! # Composition Engine
//!
//! Transactional composition of repair orders: attaching and detaching
//! service lines and part lines, with stock consistency and total recompute.
//!
//! ## Attach-Part Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   attach_part() - one transaction                       │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    1. Load service line + owning order  ── missing? ServiceLineNotFound │
//! │    2. Order accepts edits?              ── completed? OrderClosed       │
//! │    3. Load part (price snapshot)        ── missing? PartNotFound        │
//! │    4. Guarded stock decrement:                                          │
//! │         UPDATE spare_parts SET stock_qty = stock_qty - qty              │
//! │         WHERE id = ? AND stock_qty >= qty                               │
//! │                                         ── 0 rows? InsufficientStock    │
//! │    5. INSERT part line (qty, unit price frozen at today's catalog)      │
//! │    6. Recompute order total from the full line tree                     │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Any failure rolls back: stock, lines and total stay untouched.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - Line-item prices are snapshots; catalog repricing never changes them
//! - `stock_qty` never goes below zero (guarded decrement, checked in SQL too)
//! - `repair_orders.total_price_cents` is written here and nowhere else
//! - A completed order rejects every structural edit

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, EngineResult};
use crate::repository::catalog::{release_stock, reserve_stock};
use mend_core::validation::validate_quantity;
use mend_core::{
    totals, CoreError, Money, OrderStatus, RepairOrderPart, RepairOrderService, ServiceLine,
    SparePart,
};

/// Transactional engine for order composition and total recompute.
#[derive(Debug, Clone)]
pub struct CompositionEngine {
    pool: SqlitePool,
}

impl CompositionEngine {
    /// Creates a new CompositionEngine.
    pub fn new(pool: SqlitePool) -> Self {
        CompositionEngine { pool }
    }

    /// Attaches a catalog service to an order, freezing today's base price
    /// into the line.
    ///
    /// ## Errors
    /// - `CoreError::OrderNotFound` when the order id is unknown
    /// - `CoreError::OrderClosed` when the order is completed
    /// - `CoreError::ServiceNotFound` when the service id is unknown
    pub async fn attach_service(
        &self,
        order_id: &str,
        service_id: &str,
    ) -> EngineResult<RepairOrderService> {
        debug!(order_id = %order_id, service_id = %service_id, "Attaching service");

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let now = Utc::now();

        editable_order(&mut tx, order_id).await?;

        let base_price_cents: Option<i64> =
            sqlx::query_scalar("SELECT base_price_cents FROM repair_services WHERE id = ?1")
                .bind(service_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DbError::from)?;

        let base_price_cents = base_price_cents
            .ok_or_else(|| CoreError::ServiceNotFound(service_id.to_string()))?;

        let line = RepairOrderService {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            service_id: service_id.to_string(),
            service_price_cents: base_price_cents,
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO repair_order_services (id, order_id, service_id, service_price_cents, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&line.id)
        .bind(&line.order_id)
        .bind(&line.service_id)
        .bind(line.service_price_cents)
        .bind(line.created_at)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

        recompute(&mut tx, order_id, now).await?;

        tx.commit().await.map_err(DbError::from)?;
        Ok(line)
    }

    /// Attaches a spare part to a service line, decrementing stock and
    /// freezing today's unit price into the line.
    ///
    /// ## Errors
    /// - `CoreError::Validation` when `quantity` is out of range
    /// - `CoreError::ServiceLineNotFound` when the service line id is unknown
    /// - `CoreError::OrderClosed` when the owning order is completed
    /// - `CoreError::PartNotFound` when the part id is unknown
    /// - `CoreError::InsufficientStock` when fewer than `quantity` units
    ///   remain; nothing is written
    pub async fn attach_part(
        &self,
        order_service_id: &str,
        part_id: &str,
        quantity: i64,
    ) -> EngineResult<RepairOrderPart> {
        validate_quantity(quantity).map_err(CoreError::from)?;

        debug!(
            order_service_id = %order_service_id,
            part_id = %part_id,
            quantity,
            "Attaching part"
        );

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let now = Utc::now();

        let order_id = owning_order_of_service_line(&mut tx, order_service_id).await?;

        let part = sqlx::query_as::<_, SparePart>(
            r#"
            SELECT id, name, stock_qty, unit_price_cents, created_at, updated_at
            FROM spare_parts
            WHERE id = ?1
            "#,
        )
        .bind(part_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::from)?
        .ok_or_else(|| CoreError::PartNotFound(part_id.to_string()))?;

        reserve_stock(&mut tx, part_id, quantity, now).await?;

        let line = RepairOrderPart {
            id: Uuid::new_v4().to_string(),
            order_service_id: order_service_id.to_string(),
            part_id: part_id.to_string(),
            quantity,
            unit_price_cents: part.unit_price_cents,
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO repair_order_parts (id, order_service_id, part_id, quantity, unit_price_cents, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&line.id)
        .bind(&line.order_service_id)
        .bind(&line.part_id)
        .bind(line.quantity)
        .bind(line.unit_price_cents)
        .bind(line.created_at)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

        recompute(&mut tx, &order_id, now).await?;

        tx.commit().await.map_err(DbError::from)?;
        Ok(line)
    }

    /// Detaches a part line, restoring its quantity to stock.
    ///
    /// ## Errors
    /// - `CoreError::PartLineNotFound` when the line id is unknown (a second
    ///   detach of the same line lands here)
    /// - `CoreError::OrderClosed` when the owning order is completed
    pub async fn detach_part(&self, part_line_id: &str) -> EngineResult<()> {
        debug!(part_line_id = %part_line_id, "Detaching part line");

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let now = Utc::now();

        let row = sqlx::query_as::<_, (String, i64, String, OrderStatus)>(
            r#"
            SELECT rop.part_id, rop.quantity, ros.order_id, ro.status
            FROM repair_order_parts rop
            JOIN repair_order_services ros ON ros.id = rop.order_service_id
            JOIN repair_orders ro ON ro.id = ros.order_id
            WHERE rop.id = ?1
            "#,
        )
        .bind(part_line_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::from)?;

        let (part_id, quantity, order_id, status) =
            row.ok_or_else(|| CoreError::PartLineNotFound(part_line_id.to_string()))?;

        if !status.allows_edits() {
            return Err(CoreError::OrderClosed {
                order_id: order_id.clone(),
            }
            .into());
        }

        sqlx::query("DELETE FROM repair_order_parts WHERE id = ?1")
            .bind(part_line_id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;

        release_stock(&mut tx, &part_id, quantity, now).await?;

        recompute(&mut tx, &order_id, now).await?;

        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }

    /// Detaches a service line and all part lines under it, restoring each
    /// part's quantity to stock.
    ///
    /// ## Errors
    /// - `CoreError::ServiceLineNotFound` when the line id is unknown
    /// - `CoreError::OrderClosed` when the owning order is completed
    pub async fn detach_service(&self, order_service_id: &str) -> EngineResult<()> {
        debug!(order_service_id = %order_service_id, "Detaching service line");

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let now = Utc::now();

        let order_id = owning_order_of_service_line(&mut tx, order_service_id).await?;

        let children = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT part_id, quantity
            FROM repair_order_parts
            WHERE order_service_id = ?1
            "#,
        )
        .bind(order_service_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(DbError::from)?;

        for (part_id, quantity) in children {
            release_stock(&mut tx, &part_id, quantity, now).await?;
        }

        // Part lines go with the service line via ON DELETE CASCADE.
        sqlx::query("DELETE FROM repair_order_services WHERE id = ?1")
            .bind(order_service_id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;

        recompute(&mut tx, &order_id, now).await?;

        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }

    /// Recomputes an order's stored total from its line tree.
    ///
    /// Attach and detach already recompute in their own transactions; this
    /// entry point exists for reconciliation.
    pub async fn recompute_total(&self, order_id: &str) -> EngineResult<Money> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let now = Utc::now();

        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM repair_orders WHERE id = ?1")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(DbError::from)?;

        if exists.is_none() {
            return Err(CoreError::OrderNotFound(order_id.to_string()).into());
        }

        let total = recompute(&mut tx, order_id, now).await?;

        tx.commit().await.map_err(DbError::from)?;
        Ok(total)
    }
}

// =============================================================================
// Transaction-scoped helpers
// =============================================================================

/// Loads an order inside the transaction and rejects it if it no longer
/// accepts edits.
async fn editable_order(conn: &mut SqliteConnection, order_id: &str) -> EngineResult<()> {
    let status: Option<OrderStatus> =
        sqlx::query_scalar("SELECT status FROM repair_orders WHERE id = ?1")
            .bind(order_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(DbError::from)?;

    match status {
        None => Err(CoreError::OrderNotFound(order_id.to_string()).into()),
        Some(status) if !status.allows_edits() => Err(CoreError::OrderClosed {
            order_id: order_id.to_string(),
        }
        .into()),
        Some(_) => Ok(()),
    }
}

/// Resolves a service line to its owning order and rejects closed orders.
async fn owning_order_of_service_line(
    conn: &mut SqliteConnection,
    order_service_id: &str,
) -> EngineResult<String> {
    let row = sqlx::query_as::<_, (String, OrderStatus)>(
        r#"
        SELECT ros.order_id, ro.status
        FROM repair_order_services ros
        JOIN repair_orders ro ON ro.id = ros.order_id
        WHERE ros.id = ?1
        "#,
    )
    .bind(order_service_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(DbError::from)?;

    let (order_id, status) =
        row.ok_or_else(|| CoreError::ServiceLineNotFound(order_service_id.to_string()))?;

    if !status.allows_edits() {
        return Err(CoreError::OrderClosed { order_id }.into());
    }

    Ok(order_id)
}

/// Recomputes the order total from the full line-item tree and stores it.
///
/// The single writer of `repair_orders.total_price_cents`.
async fn recompute(
    conn: &mut SqliteConnection,
    order_id: &str,
    now: DateTime<Utc>,
) -> EngineResult<Money> {
    let services = sqlx::query_as::<_, RepairOrderService>(
        r#"
        SELECT id, order_id, service_id, service_price_cents, created_at
        FROM repair_order_services
        WHERE order_id = ?1
        ORDER BY created_at, id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(DbError::from)?;

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
        .fetch_all(&mut *conn)
        .await
        .map_err(DbError::from)?;

        lines.push(ServiceLine { service, parts });
    }

    let total = totals::order_total(&lines);

    sqlx::query(
        r#"
        UPDATE repair_orders
        SET total_price_cents = ?2, updated_at = ?3
        WHERE id = ?1
        "#,
    )
    .bind(order_id)
    .bind(total.cents())
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    debug!(order_id = %order_id, total = %total, "Recomputed order total");

    Ok(total)
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

    struct Fixture {
        order_id: String,
        service_id: String,
        part_id: String,
    }

    /// Customer + empty order, a $5.00 diagnostic service, and a $15.00
    /// part with 10 units on hand.
    async fn fixture(db: &Database) -> Fixture {
        let customer = db
            .customers()
            .create("Engine Customer", None, None)
            .await
            .unwrap();
        let order = db.orders().create(&customer.id, None).await.unwrap();
        let service = db
            .catalog()
            .create_service("Diagnostic", Money::from_cents(500))
            .await
            .unwrap();
        let part = db
            .catalog()
            .create_part("OLED panel", 10, Money::from_cents(1_500))
            .await
            .unwrap();

        Fixture {
            order_id: order.id,
            service_id: service.id,
            part_id: part.id,
        }
    }

    async fn stock_of(db: &Database, part_id: &str) -> i64 {
        db.catalog().get_part(part_id).await.unwrap().unwrap().stock_qty
    }

    async fn total_of(db: &Database, order_id: &str) -> i64 {
        db.orders()
            .get_by_id(order_id)
            .await
            .unwrap()
            .unwrap()
            .total_price_cents
    }

    #[tokio::test]
    async fn attach_accumulates_total_and_consumes_stock() {
        let db = test_db().await;
        let f = fixture(&db).await;
        let engine = db.engine();

        let line = engine
            .attach_service(&f.order_id, &f.service_id)
            .await
            .unwrap();
        assert_eq!(line.service_price_cents, 500);
        assert_eq!(total_of(&db, &f.order_id).await, 500);

        let part_line = engine.attach_part(&line.id, &f.part_id, 1).await.unwrap();
        assert_eq!(part_line.unit_price_cents, 1_500);
        assert_eq!(total_of(&db, &f.order_id).await, 2_000);
        assert_eq!(stock_of(&db, &f.part_id).await, 9);
    }

    #[tokio::test]
    async fn detach_part_restores_stock_and_total() {
        let db = test_db().await;
        let f = fixture(&db).await;
        let engine = db.engine();

        let line = engine
            .attach_service(&f.order_id, &f.service_id)
            .await
            .unwrap();
        let part_line = engine.attach_part(&line.id, &f.part_id, 1).await.unwrap();

        engine.detach_part(&part_line.id).await.unwrap();
        assert_eq!(total_of(&db, &f.order_id).await, 500);
        assert_eq!(stock_of(&db, &f.part_id).await, 10);

        // Detaching the same line again fails; nothing changes.
        let err = engine.detach_part(&part_line.id).await.unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::PartLineNotFound(_))
        ));
        assert_eq!(stock_of(&db, &f.part_id).await, 10);
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_state_untouched() {
        let db = test_db().await;
        let f = fixture(&db).await;
        let engine = db.engine();

        let line = engine
            .attach_service(&f.order_id, &f.service_id)
            .await
            .unwrap();

        let err = engine.attach_part(&line.id, &f.part_id, 11).await.unwrap_err();
        match err.as_core() {
            Some(CoreError::InsufficientStock {
                available,
                requested,
                ..
            }) => {
                assert_eq!(*available, 10);
                assert_eq!(*requested, 11);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        assert_eq!(stock_of(&db, &f.part_id).await, 10);
        assert_eq!(total_of(&db, &f.order_id).await, 500);
        let lines = db.orders().get_lines(&f.order_id).await.unwrap();
        assert!(lines[0].parts.is_empty());
    }

    #[tokio::test]
    async fn concurrent_attaches_for_the_last_unit() {
        let db = test_db().await;
        let f = fixture(&db).await;
        let engine = db.engine();

        let scarce = db
            .catalog()
            .create_part("Rare flex cable", 1, Money::from_cents(900))
            .await
            .unwrap();

        let line = engine
            .attach_service(&f.order_id, &f.service_id)
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            engine.attach_part(&line.id, &scarce.id, 1),
            engine.attach_part(&line.id, &scarce.id, 1),
        );

        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one attach may win the last unit");

        let loser = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
        assert!(matches!(
            loser.as_core(),
            Some(CoreError::InsufficientStock { .. })
        ));
        assert_eq!(stock_of(&db, &scarce.id).await, 0);
    }

    #[tokio::test]
    async fn snapshots_survive_catalog_repricing() {
        let db = test_db().await;
        let f = fixture(&db).await;
        let engine = db.engine();

        let line = engine
            .attach_service(&f.order_id, &f.service_id)
            .await
            .unwrap();
        engine.attach_part(&line.id, &f.part_id, 2).await.unwrap();
        assert_eq!(total_of(&db, &f.order_id).await, 500 + 2 * 1_500);

        db.catalog()
            .set_service_price(&f.service_id, Money::from_cents(9_999))
            .await
            .unwrap();
        db.catalog()
            .set_part_price(&f.part_id, Money::from_cents(8_888))
            .await
            .unwrap();

        // The stored lines keep their attach-time prices.
        let total = engine.recompute_total(&f.order_id).await.unwrap();
        assert_eq!(total.cents(), 500 + 2 * 1_500);
    }

    #[tokio::test]
    async fn completed_orders_reject_every_edit() {
        let db = test_db().await;
        let f = fixture(&db).await;
        let engine = db.engine();

        let line = engine
            .attach_service(&f.order_id, &f.service_id)
            .await
            .unwrap();
        let part_line = engine.attach_part(&line.id, &f.part_id, 1).await.unwrap();

        db.orders().start_work(&f.order_id).await.unwrap();
        db.orders().complete(&f.order_id).await.unwrap();

        let closed = |err: crate::error::EngineError| {
            matches!(err.as_core(), Some(CoreError::OrderClosed { .. }))
        };

        assert!(closed(
            engine
                .attach_service(&f.order_id, &f.service_id)
                .await
                .unwrap_err()
        ));
        assert!(closed(
            engine.attach_part(&line.id, &f.part_id, 1).await.unwrap_err()
        ));
        assert!(closed(engine.detach_part(&part_line.id).await.unwrap_err()));
        assert!(closed(engine.detach_service(&line.id).await.unwrap_err()));

        // Stock stays where completion left it.
        assert_eq!(stock_of(&db, &f.part_id).await, 9);
    }

    #[tokio::test]
    async fn detach_service_restores_stock_for_all_children() {
        let db = test_db().await;
        let f = fixture(&db).await;
        let engine = db.engine();

        let second_part = db
            .catalog()
            .create_part("Adhesive strip", 5, Money::from_cents(200))
            .await
            .unwrap();

        let line = engine
            .attach_service(&f.order_id, &f.service_id)
            .await
            .unwrap();
        engine.attach_part(&line.id, &f.part_id, 3).await.unwrap();
        engine.attach_part(&line.id, &second_part.id, 2).await.unwrap();
        assert_eq!(stock_of(&db, &f.part_id).await, 7);
        assert_eq!(stock_of(&db, &second_part.id).await, 3);

        engine.detach_service(&line.id).await.unwrap();

        assert_eq!(stock_of(&db, &f.part_id).await, 10);
        assert_eq!(stock_of(&db, &second_part.id).await, 5);
        assert_eq!(total_of(&db, &f.order_id).await, 0);
        assert!(db.orders().get_lines(&f.order_id).await.unwrap().is_empty());

        let err = engine.detach_service(&line.id).await.unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::ServiceLineNotFound(_))
        ));
    }

    #[tokio::test]
    async fn recompute_total_reconciles_an_unknown_order() {
        let db = test_db().await;
        let err = db.engine().recompute_total("ghost").await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::OrderNotFound(_))));
    }
}
