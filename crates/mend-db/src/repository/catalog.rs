//! # Catalog Repository
//!
//! Database operations for the repair-service and spare-part catalog.
//!
//! ## Stock Reservation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Check-and-Decrement Strategy                         │
//! │                                                                         │
//! │  ❌ WRONG: read stock, compare in Rust, then write                      │
//! │     SELECT stock_qty ...        (reads 1)                              │
//! │     if stock_qty >= qty { UPDATE ... SET stock_qty = 0 }               │
//! │     Two concurrent attaches both read 1 → stock goes negative          │
//! │                                                                         │
//! │  ✅ CORRECT: one guarded UPDATE (atomic compare-and-decrement)          │
//! │     UPDATE spare_parts                                                  │
//! │     SET stock_qty = stock_qty - ?2                                      │
//! │     WHERE id = ?1 AND stock_qty >= ?2                                   │
//! │                                                                         │
//! │  The guard re-evaluates under SQLite's write lock, so concurrent       │
//! │  attaches serialize and at most one can win the last unit. A miss      │
//! │  (rows_affected == 0) means insufficient stock, never a clamp.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Catalog price edits are ordinary UPDATEs: they never touch existing line
//! items, whose prices are snapshots.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult, EngineResult};
use mend_core::validation::{validate_name, validate_stock_qty};
use mend_core::{CoreError, Money, RepairService, SparePart};

/// Repository for catalog database operations.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Repair services
    // -------------------------------------------------------------------------

    /// Creates a catalog repair service.
    pub async fn create_service(&self, name: &str, base_price: Money) -> EngineResult<RepairService> {
        let name = validate_name(name).map_err(CoreError::from)?;
        let now = Utc::now();

        let service = RepairService {
            id: Uuid::new_v4().to_string(),
            name,
            base_price_cents: base_price.cents(),
            created_at: now,
            updated_at: now,
        };

        debug!(id = %service.id, name = %service.name, "Creating repair service");

        sqlx::query(
            r#"
            INSERT INTO repair_services (id, name, base_price_cents, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&service.id)
        .bind(&service.name)
        .bind(service.base_price_cents)
        .bind(service.created_at)
        .bind(service.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(service)
    }

    /// Gets a repair service by ID.
    pub async fn get_service(&self, id: &str) -> DbResult<Option<RepairService>> {
        let service = sqlx::query_as::<_, RepairService>(
            r#"
            SELECT id, name, base_price_cents, created_at, updated_at
            FROM repair_services
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(service)
    }

    /// Lists repair services ordered by name.
    pub async fn list_services(&self, limit: u32) -> DbResult<Vec<RepairService>> {
        let services = sqlx::query_as::<_, RepairService>(
            r#"
            SELECT id, name, base_price_cents, created_at, updated_at
            FROM repair_services
            ORDER BY name
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(services)
    }

    /// Reprices a catalog service.
    ///
    /// ## Snapshot Guarantee
    /// Existing `repair_order_services` rows keep their snapshotted price;
    /// only future attaches see the new one.
    pub async fn set_service_price(&self, id: &str, base_price: Money) -> DbResult<()> {
        debug!(id = %id, price = %base_price, "Repricing service");

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE repair_services
            SET base_price_cents = ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(base_price.cents())
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("RepairService", id));
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Spare parts
    // -------------------------------------------------------------------------

    /// Creates a catalog spare part.
    pub async fn create_part(
        &self,
        name: &str,
        stock_qty: i64,
        unit_price: Money,
    ) -> EngineResult<SparePart> {
        let name = validate_name(name).map_err(CoreError::from)?;
        validate_stock_qty(stock_qty).map_err(CoreError::from)?;
        let now = Utc::now();

        let part = SparePart {
            id: Uuid::new_v4().to_string(),
            name,
            stock_qty,
            unit_price_cents: unit_price.cents(),
            created_at: now,
            updated_at: now,
        };

        debug!(id = %part.id, name = %part.name, stock = part.stock_qty, "Creating spare part");

        sqlx::query(
            r#"
            INSERT INTO spare_parts (id, name, stock_qty, unit_price_cents, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&part.id)
        .bind(&part.name)
        .bind(part.stock_qty)
        .bind(part.unit_price_cents)
        .bind(part.created_at)
        .bind(part.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(part)
    }

    /// Gets a spare part by ID.
    pub async fn get_part(&self, id: &str) -> DbResult<Option<SparePart>> {
        let part = sqlx::query_as::<_, SparePart>(
            r#"
            SELECT id, name, stock_qty, unit_price_cents, created_at, updated_at
            FROM spare_parts
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(part)
    }

    /// Lists spare parts ordered by name.
    pub async fn list_parts(&self, limit: u32) -> DbResult<Vec<SparePart>> {
        let parts = sqlx::query_as::<_, SparePart>(
            r#"
            SELECT id, name, stock_qty, unit_price_cents, created_at, updated_at
            FROM spare_parts
            ORDER BY name
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(parts)
    }

    /// Reprices a catalog spare part. Snapshots on existing lines are untouched.
    pub async fn set_part_price(&self, id: &str, unit_price: Money) -> DbResult<()> {
        debug!(id = %id, price = %unit_price, "Repricing spare part");

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE spare_parts
            SET unit_price_cents = ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(unit_price.cents())
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("SparePart", id));
        }

        Ok(())
    }

    /// Adds received stock for a part (goods received, returns to supplier
    /// go through negative deltas only via the engine's detach path).
    pub async fn restock(&self, id: &str, quantity: i64) -> EngineResult<()> {
        mend_core::validation::validate_quantity(quantity).map_err(CoreError::from)?;

        debug!(id = %id, quantity, "Restocking part");

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE spare_parts
            SET stock_qty = stock_qty + ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(quantity)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::PartNotFound(id.to_string()).into());
        }

        Ok(())
    }
}

// =============================================================================
// Transaction-scoped stock helpers (used by the composition engine)
// =============================================================================

/// Atomically reserves `quantity` units of a part inside a transaction.
///
/// The single guarded UPDATE is the compare-and-decrement described in the
/// module docs. On a miss the caller's transaction should roll back.
///
/// ## Errors
/// - `CoreError::PartNotFound` when the part id does not exist
/// - `CoreError::InsufficientStock` when the guard fails
pub(crate) async fn reserve_stock(
    conn: &mut SqliteConnection,
    part_id: &str,
    quantity: i64,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE spare_parts
        SET stock_qty = stock_qty - ?2, updated_at = ?3
        WHERE id = ?1 AND stock_qty >= ?2
        "#,
    )
    .bind(part_id)
    .bind(quantity)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if result.rows_affected() == 0 {
        // Distinguish a missing part from an out-of-stock one.
        let part = sqlx::query_as::<_, SparePart>(
            r#"
            SELECT id, name, stock_qty, unit_price_cents, created_at, updated_at
            FROM spare_parts
            WHERE id = ?1
            "#,
        )
        .bind(part_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DbError::from)?;

        return match part {
            None => Err(CoreError::PartNotFound(part_id.to_string()).into()),
            Some(p) => Err(CoreError::InsufficientStock {
                part: p.name,
                available: p.stock_qty,
                requested: quantity,
            }
            .into()),
        };
    }

    Ok(())
}

/// Restores `quantity` units of a part inside a transaction (detach path).
pub(crate) async fn release_stock(
    conn: &mut SqliteConnection,
    part_id: &str,
    quantity: i64,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE spare_parts
        SET stock_qty = stock_qty + ?2, updated_at = ?3
        WHERE id = ?1
        "#,
    )
    .bind(part_id)
    .bind(quantity)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    if result.rows_affected() == 0 {
        return Err(CoreError::PartNotFound(part_id.to_string()).into());
    }

    Ok(())
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

    #[tokio::test]
    async fn create_and_fetch_service() {
        let db = test_db().await;
        let catalog = db.catalog();

        let service = catalog
            .create_service("Screen replacement", Money::from_cents(50_000))
            .await
            .unwrap();

        let fetched = catalog.get_service(&service.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Screen replacement");
        assert_eq!(fetched.base_price().cents(), 50_000);
    }

    #[tokio::test]
    async fn reprice_service_updates_catalog() {
        let db = test_db().await;
        let catalog = db.catalog();

        let service = catalog
            .create_service("Battery swap", Money::from_cents(8_000))
            .await
            .unwrap();

        catalog
            .set_service_price(&service.id, Money::from_cents(9_500))
            .await
            .unwrap();

        let fetched = catalog.get_service(&service.id).await.unwrap().unwrap();
        assert_eq!(fetched.base_price_cents, 9_500);
    }

    #[tokio::test]
    async fn create_part_rejects_negative_initial_stock() {
        let db = test_db().await;
        let catalog = db.catalog();

        // Rejected as caller input, before the schema CHECK ever sees it.
        let err = catalog
            .create_part("Ghost stock", -5, Money::from_cents(1_000))
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::Validation(_))));

        // An empty shelf is a valid starting point.
        let part = catalog
            .create_part("Backordered panel", 0, Money::from_cents(1_000))
            .await
            .unwrap();
        assert_eq!(part.stock_qty, 0);
    }

    #[tokio::test]
    async fn restock_increments_and_validates() {
        let db = test_db().await;
        let catalog = db.catalog();

        let part = catalog
            .create_part("OLED panel", 2, Money::from_cents(150_000))
            .await
            .unwrap();

        catalog.restock(&part.id, 3).await.unwrap();
        let fetched = catalog.get_part(&part.id).await.unwrap().unwrap();
        assert_eq!(fetched.stock_qty, 5);

        // Zero and negative restocks are rejected.
        assert!(catalog.restock(&part.id, 0).await.is_err());
        assert!(catalog.restock(&part.id, -4).await.is_err());
    }

    #[tokio::test]
    async fn reserve_stock_guards_against_oversell() {
        let db = test_db().await;
        let catalog = db.catalog();

        let part = catalog
            .create_part("Charging port", 3, Money::from_cents(2_500))
            .await
            .unwrap();

        let now = Utc::now();
        let mut tx = db.pool().begin().await.unwrap();
        reserve_stock(&mut tx, &part.id, 2, now).await.unwrap();

        let err = reserve_stock(&mut tx, &part.id, 2, now).await.unwrap_err();
        match err.as_core() {
            Some(CoreError::InsufficientStock {
                available,
                requested,
                ..
            }) => {
                assert_eq!(*available, 1);
                assert_eq!(*requested, 2);
            }
            other => panic!("expected InsufficientStock, got {:?}", other),
        }
        drop(tx); // roll back

        // Rollback left the original stock untouched.
        let fetched = catalog.get_part(&part.id).await.unwrap().unwrap();
        assert_eq!(fetched.stock_qty, 3);
    }

    #[tokio::test]
    async fn reserve_stock_unknown_part() {
        let db = test_db().await;
        let mut tx = db.pool().begin().await.unwrap();

        let err = reserve_stock(&mut tx, "ghost", 1, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::PartNotFound(_))));
    }
}
