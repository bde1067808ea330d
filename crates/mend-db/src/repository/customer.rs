//! # Customer Repository
//!
//! Database operations for the customer directory. No engineering complexity
//! here: identity records created at intake, contact fields editable after.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult, EngineResult};
use mend_core::{validation::validate_name, CoreError, Customer};

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Creates a customer record.
    ///
    /// ## Errors
    /// `CoreError::Validation` when the name is empty or too long.
    pub async fn create(
        &self,
        name: &str,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> EngineResult<Customer> {
        let name = validate_name(name).map_err(CoreError::from)?;
        let now = Utc::now();

        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            name,
            phone: phone.map(str::to_string),
            email: email.map(str::to_string),
            created_at: now,
            updated_at: now,
        };

        debug!(id = %customer.id, name = %customer.name, "Creating customer");

        sqlx::query(
            r#"
            INSERT INTO customers (id, name, phone, email, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(&customer.email)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Gets a customer by ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Customer))` - Customer found
    /// * `Ok(None)` - Customer not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, name, phone, email, created_at, updated_at
            FROM customers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Lists customers ordered by name.
    pub async fn list(&self, limit: u32) -> DbResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, name, phone, email, created_at, updated_at
            FROM customers
            ORDER BY name
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    /// Updates a customer's contact details.
    ///
    /// Identity (the name) is editable too; only the id is immutable.
    pub async fn update_contact(
        &self,
        id: &str,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> DbResult<()> {
        debug!(id = %id, "Updating customer contact details");

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE customers
            SET phone = ?2, email = ?3, updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(phone)
        .bind(email)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }

        Ok(())
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

    #[tokio::test]
    async fn create_and_fetch_customer() {
        let db = test_db().await;
        let repo = db.customers();

        let created = repo
            .create("Ada Wong", Some("+1-555-0101"), None)
            .await
            .unwrap();

        let fetched = repo.get_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Ada Wong");
        assert_eq!(fetched.phone.as_deref(), Some("+1-555-0101"));
        assert_eq!(fetched.email, None);
    }

    #[tokio::test]
    async fn missing_customer_is_none() {
        let db = test_db().await;
        assert!(db.customers().get_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_contact_requires_existing_row() {
        let db = test_db().await;
        let repo = db.customers();

        let err = repo
            .update_contact("ghost", Some("+1-555-0102"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        let customer = repo.create("Sam Porter", None, None).await.unwrap();
        repo.update_contact(&customer.id, None, Some("sam@example.com"))
            .await
            .unwrap();

        let fetched = repo.get_by_id(&customer.id).await.unwrap().unwrap();
        assert_eq!(fetched.email.as_deref(), Some("sam@example.com"));
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let db = test_db().await;
        assert!(db.customers().create("   ", None, None).await.is_err());
    }
}
