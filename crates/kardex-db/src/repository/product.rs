//! # Product Repository
//!
//! Database operations for the product catalog.
//!
//! ## Stock Is Not Writable Here
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   The generic update statement deliberately omits the stock column.    │
//! │                                                                         │
//! │   products.stock  ◄── ONLY the stock ledger writes this, paired with   │
//! │                       a stock_movements row in the same transaction    │
//! │                                                                         │
//! │   products.cost   ◄── written by purchase completion (landed cost),    │
//! │                       through set_cost on the completing transaction   │
//! │                                                                         │
//! │   everything else ◄── update() below                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use kardex_core::Product;

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

const PRODUCT_COLUMNS: &str = "id, sku, name, description, price_cents, cost_cents, stock, \
                               min_stock, max_stock, is_active, created_at, updated_at";

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by its SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1"
        ))
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Reads a product on the caller's transaction connection.
    ///
    /// Sale/purchase orchestration reads referenced products INSIDE its
    /// transaction so the activity check and the later stock write see the
    /// same state.
    pub async fn get_in_tx(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(product)
    }

    /// Lists active products sorted by name.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active = 1 ORDER BY name LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Lists active products at or below their reorder threshold.
    pub async fn list_low_stock(&self, limit: u32) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE is_active = 1 AND stock <= min_stock \
             ORDER BY stock - min_stock, name LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Inserted product
    /// * `Err(DbError::UniqueViolation)` - SKU already exists
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        debug!(sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, description,
                price_cents, cost_cents, stock,
                min_stock, max_stock, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.stock)
        .bind(product.min_stock)
        .bind(product.max_stock)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(product.clone())
    }

    /// Updates an existing product's catalog fields.
    ///
    /// The statement omits `stock` (ledger-owned) and `cost_cents`
    /// (purchase-completion-owned).
    pub async fn update(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, "Updating product");

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE products SET
                sku = ?2,
                name = ?3,
                description = ?4,
                price_cents = ?5,
                min_stock = ?6,
                max_stock = ?7,
                is_active = ?8,
                updated_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.min_stock)
        .bind(product.max_stock)
        .bind(product.is_active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        Ok(())
    }

    /// Writes the standing unit cost on the caller's transaction connection.
    ///
    /// Called by purchase completion: the landed cost of the completed
    /// purchase becomes the product's new cost (last-purchase-cost policy).
    pub async fn set_cost(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        cost_cents: i64,
    ) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE products SET cost_cents = ?2, updated_at = ?3 WHERE id = ?1")
                .bind(id)
                .bind(cost_cents)
                .bind(Utc::now())
                .execute(&mut *conn)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Soft-deletes a product by setting is_active = false.
    ///
    /// ## Why Soft Delete?
    /// Historical purchases, sales and movements still reference this
    /// product, and it can be restored if deactivated by mistake.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Soft-deleting product");

        let result =
            sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
                .bind(id)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Test Support
// =============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::pool::Database;
    use kardex_core::{MovementKind, NewMovement};

    /// Inserts a product and seeds its opening stock THROUGH the ledger,
    /// so the conservation invariant holds from the start.
    pub async fn insert_test_product(db: &Database, sku: &str, stock: i64) -> Product {
        let now = Utc::now();
        let product = Product {
            id: generate_product_id(),
            sku: sku.to_string(),
            name: format!("Test {sku}"),
            description: None,
            price_cents: 1500,
            cost_cents: 0,
            stock: 0,
            min_stock: 0,
            max_stock: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await.unwrap();

        if stock > 0 {
            let mut tx = db.pool().begin().await.unwrap();
            db.ledger()
                .apply_movement(
                    &mut tx,
                    &NewMovement {
                        product_id: product.id.clone(),
                        kind: MovementKind::In,
                        quantity: stock,
                        reason: "Opening stock".to_string(),
                        reference: "OPENING".to_string(),
                    },
                )
                .await
                .unwrap();
            tx.commit().await.unwrap();
        }

        db.products().get_by_id(&product.id).await.unwrap().unwrap()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::test_support::insert_test_product;
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = insert_test_product(&db, "CAFE-250", 4).await;

        let by_id = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(by_id.sku, "CAFE-250");
        assert_eq!(by_id.stock, 4);

        let by_sku = db.products().get_by_sku("CAFE-250").await.unwrap().unwrap();
        assert_eq!(by_sku.id, product.id);

        assert_eq!(db.products().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        insert_test_product(&db, "CAFE-250", 0).await;

        let now = Utc::now();
        let duplicate = Product {
            id: generate_product_id(),
            sku: "CAFE-250".to_string(),
            name: "Duplicate".to_string(),
            description: None,
            price_cents: 0,
            cost_cents: 0,
            stock: 0,
            min_stock: 0,
            max_stock: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let err = db.products().insert(&duplicate).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_update_does_not_touch_stock_or_cost() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut product = insert_test_product(&db, "CAFE-250", 8).await;

        // a hostile caller trying to set stock/cost through update
        product.name = "Renamed".to_string();
        product.stock = 9999;
        product.cost_cents = 7777;
        db.products().update(&product).await.unwrap();

        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.stock, 8);
        assert_eq!(stored.cost_cents, 0);

        // the ledger still agrees with the counter
        db.ledger().verify_product(&product.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_low_stock_listing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let healthy = insert_test_product(&db, "SKU-A", 10).await;
        let mut low = insert_test_product(&db, "SKU-B", 2).await;

        low.min_stock = 5;
        db.products().update(&low).await.unwrap();

        let listed = db.products().list_low_stock(10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, low.id);
        assert_ne!(listed[0].id, healthy.id);
        assert!(listed[0].is_low_stock());
    }

    #[tokio::test]
    async fn test_soft_delete() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = insert_test_product(&db, "CAFE-250", 0).await;

        db.products().soft_delete(&product.id).await.unwrap();

        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert_eq!(db.products().count().await.unwrap(), 0);

        let err = db.products().soft_delete("missing").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
