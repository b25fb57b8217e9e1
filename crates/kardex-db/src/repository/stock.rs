//! # Stock Ledger
//!
//! The append-only ledger of inventory-affecting events, and the ONLY
//! component with write authority over `products.stock`.
//!
//! ## The Pairing Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Every stock change is TWO writes in ONE transaction:                  │
//! │                                                                         │
//! │   BEGIN                                                                 │
//! │     UPDATE products SET stock = stock ± qty ...   ← the counter        │
//! │     INSERT INTO stock_movements (...)             ← the ledger row     │
//! │   COMMIT                                                                │
//! │                                                                         │
//! │   Consequence, by construction:                                         │
//! │     products.stock == Σ signed(stock_movements.quantity)               │
//! │                                                                         │
//! │   No code path may touch the counter without the pairing, which is     │
//! │   why apply_movement takes the caller's transaction connection         │
//! │   instead of the pool.                                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//! OUT movements are guarded in SQL (`AND stock >= qty`): the sufficiency
//! check and the decrement are one statement, serialized by SQLite's
//! single-writer transaction. Two concurrent sales cannot both take the
//! last unit.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use kardex_core::{MovementKind, NewMovement, StockMovement};

/// Repository for the stock ledger.
#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
}

impl StockLedger {
    /// Creates a new StockLedger.
    pub fn new(pool: SqlitePool) -> Self {
        StockLedger { pool }
    }

    // =========================================================================
    // Writes (transaction-scoped)
    // =========================================================================

    /// Applies one movement: counter update + ledger row, atomically.
    ///
    /// Takes the caller's transaction connection; this method NEVER opens
    /// its own transaction, so a failure anywhere in the caller's operation
    /// rolls the pairing back as a whole.
    ///
    /// ## Arguments
    /// * `conn` - the enclosing transaction's connection
    /// * `movement` - direction, quantity (> 0), reason, reference
    ///
    /// ## Errors
    /// * `Validation` - non-positive quantity
    /// * `NotFound` - unknown product
    /// * `InsufficientStock` - OUT movement larger than current stock
    pub async fn apply_movement(
        &self,
        conn: &mut SqliteConnection,
        movement: &NewMovement,
    ) -> DbResult<StockMovement> {
        if movement.quantity <= 0 {
            return Err(DbError::Validation(
                kardex_core::ValidationError::MustBePositive {
                    field: "quantity".to_string(),
                },
            ));
        }

        let now = Utc::now();

        // Counter first. The OUT guard makes the decrement and the
        // sufficiency check a single serialized statement.
        let updated = match movement.kind {
            MovementKind::In => {
                sqlx::query(
                    r#"
                    UPDATE products
                    SET stock = stock + ?1, updated_at = ?2
                    WHERE id = ?3
                    "#,
                )
                .bind(movement.quantity)
                .bind(now)
                .bind(&movement.product_id)
                .execute(&mut *conn)
                .await?
            }
            MovementKind::Out => {
                sqlx::query(
                    r#"
                    UPDATE products
                    SET stock = stock - ?1, updated_at = ?2
                    WHERE id = ?3 AND stock >= ?1
                    "#,
                )
                .bind(movement.quantity)
                .bind(now)
                .bind(&movement.product_id)
                .execute(&mut *conn)
                .await?
            }
        };

        if updated.rows_affected() == 0 {
            // Either the product is missing or an OUT guard failed;
            // look once to tell the two apart.
            let found: Option<(String, i64)> =
                sqlx::query_as("SELECT name, stock FROM products WHERE id = ?1")
                    .bind(&movement.product_id)
                    .fetch_optional(&mut *conn)
                    .await?;

            return match found {
                None => Err(DbError::not_found("Product", &movement.product_id)),
                Some((name, available)) => Err(DbError::InsufficientStock {
                    product_id: movement.product_id.clone(),
                    name,
                    available,
                    requested: movement.quantity,
                }),
            };
        }

        let entry = StockMovement {
            id: Uuid::new_v4().to_string(),
            product_id: movement.product_id.clone(),
            kind: movement.kind,
            quantity: movement.quantity,
            reason: movement.reason.clone(),
            reference: movement.reference.clone(),
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO stock_movements (id, product_id, kind, quantity, reason, reference, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.product_id)
        .bind(entry.kind)
        .bind(entry.quantity)
        .bind(&entry.reason)
        .bind(&entry.reference)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await?;

        debug!(
            product_id = %entry.product_id,
            kind = ?entry.kind,
            quantity = entry.quantity,
            reference = %entry.reference,
            "Stock movement applied"
        );

        Ok(entry)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Movement history for one product, newest first.
    pub async fn movements_for_product(
        &self,
        product_id: &str,
        limit: u32,
    ) -> DbResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, product_id, kind, quantity, reason, reference, created_at
            FROM stock_movements
            WHERE product_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            "#,
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// Most recent movements across all products.
    pub async fn recent(&self, limit: u32) -> DbResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, product_id, kind, quantity, reason, reference, created_at
            FROM stock_movements
            ORDER BY created_at DESC, id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// Movements recorded under one reference (a sale/purchase number).
    pub async fn movements_for_reference(&self, reference: &str) -> DbResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, product_id, kind, quantity, reason, reference, created_at
            FROM stock_movements
            WHERE reference = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(reference)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// Σ signed quantities for a product, from the beginning of time.
    pub async fn ledger_sum(&self, product_id: &str) -> DbResult<i64> {
        let sum: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CASE WHEN kind = 'in' THEN quantity ELSE -quantity END), 0)
            FROM stock_movements
            WHERE product_id = ?1
            "#,
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    // =========================================================================
    // Invariant Checks
    // =========================================================================

    /// Verifies counter == ledger sum for one product.
    ///
    /// A mismatch is a bug somewhere, never user error: it is logged at
    /// error level and surfaced as `DbError::Invariant`.
    pub async fn verify_product(&self, product_id: &str) -> DbResult<()> {
        let stock: Option<i64> = sqlx::query_scalar("SELECT stock FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;

        let stock = stock.ok_or_else(|| DbError::not_found("Product", product_id))?;
        let ledger = self.ledger_sum(product_id).await?;

        if stock != ledger {
            error!(
                product_id = %product_id,
                stock,
                ledger,
                "Ledger conservation violated"
            );
            return Err(DbError::Invariant(format!(
                "product {} counter {} != ledger sum {}",
                product_id, stock, ledger
            )));
        }

        Ok(())
    }

    /// Verifies counter == ledger sum for every product.
    pub async fn verify_all(&self) -> DbResult<()> {
        let mismatches: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT p.id, p.stock,
                   COALESCE(SUM(CASE WHEN m.kind = 'in' THEN m.quantity
                                     WHEN m.kind = 'out' THEN -m.quantity END), 0) AS ledger
            FROM products p
            LEFT JOIN stock_movements m ON m.product_id = p.id
            GROUP BY p.id
            HAVING p.stock != ledger
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        if let Some((id, stock, ledger)) = mismatches.first() {
            error!(
                product_id = %id,
                stock,
                ledger,
                mismatches = mismatches.len(),
                "Ledger conservation violated"
            );
            return Err(DbError::Invariant(format!(
                "{} product(s) off-ledger; first: {} counter {} != ledger sum {}",
                mismatches.len(),
                id,
                stock,
                ledger
            )));
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
    use crate::repository::product::test_support::insert_test_product;

    #[tokio::test]
    async fn test_apply_movement_pairs_counter_and_row() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = insert_test_product(&db, "CAFE-250", 10).await;
        let ledger = db.ledger();

        let mut tx = db.pool().begin().await.unwrap();
        ledger
            .apply_movement(
                &mut tx,
                &NewMovement {
                    product_id: product.id.clone(),
                    kind: MovementKind::In,
                    quantity: 5,
                    reason: "Purchase completed".to_string(),
                    reference: "PC-000001".to_string(),
                },
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 15);
        assert_eq!(ledger.ledger_sum(&product.id).await.unwrap(), 15);
        ledger.verify_product(&product.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_out_movement_guard() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = insert_test_product(&db, "CAFE-250", 3).await;
        let ledger = db.ledger();

        let mut tx = db.pool().begin().await.unwrap();
        let err = ledger
            .apply_movement(
                &mut tx,
                &NewMovement {
                    product_id: product.id.clone(),
                    kind: MovementKind::Out,
                    quantity: 5,
                    reason: "Sale".to_string(),
                    reference: "SA-000001".to_string(),
                },
            )
            .await
            .unwrap_err();
        tx.rollback().await.unwrap();

        match err {
            DbError::InsufficientStock {
                available,
                requested,
                ..
            } => {
                assert_eq!(available, 3);
                assert_eq!(requested, 5);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        // nothing moved
        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 3);
        assert_eq!(ledger.ledger_sum(&product.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ledger = db.ledger();

        let mut tx = db.pool().begin().await.unwrap();
        let err = ledger
            .apply_movement(
                &mut tx,
                &NewMovement {
                    product_id: "missing".to_string(),
                    kind: MovementKind::Out,
                    quantity: 1,
                    reason: "Sale".to_string(),
                    reference: "SA-000001".to_string(),
                },
            )
            .await
            .unwrap_err();
        tx.rollback().await.unwrap();

        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_rejects_non_positive_quantity() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = insert_test_product(&db, "CAFE-250", 3).await;
        let ledger = db.ledger();

        let mut tx = db.pool().begin().await.unwrap();
        let err = ledger
            .apply_movement(
                &mut tx,
                &NewMovement {
                    product_id: product.id,
                    kind: MovementKind::In,
                    quantity: 0,
                    reason: "Adjustment".to_string(),
                    reference: "ADJ-1".to_string(),
                },
            )
            .await
            .unwrap_err();
        tx.rollback().await.unwrap();

        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn test_history_and_reference_reads() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = insert_test_product(&db, "CAFE-250", 0).await;
        let ledger = db.ledger();

        for (kind, qty, reference) in [
            (MovementKind::In, 10, "PC-000001"),
            (MovementKind::Out, 4, "SA-000001"),
            (MovementKind::In, 4, "SA-000001"),
        ] {
            let mut tx = db.pool().begin().await.unwrap();
            ledger
                .apply_movement(
                    &mut tx,
                    &NewMovement {
                        product_id: product.id.clone(),
                        kind,
                        quantity: qty,
                        reason: "test".to_string(),
                        reference: reference.to_string(),
                    },
                )
                .await
                .unwrap();
            tx.commit().await.unwrap();
        }

        let history = ledger.movements_for_product(&product.id, 10).await.unwrap();
        assert_eq!(history.len(), 3);

        let by_ref = ledger.movements_for_reference("SA-000001").await.unwrap();
        assert_eq!(by_ref.len(), 2);

        assert_eq!(ledger.ledger_sum(&product.id).await.unwrap(), 10);
        ledger.verify_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_detects_tampered_counter() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = insert_test_product(&db, "CAFE-250", 7).await;

        // `insert_test_product` seeds the counter through an opening
        // movement, so the ledger agrees. Break it on purpose.
        sqlx::query("UPDATE products SET stock = 99 WHERE id = ?1")
            .bind(&product.id)
            .execute(db.pool())
            .await
            .unwrap();

        let err = db.ledger().verify_product(&product.id).await.unwrap_err();
        assert!(matches!(err, DbError::Invariant(_)));
        assert!(db.ledger().verify_all().await.is_err());
    }
}
