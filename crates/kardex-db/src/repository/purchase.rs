//! # Purchase Repository
//!
//! Lifecycle management for purchases.
//!
//! ## Purchase Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Purchase Lifecycle                                │
//! │                                                                         │
//! │  1. CREATE                                                              │
//! │     └── create() → validate, allocate costs, draw PC number,           │
//! │                    insert purchase + items   { status: pending }       │
//! │                                                                         │
//! │  2. TRACK (externally driven)                                          │
//! │     └── update_status() → ordered / shipped / customs / received       │
//! │     └── edit() → replace ALL items, re-run allocation                  │
//! │                  (only while pending/ordered/shipped)                  │
//! │                                                                         │
//! │  3. COMPLETE (the one transition with side effects)                    │
//! │     └── complete() → one transaction:                                  │
//! │           ledger IN movement per item                                  │
//! │           product.cost = item.final_unit_cost (last purchase cost)     │
//! │           status = completed                                           │
//! │                                                                         │
//! │  4. (OPTIONAL) CANCEL / DELETE                                         │
//! │     └── update_status(cancelled) from any non-terminal state           │
//! │     └── delete() only while pending/cancelled                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Edit Semantics
//! Editing replaces all line items and re-runs the allocation engine in one
//! transaction (delete-then-recreate, never incremental patching), so the
//! stored distributed costs can never go stale against the cost fields.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::counter::{CounterKind, DocumentCounters, MAX_NUMBER_ATTEMPTS};
use crate::repository::product::ProductRepository;
use crate::repository::stock::StockLedger;
use kardex_core::allocation::{allocate, Allocation, AllocationInput, AllocationLine, OverheadCosts};
use kardex_core::validation::validate_purchase;
use kardex_core::{
    CreatePurchase, ExchangeRate, MovementKind, NewMovement, Purchase, PurchaseItem,
    PurchaseStatus, LOCAL_CURRENCY,
};

const PURCHASE_COLUMNS: &str = "id, purchase_number, supplier_id, kind, currency, \
     exchange_rate_micros, freight_cents, customs_cents, tax_cents, insurance_cents, \
     other_cents, subtotal_cents, subtotal_foreign_cents, total_costs_cents, total_cents, \
     notes, status, created_at, updated_at, completed_at";

const ITEM_COLUMNS: &str = "id, purchase_id, product_id, quantity, unit_price_cents, \
     unit_price_foreign_cents, distributed_cost_cents, final_unit_cost_cents, \
     total_cost_cents, distributed_cost_foreign_cents, final_unit_cost_foreign_cents, \
     created_at";

/// Repository for purchase database operations.
#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    /// Creates a new PurchaseRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseRepository { pool }
    }

    // =========================================================================
    // Intake
    // =========================================================================

    /// Creates a purchase: validate, allocate, number, insert, one transaction.
    ///
    /// ## Errors
    /// * `Validation` - malformed input (incl. missing exchange rate)
    /// * `NotFound` - supplier or a referenced product absent
    pub async fn create(&self, input: &CreatePurchase) -> DbResult<Purchase> {
        validate_purchase(input)?;
        let allocation = allocate(&allocation_input(input))?;

        let mut tx = self.pool.begin().await?;

        let supplier_exists: Option<String> =
            sqlx::query_scalar("SELECT id FROM suppliers WHERE id = ?1")
                .bind(&input.supplier_id)
                .fetch_optional(&mut *tx)
                .await?;
        if supplier_exists.is_none() {
            return Err(DbError::not_found("Supplier", &input.supplier_id));
        }

        for item in &input.items {
            let product_exists: Option<String> =
                sqlx::query_scalar("SELECT id FROM products WHERE id = ?1")
                    .bind(&item.product_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if product_exists.is_none() {
                return Err(DbError::not_found("Product", &item.product_id));
            }
        }

        let now = Utc::now();
        let counters = DocumentCounters::new(self.pool.clone());

        // Bounded retry: an externally seeded row can collide with a minted
        // number at most once per seeded value.
        let mut purchase = None;
        for attempt in 0..MAX_NUMBER_ATTEMPTS {
            let number = counters.next_number(&mut tx, CounterKind::Purchase).await?;
            let candidate = build_purchase(number, input, &allocation, now);

            match insert_purchase_row(&mut tx, &candidate).await {
                Ok(()) => {
                    purchase = Some(candidate);
                    break;
                }
                Err(DbError::UniqueViolation { field, .. })
                    if field.contains("purchase_number") && attempt + 1 < MAX_NUMBER_ATTEMPTS =>
                {
                    debug!(attempt, "Purchase number collision, redrawing");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
        let purchase = purchase.ok_or_else(|| {
            DbError::Internal("purchase numbering exhausted its retry budget".to_string())
        })?;

        insert_items(&mut tx, &purchase.id, input, &allocation, now).await?;

        tx.commit().await?;

        info!(
            purchase_id = %purchase.id,
            purchase_number = %purchase.purchase_number,
            total = purchase.total_cents,
            items = input.items.len(),
            "Purchase created"
        );

        Ok(purchase)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets a purchase by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Purchase>> {
        let purchase = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(purchase)
    }

    /// Gets all items for a purchase.
    pub async fn items(&self, purchase_id: &str) -> DbResult<Vec<PurchaseItem>> {
        let items = sqlx::query_as::<_, PurchaseItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM purchase_items WHERE purchase_id = ?1 ORDER BY created_at, id"
        ))
        .bind(purchase_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Lists purchases, newest first.
    pub async fn list(&self, limit: u32) -> DbResult<Vec<Purchase>> {
        let purchases = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases ORDER BY created_at DESC, id DESC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(purchases)
    }

    // =========================================================================
    // Edit
    // =========================================================================

    /// Replaces all items and re-runs the allocation, one transaction.
    ///
    /// Permitted only while status is pending/ordered/shipped: after that,
    /// goods (and on completion, costs) are in play.
    pub async fn edit(&self, id: &str, input: &CreatePurchase) -> DbResult<Purchase> {
        validate_purchase(input)?;
        let allocation = allocate(&allocation_input(input))?;

        let mut tx = self.pool.begin().await?;

        let existing = fetch_purchase(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Purchase", id))?;

        if !existing.status.allows_editing() {
            return Err(DbError::purchase_conflict(id, existing.status, "edit"));
        }

        for item in &input.items {
            let product_exists: Option<String> =
                sqlx::query_scalar("SELECT id FROM products WHERE id = ?1")
                    .bind(&item.product_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if product_exists.is_none() {
                return Err(DbError::not_found("Product", &item.product_id));
            }
        }

        let now = Utc::now();

        // Delete-then-recreate: no partial patching of computed costs.
        sqlx::query("DELETE FROM purchase_items WHERE purchase_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_items(&mut tx, id, input, &allocation, now).await?;

        sqlx::query(
            r#"
            UPDATE purchases SET
                supplier_id = ?2, kind = ?3, currency = ?4, exchange_rate_micros = ?5,
                freight_cents = ?6, customs_cents = ?7, tax_cents = ?8,
                insurance_cents = ?9, other_cents = ?10,
                subtotal_cents = ?11, subtotal_foreign_cents = ?12,
                total_costs_cents = ?13, total_cents = ?14,
                notes = ?15, updated_at = ?16
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&input.supplier_id)
        .bind(input.kind)
        .bind(&input.currency)
        .bind(input.exchange_rate_micros)
        .bind(input.freight_cents)
        .bind(input.customs_cents)
        .bind(input.tax_cents)
        .bind(input.insurance_cents)
        .bind(input.other_cents)
        .bind(allocation.subtotal_cents)
        .bind(allocation.subtotal_foreign_cents)
        .bind(allocation.total_costs_cents)
        .bind(allocation.total_cents)
        .bind(&input.notes)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(purchase_id = %id, "Purchase edited, costs reallocated");

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Purchase", id))
    }

    // =========================================================================
    // Status Transitions
    // =========================================================================

    /// Externally driven status update (ordered/shipped/customs/received/
    /// cancelled).
    ///
    /// Terminal states cannot be left, and `completed` cannot be entered
    /// here: completion carries side effects and only `complete()` performs
    /// them.
    pub async fn update_status(&self, id: &str, status: PurchaseStatus) -> DbResult<Purchase> {
        let mut tx = self.pool.begin().await?;

        let existing = fetch_purchase(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Purchase", id))?;

        if existing.status.is_terminal() {
            return Err(DbError::purchase_conflict(
                id,
                existing.status,
                "change status",
            ));
        }
        if status == PurchaseStatus::Completed {
            return Err(DbError::purchase_conflict(
                id,
                existing.status,
                "complete via a plain status update",
            ));
        }

        sqlx::query("UPDATE purchases SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(purchase_id = %id, status = status.as_str(), "Purchase status updated");

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Purchase", id))
    }

    /// Completes a purchase: posts stock and landed costs, one transaction.
    ///
    /// For every item: ledger IN movement (reason "Purchase completed",
    /// reference = purchase number) and product cost = the item's final
    /// unit cost.
    pub async fn complete(&self, id: &str) -> DbResult<Purchase> {
        let mut tx = self.pool.begin().await?;

        let purchase = fetch_purchase(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Purchase", id))?;

        // Re-checked inside the transaction: completion must run once.
        if purchase.status.is_terminal() {
            return Err(DbError::purchase_conflict(id, purchase.status, "complete"));
        }

        let items = sqlx::query_as::<_, PurchaseItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM purchase_items WHERE purchase_id = ?1 ORDER BY created_at, id"
        ))
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let ledger = StockLedger::new(self.pool.clone());
        let products = ProductRepository::new(self.pool.clone());

        for item in &items {
            ledger
                .apply_movement(
                    &mut tx,
                    &NewMovement {
                        product_id: item.product_id.clone(),
                        kind: MovementKind::In,
                        quantity: item.quantity,
                        reason: "Purchase completed".to_string(),
                        reference: purchase.purchase_number.clone(),
                    },
                )
                .await?;

            products
                .set_cost(&mut tx, &item.product_id, item.final_unit_cost_cents)
                .await?;
        }

        let now = Utc::now();
        let updated = sqlx::query(
            r#"
            UPDATE purchases
            SET status = 'completed', completed_at = ?2, updated_at = ?2
            WHERE id = ?1 AND status = ?3
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(purchase.status)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Somebody moved the status under us; abort the whole posting.
            return Err(DbError::purchase_conflict(id, purchase.status, "complete"));
        }

        tx.commit().await?;

        info!(
            purchase_id = %id,
            purchase_number = %purchase.purchase_number,
            items = items.len(),
            "Purchase completed, stock and costs posted"
        );

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Purchase", id))
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Deletes a purchase, permitted only while pending or cancelled
    /// (nothing has been posted).
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let existing = fetch_purchase(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Purchase", id))?;

        if !existing.status.allows_deletion() {
            return Err(DbError::purchase_conflict(id, existing.status, "delete"));
        }

        // purchase_items cascade on the foreign key
        sqlx::query("DELETE FROM purchases WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(purchase_id = %id, "Purchase deleted");

        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Maps a purchase input onto the allocation engine's input.
fn allocation_input(input: &CreatePurchase) -> AllocationInput {
    AllocationInput {
        is_foreign: input.currency != LOCAL_CURRENCY,
        exchange_rate: input.exchange_rate_micros.map(ExchangeRate::from_micros),
        costs: OverheadCosts {
            freight_cents: input.freight_cents,
            customs_cents: input.customs_cents,
            tax_cents: input.tax_cents,
            insurance_cents: input.insurance_cents,
            other_cents: input.other_cents,
        },
        lines: input
            .items
            .iter()
            .map(|item| AllocationLine {
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
                unit_price_foreign_cents: item.unit_price_foreign_cents,
            })
            .collect(),
    }
}

fn build_purchase(
    number: String,
    input: &CreatePurchase,
    allocation: &Allocation,
    now: chrono::DateTime<Utc>,
) -> Purchase {
    Purchase {
        id: Uuid::new_v4().to_string(),
        purchase_number: number,
        supplier_id: input.supplier_id.clone(),
        kind: input.kind,
        currency: input.currency.clone(),
        exchange_rate_micros: input.exchange_rate_micros,
        freight_cents: input.freight_cents,
        customs_cents: input.customs_cents,
        tax_cents: input.tax_cents,
        insurance_cents: input.insurance_cents,
        other_cents: input.other_cents,
        subtotal_cents: allocation.subtotal_cents,
        subtotal_foreign_cents: allocation.subtotal_foreign_cents,
        total_costs_cents: allocation.total_costs_cents,
        total_cents: allocation.total_cents,
        notes: input.notes.clone(),
        status: PurchaseStatus::Pending,
        created_at: now,
        updated_at: now,
        completed_at: None,
    }
}

async fn fetch_purchase(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Purchase>> {
    let purchase = sqlx::query_as::<_, Purchase>(&format!(
        "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(purchase)
}

async fn insert_purchase_row(conn: &mut SqliteConnection, purchase: &Purchase) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO purchases (
            id, purchase_number, supplier_id, kind, currency, exchange_rate_micros,
            freight_cents, customs_cents, tax_cents, insurance_cents, other_cents,
            subtotal_cents, subtotal_foreign_cents, total_costs_cents, total_cents,
            notes, status, created_at, updated_at, completed_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8, ?9, ?10, ?11,
            ?12, ?13, ?14, ?15,
            ?16, ?17, ?18, ?19, ?20
        )
        "#,
    )
    .bind(&purchase.id)
    .bind(&purchase.purchase_number)
    .bind(&purchase.supplier_id)
    .bind(purchase.kind)
    .bind(&purchase.currency)
    .bind(purchase.exchange_rate_micros)
    .bind(purchase.freight_cents)
    .bind(purchase.customs_cents)
    .bind(purchase.tax_cents)
    .bind(purchase.insurance_cents)
    .bind(purchase.other_cents)
    .bind(purchase.subtotal_cents)
    .bind(purchase.subtotal_foreign_cents)
    .bind(purchase.total_costs_cents)
    .bind(purchase.total_cents)
    .bind(&purchase.notes)
    .bind(purchase.status)
    .bind(purchase.created_at)
    .bind(purchase.updated_at)
    .bind(purchase.completed_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Inserts the item rows computed by one allocation run.
async fn insert_items(
    conn: &mut SqliteConnection,
    purchase_id: &str,
    input: &CreatePurchase,
    allocation: &Allocation,
    now: chrono::DateTime<Utc>,
) -> DbResult<()> {
    for (item, line) in input.items.iter().zip(&allocation.lines) {
        sqlx::query(
            r#"
            INSERT INTO purchase_items (
                id, purchase_id, product_id, quantity,
                unit_price_cents, unit_price_foreign_cents,
                distributed_cost_cents, final_unit_cost_cents, total_cost_cents,
                distributed_cost_foreign_cents, final_unit_cost_foreign_cents,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(purchase_id)
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.unit_price_foreign_cents)
        .bind(line.distributed_cost_cents)
        .bind(line.final_unit_cost_cents)
        .bind(line.total_cost_cents)
        .bind(line.distributed_cost_foreign_cents)
        .bind(line.final_unit_cost_foreign_cents)
        .bind(now)
        .execute(&mut *conn)
        .await?;
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
    use crate::repository::product::test_support::insert_test_product;
    use crate::repository::supplier::test_support::insert_test_supplier;
    use kardex_core::{CreatePurchaseItem, PurchaseKind};

    fn local_purchase(supplier_id: &str, product_id: &str) -> CreatePurchase {
        CreatePurchase {
            supplier_id: supplier_id.to_string(),
            kind: PurchaseKind::Local,
            currency: LOCAL_CURRENCY.to_string(),
            exchange_rate_micros: None,
            freight_cents: 1000,
            customs_cents: 0,
            tax_cents: 500,
            insurance_cents: 0,
            other_cents: 0,
            notes: None,
            items: vec![CreatePurchaseItem {
                product_id: product_id.to_string(),
                quantity: 5,
                unit_price_cents: 1000,
                unit_price_foreign_cents: None,
            }],
        }
    }

    /// The reference scenario: stock 10 cost $0, purchase 5 × $10.00 with
    /// freight $10.00 and tax $5.00 local. After completion: stock 15,
    /// cost $13.00.
    #[tokio::test]
    async fn test_create_and_complete_posts_stock_and_cost() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let supplier = insert_test_supplier(&db, "Proveedora Local").await;
        let product = insert_test_product(&db, "CAFE-250", 10).await;

        let purchase = db
            .purchases()
            .create(&local_purchase(&supplier.id, &product.id))
            .await
            .unwrap();

        assert_eq!(purchase.purchase_number, "PC-000001");
        assert_eq!(purchase.status, PurchaseStatus::Pending);
        assert_eq!(purchase.subtotal_cents, 5000);
        assert_eq!(purchase.total_costs_cents, 1500);
        assert_eq!(purchase.total_cents, 6500);

        let items = db.purchases().items(&purchase.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].distributed_cost_cents, 1500);
        assert_eq!(items[0].final_unit_cost_cents, 1300);
        assert_eq!(items[0].total_cost_cents, 6500);

        // stock untouched before completion
        let before = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(before.stock, 10);
        assert_eq!(before.cost_cents, 0);

        let completed = db.purchases().complete(&purchase.id).await.unwrap();
        assert_eq!(completed.status, PurchaseStatus::Completed);
        assert!(completed.completed_at.is_some());

        let after = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(after.stock, 15);
        assert_eq!(after.cost_cents, 1300);

        let movements = db
            .ledger()
            .movements_for_reference(&purchase.purchase_number)
            .await
            .unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].reason, "Purchase completed");

        db.ledger().verify_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_complete_is_not_repeatable() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let supplier = insert_test_supplier(&db, "Proveedora Local").await;
        let product = insert_test_product(&db, "CAFE-250", 0).await;

        let purchase = db
            .purchases()
            .create(&local_purchase(&supplier.id, &product.id))
            .await
            .unwrap();
        db.purchases().complete(&purchase.id).await.unwrap();

        let err = db.purchases().complete(&purchase.id).await.unwrap_err();
        assert!(matches!(err, DbError::StateConflict { .. }));

        // stock posted exactly once
        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 5);
    }

    #[tokio::test]
    async fn test_cancelled_purchase_cannot_complete() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let supplier = insert_test_supplier(&db, "Proveedora Local").await;
        let product = insert_test_product(&db, "CAFE-250", 0).await;

        let purchase = db
            .purchases()
            .create(&local_purchase(&supplier.id, &product.id))
            .await
            .unwrap();
        db.purchases()
            .update_status(&purchase.id, PurchaseStatus::Cancelled)
            .await
            .unwrap();

        let err = db.purchases().complete(&purchase.id).await.unwrap_err();
        assert!(matches!(err, DbError::StateConflict { .. }));
    }

    #[tokio::test]
    async fn test_import_purchase_allocates_in_both_currencies() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let supplier = insert_test_supplier(&db, "Importadora Norte").await;
        let product_a = insert_test_product(&db, "SKU-A", 0).await;
        let product_b = insert_test_product(&db, "SKU-B", 0).await;

        // rate 2.0: freight $10 + customs $5 foreign → $30 local; tax $3 local
        let input = CreatePurchase {
            supplier_id: supplier.id.clone(),
            kind: PurchaseKind::Import,
            currency: "USD".to_string(),
            exchange_rate_micros: Some(2_000_000),
            freight_cents: 1000,
            customs_cents: 500,
            tax_cents: 300,
            insurance_cents: 0,
            other_cents: 0,
            notes: Some("container 42".to_string()),
            items: vec![
                CreatePurchaseItem {
                    product_id: product_a.id.clone(),
                    quantity: 1,
                    unit_price_cents: 6000,
                    unit_price_foreign_cents: Some(3000),
                },
                CreatePurchaseItem {
                    product_id: product_b.id.clone(),
                    quantity: 1,
                    unit_price_cents: 4000,
                    unit_price_foreign_cents: Some(2000),
                },
            ],
        };

        let purchase = db.purchases().create(&input).await.unwrap();
        assert_eq!(purchase.total_costs_cents, 3300);
        assert_eq!(purchase.subtotal_foreign_cents, Some(5000));

        let items = db.purchases().items(&purchase.id).await.unwrap();
        let total_distributed: i64 = items.iter().map(|i| i.distributed_cost_cents).sum();
        assert_eq!(total_distributed, 3300);
        assert_eq!(items[0].distributed_cost_foreign_cents, Some(990));
        assert_eq!(items[0].final_unit_cost_foreign_cents, Some(3990));
    }

    #[tokio::test]
    async fn test_import_without_rate_is_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let supplier = insert_test_supplier(&db, "Importadora Norte").await;
        let product = insert_test_product(&db, "SKU-A", 0).await;

        let mut input = local_purchase(&supplier.id, &product.id);
        input.currency = "USD".to_string();
        input.kind = PurchaseKind::Import;

        let err = db.purchases().create(&input).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_supplier_is_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = insert_test_product(&db, "SKU-A", 0).await;

        let err = db
            .purchases()
            .create(&local_purchase("missing-supplier", &product.id))
            .await
            .unwrap_err();
        match err {
            DbError::NotFound { entity, .. } => assert_eq!(entity, "Supplier"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_edit_replaces_items_and_reallocates() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let supplier = insert_test_supplier(&db, "Proveedora Local").await;
        let product = insert_test_product(&db, "SKU-A", 0).await;
        let other_product = insert_test_product(&db, "SKU-B", 0).await;

        let purchase = db
            .purchases()
            .create(&local_purchase(&supplier.id, &product.id))
            .await
            .unwrap();

        let mut edited_input = local_purchase(&supplier.id, &other_product.id);
        edited_input.freight_cents = 2000;
        edited_input.tax_cents = 0;
        edited_input.items[0].quantity = 10;

        let edited = db.purchases().edit(&purchase.id, &edited_input).await.unwrap();
        assert_eq!(edited.purchase_number, purchase.purchase_number);
        assert_eq!(edited.subtotal_cents, 10000);
        assert_eq!(edited.total_costs_cents, 2000);

        let items = db.purchases().items(&purchase.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id, other_product.id);
        assert_eq!(items[0].distributed_cost_cents, 2000);
        assert_eq!(items[0].final_unit_cost_cents, 1200); // $10 + $20/10
    }

    #[tokio::test]
    async fn test_edit_rejected_after_shipping_window() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let supplier = insert_test_supplier(&db, "Proveedora Local").await;
        let product = insert_test_product(&db, "SKU-A", 0).await;

        let purchase = db
            .purchases()
            .create(&local_purchase(&supplier.id, &product.id))
            .await
            .unwrap();

        // pending → ordered → shipped are editable
        db.purchases()
            .update_status(&purchase.id, PurchaseStatus::Ordered)
            .await
            .unwrap();
        db.purchases()
            .edit(&purchase.id, &local_purchase(&supplier.id, &product.id))
            .await
            .unwrap();

        db.purchases()
            .update_status(&purchase.id, PurchaseStatus::Received)
            .await
            .unwrap();
        let err = db
            .purchases()
            .edit(&purchase.id, &local_purchase(&supplier.id, &product.id))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::StateConflict { .. }));
    }

    #[tokio::test]
    async fn test_status_cannot_leave_terminal_or_jump_to_completed() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let supplier = insert_test_supplier(&db, "Proveedora Local").await;
        let product = insert_test_product(&db, "SKU-A", 0).await;

        let purchase = db
            .purchases()
            .create(&local_purchase(&supplier.id, &product.id))
            .await
            .unwrap();

        let err = db
            .purchases()
            .update_status(&purchase.id, PurchaseStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::StateConflict { .. }));

        db.purchases().complete(&purchase.id).await.unwrap();
        let err = db
            .purchases()
            .update_status(&purchase.id, PurchaseStatus::Ordered)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::StateConflict { .. }));
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let supplier = insert_test_supplier(&db, "Proveedora Local").await;
        let product = insert_test_product(&db, "SKU-A", 0).await;

        // pending: deletable
        let purchase = db
            .purchases()
            .create(&local_purchase(&supplier.id, &product.id))
            .await
            .unwrap();
        db.purchases().delete(&purchase.id).await.unwrap();
        assert!(db
            .purchases()
            .get_by_id(&purchase.id)
            .await
            .unwrap()
            .is_none());

        // completed: not deletable (stock/cost already posted)
        let purchase = db
            .purchases()
            .create(&local_purchase(&supplier.id, &product.id))
            .await
            .unwrap();
        db.purchases().complete(&purchase.id).await.unwrap();
        let err = db.purchases().delete(&purchase.id).await.unwrap_err();
        assert!(matches!(err, DbError::StateConflict { .. }));

        // cancelled: deletable
        let purchase = db
            .purchases()
            .create(&local_purchase(&supplier.id, &product.id))
            .await
            .unwrap();
        db.purchases()
            .update_status(&purchase.id, PurchaseStatus::Cancelled)
            .await
            .unwrap();
        db.purchases().delete(&purchase.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_purchase_numbers_are_sequential() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let supplier = insert_test_supplier(&db, "Proveedora Local").await;
        let product = insert_test_product(&db, "SKU-A", 0).await;

        let first = db
            .purchases()
            .create(&local_purchase(&supplier.id, &product.id))
            .await
            .unwrap();
        let second = db
            .purchases()
            .create(&local_purchase(&supplier.id, &product.id))
            .await
            .unwrap();

        assert_eq!(first.purchase_number, "PC-000001");
        assert_eq!(second.purchase_number, "PC-000002");

        let listed = db.purchases().list(10).await.unwrap();
        assert_eq!(listed.len(), 2);
    }
}
