//! # Sale Repository
//!
//! Transaction management for sales: creation (stock decrement),
//! cancellation (stock restitution) and edit (stock reconciliation).
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sale Lifecycle                                  │
//! │                                                                         │
//! │  1. CREATE (one transaction)                                           │
//! │     ├── aggregate required stock per product across ALL lines          │
//! │     ├── every product: exists? active? stock >= required?              │
//! │     │     any line fails → the WHOLE sale is rejected                  │
//! │     ├── draw SA number, insert sale + items + components               │
//! │     └── ledger OUT movement per stock effect                           │
//! │           simple line:      own product × quantity                     │
//! │           combo/grouped:    each component × (per-unit × quantity)     │
//! │                                                                         │
//! │  2. CANCEL (one transaction, 10s budget)                               │
//! │     ├── status re-checked INSIDE the transaction                       │
//! │     ├── ledger IN movement exactly mirroring every creation OUT        │
//! │     └── status = cancelled (guarded update, exactly-once)              │
//! │                                                                         │
//! │  3. EDIT (one transaction)                                             │
//! │     ├── replace all items, recompute totals                            │
//! │     └── reconcile stock by per-product diff (IN for released,          │
//! │         guarded OUT for newly required)                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cancellation fans out one ledger call per component across all items,
//! so it carries an explicit timeout; on expiry the transaction is dropped
//! and rolls back whole. No partial reversal is ever observable.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::counter::{CounterKind, DocumentCounters, MAX_NUMBER_ATTEMPTS};
use crate::repository::product::ProductRepository;
use crate::repository::stock::StockLedger;
use kardex_core::validation::validate_sale;
use kardex_core::{
    CreateSale, CreateSaleItem, MovementKind, NewMovement, Sale, SaleComponent, SaleItem,
    SaleItemKind, SaleStatus,
};

/// Time budget for a cancellation transaction.
pub const CANCEL_TIMEOUT: Duration = Duration::from_secs(10);

const SALE_COLUMNS: &str = "id, sale_number, customer_id, subtotal_cents, discount_cents, \
     tax_cents, shipping_cents, total_cents, payment_method, status, notes, created_at, \
     updated_at, cancelled_at";

/// Raw sale_items row; the typed [`SaleItemKind`] is assembled from
/// `item_type` + `product_id` + the components table.
#[derive(Debug, sqlx::FromRow)]
struct SaleItemRow {
    id: String,
    sale_id: String,
    item_type: String,
    product_id: Option<String>,
    display_name: String,
    quantity: i64,
    unit_price_cents: i64,
    total_price_cents: i64,
    created_at: chrono::DateTime<Utc>,
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Creates a sale and decrements stock, one transaction, all-or-nothing.
    ///
    /// ## Errors
    /// * `Validation` - malformed input
    /// * `NotFound` - a referenced product is absent
    /// * `StateConflict` - a referenced product is inactive
    /// * `InsufficientStock` - any product short of the AGGREGATED
    ///   requirement across all lines (lines may share a product)
    pub async fn create(&self, input: &CreateSale) -> DbResult<Sale> {
        validate_sale(input)?;

        let mut tx = self.pool.begin().await?;

        // Aggregate the stock requirement per product across every line's
        // expansion, then check each product once against the sum.
        let required = aggregate_requirements(input.items.iter().flat_map(|i| i.stock_effects()));

        let products = ProductRepository::new(self.pool.clone());
        let mut names: BTreeMap<String, String> = BTreeMap::new();
        for (product_id, quantity) in &required {
            let product = products
                .get_in_tx(&mut tx, product_id)
                .await?
                .ok_or_else(|| DbError::not_found("Product", product_id))?;

            if !product.is_active {
                return Err(DbError::state_conflict(
                    "Product",
                    product_id,
                    "inactive",
                    "sell",
                ));
            }
            if product.stock < *quantity {
                return Err(DbError::InsufficientStock {
                    product_id: product_id.clone(),
                    name: product.name,
                    available: product.stock,
                    requested: *quantity,
                });
            }
            names.insert(product_id.clone(), product.name);
        }

        let now = Utc::now();
        let subtotal_cents: i64 = input
            .items
            .iter()
            .map(|i| i.quantity * i.unit_price_cents)
            .sum();
        let total_cents =
            subtotal_cents - input.discount_cents + input.tax_cents + input.shipping_cents;

        let counters = DocumentCounters::new(self.pool.clone());
        let mut sale = None;
        for attempt in 0..MAX_NUMBER_ATTEMPTS {
            let number = counters.next_number(&mut tx, CounterKind::Sale).await?;
            let candidate = Sale {
                id: Uuid::new_v4().to_string(),
                sale_number: number,
                customer_id: input.customer_id.clone(),
                subtotal_cents,
                discount_cents: input.discount_cents,
                tax_cents: input.tax_cents,
                shipping_cents: input.shipping_cents,
                total_cents,
                payment_method: input.payment_method,
                status: SaleStatus::Pending,
                notes: input.notes.clone(),
                created_at: now,
                updated_at: now,
                cancelled_at: None,
            };

            match insert_sale_row(&mut tx, &candidate).await {
                Ok(()) => {
                    sale = Some(candidate);
                    break;
                }
                Err(DbError::UniqueViolation { field, .. })
                    if field.contains("sale_number") && attempt + 1 < MAX_NUMBER_ATTEMPTS =>
                {
                    debug!(attempt, "Sale number collision, redrawing");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
        let sale = sale.ok_or_else(|| {
            DbError::Internal("sale numbering exhausted its retry budget".to_string())
        })?;

        let ledger = StockLedger::new(self.pool.clone());
        for item in &input.items {
            let display_name = resolve_display_name(item, &names);
            insert_item_rows(&mut tx, &sale.id, item, &display_name, now).await?;

            let reason = if item.kind.is_composite() {
                format!("Sale - {display_name}")
            } else {
                "Sale".to_string()
            };
            for effect in item.stock_effects() {
                ledger
                    .apply_movement(
                        &mut tx,
                        &NewMovement {
                            product_id: effect.product_id,
                            kind: MovementKind::Out,
                            quantity: effect.quantity,
                            reason: reason.clone(),
                            reference: sale.sale_number.clone(),
                        },
                    )
                    .await?;
            }
        }

        tx.commit().await?;

        info!(
            sale_id = %sale.id,
            sale_number = %sale.sale_number,
            total = sale.total_cents,
            items = input.items.len(),
            "Sale created"
        );

        Ok(sale)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Gets all items for a sale, composites assembled with their components.
    pub async fn items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch_items(&mut conn, sale_id).await
    }

    /// Lists sales, newest first.
    pub async fn list(&self, limit: u32) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales ORDER BY created_at DESC, id DESC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// Cancels a sale and reverses every stock effect, exactly once.
    ///
    /// Bounded by [`CANCEL_TIMEOUT`]: the reversal is one ledger call per
    /// component across all items. On expiry the transaction is dropped and
    /// rolls back; the caller sees a transient `Timeout` and may retry.
    pub async fn cancel(&self, id: &str) -> DbResult<Sale> {
        match tokio::time::timeout(CANCEL_TIMEOUT, self.cancel_inner(id)).await {
            Ok(result) => result,
            Err(_) => Err(DbError::Timeout {
                operation: "cancel_sale".to_string(),
                seconds: CANCEL_TIMEOUT.as_secs(),
            }),
        }
    }

    async fn cancel_inner(&self, id: &str) -> DbResult<Sale> {
        let mut tx = self.pool.begin().await?;

        // Status is read INSIDE the transaction: two concurrent cancels
        // serialize here, and the loser sees `cancelled`.
        let sale = fetch_sale(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", id))?;

        if sale.status == SaleStatus::Cancelled {
            return Err(DbError::AlreadyCancelled { id: id.to_string() });
        }

        let items = fetch_items(&mut tx, id).await?;

        let ledger = StockLedger::new(self.pool.clone());
        for item in &items {
            let reason = if item.kind.is_composite() {
                format!("Sale cancelled - {}", item.display_name)
            } else {
                "Sale cancelled".to_string()
            };
            // Exact mirror of creation's OUT movements.
            for effect in item.stock_effects() {
                ledger
                    .apply_movement(
                        &mut tx,
                        &NewMovement {
                            product_id: effect.product_id,
                            kind: MovementKind::In,
                            quantity: effect.quantity,
                            reason: reason.clone(),
                            reference: sale.sale_number.clone(),
                        },
                    )
                    .await?;
            }
        }

        let now = Utc::now();
        let updated = sqlx::query(
            r#"
            UPDATE sales
            SET status = 'cancelled', cancelled_at = ?2, updated_at = ?2
            WHERE id = ?1 AND status != 'cancelled'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DbError::AlreadyCancelled { id: id.to_string() });
        }

        tx.commit().await?;

        info!(
            sale_id = %id,
            sale_number = %sale.sale_number,
            items = items.len(),
            "Sale cancelled, stock restored"
        );

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", id))
    }

    // =========================================================================
    // Edit
    // =========================================================================

    /// Replaces all items, recomputes totals and reconciles stock by
    /// per-product diff, one transaction.
    ///
    /// Products the new item set needs MORE of are decremented (guarded);
    /// products it needs LESS of are restored. A sale edited back and forth
    /// therefore leaves stock exactly where the final item set implies.
    pub async fn edit(&self, id: &str, input: &CreateSale) -> DbResult<Sale> {
        validate_sale(input)?;

        let mut tx = self.pool.begin().await?;

        let sale = fetch_sale(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", id))?;

        if sale.status == SaleStatus::Cancelled {
            return Err(DbError::state_conflict("Sale", id, "cancelled", "edit"));
        }

        let old_items = fetch_items(&mut tx, id).await?;
        let old_required =
            aggregate_requirements(old_items.iter().flat_map(|i| i.stock_effects()));
        let new_required =
            aggregate_requirements(input.items.iter().flat_map(|i| i.stock_effects()));

        let products = ProductRepository::new(self.pool.clone());
        let mut names: BTreeMap<String, String> = BTreeMap::new();
        for product_id in new_required.keys() {
            let product = products
                .get_in_tx(&mut tx, product_id)
                .await?
                .ok_or_else(|| DbError::not_found("Product", product_id))?;

            let before = old_required.get(product_id).copied().unwrap_or(0);
            let after = new_required.get(product_id).copied().unwrap_or(0);
            if !product.is_active && after > before {
                // Taking MORE of an inactive product is rejected; keeping or
                // shrinking a line that already referenced it is allowed.
                return Err(DbError::state_conflict(
                    "Product",
                    product_id,
                    "inactive",
                    "sell",
                ));
            }
            names.insert(product_id.clone(), product.name);
        }

        // Stock reconciliation: the diff between what the old and the new
        // item sets take out of each product.
        let ledger = StockLedger::new(self.pool.clone());
        let mut touched: Vec<&String> = old_required.keys().chain(new_required.keys()).collect();
        touched.sort();
        touched.dedup();
        for product_id in touched {
            let before = old_required.get(product_id).copied().unwrap_or(0);
            let after = new_required.get(product_id).copied().unwrap_or(0);
            let movement = match after - before {
                0 => continue,
                delta if delta > 0 => NewMovement {
                    product_id: product_id.clone(),
                    kind: MovementKind::Out,
                    quantity: delta,
                    reason: "Sale adjusted".to_string(),
                    reference: sale.sale_number.clone(),
                },
                delta => NewMovement {
                    product_id: product_id.clone(),
                    kind: MovementKind::In,
                    quantity: -delta,
                    reason: "Sale adjusted".to_string(),
                    reference: sale.sale_number.clone(),
                },
            };
            ledger.apply_movement(&mut tx, &movement).await?;
        }

        // Replace all items (components cascade with their rows).
        sqlx::query("DELETE FROM sale_items WHERE sale_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let now = Utc::now();
        for item in &input.items {
            let display_name = resolve_display_name(item, &names);
            insert_item_rows(&mut tx, id, item, &display_name, now).await?;
        }

        let subtotal_cents: i64 = input
            .items
            .iter()
            .map(|i| i.quantity * i.unit_price_cents)
            .sum();
        let total_cents =
            subtotal_cents - input.discount_cents + input.tax_cents + input.shipping_cents;

        sqlx::query(
            r#"
            UPDATE sales SET
                customer_id = ?2, subtotal_cents = ?3, discount_cents = ?4,
                tax_cents = ?5, shipping_cents = ?6, total_cents = ?7,
                payment_method = ?8, notes = ?9, updated_at = ?10
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&input.customer_id)
        .bind(subtotal_cents)
        .bind(input.discount_cents)
        .bind(input.tax_cents)
        .bind(input.shipping_cents)
        .bind(total_cents)
        .bind(input.payment_method)
        .bind(&input.notes)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(sale_id = %id, "Sale edited, stock reconciled");

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", id))
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Sums stock effects per product. BTreeMap keeps the iteration order
/// deterministic, which keeps ledger write order deterministic.
fn aggregate_requirements(
    effects: impl Iterator<Item = kardex_core::StockEffect>,
) -> BTreeMap<String, i64> {
    let mut required = BTreeMap::new();
    for effect in effects {
        *required.entry(effect.product_id).or_insert(0) += effect.quantity;
    }
    required
}

/// Composite lines carry their own name; simple lines snapshot the
/// product name unless the caller provided one.
fn resolve_display_name(item: &CreateSaleItem, names: &BTreeMap<String, String>) -> String {
    if let Some(name) = &item.display_name {
        return name.clone();
    }
    match &item.kind {
        SaleItemKind::Simple { product_id } => names
            .get(product_id)
            .cloned()
            .unwrap_or_else(|| product_id.clone()),
        _ => String::new(),
    }
}

async fn fetch_sale(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
    let sale =
        sqlx::query_as::<_, Sale>(&format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(sale)
}

async fn insert_sale_row(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sales (
            id, sale_number, customer_id, subtotal_cents, discount_cents,
            tax_cents, shipping_cents, total_cents, payment_method, status,
            notes, created_at, updated_at, cancelled_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.sale_number)
    .bind(&sale.customer_id)
    .bind(sale.subtotal_cents)
    .bind(sale.discount_cents)
    .bind(sale.tax_cents)
    .bind(sale.shipping_cents)
    .bind(sale.total_cents)
    .bind(sale.payment_method)
    .bind(sale.status)
    .bind(&sale.notes)
    .bind(sale.created_at)
    .bind(sale.updated_at)
    .bind(sale.cancelled_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Inserts one sale item plus its component rows.
async fn insert_item_rows(
    conn: &mut SqliteConnection,
    sale_id: &str,
    item: &CreateSaleItem,
    display_name: &str,
    now: chrono::DateTime<Utc>,
) -> DbResult<()> {
    let item_id = Uuid::new_v4().to_string();
    let product_id = match &item.kind {
        SaleItemKind::Simple { product_id } => Some(product_id.clone()),
        _ => None,
    };

    sqlx::query(
        r#"
        INSERT INTO sale_items (
            id, sale_id, item_type, product_id, display_name,
            quantity, unit_price_cents, total_price_cents, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&item_id)
    .bind(sale_id)
    .bind(item.kind.as_str())
    .bind(&product_id)
    .bind(display_name)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.quantity * item.unit_price_cents)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if let Some(components) = item.kind.components() {
        for component in components {
            sqlx::query(
                r#"
                INSERT INTO sale_item_components (id, sale_item_id, product_id, quantity_per_unit)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&item_id)
            .bind(&component.product_id)
            .bind(component.quantity_per_unit)
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}

/// Loads items and reassembles each row's [`SaleItemKind`].
async fn fetch_items(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
    let rows = sqlx::query_as::<_, SaleItemRow>(
        r#"
        SELECT id, sale_id, item_type, product_id, display_name,
               quantity, unit_price_cents, total_price_cents, created_at
        FROM sale_items
        WHERE sale_id = ?1
        ORDER BY created_at, id
        "#,
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let kind = match row.item_type.as_str() {
            "simple" => {
                let product_id = row.product_id.clone().ok_or_else(|| {
                    DbError::Invariant(format!("simple sale item {} has no product", row.id))
                })?;
                SaleItemKind::Simple { product_id }
            }
            "combo" | "grouped" => {
                let components: Vec<(String, i64)> = sqlx::query_as(
                    r#"
                    SELECT product_id, quantity_per_unit
                    FROM sale_item_components
                    WHERE sale_item_id = ?1
                    ORDER BY id
                    "#,
                )
                .bind(&row.id)
                .fetch_all(&mut *conn)
                .await?;

                let components = components
                    .into_iter()
                    .map(|(product_id, quantity_per_unit)| SaleComponent {
                        product_id,
                        quantity_per_unit,
                    })
                    .collect();

                if row.item_type == "combo" {
                    SaleItemKind::Combo { components }
                } else {
                    SaleItemKind::Grouped { components }
                }
            }
            other => {
                return Err(DbError::Invariant(format!(
                    "unknown sale item type '{other}' on item {}",
                    row.id
                )))
            }
        };

        items.push(SaleItem {
            id: row.id,
            sale_id: row.sale_id,
            kind,
            display_name: row.display_name,
            quantity: row.quantity,
            unit_price_cents: row.unit_price_cents,
            total_price_cents: row.total_price_cents,
            created_at: row.created_at,
        });
    }

    Ok(items)
}

// =============================================================================
// Unit Tests
// =============================================================================
