//! # Domain Types
//!
//! Core domain types used throughout Kardex.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │  StockMovement  │   │    Supplier     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  sku (business) │   │  kind (in/out)  │   │  name           │       │
//! │  │  stock ← ledger │   │  quantity       │   │  is_active      │       │
//! │  │  cost_cents     │   │  reason, ref    │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                             │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Purchase     │──►│  PurchaseItem   │   │  SaleItemKind   │       │
//! │  │  status machine │   │  landed costs   │   │  Simple         │       │
//! │  └─────────────────┘   └─────────────────┘   │  Combo          │       │
//! │  ┌─────────────────┐   ┌─────────────────┐   │  Grouped        │       │
//! │  │      Sale       │──►│    SaleItem     │──►│  (components)   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID where users need one: (sku, purchase_number, sale_number)
//!
//! ## Stock Ownership
//! `Product.stock` is owned by the stock ledger. Nothing in this crate or
//! elsewhere mutates it except the ledger's movement application, which
//! writes the counter and the movement row in the same transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::{ExchangeRate, Money};

// =============================================================================
// Product
// =============================================================================

/// A product tracked in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name.
    pub name: String,

    /// Optional description.
    pub description: Option<String>,

    /// Sale price in cents.
    pub price_cents: i64,

    /// Standing unit cost in cents. Updated to the landed cost of the
    /// most recent completed purchase (last-purchase-cost policy).
    pub cost_cents: i64,

    /// Current stock level. Mutated only through the stock ledger.
    pub stock: i64,

    /// Reorder threshold: at or below this the product is "low stock".
    pub min_stock: i64,

    /// Overstock threshold (reporting only).
    pub max_stock: i64,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    /// When the product was created.
    pub created_at: DateTime<Utc>,

    /// When the product was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the sale price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Returns the standing unit cost as a Money type.
    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    /// Checks if the requested quantity can be taken from stock.
    pub fn can_fulfill(&self, quantity: i64) -> bool {
        self.is_active && self.stock >= quantity
    }

    /// Checks if the product is at or below its reorder threshold.
    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock
    }
}

// =============================================================================
// Stock Movement
// =============================================================================

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    /// Stock increase (purchase completion, sale cancellation).
    In,
    /// Stock decrease (sale).
    Out,
}

impl MovementKind {
    /// Applies the direction's sign to a positive quantity.
    #[inline]
    pub const fn signed(&self, quantity: i64) -> i64 {
        match self {
            MovementKind::In => quantity,
            MovementKind::Out => -quantity,
        }
    }
}

/// One immutable entry in the stock ledger.
///
/// Created once, never updated or deleted. The sum of signed quantities for
/// a product, from the beginning of time, equals that product's current
/// stock counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    pub kind: MovementKind,
    /// Always positive; direction lives in `kind`.
    pub quantity: i64,
    /// Free-text reason ("Sale", "Purchase completed", ...).
    pub reason: String,
    /// External correlation id (sale/purchase number).
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// The movement's signed effect on stock.
    #[inline]
    pub fn signed_quantity(&self) -> i64 {
        self.kind.signed(self.quantity)
    }
}

/// Input for a new ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMovement {
    pub product_id: String,
    pub kind: MovementKind,
    pub quantity: i64,
    pub reason: String,
    pub reference: String,
}

// =============================================================================
// Supplier
// =============================================================================

/// A goods supplier. The engine only needs existence and the id; contact
/// details belong to the excluded catalog surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Supplier {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Purchase Status
// =============================================================================

/// The lifecycle state of a purchase.
///
/// ```text
/// pending → ordered → shipped → customs → received → completed
///     │         │         │         │          │
///     └─────────┴─────────┴─────────┴──────────┴──► cancelled
/// ```
///
/// `completed` and `cancelled` are terminal. Only `completed` carries side
/// effects (stock + cost posting), so it is reachable exclusively through
/// the completion operation, never a plain status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Pending,
    Ordered,
    Shipped,
    Customs,
    Received,
    Completed,
    Cancelled,
}

impl PurchaseStatus {
    /// Terminal states admit no further transitions.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, PurchaseStatus::Completed | PurchaseStatus::Cancelled)
    }

    /// Items and costs may change only early in the lifecycle,
    /// before goods are physically in play.
    #[inline]
    pub const fn allows_editing(&self) -> bool {
        matches!(
            self,
            PurchaseStatus::Pending | PurchaseStatus::Ordered | PurchaseStatus::Shipped
        )
    }

    /// Deletion is permitted only before anything was posted.
    #[inline]
    pub const fn allows_deletion(&self) -> bool {
        matches!(self, PurchaseStatus::Pending | PurchaseStatus::Cancelled)
    }

    /// Stable lowercase name (matches the database representation).
    pub const fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Ordered => "ordered",
            PurchaseStatus::Shipped => "shipped",
            PurchaseStatus::Customs => "customs",
            PurchaseStatus::Received => "received",
            PurchaseStatus::Completed => "completed",
            PurchaseStatus::Cancelled => "cancelled",
        }
    }
}

impl Default for PurchaseStatus {
    fn default() -> Self {
        PurchaseStatus::Pending
    }
}

/// Whether a purchase is domestic or an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PurchaseKind {
    Local,
    Import,
}

// =============================================================================
// Purchase
// =============================================================================

/// A purchase of goods from a supplier.
///
/// Monetary fields are cents. When `currency` is not the local currency,
/// `exchange_rate_micros` must be present and the foreign-denominated
/// figures (`subtotal_foreign_cents`, per-item foreign prices) are kept
/// alongside the authoritative local ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Purchase {
    pub id: String,
    /// Business number, unique and monotonic: `PC-000123`.
    pub purchase_number: String,
    pub supplier_id: String,
    pub kind: PurchaseKind,
    /// ISO currency code of the supplier invoice (e.g. "MXN", "USD").
    pub currency: String,
    /// Fixed-point rate (1_000_000 = 1.0); required when currency is foreign.
    pub exchange_rate_micros: Option<i64>,
    /// Overhead: freight/shipping.
    pub freight_cents: i64,
    /// Overhead: customs duties.
    pub customs_cents: i64,
    /// Overhead: tax. Always local currency (local-jurisdiction charge).
    pub tax_cents: i64,
    /// Overhead: insurance.
    pub insurance_cents: i64,
    /// Overhead: anything else.
    pub other_cents: i64,
    /// Σ quantity × local unit price over items.
    pub subtotal_cents: i64,
    /// Σ quantity × foreign unit price, when foreign-denominated.
    pub subtotal_foreign_cents: Option<i64>,
    /// All overheads converted to local cents.
    pub total_costs_cents: i64,
    /// subtotal + total costs, local cents.
    pub total_cents: i64,
    pub notes: Option<String>,
    pub status: PurchaseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Purchase {
    /// Returns the exchange rate, if one is recorded.
    #[inline]
    pub fn exchange_rate(&self) -> Option<ExchangeRate> {
        self.exchange_rate_micros.map(ExchangeRate::from_micros)
    }

    /// Returns the grand total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A line item of a purchase.
///
/// The distributed/final/total cost fields are outputs of the cost
/// allocation engine; they are recomputed in full whenever the parent
/// purchase changes while editable, and become permanent once it completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PurchaseItem {
    pub id: String,
    pub purchase_id: String,
    pub product_id: String,
    pub quantity: i64,
    /// Unit price in local cents (authoritative for allocation).
    pub unit_price_cents: i64,
    /// Unit price in foreign cents, when foreign-denominated.
    pub unit_price_foreign_cents: Option<i64>,
    /// This line's share of the purchase overheads, local cents.
    pub distributed_cost_cents: i64,
    /// Landed unit cost: unit price + distributed share per unit.
    pub final_unit_cost_cents: i64,
    /// quantity × unit price + distributed share (exact, conserving).
    pub total_cost_cents: i64,
    /// Informational mirror of the distributed share in foreign cents.
    pub distributed_cost_foreign_cents: Option<i64>,
    /// Informational mirror of the landed unit cost in foreign cents.
    pub final_unit_cost_foreign_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl PurchaseItem {
    /// Returns the landed unit cost as Money.
    #[inline]
    pub fn final_unit_cost(&self) -> Money {
        Money::from_cents(self.final_unit_cost_cents)
    }
}

// =============================================================================
// Sale Status / Payment Method
// =============================================================================

/// The status of a sale transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Recorded, payment settling.
    Pending,
    /// Paid and settled.
    Completed,
    /// Cancelled; all stock effects reversed.
    Cancelled,
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Card payment on external terminal.
    Card,
    /// Bank transfer.
    Transfer,
}

// =============================================================================
// Sale
// =============================================================================

/// A sale transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,
    /// Business number, unique and monotonic: `SA-000123`.
    pub sale_number: String,
    pub customer_id: Option<String>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    /// subtotal - discount + tax + shipping.
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    pub status: SaleStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Sale {
    /// Returns the sale total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Sale Items (simple / combo / grouped)
// =============================================================================

/// One (product, quantity) pair a sale item resolves to in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEffect {
    pub product_id: String,
    /// Total units taken from (or returned to) the product's stock.
    pub quantity: i64,
}

/// One constituent product of a combo/grouped sale item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleComponent {
    pub product_id: String,
    /// Units of this product per ONE unit of the parent item.
    pub quantity_per_unit: i64,
}

/// What a sale line actually is, as a closed sum.
///
/// ## Why a sum type?
/// The stock effect of a line depends entirely on its shape: a simple line
/// hits its own product, a combo/grouped line hits every component. Keeping
/// the shapes in one enum forces every stock-effect computation through an
/// exhaustive match, so a future item shape cannot be silently skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "item_type", rename_all = "snake_case")]
pub enum SaleItemKind {
    /// A single product.
    Simple { product_id: String },
    /// A fixed bundle sold as one unit (e.g. "Breakfast Combo").
    Combo { components: Vec<SaleComponent> },
    /// An ad-hoc grouping priced as one line.
    Grouped { components: Vec<SaleComponent> },
}

impl SaleItemKind {
    /// Stable lowercase tag (matches the database representation).
    pub const fn as_str(&self) -> &'static str {
        match self {
            SaleItemKind::Simple { .. } => "simple",
            SaleItemKind::Combo { .. } => "combo",
            SaleItemKind::Grouped { .. } => "grouped",
        }
    }

    /// Whether the line decomposes into components.
    #[inline]
    pub const fn is_composite(&self) -> bool {
        matches!(
            self,
            SaleItemKind::Combo { .. } | SaleItemKind::Grouped { .. }
        )
    }

    /// The components, when composite.
    pub fn components(&self) -> Option<&[SaleComponent]> {
        match self {
            SaleItemKind::Simple { .. } => None,
            SaleItemKind::Combo { components } | SaleItemKind::Grouped { components } => {
                Some(components)
            }
        }
    }

    /// Expands the line's full stock effect for `quantity` units of it.
    ///
    /// Simple:          own product × quantity
    /// Combo/Grouped:   each component × (per-unit × quantity)
    ///
    /// Creation applies these as OUT movements, cancellation mirrors them
    /// as IN movements; both sides share this single expansion.
    pub fn stock_effects(&self, quantity: i64) -> Vec<StockEffect> {
        match self {
            SaleItemKind::Simple { product_id } => vec![StockEffect {
                product_id: product_id.clone(),
                quantity,
            }],
            SaleItemKind::Combo { components } | SaleItemKind::Grouped { components } => components
                .iter()
                .map(|c| StockEffect {
                    product_id: c.product_id.clone(),
                    quantity: c.quantity_per_unit * quantity,
                })
                .collect(),
        }
    }
}

/// A line item in a sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub kind: SaleItemKind,
    /// Name shown on the ticket; for composites the bundle's name,
    /// for simple items a snapshot of the product name.
    pub display_name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// unit price × quantity.
    pub total_price_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl SaleItem {
    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// The line's full stock effect.
    pub fn stock_effects(&self) -> Vec<StockEffect> {
        self.kind.stock_effects(self.quantity)
    }
}

// =============================================================================
// Input Types
// =============================================================================
// The shapes the excluded HTTP/validation layer hands to the engine.

/// Input for creating or editing a purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePurchase {
    pub supplier_id: String,
    pub kind: PurchaseKind,
    /// ISO currency code of the supplier invoice.
    pub currency: String,
    /// Required when `currency` differs from the local currency.
    pub exchange_rate_micros: Option<i64>,
    pub freight_cents: i64,
    pub customs_cents: i64,
    pub tax_cents: i64,
    pub insurance_cents: i64,
    pub other_cents: i64,
    pub notes: Option<String>,
    pub items: Vec<CreatePurchaseItem>,
}

/// One line of a purchase input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePurchaseItem {
    pub product_id: String,
    pub quantity: i64,
    /// Unit price in local cents.
    pub unit_price_cents: i64,
    /// Unit price in foreign cents, for foreign-denominated purchases.
    pub unit_price_foreign_cents: Option<i64>,
}

/// Input for creating or editing a sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSale {
    pub customer_id: Option<String>,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub items: Vec<CreateSaleItem>,
}

/// One line of a sale input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSaleItem {
    pub kind: SaleItemKind,
    /// Required for composites; defaults to the product name for simple lines.
    pub display_name: Option<String>,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl CreateSaleItem {
    /// The line's full stock effect (same expansion as a stored item).
    pub fn stock_effects(&self) -> Vec<StockEffect> {
        self.kind.stock_effects(self.quantity)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_kind_signed() {
        assert_eq!(MovementKind::In.signed(5), 5);
        assert_eq!(MovementKind::Out.signed(5), -5);
    }

    #[test]
    fn test_purchase_status_rules() {
        assert!(PurchaseStatus::Pending.allows_editing());
        assert!(PurchaseStatus::Ordered.allows_editing());
        assert!(PurchaseStatus::Shipped.allows_editing());
        assert!(!PurchaseStatus::Customs.allows_editing());
        assert!(!PurchaseStatus::Received.allows_editing());
        assert!(!PurchaseStatus::Completed.allows_editing());

        assert!(PurchaseStatus::Pending.allows_deletion());
        assert!(PurchaseStatus::Cancelled.allows_deletion());
        assert!(!PurchaseStatus::Received.allows_deletion());

        assert!(PurchaseStatus::Completed.is_terminal());
        assert!(PurchaseStatus::Cancelled.is_terminal());
        assert!(!PurchaseStatus::Customs.is_terminal());
    }

    #[test]
    fn test_simple_item_stock_effect() {
        let kind = SaleItemKind::Simple {
            product_id: "p1".to_string(),
        };
        let effects = kind.stock_effects(4);
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].product_id, "p1");
        assert_eq!(effects[0].quantity, 4);
    }

    #[test]
    fn test_composite_item_stock_effect() {
        // "Combo A" ×2 with components X (3/unit) and Y (1/unit)
        let kind = SaleItemKind::Grouped {
            components: vec![
                SaleComponent {
                    product_id: "x".to_string(),
                    quantity_per_unit: 3,
                },
                SaleComponent {
                    product_id: "y".to_string(),
                    quantity_per_unit: 1,
                },
            ],
        };
        let effects = kind.stock_effects(2);
        assert_eq!(
            effects,
            vec![
                StockEffect {
                    product_id: "x".to_string(),
                    quantity: 6,
                },
                StockEffect {
                    product_id: "y".to_string(),
                    quantity: 2,
                },
            ]
        );
    }

    #[test]
    fn test_kind_tags() {
        let simple = SaleItemKind::Simple {
            product_id: "p".to_string(),
        };
        assert_eq!(simple.as_str(), "simple");
        assert!(!simple.is_composite());
        assert!(simple.components().is_none());

        let combo = SaleItemKind::Combo { components: vec![] };
        assert_eq!(combo.as_str(), "combo");
        assert!(combo.is_composite());
    }
}
