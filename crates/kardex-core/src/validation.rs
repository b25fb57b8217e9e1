//! # Validation Module
//!
//! Input validation for the engine's entry points.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP layer (excluded from this workspace)                    │
//! │  ├── Request shape, auth, content types                                │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - business rule validation                       │
//! │  ├── Required fields, ranges, currency/rate coherence                  │
//! │  └── Runs before any transaction is opened                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / UNIQUE / CHECK constraints                             │
//! │  └── Foreign key constraints                                           │
//! │                                                                         │
//! │  Defense in depth: each layer catches different mistakes               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{CreatePurchase, CreateSale, SaleItemKind};
use crate::{LOCAL_CURRENCY, MAX_ITEM_QUANTITY, MAX_SALE_ITEMS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - Must be at most 50 characters
/// - Only alphanumeric characters, hyphens, underscores
///
/// ## Example
/// ```rust
/// use kardex_core::validation::validate_sku;
///
/// assert!(validate_sku("CAFE-250").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("has space").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a display name (product, supplier, combo).
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates a quantity value.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY
pub fn validate_quantity(field: &str, qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an amount in cents that may be zero (prices, overheads).
pub fn validate_amount_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustBeNonNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates an ISO-4217-shaped currency code (three ASCII uppercase letters).
///
/// ## Example
/// ```rust
/// use kardex_core::validation::validate_currency;
///
/// assert!(validate_currency("MXN").is_ok());
/// assert!(validate_currency("USD").is_ok());
/// assert!(validate_currency("usd").is_err());
/// assert!(validate_currency("").is_err());
/// ```
pub fn validate_currency(code: &str) -> ValidationResult<()> {
    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "currency".to_string(),
        });
    }

    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::InvalidFormat {
            field: "currency".to_string(),
            reason: "must be a three-letter uppercase code".to_string(),
        });
    }

    Ok(())
}

/// Validates a UUID string format.
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Aggregate Validators
// =============================================================================

/// Validates a purchase input before it touches the database.
///
/// Checks the currency/rate coherence rule: a purchase denominated in a
/// currency other than [`LOCAL_CURRENCY`] must carry a positive exchange
/// rate. Per-line and overhead amounts must be well-formed; the allocation
/// engine re-checks its own inputs as a second line of defense.
pub fn validate_purchase(input: &CreatePurchase) -> ValidationResult<()> {
    if input.supplier_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "supplier_id".to_string(),
        });
    }

    validate_currency(&input.currency)?;

    if input.currency != LOCAL_CURRENCY {
        match input.exchange_rate_micros {
            None => {
                return Err(ValidationError::Required {
                    field: "exchange_rate".to_string(),
                })
            }
            Some(micros) if micros <= 0 => {
                return Err(ValidationError::MustBePositive {
                    field: "exchange_rate".to_string(),
                })
            }
            Some(_) => {}
        }
    }

    validate_amount_cents("freight", input.freight_cents)?;
    validate_amount_cents("customs", input.customs_cents)?;
    validate_amount_cents("tax", input.tax_cents)?;
    validate_amount_cents("insurance", input.insurance_cents)?;
    validate_amount_cents("other", input.other_cents)?;

    if input.items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    for item in &input.items {
        if item.product_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "items.product_id".to_string(),
            });
        }
        validate_quantity("items.quantity", item.quantity)?;
        validate_amount_cents("items.unit_price", item.unit_price_cents)?;
        if let Some(foreign) = item.unit_price_foreign_cents {
            validate_amount_cents("items.unit_price_foreign", foreign)?;
        }
    }

    Ok(())
}

/// Validates a sale input before it touches the database.
pub fn validate_sale(input: &CreateSale) -> ValidationResult<()> {
    if input.items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    if input.items.len() > MAX_SALE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_SALE_ITEMS as i64,
        });
    }

    validate_amount_cents("discount", input.discount_cents)?;
    validate_amount_cents("tax", input.tax_cents)?;
    validate_amount_cents("shipping", input.shipping_cents)?;

    for item in &input.items {
        validate_quantity("items.quantity", item.quantity)?;
        validate_amount_cents("items.unit_price", item.unit_price_cents)?;

        match &item.kind {
            SaleItemKind::Simple { product_id } => {
                if product_id.trim().is_empty() {
                    return Err(ValidationError::Required {
                        field: "items.product_id".to_string(),
                    });
                }
            }
            SaleItemKind::Combo { components } | SaleItemKind::Grouped { components } => {
                let name = item.display_name.as_deref().unwrap_or("");
                validate_name("items.display_name", name)?;

                if components.is_empty() {
                    return Err(ValidationError::Required {
                        field: "items.components".to_string(),
                    });
                }
                for component in components {
                    if component.product_id.trim().is_empty() {
                        return Err(ValidationError::Required {
                            field: "items.components.product_id".to_string(),
                        });
                    }
                    validate_quantity(
                        "items.components.quantity_per_unit",
                        component.quantity_per_unit,
                    )?;
                }
            }
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        CreatePurchaseItem, CreateSaleItem, PaymentMethod, PurchaseKind, SaleComponent,
    };

    fn purchase_input() -> CreatePurchase {
        CreatePurchase {
            supplier_id: "supplier-1".to_string(),
            kind: PurchaseKind::Local,
            currency: LOCAL_CURRENCY.to_string(),
            exchange_rate_micros: None,
            freight_cents: 0,
            customs_cents: 0,
            tax_cents: 0,
            insurance_cents: 0,
            other_cents: 0,
            notes: None,
            items: vec![CreatePurchaseItem {
                product_id: "p1".to_string(),
                quantity: 5,
                unit_price_cents: 1000,
                unit_price_foreign_cents: None,
            }],
        }
    }

    fn sale_input() -> CreateSale {
        CreateSale {
            customer_id: None,
            discount_cents: 0,
            tax_cents: 0,
            shipping_cents: 0,
            payment_method: PaymentMethod::Cash,
            notes: None,
            items: vec![CreateSaleItem {
                kind: SaleItemKind::Simple {
                    product_id: "p1".to_string(),
                },
                display_name: None,
                quantity: 1,
                unit_price_cents: 500,
            }],
        }
    }

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("CAFE-250").is_ok());
        assert!(validate_sku("ABC123").is_ok());
        assert!(validate_sku("product_1").is_ok());

        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(100)).is_err());
    }

    #[test]
    fn test_validate_currency() {
        assert!(validate_currency("MXN").is_ok());
        assert!(validate_currency("USD").is_ok());
        assert!(validate_currency("").is_err());
        assert!(validate_currency("usd").is_err());
        assert!(validate_currency("MXNN").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity("quantity", 1).is_ok());
        assert!(validate_quantity("quantity", MAX_ITEM_QUANTITY).is_ok());
        assert!(validate_quantity("quantity", 0).is_err());
        assert!(validate_quantity("quantity", -1).is_err());
        assert!(validate_quantity("quantity", MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("id", "").is_err());
        assert!(validate_uuid("id", "not-a-uuid").is_err());
    }

    #[test]
    fn test_purchase_requires_rate_for_foreign_currency() {
        let mut input = purchase_input();
        input.currency = "USD".to_string();
        assert!(validate_purchase(&input).is_err());

        input.exchange_rate_micros = Some(0);
        assert!(validate_purchase(&input).is_err());

        input.exchange_rate_micros = Some(17_350_000);
        assert!(validate_purchase(&input).is_ok());
    }

    #[test]
    fn test_purchase_local_needs_no_rate() {
        let input = purchase_input();
        assert!(validate_purchase(&input).is_ok());
    }

    #[test]
    fn test_purchase_rejects_empty_items_and_bad_amounts() {
        let mut input = purchase_input();
        input.items.clear();
        assert!(validate_purchase(&input).is_err());

        let mut input = purchase_input();
        input.freight_cents = -1;
        assert!(validate_purchase(&input).is_err());

        let mut input = purchase_input();
        input.items[0].quantity = 0;
        assert!(validate_purchase(&input).is_err());
    }

    #[test]
    fn test_sale_composite_rules() {
        let mut input = sale_input();
        input.items[0] = CreateSaleItem {
            kind: SaleItemKind::Combo {
                components: vec![SaleComponent {
                    product_id: "x".to_string(),
                    quantity_per_unit: 2,
                }],
            },
            display_name: Some("Breakfast Combo".to_string()),
            quantity: 1,
            unit_price_cents: 9900,
        };
        assert!(validate_sale(&input).is_ok());

        // composite without a display name
        input.items[0].display_name = None;
        assert!(validate_sale(&input).is_err());

        // composite without components
        input.items[0].display_name = Some("Breakfast Combo".to_string());
        input.items[0].kind = SaleItemKind::Combo { components: vec![] };
        assert!(validate_sale(&input).is_err());
    }

    #[test]
    fn test_sale_rejects_empty_and_negative() {
        let mut input = sale_input();
        input.items.clear();
        assert!(validate_sale(&input).is_err());

        let mut input = sale_input();
        input.discount_cents = -5;
        assert!(validate_sale(&input).is_err());
    }
}
