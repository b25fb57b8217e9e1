//! # kardex-core: Pure Business Logic for Kardex
//!
//! This crate is the **heart** of Kardex. It contains all business logic
//! as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kardex Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            HTTP / validation layer (external)                   │   │
//! │  │    create_purchase, complete_purchase, create_sale, ...        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kardex-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────┐  ┌───────────┐ │   │
//! │  │   │   types   │  │   money   │  │ allocation │  │ validation│ │   │
//! │  │   │  Product  │  │   Money   │  │  landed    │  │   rules   │ │   │
//! │  │   │ Purchase  │  │ Exchange  │  │  costs     │  │  checks   │ │   │
//! │  │   │   Sale    │  │   Rate    │  │            │  │           │ │   │
//! │  │   └───────────┘  └───────────┘  └────────────┘  └───────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    kardex-db (Database Layer)                   │   │
//! │  │       stock ledger, purchases, sales, SQLite transactions       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, StockMovement, Purchase, Sale, ...)
//! - [`money`] - Money and ExchangeRate with integer arithmetic (no floats!)
//! - [`allocation`] - Cost allocation engine (landed unit cost)
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64) to avoid float errors
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use kardex_core::allocation::{allocate, AllocationInput, AllocationLine, OverheadCosts};
//!
//! // 5 units at $10.00 with $10.00 freight and $5.00 tax (local currency)
//! let input = AllocationInput {
//!     is_foreign: false,
//!     exchange_rate: None,
//!     costs: OverheadCosts { freight_cents: 1000, tax_cents: 500, ..Default::default() },
//!     lines: vec![AllocationLine {
//!         quantity: 5,
//!         unit_price_cents: 1000,
//!         unit_price_foreign_cents: None,
//!     }],
//! };
//!
//! let result = allocate(&input).unwrap();
//! // Landed unit cost: $10.00 + $15.00 / 5 = $13.00
//! assert_eq!(result.lines[0].final_unit_cost_cents, 1300);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocation;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use kardex_core::Money` instead of
// `use kardex_core::money::Money`

pub use error::{CoreError, ValidationError};
pub use money::{ExchangeRate, Money};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// The local (book-keeping) currency code.
///
/// ## Why a constant?
/// v0.1 serves a single market, but purchases may be invoiced in any
/// currency. Amount fields without a "foreign" suffix are denominated in
/// this currency; it becomes per-installation configuration in a later
/// version.
pub const LOCAL_CURRENCY: &str = "MXN";

/// Maximum line items allowed in a single sale
///
/// ## Business Reason
/// Prevents runaway tickets and ensures reasonable transaction sizes.
pub const MAX_SALE_ITEMS: usize = 100;

/// Maximum quantity of a single line item
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 9999;
