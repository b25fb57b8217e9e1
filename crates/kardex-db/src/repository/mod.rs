//! # Repository Module
//!
//! Database repository implementations for Kardex.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Caller (HTTP layer)                                                   │
//! │       │                                                                 │
//! │       │  db.sales().create(&input)                                     │
//! │       ▼                                                                 │
//! │  SaleRepository                                                        │
//! │  ├── owns the WHOLE transaction for the operation                      │
//! │  ├── calls StockLedger::apply_movement on the SAME connection          │
//! │  └── commits or rolls back as a unit                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  The one rule: products.stock is written ONLY by the stock ledger,     │
//! │  always paired with a movement row.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Catalog CRUD, low-stock listing
//! - [`supplier::SupplierRepository`] - Supplier registry
//! - [`stock::StockLedger`] - Append-only movement ledger (stock authority)
//! - [`purchase::PurchaseRepository`] - Purchase lifecycle and landed costs
//! - [`sale::SaleRepository`] - Sale creation/cancellation/edit
//! - [`counter::DocumentCounters`] - PC-/SA- business numbering

pub mod counter;
pub mod product;
pub mod purchase;
pub mod sale;
pub mod stock;
pub mod supplier;
