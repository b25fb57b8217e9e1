//! # Seed Data Generator
//!
//! Populates the database with test products, suppliers and opening stock
//! for development.
//!
//! ## Usage
//! ```bash
//! # Generate 500 products (default)
//! cargo run -p kardex-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p kardex-db --bin seed -- --count 2000
//!
//! # Specify database path
//! cargo run -p kardex-db --bin seed -- --db ./data/kardex.db
//! ```
//!
//! ## Generated Data
//! - Products across grocery-style categories with SKU `{CAT}-{NNN}`
//! - A handful of suppliers
//! - Opening stock posted THROUGH the stock ledger, so the conservation
//!   invariant (counter == ledger sum) holds from the first row

use chrono::Utc;
use std::env;

use kardex_core::{MovementKind, NewMovement, Product};
use kardex_db::repository::product::generate_product_id;
use kardex_db::repository::supplier::generate_supplier_id;
use kardex_db::{Database, DbConfig};

/// Product categories for realistic test data
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "BEB",
        &[
            "Agua Mineral",
            "Refresco Cola",
            "Refresco Naranja",
            "Jugo de Manzana",
            "Jugo de Uva",
            "Te Helado",
            "Cafe Molido",
            "Cafe en Grano",
            "Leche Entera",
            "Leche Deslactosada",
        ],
    ),
    (
        "ABA",
        &[
            "Arroz Blanco",
            "Frijol Negro",
            "Lenteja",
            "Harina de Trigo",
            "Azucar Estandar",
            "Sal de Mesa",
            "Aceite Vegetal",
            "Pasta Espagueti",
            "Atun en Lata",
            "Sardina en Lata",
        ],
    ),
    (
        "LIM",
        &[
            "Detergente en Polvo",
            "Jabon de Barra",
            "Cloro",
            "Limpiador Multiusos",
            "Suavizante",
            "Escoba",
            "Trapeador",
            "Bolsa de Basura",
            "Servilletas",
            "Papel Higienico",
        ],
    ),
    (
        "DUL",
        &[
            "Chocolate de Mesa",
            "Galletas Maria",
            "Galletas Saladas",
            "Caramelos Surtidos",
            "Chicle de Menta",
            "Mazapan",
            "Cajeta",
            "Mermelada de Fresa",
            "Miel de Abeja",
            "Gomitas",
        ],
    ),
];

/// Size variants for products
const SIZES: &[(&str, i64)] = &[
    ("Chico", 0),
    ("Mediano", 300),
    ("Grande", 700),
    ("500g", 200),
    ("1kg", 500),
    ("6-Pack", 900),
];

const SUPPLIERS: &[&str] = &[
    "Abarrotera Central",
    "Distribuidora del Golfo",
    "Importadora Norte",
    "Comercial La Villita",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 500;
    let mut db_path = String::from("./kardex_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(500);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Kardex Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 500)");
                println!("  -d, --db <PATH>    Database file path (default: ./kardex_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Kardex Seed Data Generator");
    println!("==========================");
    println!("Database: {}", db_path);
    println!("Products: {}", count);
    println!();

    // Connect to database
    let config = DbConfig::new(&db_path);
    let db = Database::new(config).await?;

    println!("* Connected to database");
    println!("* Migrations applied");

    // Check existing products
    let existing = db.products().count().await?;
    if existing > 0 {
        println!("! Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Suppliers
    for name in SUPPLIERS {
        let supplier = kardex_core::Supplier {
            id: generate_supplier_id(),
            name: name.to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        db.suppliers().insert(&supplier).await?;
    }
    println!("* Created {} suppliers", SUPPLIERS.len());

    // Generate products
    println!();
    println!("Generating products...");

    let mut generated = 0;
    let start = std::time::Instant::now();

    'outer: for (category_idx, (category_code, products)) in CATEGORIES.iter().enumerate() {
        for (product_idx, product_name) in products.iter().enumerate() {
            for (size_idx, (size_name, price_addon)) in SIZES.iter().enumerate() {
                if generated >= count {
                    break 'outer;
                }

                let seed = category_idx * 1000 + product_idx * 20 + size_idx;
                let product =
                    generate_product(category_code, product_name, size_name, *price_addon, seed);
                let opening_stock = (seed % 60) as i64;

                if let Err(e) = db.products().insert(&product).await {
                    eprintln!("Failed to insert {}: {}", product.sku, e);
                    continue;
                }

                // Opening stock goes through the ledger, never straight
                // into the counter.
                if opening_stock > 0 {
                    let mut tx = db.pool().begin().await?;
                    db.ledger()
                        .apply_movement(
                            &mut tx,
                            &NewMovement {
                                product_id: product.id.clone(),
                                kind: MovementKind::In,
                                quantity: opening_stock,
                                reason: "Opening stock".to_string(),
                                reference: "SEED".to_string(),
                            },
                        )
                        .await?;
                    tx.commit().await?;
                }

                generated += 1;

                if generated % 100 == 0 {
                    println!("  Generated {} products...", generated);
                }
            }
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!("* Generated {} products in {:?}", generated, elapsed);

    // Verify the books balance before calling it done
    println!();
    println!("Verifying ledger conservation...");
    db.ledger().verify_all().await?;
    println!("  counter == ledger sum for every product");

    println!();
    println!("* Seed complete!");

    Ok(())
}

/// Generates a single product with realistic data.
fn generate_product(
    category: &str,
    name: &str,
    size: &str,
    price_addon: i64,
    seed: usize,
) -> Product {
    let now = Utc::now();

    // Unique SKU: CAT-NNNN
    let sku = format!("{}-{:04}", category, seed);

    // Base price $19.90 - $99.90 + size addon
    let base_price = 1990 + ((seed * 17) % 8000) as i64;
    let price_cents = base_price + price_addon;

    // Standing cost starts at zero; purchase completion will set it
    let full_name = format!("{} {}", name, size);

    Product {
        id: generate_product_id(),
        sku,
        name: full_name,
        description: None,
        price_cents,
        cost_cents: 0,
        stock: 0,
        min_stock: (seed % 8) as i64,
        max_stock: 100,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}
