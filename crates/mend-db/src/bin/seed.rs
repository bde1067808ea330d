//! # Seed Data Generator
//!
//! Populates the database with demo catalog and order data for development.
//!
//! ## Usage
//! ```bash
//! # Seed into the default development database
//! cargo run -p mend-db --bin seed
//!
//! # Specify database path
//! cargo run -p mend-db --bin seed -- --db ./data/mendshop.db
//! ```
//!
//! ## Generated Data
//! - A handful of customers
//! - The standard repair-service catalog (diagnostics, screen/battery swaps)
//! - Spare parts with stock on hand
//! - One fully composed demo order with a cash payment against it

use std::env;

use mend_core::{Money, PaymentMethod};
use mend_db::{Database, DbConfig};

const CUSTOMERS: &[(&str, &str)] = &[
    ("Amira Hassan", "amira@example.com"),
    ("Jonas Weber", "jonas@example.com"),
    ("Priya Sharma", "priya@example.com"),
    ("Tomás Alvarez", "tomas@example.com"),
];

/// Service catalog: name and base price in cents.
const SERVICES: &[(&str, i64)] = &[
    ("Diagnostic", 2_500),
    ("Screen replacement", 8_900),
    ("Battery replacement", 5_900),
    ("Charging port repair", 6_500),
    ("Water damage treatment", 12_000),
    ("Data recovery", 15_000),
];

/// Spare parts: name, stock on hand, unit price in cents.
const PARTS: &[(&str, i64, i64)] = &[
    ("iPhone 13 OLED panel", 8, 14_500),
    ("iPhone 13 battery", 15, 4_200),
    ("Galaxy S22 AMOLED panel", 5, 13_800),
    ("Galaxy S22 battery", 12, 3_900),
    ("USB-C charging port", 30, 1_200),
    ("Lightning charging port", 25, 1_400),
    ("Adhesive strip set", 100, 300),
    ("Screw kit", 60, 150),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=debug surfaces the repository-level tracing output.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./mendshop_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Mendshop Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./mendshop_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Mendshop Seed Data Generator");
    println!("===============================");
    println!("Database: {}", db_path);
    println!();

    let config = DbConfig::new(&db_path);
    let db = Database::new(config).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.customers().list(10).await?;
    if !existing.is_empty() {
        println!("⚠ Database already has {} customers", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Seeding customers...");
    let mut customers = Vec::new();
    for (name, email) in CUSTOMERS {
        let customer = db.customers().create(name, None, Some(email)).await?;
        customers.push(customer);
    }
    println!("  {} customers", customers.len());

    println!("Seeding repair services...");
    let mut services = Vec::new();
    for (name, price) in SERVICES {
        let service = db
            .catalog()
            .create_service(name, Money::from_cents(*price))
            .await?;
        services.push(service);
    }
    println!("  {} services", services.len());

    println!("Seeding spare parts...");
    let mut parts = Vec::new();
    for (name, stock, price) in PARTS {
        let part = db
            .catalog()
            .create_part(name, *stock, Money::from_cents(*price))
            .await?;
        parts.push(part);
    }
    println!("  {} parts", parts.len());

    // One composed demo order: screen replacement with a panel and adhesive,
    // partially paid in cash.
    println!();
    println!("Composing demo order...");
    let order = db.orders().create(&customers[0].id, Some("Cracked screen, no touch response")).await?;
    let engine = db.engine();

    let screen_swap = engine.attach_service(&order.id, &services[1].id).await?;
    engine.attach_part(&screen_swap.id, &parts[0].id, 1).await?;
    engine.attach_part(&screen_swap.id, &parts[6].id, 1).await?;
    engine.attach_service(&order.id, &services[0].id).await?;

    db.payments()
        .capture(&order.id, Money::from_cents(10_000), PaymentMethod::Cash)
        .await?;

    let total = db.orders().get_by_id(&order.id).await?.map(|o| o.total_price());
    let balance = db.payments().outstanding_balance(&order.id).await?;

    println!("  Order {} for {}", order.id, customers[0].name);
    if let Some(total) = total {
        println!("  Total: {}", total);
    }
    println!("  Outstanding: {}", balance);

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
