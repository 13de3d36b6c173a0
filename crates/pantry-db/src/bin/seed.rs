//! # Seed Data Generator
//!
//! Fills a development database with one demo household: a few storage
//! locations and batches spread across expired, expiring and undated stock.
//!
//! ## Usage
//! ```bash
//! cargo run -p pantry-db --bin seed -- --db ./pantry_dev.db --household demo
//! ```
//!
//! Logging follows `RUST_LOG`, defaulting to `info,pantry=debug,sqlx=warn`.

use chrono::{Duration, FixedOffset, Utc};
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pantry_core::{new_id, InventoryDraft, InventoryItem, Quantity, StorageLocation, Unit};
use pantry_db::{Database, DbConfig};

/// (product id, title, quantity, unit, location, days until expiry)
const PRODUCTS: &[(&str, &str, f64, Unit, &str, Option<i64>)] = &[
    ("milk", "Whole milk", 1.0, Unit::Liter, "fridge", Some(2)),
    ("yogurt", "Greek yogurt", 4.0, Unit::Piece, "fridge", Some(-1)),
    ("eggs", "Eggs", 10.0, Unit::Piece, "fridge", Some(12)),
    ("spinach", "Baby spinach", 200.0, Unit::Gram, "fridge", Some(0)),
    ("peas", "Frozen peas", 1.0, Unit::Kilogram, "freezer", Some(180)),
    ("rice", "Basmati rice", 2.0, Unit::Kilogram, "pantry", None),
    ("pasta", "Penne", 3.0, Unit::Pack, "pantry", Some(400)),
    ("oil", "Olive oil", 750.0, Unit::Milliliter, "pantry", None),
];

const LOCATIONS: &[(&str, &str, bool)] = &[
    ("fridge", "Fridge", true),
    ("freezer", "Freezer", true),
    ("pantry", "Pantry", false),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,pantry=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./pantry_dev.db");
    let mut household = String::from("demo-household");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--household" | "-H" => {
                if i + 1 < args.len() {
                    household = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Pantry Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>          Database file path (default: ./pantry_dev.db)");
                println!("  -H, --household <ID>     Household id (default: demo-household)");
                println!("  -h, --help               Show this help message");
                return Ok(());
            }
            other => warn!(argument = other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    info!(path = %db_path, household = %household, "Seeding database");

    let db = Database::new(DbConfig::new(&db_path)).await?;
    let inventory = db.inventory();

    if inventory.has_any_items(&household).await? {
        warn!(household = %household, "Household already has inventory; skipping seed");
        return Ok(());
    }

    let now = Utc::now();

    for (id, name, is_cold) in LOCATIONS {
        let location = StorageLocation::new(*id, &household, *name, *is_cold, now)?;
        db.locations().save(&location).await?;
    }

    for (offset, (product_id, title, amount, unit, location, expiry_days)) in PRODUCTS.iter().enumerate() {
        let mut draft = InventoryDraft::new(&household, *product_id, Quantity::new(*amount, *unit)?, *location);
        draft.product.snapshot = Some(pantry_core::ProductSnapshot {
            title: title.to_string(),
            brand: None,
            category: None,
            barcode: None,
        });
        if let Some(days) = expiry_days {
            draft = draft.with_expiry(now + Duration::days(*days));
        }

        let created = now - Duration::minutes((PRODUCTS.len() - offset) as i64);
        let item = InventoryItem::from_draft(new_id(), draft, created)?;
        inventory.create(&item).await?;
    }

    let utc = FixedOffset::east_opt(0).ok_or("invalid offset")?;
    let expired = inventory.fetch_expired(&household, now, &utc).await?;
    let expiring = inventory.fetch_expiring(&household, now, 3, &utc).await?;

    info!(
        items = PRODUCTS.len(),
        expired = expired.len(),
        expiring_3d = expiring.len(),
        "Seed complete"
    );

    for summary in inventory.summarize_household(&household).await? {
        println!(
            "  {:<10} {:>8.2} {:<6} batches={} earliest={}",
            summary.product_id,
            summary.total_quantity,
            summary.unit.map(|u| u.to_string()).unwrap_or_default(),
            summary.active_batch_count,
            summary
                .earliest_expiry
                .map(|e| e.date_naive().to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }

    db.close().await;
    Ok(())
}
