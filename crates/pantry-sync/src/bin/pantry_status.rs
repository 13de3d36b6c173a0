//! # Household Status Report
//!
//! Reads the local database and prints, as JSON, what a household has on
//! the shelf: pending sync counts, expired and expiring batches, and
//! per-product totals. Never touches the network.
//!
//! ## Usage
//! ```bash
//! cargo run -p pantry-sync --bin pantry-status -- --household demo-household --window 7
//! ```
//!
//! Configuration is loaded the same way as the app (pantry.toml, then
//! `PANTRY_*` variables). Logging follows `RUST_LOG`.

use chrono::{FixedOffset, Utc};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use pantry_db::Database;
use pantry_sync::{ConnectivityMonitor, InventoryService, LoopbackRemote, PantryConfig, Stores};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,pantry=info")))
        .init();

    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut household = String::from("demo-household");
    let mut window: Option<i64> = None;
    let mut offset_minutes: i32 = 0;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" if i + 1 < args.len() => {
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 1;
            }
            "--household" | "-h" if i + 1 < args.len() => {
                household = args[i + 1].clone();
                i += 1;
            }
            "--window" | "-w" if i + 1 < args.len() => {
                window = Some(args[i + 1].parse()?);
                i += 1;
            }
            "--utc-offset-minutes" if i + 1 < args.len() => {
                offset_minutes = args[i + 1].parse()?;
                i += 1;
            }
            "--help" => {
                println!("Usage: pantry-status [--config FILE] [--household ID] [--window DAYS] [--utc-offset-minutes N]");
                return Ok(());
            }
            other => {
                eprintln!("Ignoring unknown argument: {}", other);
            }
        }
        i += 1;
    }

    let tz = FixedOffset::east_opt(offset_minutes * 60).ok_or("UTC offset out of range")?;
    let config = PantryConfig::load(config_path)?;
    let db = Database::new(config.database.to_db_config()).await?;

    let service = InventoryService::new(
        Stores::sqlite(&db),
        Arc::new(LoopbackRemote::new()),
        Arc::new(ConnectivityMonitor::new(false)),
        &config,
    );

    let now = Utc::now();
    let report = serde_json::json!({
        "household_id": household,
        "as_of": now,
        "sync": service.sync_status(&household).await?,
        "expired": service.get_expired(&household, now, &tz).await?,
        "expiring": service.get_expiring(&household, now, window, &tz).await?,
        "products": service.summarize_household(&household).await?,
    });

    println!("{}", serde_json::to_string_pretty(&report)?);
    db.close().await;
    Ok(())
}
