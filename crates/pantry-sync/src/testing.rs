//! Shared fixtures for the service tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};

use pantry_core::ports::Clock;
use pantry_core::StorageLocation;
use pantry_db::{Database, DbConfig};

use crate::config::PantryConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::remote::LoopbackRemote;
use crate::service::{InventoryService, Stores};

pub const HOUSEHOLD: &str = "h1";
pub const LOCATION: &str = "loc1";

/// Midnight UTC on the given day of January 2026.
pub fn ts(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap()
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        ManualClock(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

pub struct Harness {
    pub db: Database,
    pub service: InventoryService,
    pub remote: Arc<LoopbackRemote>,
    pub connectivity: ConnectivityMonitor,
    pub clock: Arc<ManualClock>,
}

pub async fn harness() -> Harness {
    harness_with(LoopbackRemote::new(), PantryConfig::default()).await
}

pub async fn harness_with(remote: LoopbackRemote, config: PantryConfig) -> Harness {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let remote = Arc::new(remote);
    let connectivity = ConnectivityMonitor::new(true);
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap()));

    let service = InventoryService::new(
        Stores::sqlite(&db),
        remote.clone(),
        Arc::new(connectivity.clone()),
        &config,
    )
    .with_clock(clock.clone());

    let fridge = StorageLocation::new(LOCATION, HOUSEHOLD, "Fridge", true, clock.now()).unwrap();
    service.save_location(&fridge).await.unwrap();

    Harness {
        db,
        service,
        remote,
        connectivity,
        clock,
    }
}
