//! Per-product aggregates over a household's batches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::types::{InventoryItem, Unit};

/// Read-only aggregate of every batch of one product. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductSummary {
    pub product_id: String,

    /// Sum over active batches, expressed in `unit`.
    pub total_quantity: f64,

    /// Unit of the first active batch; `None` when nothing is active.
    pub unit: Option<Unit>,

    /// All batches regardless of status.
    pub batch_count: u32,

    pub active_batch_count: u32,

    #[ts(as = "Option<String>")]
    pub earliest_expiry: Option<DateTime<Utc>>,
}

impl ProductSummary {
    /// Summary of a product with no batches.
    pub fn empty(product_id: &str) -> Self {
        ProductSummary {
            product_id: product_id.to_string(),
            total_quantity: 0.0,
            unit: None,
            batch_count: 0,
            active_batch_count: 0,
            earliest_expiry: None,
        }
    }

    fn add(&mut self, item: &InventoryItem) {
        self.batch_count += 1;
        if !item.is_active() {
            return;
        }
        self.active_batch_count += 1;

        let unit = *self.unit.get_or_insert(item.quantity.unit);
        // Batches in another dimension are counted but not totalled.
        if let Ok(converted) = item.quantity.convert_to(unit) {
            self.total_quantity += converted.value;
        }

        if let Some(expiry) = item.expiry_date() {
            self.earliest_expiry = Some(match self.earliest_expiry {
                Some(current) => current.min(expiry),
                None => expiry,
            });
        }
    }
}

/// Groups `items` by product, ordered by product id.
///
/// Callers pass items in creation order so the "first active batch" unit is
/// stable.
pub fn summarize(items: &[InventoryItem]) -> Vec<ProductSummary> {
    let mut by_product: BTreeMap<&str, ProductSummary> = BTreeMap::new();
    for item in items {
        by_product
            .entry(item.product_id())
            .or_insert_with(|| ProductSummary::empty(item.product_id()))
            .add(item);
    }
    by_product.into_values().collect()
}
