//! # FEFO Policy
//!
//! First-expired-first-out ordering for consumption and display.
//!
//! ## Ordering Rule
//! ```text
//! 1. Dated items, ascending by resolved expiry
//! 2. Undated items ("expires never"), after every dated item
//! 3. Ties in either group: ascending created_at (oldest stock first)
//! 4. Remaining ties: input order (stable sort)
//! ```

use std::cmp::Ordering;

use crate::error::{CoreError, CoreResult};
use crate::types::{InventoryItem, Quantity};

/// Compares two items under FEFO.
pub fn compare(a: &InventoryItem, b: &InventoryItem) -> Ordering {
    let by_expiry = match (a.expiry_date(), b.expiry_date()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_expiry.then_with(|| a.created_at.cmp(&b.created_at))
}

/// Sorts items into FEFO order.
///
/// Stable and idempotent; independent of storage iteration order.
///
/// ## Example
/// ```rust
/// use pantry_core::fefo::sort_for_consumption;
///
/// let sorted = sort_for_consumption(Vec::new());
/// assert!(sorted.is_empty());
/// ```
pub fn sort_for_consumption(mut items: Vec<InventoryItem>) -> Vec<InventoryItem> {
    items.sort_by(compare);
    items
}

/// One slice of a consume request, taken from a single batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub item_id: String,
    /// Amount to take, in the batch's own unit.
    pub take: Quantity,
}

/// Splits `requested` across active batches in FEFO order.
///
/// ## Errors
/// - `IncompatibleUnit` if any active batch is in a different dimension
/// - `InsufficientStock` if the active batches cannot cover the request
pub fn plan_consumption(items: &[InventoryItem], requested: &Quantity) -> CoreResult<Vec<Allocation>> {
    let mut active: Vec<&InventoryItem> = items.iter().filter(|i| i.is_active()).collect();
    active.sort_by(|a, b| compare(a, b));

    let mut remaining = requested.value;
    let mut available = 0.0;
    let mut plan = Vec::new();

    for item in active {
        let stock = item.quantity.convert_to(requested.unit)?;
        available += stock.value;

        if remaining <= crate::types::QUANTITY_EPSILON {
            continue;
        }

        let take = stock.value.min(remaining);
        remaining -= take;

        if take > 0.0 {
            let take = Quantity {
                value: take,
                unit: requested.unit,
            }
            .convert_to(item.quantity.unit)?;
            plan.push(Allocation {
                item_id: item.id.clone(),
                take,
            });
        }
    }

    if remaining > crate::types::QUANTITY_EPSILON {
        return Err(CoreError::InsufficientStock {
            product_id: items
                .first()
                .map(|i| i.product_id().to_string())
                .unwrap_or_default(),
            available,
            requested: requested.value,
        });
    }

    Ok(plan)
}
