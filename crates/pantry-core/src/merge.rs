//! # Merge Policy
//!
//! Decides whether a newly observed batch merges into an existing record.
//!
//! ## Merge vs Create
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Candidate batch (draft)                                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  key_for(candidate) = (household, product, expiry, opened,             │
//! │                        location, lot code)                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Active items with identical key?                                      │
//! │       │                                                                 │
//! │       ├── none ───────► create new batch                               │
//! │       │                                                                 │
//! │       ├── one ────────► sum quantities, refresh updated_at             │
//! │       │                                                                 │
//! │       └── several ────► earliest-created wins, collision reported      │
//! │                         (never summed across records)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};

use crate::types::{InventoryDraft, InventoryItem, ItemStatus};

/// Derived identity of a batch lineage. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeKey {
    pub household_id: String,
    pub product_id: String,
    pub expiry_date: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub storage_location_id: String,
    pub lot_code: Option<String>,
}

impl MergeKey {
    fn new(
        household_id: &str,
        product_id: &str,
        expiry_date: Option<DateTime<Utc>>,
        opened_at: Option<DateTime<Utc>>,
        storage_location_id: &str,
        lot_code: Option<&str>,
    ) -> Self {
        MergeKey {
            household_id: household_id.to_string(),
            product_id: product_id.to_string(),
            expiry_date,
            opened_at,
            storage_location_id: storage_location_id.to_string(),
            lot_code: normalize_lot_code(lot_code),
        }
    }
}

/// Trims a lot code; blank codes count as absent.
pub fn normalize_lot_code(lot_code: Option<&str>) -> Option<String> {
    lot_code
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
}

/// Projects an item onto its merge key.
pub fn key_for(item: &InventoryItem) -> MergeKey {
    MergeKey::new(
        &item.household_id,
        item.product_id(),
        item.expiry_date(),
        item.opened_date(),
        &item.storage_location_id,
        item.lot_code.as_deref(),
    )
}

/// Projects a draft onto the key it would have once stored.
pub fn key_for_draft(draft: &InventoryDraft) -> MergeKey {
    MergeKey::new(
        &draft.household_id,
        &draft.product.product_id,
        draft.expiry.as_ref().and_then(|d| d.resolved),
        draft.opened.as_ref().and_then(|d| d.resolved),
        &draft.storage_location_id,
        draft.lot_code.as_deref(),
    )
}

/// True iff `existing` is active and shares `key`.
pub fn can_merge(existing: &InventoryItem, key: &MergeKey) -> bool {
    existing.status == ItemStatus::Active && key_for(existing) == *key
}

/// Result of choosing a merge target among candidates.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeDecision<'a> {
    /// No mergeable item; create a new batch.
    Create,
    /// Merge into this item.
    Merge(&'a InventoryItem),
    /// Several active items share the key. The earliest-created is the
    /// target; the rest are listed so the caller can report the defect.
    Collision {
        target: &'a InventoryItem,
        duplicates: Vec<&'a InventoryItem>,
    },
}

/// Chooses the merge target among `candidates` for `key`.
///
/// Non-matching and inactive candidates are ignored. Ties on
/// `created_at` fall back to the id so the choice is deterministic.
pub fn decide<'a>(key: &MergeKey, candidates: &'a [InventoryItem]) -> MergeDecision<'a> {
    let mut matches: Vec<&InventoryItem> =
        candidates.iter().filter(|item| can_merge(item, key)).collect();

    matches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    match matches.len() {
        0 => MergeDecision::Create,
        1 => MergeDecision::Merge(matches[0]),
        _ => {
            let target = matches.remove(0);
            MergeDecision::Collision {
                target,
                duplicates: matches,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InventoryDraft, Quantity};
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap()
    }

    fn item(id: &str, created: u32, draft: InventoryDraft) -> InventoryItem {
        InventoryItem::from_draft(id, draft, ts(created)).unwrap()
    }

    fn draft() -> InventoryDraft {
        InventoryDraft::new("h1", "p1", Quantity::pieces(2.0), "loc1")
    }

    #[test]
    fn test_key_for_matches_draft_key() {
        let d = draft().with_expiry(ts(10)).with_lot_code(" L42 ");
        let stored = item("a", 1, d.clone());
        assert_eq!(key_for(&stored), key_for_draft(&d));
        assert_eq!(key_for(&stored).lot_code.as_deref(), Some("L42"));
    }

    #[test]
    fn test_blank_lot_code_equals_none() {
        let a = draft().with_lot_code("   ");
        assert_eq!(key_for_draft(&a), key_for_draft(&draft()));
    }

    #[test]
    fn test_can_merge_requires_active() {
        let mut existing = item("a", 1, draft());
        let key = key_for_draft(&draft());
        assert!(can_merge(&existing, &key));

        existing.transition(ItemStatus::Consumed, ts(2)).unwrap();
        assert!(!can_merge(&existing, &key));
    }

    #[test]
    fn test_different_expiry_does_not_merge() {
        let existing = item("a", 1, draft().with_expiry(ts(10)));
        let key = key_for_draft(&draft().with_expiry(ts(11)));
        assert!(!can_merge(&existing, &key));
    }

    #[test]
    fn test_decide_prefers_earliest_created() {
        let items = vec![item("late", 5, draft()), item("early", 2, draft())];
        let key = key_for_draft(&draft());

        match decide(&key, &items) {
            MergeDecision::Collision { target, duplicates } => {
                assert_eq!(target.id, "early");
                assert_eq!(duplicates.len(), 1);
                assert_eq!(duplicates[0].id, "late");
            }
            other => panic!("expected collision, got {:?}", other),
        }
    }

    #[test]
    fn test_decide_create_when_nothing_matches() {
        let items = vec![item("a", 1, draft().with_lot_code("X"))];
        assert_eq!(decide(&key_for_draft(&draft()), &items), MergeDecision::Create);
    }
}
