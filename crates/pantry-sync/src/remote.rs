//! In-process remote backend.
//!
//! [`LoopbackRemote`] keeps whole-item snapshots in memory with
//! last-writer-wins on `updated_at`, the same contract a real backend
//! implements. It records every push so callers can inspect what was sent,
//! and it can be told to fail or to hold each push for a while.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use pantry_core::ports::RemoteGateway;
use pantry_core::{InventoryItem, RemoteError, RemoteResult};

#[derive(Debug, Default)]
struct RemoteState {
    items: HashMap<String, InventoryItem>,
    pushes: Vec<Vec<String>>,
    failure: Option<RemoteError>,
    in_flight: HashSet<String>,
}

/// Remote gateway backed by a map.
#[derive(Debug, Default)]
pub struct LoopbackRemote {
    state: Mutex<RemoteState>,
    latency: Option<Duration>,
    overlapping_pushes: AtomicUsize,
}

impl LoopbackRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds every push for `latency` before applying it.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes every call fail with `error` until cleared with `None`.
    pub async fn set_failure(&self, error: Option<RemoteError>) {
        self.state.lock().await.failure = error;
    }

    /// Stores items as if another device had pushed them.
    pub async fn seed(&self, items: impl IntoIterator<Item = InventoryItem>) {
        let mut state = self.state.lock().await;
        for item in items {
            state.items.insert(item.id.clone(), item);
        }
    }

    pub async fn item(&self, id: &str) -> Option<InventoryItem> {
        self.state.lock().await.items.get(id).cloned()
    }

    /// Item ids of every accepted push, in call order.
    pub async fn pushes(&self) -> Vec<Vec<String>> {
        self.state.lock().await.pushes.clone()
    }

    /// Pushes that started while another push for the same item was running.
    pub fn overlapping_pushes(&self) -> usize {
        self.overlapping_pushes.load(Ordering::SeqCst)
    }

    fn apply(items: &mut HashMap<String, InventoryItem>, incoming: &InventoryItem) {
        match items.get(&incoming.id) {
            Some(existing) if existing.updated_at > incoming.updated_at => {
                debug!(item_id = %incoming.id, "Remote kept newer snapshot");
            }
            _ => {
                items.insert(incoming.id.clone(), incoming.clone());
            }
        }
    }
}

#[async_trait]
impl RemoteGateway for LoopbackRemote {
    async fn upsert(&self, items: &[InventoryItem]) -> RemoteResult<()> {
        let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();

        {
            let mut state = self.state.lock().await;
            if let Some(error) = state.failure.clone() {
                return Err(error);
            }
            for id in &ids {
                if !state.in_flight.insert(id.clone()) {
                    self.overlapping_pushes.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        for id in &ids {
            state.in_flight.remove(id);
        }
        for item in items {
            Self::apply(&mut state.items, item);
        }
        state.pushes.push(ids);
        Ok(())
    }

    async fn fetch_active_items(&self, household_id: &str) -> RemoteResult<Vec<InventoryItem>> {
        let state = self.state.lock().await;
        if let Some(error) = state.failure.clone() {
            return Err(error);
        }

        let mut items: Vec<InventoryItem> = state
            .items
            .values()
            .filter(|i| i.household_id == household_id && i.is_active())
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use pantry_core::{InventoryDraft, Quantity};

    fn item(id: &str, household: &str, pieces: f64) -> InventoryItem {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let draft = InventoryDraft::new(household, "p1", Quantity::pieces(pieces), "loc1");
        InventoryItem::from_draft(id, draft, now).unwrap()
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let remote = LoopbackRemote::new();
        let mut newer = item("i1", "h1", 5.0);
        newer.updated_at = newer.updated_at + ChronoDuration::minutes(5);
        let older = item("i1", "h1", 1.0);

        remote.upsert(&[newer.clone()]).await.unwrap();
        remote.upsert(&[older]).await.unwrap();
        remote.upsert(&[newer.clone()]).await.unwrap();

        assert_eq!(remote.item("i1").await.unwrap().quantity.value, 5.0);
        assert_eq!(remote.pushes().await.len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_is_scoped_and_failure_is_reported() {
        let remote = LoopbackRemote::new();
        remote.seed([item("a", "h1", 1.0), item("b", "h2", 1.0)]).await;

        let ids: Vec<String> = remote
            .fetch_active_items("h1")
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["a"]);

        remote.set_failure(Some(RemoteError::Timeout)).await;
        assert!(matches!(remote.upsert(&[item("c", "h1", 1.0)]).await, Err(RemoteError::Timeout)));
        assert!(remote.item("c").await.is_none());
    }
}
