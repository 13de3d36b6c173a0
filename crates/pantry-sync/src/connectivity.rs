//! # Connectivity
//!
//! Process-wide online/offline signal.
//!
//! The platform layer calls [`ConnectivityMonitor::set_online`] whenever the
//! network changes. Use cases read the current value through the
//! [`Connectivity`] port; the background worker subscribes to the underlying
//! watch channel to drain as soon as the device comes back online.
//!
//! ```text
//!   platform reachability ──► set_online(bool) ──► watch::Sender<bool>
//!                                                       │
//!                        ┌──────────────────────────────┼─────────────────┐
//!                        ▼                              ▼                 ▼
//!              InventoryService::sync_pending   SyncWorker (edges)   sync_status
//! ```

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use pantry_core::ports::Connectivity;

/// Shared connectivity state. Clones observe the same value.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        ConnectivityMonitor { tx: Arc::new(tx) }
    }

    /// Publishes a new state. Returns true if it changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            info!(online, "Connectivity changed");
        }
        changed
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        ConnectivityMonitor::new(false)
    }
}

impl Connectivity for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_edges_reach_subscribers() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();

        assert!(!monitor.is_online());
        assert!(!monitor.set_online(false));
        assert!(monitor.set_online(true));

        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        assert!(monitor.clone().is_online());
    }
}
