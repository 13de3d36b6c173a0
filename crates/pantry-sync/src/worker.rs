//! # Sync Worker
//!
//! Background task that calls [`InventoryService::sync_pending`] for one
//! household.
//!
//! ## Triggers
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  interval tick (AUTO only) ───┐                                  │
//! │  offline → online edge ───────┼──► sync_pending ──► reports()    │
//! │  handle.sync_now() ───────────┘                                  │
//! │  handle.shutdown() ───────────────► loop exits                   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Drains never run concurrently inside one worker; a trigger that arrives
//! during a drain is handled after it.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::SyncSettings;
use crate::connectivity::ConnectivityMonitor;
use crate::drain::SyncReport;
use crate::error::{SyncError, SyncResult};
use crate::service::InventoryService;

#[derive(Debug)]
enum WorkerCommand {
    SyncNow,
    Shutdown,
}

/// Handle for controlling a running worker.
#[derive(Clone)]
pub struct SyncWorkerHandle {
    cmd_tx: mpsc::Sender<WorkerCommand>,
    reports: watch::Receiver<Option<SyncReport>>,
}

impl SyncWorkerHandle {
    /// Asks for a drain as soon as the current one (if any) ends.
    pub async fn sync_now(&self) -> SyncResult<()> {
        self.cmd_tx
            .send(WorkerCommand::SyncNow)
            .await
            .map_err(|_| SyncError::ChannelError("Sync worker channel closed".into()))
    }

    pub async fn shutdown(&self) -> SyncResult<()> {
        self.cmd_tx
            .send(WorkerCommand::Shutdown)
            .await
            .map_err(|_| SyncError::ChannelError("Sync worker channel closed".into()))
    }

    /// Latest drain report; `None` until the first drain.
    pub fn reports(&self) -> watch::Receiver<Option<SyncReport>> {
        self.reports.clone()
    }
}

pub struct SyncWorker {
    service: InventoryService,
    household_id: String,
    online_rx: watch::Receiver<bool>,
    settings: SyncSettings,
}

impl SyncWorker {
    pub fn new(service: InventoryService, household_id: impl Into<String>, connectivity: &ConnectivityMonitor) -> Self {
        let settings = service.sync_settings.clone();
        SyncWorker {
            service,
            household_id: household_id.into(),
            online_rx: connectivity.subscribe(),
            settings,
        }
    }

    /// Spawns the worker loop.
    pub fn start(self) -> (SyncWorkerHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (report_tx, report_rx) = watch::channel(None);

        let task = tokio::spawn(async move {
            self.run(cmd_rx, report_tx).await;
        });

        (
            SyncWorkerHandle {
                cmd_tx,
                reports: report_rx,
            },
            task,
        )
    }

    async fn run(mut self, mut cmd_rx: mpsc::Receiver<WorkerCommand>, report_tx: watch::Sender<Option<SyncReport>>) {
        if !self.settings.mode.is_sync_enabled() {
            info!(household_id = %self.household_id, "Sync disabled; worker not started");
            return;
        }
        info!(household_id = %self.household_id, mode = %self.settings.mode, "Sync worker started");

        let period = self.settings.poll_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let polls = self.settings.mode.polls();
        let mut watching = true;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(WorkerCommand::SyncNow) => self.drain(&report_tx).await,
                    Some(WorkerCommand::Shutdown) | None => {
                        info!(household_id = %self.household_id, "Sync worker shutting down");
                        break;
                    }
                },
                changed = self.online_rx.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                        continue;
                    }
                    let online = *self.online_rx.borrow_and_update();
                    if online {
                        debug!(household_id = %self.household_id, "Back online; draining");
                        self.drain(&report_tx).await;
                    }
                }
                _ = ticker.tick(), if polls => {
                    self.drain(&report_tx).await;
                }
            }
        }
    }

    async fn drain(&self, report_tx: &watch::Sender<Option<SyncReport>>) {
        match self.service.sync_pending(&self.household_id).await {
            Ok(report) => {
                report_tx.send_replace(Some(report));
            }
            Err(e) => {
                error!(household_id = %self.household_id, error = %e, "Sync drain failed");
            }
        }
    }
}
