//! Single-writer pipeline for observations
//!
//! One tokio task owns the [`HourlyFileManager`]; producers only ever touch the
//! bounded inbox. The task also flushes the active file on a fixed interval.
//!
//! On stop the inbox is closed and everything already queued is written
//! before the file is synced and closed. Submissions racing with stop are
//! rejected and logged.

use super::active::{ActiveFileInfo, ActiveFileStatus, HourlyFileManager};
use super::{StoreConfig, StoreError};
use crate::data::Observation;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};

/// Source of wall-clock time for rotation decisions
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Handle to the background writer task
pub struct ObservationWriter {
    inbox: mpsc::Sender<Observation>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    status: ActiveFileStatus,
}

impl ObservationWriter {
    /// Start the writer task. Must be called inside a tokio runtime.
    pub fn start(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::start_with_clock(config, system_clock())
    }

    pub fn start_with_clock(config: &StoreConfig, clock: Clock) -> Result<Self, StoreError> {
        let manager = HourlyFileManager::new(config)?;
        let status = manager.status();

        let (inbox, rx) = mpsc::channel(config.inbox_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = WriterLoop {
            manager,
            clock,
            // tokio intervals reject a zero period
            sync_interval: config.sync_interval.max(Duration::from_millis(1)),
        };
        let handle = tokio::spawn(worker.run(rx, shutdown_rx));

        tracing::info!(
            directory = %config.directory.display(),
            prefix = %config.prefix,
            "observation writer started"
        );

        Ok(Self {
            inbox,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            handle: Mutex::new(Some(handle)),
            status,
        })
    }

    /// Queue an observation, waiting while the inbox is full.
    /// Write failures are logged by the writer task, never returned.
    pub async fn submit(&self, obs: Observation) {
        if let Err(e) = self.inbox.send(obs).await {
            tracing::warn!(job_id = %e.0.job_id, "writer stopped, dropping observation");
        }
    }

    /// Blocking variant of [`submit`](Self::submit) for probe threads outside the runtime.
    /// Panics if called from within an async context.
    pub fn blocking_submit(&self, obs: Observation) {
        if let Err(e) = self.inbox.blocking_send(obs) {
            tracing::warn!(job_id = %e.0.job_id, "writer stopped, dropping observation");
        }
    }

    /// Snapshot of the file currently being written
    pub fn active_file(&self) -> Option<ActiveFileInfo> {
        self.status.read().clone()
    }

    /// Stop the writer, draining queued observations, and wait for it to finish.
    /// Later calls return immediately.
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "observation writer task failed");
            }
        }
    }
}

struct WriterLoop {
    manager: HourlyFileManager,
    clock: Clock,
    sync_interval: Duration,
}

impl WriterLoop {
    async fn run(mut self, mut inbox: mpsc::Receiver<Observation>, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = time::interval_at(Instant::now() + self.sync_interval, self.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.manager.sync((self.clock)()) {
                        tracing::warn!(error = %e, "sync failed");
                    }
                }
                received = inbox.recv() => match received {
                    Some(obs) => self.write(&obs),
                    None => break,
                },
            }
        }

        inbox.close();
        let mut drained = 0usize;
        while let Some(obs) = inbox.recv().await {
            self.write(&obs);
            drained += 1;
        }

        self.manager.close();
        tracing::info!(drained, "observation writer stopped");
    }

    fn write(&mut self, obs: &Observation) {
        if let Err(e) = self.append(obs) {
            tracing::warn!(job_id = %obs.job_id, error = %e, "write failed, dropping observation");
        }
    }

    fn append(&mut self, obs: &Observation) -> Result<(), StoreError> {
        self.manager.append((self.clock)(), obs)
    }
}
