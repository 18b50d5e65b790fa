//! Sweeper — background task that expires risky-app exclusions.
//!
//! Exclusions are never dropped on read. The sweeper calls
//! [`BotDatabase::sweep_expired`] on a fixed interval and stops on its own
//! once the document is disposed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use botdb_core::{MaintenanceConfig, now_secs};

use crate::database::BotDatabase;
use crate::error::{StateError, StateResult};

pub struct Sweeper {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl Sweeper {
    /// Start sweeping `db` on the interval from the `[maintenance]` section.
    pub fn from_config(db: Arc<BotDatabase>, config: &MaintenanceConfig) -> StateResult<Self> {
        Self::start(db, config.sweep_interval())
    }

    /// Start sweeping `db` every `interval`. The first sweep runs after one interval.
    pub fn start(db: Arc<BotDatabase>, interval: Duration) -> StateResult<Self> {
        if interval.is_zero() {
            return Err(StateError::InvalidArgument(
                "sweep interval must be greater than zero".to_string(),
            ));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            run_sweep_loop(db, interval, shutdown_rx).await;
        });
        Ok(Self {
            handle,
            shutdown_tx,
        })
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the loop to stop and wait for it.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

async fn run_sweep_loop(
    db: Arc<BotDatabase>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(path = %db.path().display(), ?interval, "sweeper starting");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                match db.sweep_expired(now_secs()) {
                    Ok(0) => {}
                    Ok(removed) => {
                        info!(path = %db.path().display(), removed, "expired risky exclusions removed");
                    }
                    Err(StateError::Disposed(_)) => {
                        debug!(path = %db.path().display(), "document disposed, sweeper exiting");
                        break;
                    }
                    Err(e) => {
                        warn!(path = %db.path().display(), error = %e, "sweep failed");
                    }
                }
            }
            _ = shutdown.changed() => {
                debug!(path = %db.path().display(), "sweeper shutting down");
                break;
            }
        }
    }
}
