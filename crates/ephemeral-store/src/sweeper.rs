//! Background task that periodically evicts expired files

use crate::store::EphemeralStore;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

pub struct Sweeper {
    store: EphemeralStore,
    period: Duration,
}

impl Sweeper {
    pub fn new(store: EphemeralStore, period: Duration) -> Self {
        Self {
            store,
            period: period.max(Duration::from_millis(1)),
        }
    }

    /// Spawn the sweep loop. The first tick fires immediately.
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let Sweeper { store, period } = self;

        info!(period_secs = period.as_secs_f64(), "Starting expiry sweeper");

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let report = store.sweep_expired().await;
                        debug!(removed = report.removed, failed = report.failed, "Sweep tick");
                    }
                }
            }

            info!("Expiry sweeper stopped");
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Owner's handle on a running sweeper. Dropping it also stops the loop.
pub struct SweeperHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the loop to exit and wait for it. A tick in progress finishes first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "Expiry sweeper task ended abnormally");
        }
    }
}
