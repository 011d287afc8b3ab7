use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::services::{LifecycleManager, Reclamation};

/// Result of one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub reclaimed: usize,
    /// Already gone by the time the sweep reached them
    pub missing: usize,
    pub failed: usize,
}

/// Reclaim every expired record.
///
/// Each record is reclaimed independently; one failure is logged and the
/// sweep moves on.
pub async fn sweep(manager: &LifecycleManager) -> Result<SweepReport> {
    let mut report = SweepReport::default();

    for id in manager.expired_ids().await? {
        match manager.reclaim(&id).await {
            Ok(Reclamation::Reclaimed) => report.reclaimed += 1,
            Ok(Reclamation::NotFound) => report.missing += 1,
            Err(e) => {
                report.failed += 1;
                tracing::error!("Error reclaiming expired file {}: {}", id, e);
            }
        }
    }

    if report.reclaimed > 0 || report.failed > 0 {
        tracing::info!(
            "Cleanup: reclaimed {} expired file(s), {} failed",
            report.reclaimed,
            report.failed
        );
    }
    Ok(report)
}

/// Background task running `sweep` on a fixed interval
pub struct Reaper {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Reaper {
    /// Start sweeping. The first sweep runs immediately.
    pub fn spawn(manager: Arc<LifecycleManager>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = sweep(&manager).await {
                            tracing::error!("Cleanup sweep failed: {}", e);
                        }
                    }
                }
            }
            tracing::debug!("Reaper stopped");
        });

        tracing::info!("Reaper started, sweeping every {:?}", interval);
        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop the task and wait for an in-flight sweep to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!("Reaper task ended abnormally: {}", e);
        }
    }
}
