// src/ingest/scheduler.rs
use metrics::counter;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

use crate::ingest::Pipeline;

pub struct SchedulerHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Ask the loop to stop and wait for the in-flight cycle to finish.
    pub async fn stop(self) -> Result<(), JoinError> {
        let _ = self.cancel_tx.send(());
        self.join.await
    }
}

/// Run `pipeline.run_cycle()` every `interval`, starting immediately.
/// Missed ticks are skipped; a failed cycle is logged and retried next tick.
pub fn spawn_scheduler(pipeline: Pipeline, interval: Duration) -> SchedulerHandle {
    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel_rx.recv() => {
                    info!(target: "ingest", "scheduler shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    counter!("ingest_cycles_total").increment(1);
                    match pipeline.run_cycle().await {
                        Ok(report) => info!(
                            target: "ingest",
                            inserted = report.inserted(),
                            "scheduled ingest tick"
                        ),
                        Err(e) => error!(target: "ingest", error = %e, "scheduled ingest failed"),
                    }
                }
            }
        }
    });

    SchedulerHandle { cancel_tx, join }
}
