//! Periodic tick loop.

use super::runner::StrategyRunner;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Runs every ACTIVE strategy once per interval until stopped.
pub struct TickScheduler {
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TickScheduler {
    /// Spawn the loop; the first tick fires immediately.
    pub fn start(runner: Arc<StrategyRunner>, interval: Duration) -> Self {
        let shutdown = Arc::new(Notify::new());
        let running = Arc::new(AtomicBool::new(true));

        let handle = tokio::spawn({
            let shutdown = shutdown.clone();
            let running = running.clone();
            async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                info!(interval_secs = interval.as_secs(), "Scheduler started");

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let outcomes = runner.run_all().await;
                            info!(strategies = outcomes.len(), "Scheduled tick complete");
                        }
                        _ = shutdown.notified() => break,
                    }
                }

                running.store(false, Ordering::SeqCst);
                info!("Scheduler stopped");
            }
        });

        Self {
            shutdown,
            running,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop after the tick in flight, if any, and wait for the loop to exit.
    pub async fn stop(mut self) {
        self.shutdown.notify_one();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Scheduler task ended abnormally");
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }
}
