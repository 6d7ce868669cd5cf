//! Recurring sweep timer.
//!
//! The scheduler owns its task handle; nothing about it is process-global.
//! `stop()` prevents any further cycle from starting and waits for the task,
//! letting an in-flight cycle run to completion.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::sweeper::RetentionSweeper;

/// Drives a [`RetentionSweeper`] on a fixed interval
pub struct Scheduler {
    sweeper: Arc<RetentionSweeper>,
    interval: Duration,
    handle: Option<ScheduleHandle>,
}

struct ScheduleHandle {
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl Scheduler {
    /// Create a stopped scheduler. A zero interval is raised to 1ms.
    pub fn new(sweeper: Arc<RetentionSweeper>, interval: Duration) -> Self {
        Self {
            sweeper,
            interval: interval.max(Duration::from_millis(1)),
            handle: None,
        }
    }

    /// Scheduler using the sweeper's own configured interval
    pub fn from_policy(sweeper: Arc<RetentionSweeper>) -> Self {
        let interval = sweeper.policy().sweep_interval;
        Self::new(sweeper, interval)
    }

    /// Start sweeping: one cycle immediately, then one per interval.
    /// No-op if already running. Must be called within a tokio runtime.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>(1);
        let sweeper = Arc::clone(&self.sweeper);
        let interval = self.interval;

        let task = tokio::spawn(async move {
            run_schedule(sweeper, interval, stop_rx).await;
        });

        tracing::info!(interval_secs = self.interval.as_secs(), "Retention scheduler started");
        self.handle = Some(ScheduleHandle { stop_tx, task });
    }

    /// Stop sweeping and wait for the timer task to exit
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.stop_tx.send(()).await;
            handle.task.await?;
            tracing::info!("Retention scheduler stopped");
        }
        Ok(())
    }

    /// Whether the timer task is running
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

/// Timer loop. A stop signal (or a dropped scheduler) ends the loop; the
/// signal is only observed between cycles.
async fn run_schedule(
    sweeper: Arc<RetentionSweeper>,
    interval: Duration,
    mut stop_rx: mpsc::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.recv() => break,
            _ = ticker.tick() => {
                sweeper.run_cleanup_once().await;
            }
        }
    }
}
