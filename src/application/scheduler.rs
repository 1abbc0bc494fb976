//! Recurring trigger for sync jobs
//!
//! Waits an initial delay, then runs one job per interval until cancelled.
//! Ticks missed while a long job runs are skipped rather than bunched up.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::sync_orchestrator::ComicSyncService;

/// Unit of scheduled work; must absorb its own errors
#[async_trait]
pub trait SyncJob: Send + Sync {
    async fn run_job(&self);
}

#[async_trait]
impl SyncJob for ComicSyncService {
    async fn run_job(&self) {
        ComicSyncService::run_job(self).await;
    }
}

pub struct SyncScheduler {
    job: Arc<dyn SyncJob>,
    initial_delay: Duration,
    interval: Duration,
}

impl SyncScheduler {
    pub fn new(job: Arc<dyn SyncJob>, initial_delay: Duration, interval: Duration) -> Self {
        Self {
            job,
            initial_delay,
            interval,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Scheduler started: first run in {:?}, then every {:?}",
            self.initial_delay, self.interval
        );

        tokio::select! {
            () = cancel.cancelled() => {
                info!("Scheduler cancelled before first run");
                return;
            }
            () = tokio::time::sleep(self.initial_delay) => {}
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    info!("Starting scheduled sync job");
                    self.job.run_job().await;
                }
            }
        }

        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingJob {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl SyncJob for CountingJob {
        async fn run_job(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_after_initial_delay_then_every_interval() {
        let job = Arc::new(CountingJob::default());
        let scheduler = SyncScheduler::new(job.clone(), Duration::from_secs(60), Duration::from_secs(3600));
        let cancel = CancellationToken::new();

        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_initial_delay_skips_every_run() {
        let job = Arc::new(CountingJob::default());
        let scheduler = SyncScheduler::new(job.clone(), Duration::from_secs(60), Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();

        scheduler.run(cancel).await;

        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }
}
