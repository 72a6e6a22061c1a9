//! StaleJobSweeper - fails jobs abandoned in `processing`.
//!
//! A worker that dies mid-task leaves its job record in `processing`. The
//! broker redelivers the unacknowledged task, so only the audit record needs
//! closing.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::feed::FeedJob;
use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::FeedJobRepository;

pub const DEFAULT_STALE_JOB_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct StaleJobSweeper {
    jobs: Arc<dyn FeedJobRepository>,
    timeout: Duration,
    interval: Duration,
}

impl StaleJobSweeper {
    pub fn new(jobs: Arc<dyn FeedJobRepository>) -> Self {
        Self {
            jobs,
            timeout: DEFAULT_STALE_JOB_TIMEOUT,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One pass. Returns the number of jobs failed.
    pub async fn sweep_once(&self) -> Result<u64, DomainError> {
        let cutoff = Timestamp::now().minus_secs(self.timeout.as_secs());
        let swept = self.jobs.fail_stale(cutoff, FeedJob::ABANDONED).await?;
        if swept > 0 {
            warn!(swept, timeout_secs = self.timeout.as_secs(), "Failed abandoned feed jobs");
        }
        Ok(swept)
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "Stale job sweeper started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "Stale job sweep failed");
                    }
                }
            }
        }

        info!("Stale job sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryFeedJobRepository;
    use crate::domain::feed::{FeedEvent, FeedUpdateTask, JobStatus, PostCreatedEvent, Priority};
    use crate::domain::foundation::{PostId, UserId};

    fn job(age_secs: u64) -> FeedJob {
        let created = PostCreatedEvent::new(
            PostId::new("p").unwrap(),
            UserId::new("a").unwrap(),
            "t",
        );
        let task = FeedUpdateTask::new(
            UserId::new("r").unwrap(),
            FeedEvent::from(&created),
            Priority::LOW,
        );
        let mut job = FeedJob::start(&task);
        job.updated_at = Timestamp::now().minus_secs(age_secs);
        job
    }

    #[tokio::test]
    async fn sweep_fails_only_jobs_past_timeout() {
        let repo = Arc::new(InMemoryFeedJobRepository::new());
        repo.insert(job(1_000));
        repo.insert(job(10));
        let sweeper = StaleJobSweeper::new(repo.clone()).with_timeout(Duration::from_secs(300));

        assert_eq!(sweeper.sweep_once().await.unwrap(), 1);
        assert_eq!(repo.count_with_status(JobStatus::Failed), 1);
        assert_eq!(repo.count_with_status(JobStatus::Processing), 1);
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn run_sweeps_immediately_and_stops_on_cancel() {
        let repo = Arc::new(InMemoryFeedJobRepository::new());
        repo.insert(job(1_000));
        let sweeper = Arc::new(
            StaleJobSweeper::new(repo.clone())
                .with_timeout(Duration::from_secs(60))
                .with_interval(Duration::from_secs(3600)),
        );
        let shutdown = CancellationToken::new();
        let handle = {
            let sweeper = sweeper.clone();
            let token = shutdown.clone();
            tokio::spawn(async move { sweeper.run(token).await })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while repo.count_with_status(JobStatus::Failed) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
