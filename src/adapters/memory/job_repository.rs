//! In-memory FeedJobRepository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::domain::feed::{FeedJob, JobStatus};
use crate::domain::foundation::{DomainError, ErrorCode, JobId, StateMachine, Timestamp};
use crate::ports::FeedJobRepository;

#[derive(Default)]
pub struct InMemoryFeedJobRepository {
    jobs: Mutex<HashMap<JobId, FeedJob>>,
}

impl InMemoryFeedJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, FeedJob>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // === Test Helpers ===

    pub fn all(&self) -> Vec<FeedJob> {
        self.jobs().values().cloned().collect()
    }

    pub fn count_with_status(&self, status: JobStatus) -> usize {
        self.jobs().values().filter(|j| j.status == status).count()
    }

    /// Inserts a job as-is, bypassing `create`.
    pub fn insert(&self, job: FeedJob) {
        self.jobs().insert(job.id, job);
    }
}

#[async_trait]
impl FeedJobRepository for InMemoryFeedJobRepository {
    async fn create(&self, job: &FeedJob) -> Result<(), DomainError> {
        self.jobs().insert(job.id, job.clone());
        Ok(())
    }

    async fn update(&self, job: &FeedJob) -> Result<(), DomainError> {
        let mut jobs = self.jobs();
        let stored = jobs.get_mut(&job.id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::JobNotFound,
                format!("Feed job not found: {}", job.id),
            )
        })?;
        if stored.status.is_terminal() {
            return Ok(());
        }
        stored.status = job.status;
        stored.error = job.error.clone();
        stored.updated_at = job.updated_at;
        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<FeedJob>, DomainError> {
        Ok(self.jobs().get(id).cloned())
    }

    async fn fail_stale(&self, cutoff: Timestamp, error: &str) -> Result<u64, DomainError> {
        let now = Timestamp::now();
        let mut changed = 0;
        for job in self.jobs().values_mut().filter(|j| j.is_stale(&cutoff)) {
            job.status = JobStatus::Failed;
            job.error = Some(error.to_string());
            job.updated_at = now;
            changed += 1;
        }
        Ok(changed)
    }
}
