//! FeedJob repository port.

use async_trait::async_trait;

use crate::domain::feed::FeedJob;
use crate::domain::foundation::{DomainError, JobId, Timestamp};

/// Persistence for materialization job records.
///
/// Job records are audit only; the materialized feed never depends on them.
#[async_trait]
pub trait FeedJobRepository: Send + Sync {
    /// Stores a freshly started job.
    async fn create(&self, job: &FeedJob) -> Result<(), DomainError>;

    /// Persists status, error and `updated_at`.
    ///
    /// Rows already in a terminal state are left untouched.
    ///
    /// # Errors
    ///
    /// - `JobNotFound` if no row exists for the job id
    /// - `DatabaseError` on persistence failure
    async fn update(&self, job: &FeedJob) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &JobId) -> Result<Option<FeedJob>, DomainError>;

    /// Fails every `processing` job last updated before `cutoff`, recording
    /// `error`. Returns the number of jobs changed.
    async fn fail_stale(&self, cutoff: Timestamp, error: &str) -> Result<u64, DomainError>;
}
