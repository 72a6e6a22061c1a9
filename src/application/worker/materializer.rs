//! FeedMaterializer - applies one durable task to the feed store.
//!
//! Each task gets its own `FeedJob` record (processing → completed | failed).
//! The job record is audit only: a failure to write it is logged and the
//! feed write still happens.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::feed::{FeedJob, FeedUpdateTask, MaterializedFeedEntry};
use crate::domain::foundation::{DomainError, JobId};
use crate::ports::{FeedJobRepository, FeedStore};

/// Why a task could not be materialized.
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// Structurally invalid payload. Retrying cannot help.
    #[error("Malformed feed task: {0}")]
    Malformed(String),

    /// Feed store failure. The task may succeed on redelivery.
    #[error("Feed store failure for job {job_id}: {source}")]
    Storage {
        job_id: JobId,
        #[source]
        source: DomainError,
    },
}

impl MaterializeError {
    /// Whether the broker should redeliver the task.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MaterializeError::Storage { .. })
    }
}

/// What a successful task did to the recipient's feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedChange {
    Upserted,
    Removed { existed: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub job_id: JobId,
    pub change: FeedChange,
}

pub struct FeedMaterializer {
    store: Arc<dyn FeedStore>,
    jobs: Arc<dyn FeedJobRepository>,
}

impl FeedMaterializer {
    pub fn new(store: Arc<dyn FeedStore>, jobs: Arc<dyn FeedJobRepository>) -> Self {
        Self { store, jobs }
    }

    /// Decodes and applies a raw task body.
    pub async fn materialize(&self, body: &[u8]) -> Result<Materialized, MaterializeError> {
        let task = decode_task(body)?;
        self.apply(&task).await
    }

    /// Applies a decoded task. Safe to call repeatedly for the same task.
    pub async fn apply(&self, task: &FeedUpdateTask) -> Result<Materialized, MaterializeError> {
        let mut job = FeedJob::start(task);
        let recorded = match self.jobs.create(&job).await {
            Ok(()) => true,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Failed to record feed job");
                false
            }
        };

        let result = if task.event.event_type.is_removal() {
            self.store
                .remove_entry(&task.recipient_id, &task.post_id)
                .await
                .map(|existed| FeedChange::Removed { existed })
        } else {
            self.store
                .upsert_entry(&MaterializedFeedEntry::from_task(task))
                .await
                .map(|_| FeedChange::Upserted)
        };

        match result {
            Ok(change) => {
                if job.complete().is_ok() && recorded {
                    self.persist_job(&job).await;
                }
                debug!(
                    job_id = %job.id,
                    recipient_id = %task.recipient_id,
                    post_id = %task.post_id,
                    change = ?change,
                    "Feed task materialized"
                );
                Ok(Materialized {
                    job_id: job.id,
                    change,
                })
            }
            Err(source) => {
                if job.fail(source.to_string()).is_ok() && recorded {
                    self.persist_job(&job).await;
                }
                Err(MaterializeError::Storage {
                    job_id: job.id,
                    source,
                })
            }
        }
    }

    async fn persist_job(&self, job: &FeedJob) {
        if let Err(e) = self.jobs.update(job).await {
            warn!(job_id = %job.id, status = %job.status, error = %e, "Failed to update feed job");
        }
    }
}

/// Decodes a task and checks it is internally consistent.
pub fn decode_task(body: &[u8]) -> Result<FeedUpdateTask, MaterializeError> {
    let task = FeedUpdateTask::decode(body).map_err(|e| MaterializeError::Malformed(e.to_string()))?;
    if task.post_id != task.event.post_id {
        return Err(MaterializeError::Malformed(format!(
            "task post {} does not match event post {}",
            task.post_id, task.event.post_id
        )));
    }
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryFeedJobRepository, InMemoryFeedStore};
    use crate::domain::feed::{FeedEvent, FeedEventType, JobStatus, PostCreatedEvent, Priority};
    use crate::domain::foundation::{PostId, UserId};

    struct Fixture {
        store: Arc<InMemoryFeedStore>,
        jobs: Arc<InMemoryFeedJobRepository>,
        materializer: FeedMaterializer,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryFeedStore::new());
        let jobs = Arc::new(InMemoryFeedJobRepository::new());
        let materializer = FeedMaterializer::new(store.clone(), jobs.clone());
        Fixture {
            store,
            jobs,
            materializer,
        }
    }

    fn task(text: &str) -> FeedUpdateTask {
        let created = PostCreatedEvent::new(
            PostId::new("p-1").unwrap(),
            UserId::new("author").unwrap(),
            text,
        );
        FeedUpdateTask::new(
            UserId::new("reader").unwrap(),
            FeedEvent::from(&created),
            Priority::HIGH,
        )
    }

    fn key() -> (UserId, PostId) {
        (UserId::new("reader").unwrap(), PostId::new("p-1").unwrap())
    }

    #[tokio::test]
    async fn task_is_upserted_and_job_completed() {
        let f = fixture();
        let body = task("hello").encode().unwrap();

        let done = f.materializer.materialize(&body).await.unwrap();

        assert_eq!(done.change, FeedChange::Upserted);
        let (user, post) = key();
        assert_eq!(f.store.entry(&user, &post).unwrap().text, "hello");
        let job = f.jobs.find_by_id(&done.job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn redelivery_does_not_duplicate_entries() {
        let f = fixture();
        let body = task("hello").encode().unwrap();

        f.materializer.materialize(&body).await.unwrap();
        let (user, post) = key();
        let first = f.store.entry(&user, &post).unwrap();
        f.materializer.materialize(&body).await.unwrap();

        assert_eq!(f.store.len(), 1);
        let second = f.store.entry(&user, &post).unwrap();
        assert_eq!(second.id, first.id);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(f.jobs.count_with_status(JobStatus::Completed), 2);
    }

    #[tokio::test]
    async fn deleted_post_is_removed() {
        let f = fixture();
        f.materializer.apply(&task("hello")).await.unwrap();

        let mut deletion = task("hello");
        deletion.event.event_type = FeedEventType::PostDeleted;
        let done = f.materializer.apply(&deletion).await.unwrap();

        assert_eq!(done.change, FeedChange::Removed { existed: true });
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn empty_recipient_is_malformed_and_leaves_no_trace() {
        let f = fixture();
        let mut json = serde_json::to_value(task("x")).unwrap();
        json["userId"] = serde_json::json!("");
        let body = serde_json::to_vec(&json).unwrap();

        let err = f.materializer.materialize(&body).await.unwrap_err();

        assert!(matches!(err, MaterializeError::Malformed(_)));
        assert!(!err.is_retryable());
        assert!(f.store.is_empty());
        assert!(f.jobs.all().is_empty());
    }

    #[tokio::test]
    async fn garbage_body_is_malformed() {
        let f = fixture();
        let err = f.materializer.materialize(b"not json").await.unwrap_err();
        assert!(matches!(err, MaterializeError::Malformed(_)));
    }

    #[tokio::test]
    async fn mismatched_post_ids_are_malformed() {
        let f = fixture();
        let mut t = task("x");
        t.post_id = PostId::new("other").unwrap();
        let err = f.materializer.materialize(&t.encode().unwrap()).await.unwrap_err();
        assert!(matches!(err, MaterializeError::Malformed(_)));
    }

    #[tokio::test]
    async fn storage_failure_fails_job_and_is_retryable() {
        let f = fixture();
        f.store.set_unavailable(true);

        let err = f.materializer.apply(&task("x")).await.unwrap_err();

        assert!(err.is_retryable());
        let MaterializeError::Storage { job_id, .. } = err else {
            panic!("expected storage error");
        };
        let job = f.jobs.find_by_id(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("unavailable"));
    }
}
