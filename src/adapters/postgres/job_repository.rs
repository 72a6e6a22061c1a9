//! PostgreSQL implementation of FeedJobRepository.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::feed::{FeedJob, JobStatus, Priority};
use crate::domain::foundation::{
    DomainError, ErrorCode, JobId, PostId, Timestamp, UserId,
};
use crate::ports::FeedJobRepository;

#[derive(Clone)]
pub struct PostgresFeedJobRepository {
    pool: PgPool,
}

impl PostgresFeedJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeedJobRepository for PostgresFeedJobRepository {
    async fn create(&self, job: &FeedJob) -> Result<(), DomainError> {
        let record = JobRecord::from(job);
        sqlx::query(
            r#"
            INSERT INTO feed_jobs (
                id, user_id, post_id, status, priority, created_at, updated_at, error
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.post_id)
        .bind(&record.status)
        .bind(record.priority)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(&record.error)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to insert feed job: {}", e),
            )
        })?;

        Ok(())
    }

    async fn update(&self, job: &FeedJob) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE feed_jobs SET
                status = $2,
                error = $3,
                updated_at = $4
            WHERE id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.status.as_str())
        .bind(job.error.as_deref())
        .bind(job.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to update feed job: {}", e),
            )
        })?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Zero rows: either the job is already terminal or it never existed.
        match self.find_by_id(&job.id).await? {
            Some(_) => Ok(()),
            None => Err(DomainError::new(
                ErrorCode::JobNotFound,
                format!("Feed job not found: {}", job.id),
            )),
        }
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<FeedJob>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, post_id, status, priority, created_at, updated_at, error
            FROM feed_jobs
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to fetch feed job: {}", e),
            )
        })?;

        row.map(row_to_job).transpose()
    }

    async fn fail_stale(&self, cutoff: Timestamp, error: &str) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE feed_jobs SET
                status = 'failed',
                error = $2,
                updated_at = NOW()
            WHERE status = 'processing' AND updated_at < $1
            "#,
        )
        .bind(cutoff.as_datetime())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to sweep stale feed jobs: {}", e),
            )
        })?;

        Ok(result.rows_affected())
    }
}

/// Column values of one `feed_jobs` row.
#[derive(Debug, Clone, PartialEq)]
struct JobRecord {
    id: uuid::Uuid,
    user_id: String,
    post_id: String,
    status: String,
    priority: i16,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    error: Option<String>,
}

impl From<&FeedJob> for JobRecord {
    fn from(job: &FeedJob) -> Self {
        Self {
            id: *job.id.as_uuid(),
            user_id: job.recipient_id.to_string(),
            post_id: job.post_id.to_string(),
            status: job.status.as_str().to_string(),
            priority: i16::from(job.priority.value()),
            created_at: *job.created_at.as_datetime(),
            updated_at: *job.updated_at.as_datetime(),
            error: job.error.clone(),
        }
    }
}

impl JobRecord {
    fn into_job(self) -> Result<FeedJob, DomainError> {
        Ok(FeedJob {
            id: JobId::from_uuid(self.id),
            recipient_id: UserId::new(self.user_id)?,
            post_id: PostId::new(self.post_id)?,
            status: self.status.parse::<JobStatus>()?,
            priority: stored_priority(self.priority)?,
            created_at: Timestamp::from_datetime(self.created_at),
            updated_at: Timestamp::from_datetime(self.updated_at),
            error: self.error,
        })
    }
}

fn stored_priority(value: i16) -> Result<Priority, DomainError> {
    let value = u8::try_from(value).map_err(|_| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid stored priority: {}", value),
        )
    })?;
    Priority::new(value).map_err(DomainError::from)
}

fn column<'r, T>(row: &'r sqlx::postgres::PgRow, name: &str) -> Result<T, DomainError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name).map_err(|e| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Failed to get {}: {}", name, e),
        )
    })
}

fn row_to_job(row: sqlx::postgres::PgRow) -> Result<FeedJob, DomainError> {
    JobRecord {
        id: column(&row, "id")?,
        user_id: column(&row, "user_id")?,
        post_id: column(&row, "post_id")?,
        status: column(&row, "status")?,
        priority: column(&row, "priority")?,
        created_at: column(&row, "created_at")?,
        updated_at: column(&row, "updated_at")?,
        error: column(&row, "error")?,
    }
    .into_job()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn job(status: JobStatus) -> FeedJob {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        FeedJob {
            id: JobId::new(),
            recipient_id: UserId::new("bob").unwrap(),
            post_id: PostId::new("post-7").unwrap(),
            status,
            priority: Priority::LOW,
            created_at: Timestamp::from_datetime(created),
            updated_at: Timestamp::from_datetime(created + chrono::Duration::seconds(3)),
            error: None,
        }
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn record_converts_back_to_the_same_job() {
        let mut failed = job(JobStatus::Processing);
        failed.fail("store down").unwrap();

        for original in [job(JobStatus::Processing), failed] {
            let record = JobRecord::from(&original);
            assert_eq!(record.priority, 5);
            assert_eq!(record.into_job().unwrap(), original);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut record = JobRecord::from(&job(JobStatus::Completed));
        record.status = "archived".to_string();
        assert!(record.into_job().is_err());
    }

    #[test]
    fn out_of_range_priority_is_rejected() {
        assert_eq!(stored_priority(1).unwrap(), Priority::HIGH);
        for bad in [0, 6, -1, 300] {
            let err = stored_priority(bad).unwrap_err();
            assert!(!err.message.is_empty(), "{bad}");
        }
    }
}
