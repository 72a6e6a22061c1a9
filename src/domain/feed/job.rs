//! Audit record of one materialization attempt.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{FeedUpdateTask, Priority};
use crate::domain::foundation::{
    JobId, PostId, StateMachine, Timestamp, UserId, ValidationError,
};

/// Lifecycle of a [`FeedJob`].
///
/// `Pending` is accepted on the wire and in storage but jobs are always
/// created directly in `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ValidationError::invalid_format(
                "job_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

impl StateMachine for JobStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use JobStatus::*;
        matches!(
            (self, target),
            (Pending, Processing) | (Processing, Completed) | (Processing, Failed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use JobStatus::*;
        match self {
            Pending => vec![Processing],
            Processing => vec![Completed, Failed],
            Completed | Failed => vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedJob {
    pub id: JobId,
    pub recipient_id: UserId,
    pub post_id: PostId,
    pub status: JobStatus,
    pub priority: Priority,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub error: Option<String>,
}

impl FeedJob {
    /// Error recorded on jobs failed by the stale-job sweep.
    pub const ABANDONED: &'static str = "abandoned: processing timed out";

    /// Opens a job for `task` in the `Processing` state.
    pub fn start(task: &FeedUpdateTask) -> Self {
        let now = Timestamp::now();
        Self {
            id: JobId::new(),
            recipient_id: task.recipient_id.clone(),
            post_id: task.post_id.clone(),
            status: JobStatus::Processing,
            priority: task.priority,
            created_at: now,
            updated_at: now,
            error: None,
        }
    }

    pub fn complete(&mut self) -> Result<(), ValidationError> {
        self.status = self.status.transition_to(JobStatus::Completed)?;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), ValidationError> {
        self.status = self.status.transition_to(JobStatus::Failed)?;
        self.error = Some(error.into());
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// True when still processing and last touched before `cutoff`.
    pub fn is_stale(&self, cutoff: &Timestamp) -> bool {
        self.status == JobStatus::Processing && self.updated_at < *cutoff
    }
}
