//! Durable unit of fan-out work: one recipient, one post.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::FeedEvent;
use crate::domain::foundation::{PostId, Timestamp, UserId, ValidationError};

/// Advisory ordering hint for the broker. 1 is served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const HIGH: Priority = Priority(1);
    pub const MEDIUM: Priority = Priority(3);
    pub const LOW: Priority = Priority(5);

    pub const MIN_VALUE: u8 = 1;
    pub const MAX_VALUE: u8 = 5;

    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if !(Self::MIN_VALUE..=Self::MAX_VALUE).contains(&value) {
            return Err(ValidationError::out_of_range(
                "priority",
                Self::MIN_VALUE as i32,
                Self::MAX_VALUE as i32,
                value as i32,
            ));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Priority {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Instruction to materialize `event` into `recipient_id`'s feed.
///
/// Decoding enforces non-empty identifiers and a priority in range, so any
/// task that deserializes is structurally valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedUpdateTask {
    #[serde(rename = "userId")]
    pub recipient_id: UserId,
    pub post_id: PostId,
    pub event: FeedEvent,
    pub priority: Priority,
    pub created_at: Timestamp,
}

impl FeedUpdateTask {
    pub fn new(recipient_id: UserId, event: FeedEvent, priority: Priority) -> Self {
        Self {
            recipient_id,
            post_id: event.post_id.clone(),
            event,
            priority,
            created_at: Timestamp::now(),
        }
    }

    /// Broker message id, unique per (recipient, post, creation instant).
    pub fn message_id(&self) -> String {
        format!(
            "{}:{}:{}",
            self.recipient_id,
            self.post_id,
            self.created_at.as_unix_nanos()
        )
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}
