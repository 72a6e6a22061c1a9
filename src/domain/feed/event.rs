//! Events flowing through the pipeline.
//!
//! `FeedDomainEvent` is the closed set carried by the in-process bus.
//! `FeedEvent` is the wire payload shared by the durable task and the live
//! channel, so both delivery paths describe a post identically.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{PostId, Timestamp, UserId};

/// Emitted once per successfully created post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCreatedEvent {
    pub post_id: PostId,
    pub author_id: UserId,
    pub text: String,
    pub created_at: Timestamp,
}

impl PostCreatedEvent {
    pub fn new(post_id: PostId, author_id: UserId, text: impl Into<String>) -> Self {
        Self {
            post_id,
            author_id,
            text: text.into(),
            created_at: Timestamp::now(),
        }
    }
}

/// Kind of change a [`FeedEvent`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedEventType {
    PostCreated,
    PostUpdated,
    PostDeleted,
}

impl FeedEventType {
    /// True when the recipient's feed entry should be removed rather than upserted.
    pub fn is_removal(&self) -> bool {
        matches!(self, FeedEventType::PostDeleted)
    }
}

/// Post change as delivered to a recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEvent {
    pub post_id: PostId,
    #[serde(rename = "authorUserId")]
    pub author_id: UserId,
    #[serde(rename = "postText")]
    pub text: String,
    pub created_at: Timestamp,
    pub event_type: FeedEventType,
}

impl From<&PostCreatedEvent> for FeedEvent {
    fn from(event: &PostCreatedEvent) -> Self {
        Self {
            post_id: event.post_id.clone(),
            author_id: event.author_id.clone(),
            text: event.text.clone(),
            created_at: event.created_at,
            event_type: FeedEventType::PostCreated,
        }
    }
}

/// Discriminant used as the bus subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PostCreated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PostCreated => "post.created",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events published on the in-process bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedDomainEvent {
    PostCreated(PostCreatedEvent),
}

impl FeedDomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            FeedDomainEvent::PostCreated(_) => EventKind::PostCreated,
        }
    }
}

impl From<PostCreatedEvent> for FeedDomainEvent {
    fn from(event: PostCreatedEvent) -> Self {
        FeedDomainEvent::PostCreated(event)
    }
}
