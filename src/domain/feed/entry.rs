//! Read-path row: one post in one recipient's feed.

use serde::{Deserialize, Serialize};

use super::FeedUpdateTask;
use crate::domain::foundation::{EntryId, PostId, Timestamp, UserId};

/// Unique per (recipient_id, post_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializedFeedEntry {
    pub id: EntryId,
    #[serde(rename = "userId")]
    pub recipient_id: UserId,
    pub post_id: PostId,
    #[serde(rename = "authorUserId")]
    pub author_id: UserId,
    #[serde(rename = "postText")]
    pub text: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl MaterializedFeedEntry {
    /// Builds the row a task should upsert. `created_at` is the post's
    /// creation time so feeds sort by recency of the post itself.
    pub fn from_task(task: &FeedUpdateTask) -> Self {
        Self {
            id: EntryId::new(),
            recipient_id: task.recipient_id.clone(),
            post_id: task.post_id.clone(),
            author_id: task.event.author_id.clone(),
            text: task.event.text.clone(),
            created_at: task.event.created_at,
            updated_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::feed::{FeedEvent, PostCreatedEvent, Priority};

    #[test]
    fn from_task_copies_post_fields() {
        let created = PostCreatedEvent::new(
            PostId::new("p-1").unwrap(),
            UserId::new("author").unwrap(),
            "hello",
        );
        let task = FeedUpdateTask::new(
            UserId::new("friend").unwrap(),
            FeedEvent::from(&created),
            Priority::LOW,
        );

        let entry = MaterializedFeedEntry::from_task(&task);

        assert_eq!(entry.recipient_id.as_str(), "friend");
        assert_eq!(entry.post_id.as_str(), "p-1");
        assert_eq!(entry.author_id.as_str(), "author");
        assert_eq!(entry.text, "hello");
        assert_eq!(entry.created_at, created.created_at);
    }
}
