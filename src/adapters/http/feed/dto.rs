//! HTTP DTOs for feed endpoints.

use serde::{Deserialize, Serialize};

use crate::domain::feed::MaterializedFeedEntry;

// ════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════

/// Query parameters for `GET /post/feed/materialized`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedQueryParams {
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Body of `POST /post/create`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    /// Id assigned by the post store. Generated when absent.
    #[serde(default)]
    pub post_id: Option<String>,
    pub text: String,
}

// ════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════

/// One feed row as served to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntryResponse {
    pub id: String,
    pub post_id: String,
    pub author_user_id: String,
    pub post_text: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<MaterializedFeedEntry> for FeedEntryResponse {
    fn from(entry: MaterializedFeedEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            post_id: entry.post_id.to_string(),
            author_user_id: entry.author_id.to_string(),
            post_text: entry.text,
            created_at: entry.created_at.as_datetime().to_rfc3339(),
            updated_at: entry.updated_at.as_datetime().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostResponse {
    pub post_id: String,
    /// Subscribers that processed the post.
    pub handlers: usize,
}

/// Standard error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::feed::{FeedEvent, FeedUpdateTask, PostCreatedEvent, Priority};
    use crate::domain::foundation::{PostId, UserId};

    #[test]
    fn entry_response_uses_camel_case() {
        let created = PostCreatedEvent::new(
            PostId::new("p1").unwrap(),
            UserId::new("author").unwrap(),
            "body",
        );
        let task = FeedUpdateTask::new(
            UserId::new("reader").unwrap(),
            FeedEvent::from(&created),
            Priority::LOW,
        );
        let response = FeedEntryResponse::from(MaterializedFeedEntry::from_task(&task));
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["postId"], "p1");
        assert_eq!(json["authorUserId"], "author");
        assert_eq!(json["postText"], "body");
    }

    #[test]
    fn create_post_request_post_id_is_optional() {
        let req: CreatePostRequest = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert!(req.post_id.is_none());
        let req: CreatePostRequest =
            serde_json::from_str(r#"{"postId":"p7","text":"hi"}"#).unwrap();
        assert_eq!(req.post_id.as_deref(), Some("p7"));
    }
}
