//! HTTP handlers for feed endpoints.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::adapters::http::middleware::RequireAuth;
use crate::application::feed::{
    GetFeedHandler, GetFeedQuery, PublishPostCommand, PublishPostHandler,
};
use crate::domain::foundation::{DomainError, ErrorCode, PostId};

use super::dto::{
    CreatePostRequest, CreatePostResponse, ErrorResponse, FeedEntryResponse, FeedQueryParams,
};

#[derive(Clone)]
pub struct FeedHandlers {
    get_feed: Arc<GetFeedHandler>,
    publish_post: Arc<PublishPostHandler>,
}

impl FeedHandlers {
    pub fn new(get_feed: Arc<GetFeedHandler>, publish_post: Arc<PublishPostHandler>) -> Self {
        Self {
            get_feed,
            publish_post,
        }
    }
}

/// GET /post/feed/materialized - the caller's feed, newest first
pub async fn get_materialized_feed(
    State(handlers): State<FeedHandlers>,
    RequireAuth(user_id): RequireAuth,
    Query(params): Query<FeedQueryParams>,
) -> Response {
    let query = GetFeedQuery {
        user_id,
        offset: params.offset.unwrap_or(0),
        limit: params.limit,
    };

    match handlers.get_feed.handle(query).await {
        Ok(entries) => {
            let body: Vec<FeedEntryResponse> = entries.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => domain_error_response(e),
    }
}

/// POST /post/create - announce a stored post to the fan-out pipeline
pub async fn create_post(
    State(handlers): State<FeedHandlers>,
    RequireAuth(author_id): RequireAuth,
    Json(req): Json<CreatePostRequest>,
) -> Response {
    let post_id = match req.post_id {
        Some(raw) => match PostId::new(raw) {
            Ok(id) => id,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, Json(ErrorResponse::bad_request(e.to_string())))
                    .into_response()
            }
        },
        None => match PostId::new(Uuid::new_v4().to_string()) {
            Ok(id) => id,
            Err(e) => return domain_error_response(e.into()),
        },
    };

    let cmd = PublishPostCommand {
        author_id,
        post_id: post_id.clone(),
        text: req.text,
    };

    match handlers.publish_post.handle(cmd).await {
        Ok(report) => (
            StatusCode::CREATED,
            Json(CreatePostResponse {
                post_id: post_id.to_string(),
                handlers: report.outcomes.len(),
            }),
        )
            .into_response(),
        Err(e) => domain_error_response(e),
    }
}

fn domain_error_response(error: DomainError) -> Response {
    let status = match error.code {
        ErrorCode::ValidationFailed | ErrorCode::InvalidFormat => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::JobNotFound | ErrorCode::EntryNotFound => StatusCode::NOT_FOUND,
        ErrorCode::AudienceUnavailable | ErrorCode::BrokerError => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(code = %error.code, error = %error.message, "Feed request failed");
    }
    (
        status,
        Json(ErrorResponse::new(error.code.to_string(), error.message)),
    )
        .into_response()
}
