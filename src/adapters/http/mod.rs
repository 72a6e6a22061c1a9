//! HTTP adapters - REST and WebSocket surface of the feed service.
//!
//! ```text
//! /health                      public
//! /post/feed/materialized      GET  bearer
//! /post/create                 POST bearer
//! {hub.path}                   WS   bearer
//! ```

pub mod feed;
pub mod middleware;

pub use feed::{feed_routes, FeedHandlers};

use axum::{middleware::from_fn_with_state, routing::get, Json, Router};
use tower_http::trace::TraceLayer;

use crate::adapters::websocket::{websocket_router, WebSocketState};

use middleware::{auth_middleware, AuthState};

/// Builds the full router: authenticated feed and socket routes plus health.
pub fn api_router(
    feed: FeedHandlers,
    websocket: WebSocketState,
    websocket_path: &str,
    auth: AuthState,
) -> Router {
    let protected = feed_routes(feed)
        .merge(websocket_router(websocket_path).with_state(websocket))
        .route_layer(from_fn_with_state(auth, auth_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header::AUTHORIZATION, Request, StatusCode};
    use tower::ServiceExt;

    use crate::adapters::auth::MockTokenValidator;
    use crate::adapters::events::InProcessEventBus;
    use crate::adapters::memory::InMemoryFeedStore;
    use crate::adapters::websocket::LiveConnectionHub;
    use crate::application::feed::{GetFeedHandler, PublishPostHandler};
    use crate::domain::feed::{FeedEvent, FeedUpdateTask, MaterializedFeedEntry, PostCreatedEvent, Priority};
    use crate::domain::foundation::{PostId, UserId};
    use crate::ports::FeedStore;

    async fn app() -> Router {
        let store = Arc::new(InMemoryFeedStore::new());
        let created = PostCreatedEvent::new(
            PostId::new("p1").unwrap(),
            UserId::new("author").unwrap(),
            "hello",
        );
        let task = FeedUpdateTask::new(
            UserId::new("reader").unwrap(),
            FeedEvent::from(&created),
            Priority::HIGH,
        );
        store
            .upsert_entry(&MaterializedFeedEntry::from_task(&task))
            .await
            .unwrap();

        let feed = FeedHandlers::new(
            Arc::new(GetFeedHandler::new(store)),
            Arc::new(PublishPostHandler::new(Arc::new(InProcessEventBus::new()))),
        );
        let websocket = WebSocketState::new(Arc::new(LiveConnectionHub::default()));
        let auth: AuthState = Arc::new(
            MockTokenValidator::new().with_user("reader-token", "reader"),
        );
        api_router(feed, websocket, "/post/feed/posted", auth)
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let response = app().await.oneshot(get("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn feed_requires_bearer_token() {
        let response = app()
            .await
            .oneshot(get("/post/feed/materialized", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn query_parameter_token_is_not_accepted() {
        let response = app()
            .await
            .oneshot(get("/post/feed/materialized?token=reader-token", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn feed_returns_callers_entries() {
        let response = app()
            .await
            .oneshot(get("/post/feed/materialized?limit=5", Some("reader-token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Vec<feed::FeedEntryResponse> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].post_id, "p1");
    }

    #[tokio::test]
    async fn create_post_with_no_subscribers_succeeds() {
        let request = Request::builder()
            .method("POST")
            .uri("/post/create")
            .header(AUTHORIZATION, "Bearer reader-token")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"postId":"p2","text":"hi"}"#))
            .unwrap();

        let response = app().await.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
