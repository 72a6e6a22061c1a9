//! HTTP routes for feed endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{create_post, get_materialized_feed, FeedHandlers};

pub const FEED_PATH: &str = "/post/feed/materialized";
pub const CREATE_POST_PATH: &str = "/post/create";

/// Feed routes. Authentication is layered on by the caller.
pub fn feed_routes(handlers: FeedHandlers) -> Router {
    Router::new()
        .route(FEED_PATH, get(get_materialized_feed))
        .route(CREATE_POST_PATH, post(create_post))
        .with_state(handlers)
}
