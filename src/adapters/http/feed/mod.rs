//! HTTP adapter for feed endpoints.

mod dto;
mod handlers;
mod routes;

pub use dto::{
    CreatePostRequest, CreatePostResponse, ErrorResponse, FeedEntryResponse, FeedQueryParams,
};
pub use handlers::FeedHandlers;
pub use routes::{feed_routes, CREATE_POST_PATH, FEED_PATH};
