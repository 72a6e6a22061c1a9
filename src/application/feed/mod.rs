//! Feed read path and post write-path entry.

mod get_feed;
mod publish_post;

pub use get_feed::{GetFeedHandler, GetFeedQuery, DEFAULT_FEED_LIMIT, MAX_FEED_LIMIT};
pub use publish_post::{PublishPostCommand, PublishPostHandler};
