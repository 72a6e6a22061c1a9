//! Application layer - orchestration over the ports.
//!
//! - `fanout` - audience selection and task generation on post creation
//! - `worker` - durable task materialization and job bookkeeping
//! - `feed` - feed queries and the post write-path entry

pub mod fanout;
pub mod feed;
pub mod worker;

pub use fanout::{FanoutReport, FanoutScheduler, PostCreatedHandler};
pub use feed::{GetFeedHandler, GetFeedQuery, PublishPostCommand, PublishPostHandler};
pub use worker::{FeedMaterializer, MaterializationWorker, StaleJobSweeper};
