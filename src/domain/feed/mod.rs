//! Feed domain - posts fanned out to recipients and their materialized feeds.

mod entry;
mod event;
mod job;
mod task;

pub use entry::MaterializedFeedEntry;
pub use event::{EventKind, FeedDomainEvent, FeedEvent, FeedEventType, PostCreatedEvent};
pub use job::{FeedJob, JobStatus};
pub use task::{FeedUpdateTask, Priority};
