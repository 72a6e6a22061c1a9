//! In-memory adapters for the storage ports.
//!
//! Used by tests and by the single-process development profile.

mod audience_resolver;
mod feed_store;
mod job_repository;

pub use audience_resolver::InMemoryAudienceResolver;
pub use feed_store::InMemoryFeedStore;
pub use job_repository::InMemoryFeedJobRepository;
