//! Materialized feed store port.

use async_trait::async_trait;

use crate::domain::feed::MaterializedFeedEntry;
use crate::domain::foundation::{DomainError, PostId, UserId};

/// Keyed store of per-recipient feed rows.
///
/// Implementations must keep at most one row per (recipient, post).
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Inserts the entry, or refreshes text, author and `updated_at` of the
    /// existing row for the same (recipient, post). The row id and
    /// `created_at` of an existing row are preserved.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` on persistence failure
    async fn upsert_entry(&self, entry: &MaterializedFeedEntry) -> Result<(), DomainError>;

    /// Removes the (recipient, post) row. Returns whether a row existed.
    async fn remove_entry(&self, recipient: &UserId, post: &PostId) -> Result<bool, DomainError>;

    /// Recipient's feed, newest first.
    async fn get_feed(
        &self,
        recipient: &UserId,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<MaterializedFeedEntry>, DomainError>;
}
