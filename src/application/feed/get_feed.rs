//! GetFeedHandler - query handler for a recipient's materialized feed.

use std::sync::Arc;

use crate::domain::feed::MaterializedFeedEntry;
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::FeedStore;

pub const DEFAULT_FEED_LIMIT: u32 = 10;
pub const MAX_FEED_LIMIT: u32 = 100;

/// Query for one page of a feed.
#[derive(Debug, Clone)]
pub struct GetFeedQuery {
    pub user_id: UserId,
    pub offset: u32,
    /// Defaults to [`DEFAULT_FEED_LIMIT`], clamped to [`MAX_FEED_LIMIT`].
    pub limit: Option<u32>,
}

impl GetFeedQuery {
    pub fn effective_limit(&self) -> u32 {
        match self.limit {
            None | Some(0) => DEFAULT_FEED_LIMIT,
            Some(limit) => limit.min(MAX_FEED_LIMIT),
        }
    }
}

pub struct GetFeedHandler {
    store: Arc<dyn FeedStore>,
}

impl GetFeedHandler {
    pub fn new(store: Arc<dyn FeedStore>) -> Self {
        Self { store }
    }

    /// Newest entries first. An empty page means nothing has been
    /// materialized yet, not an error.
    pub async fn handle(&self, query: GetFeedQuery) -> Result<Vec<MaterializedFeedEntry>, DomainError> {
        let limit = query.effective_limit();
        self.store.get_feed(&query.user_id, query.offset, limit).await
    }
}
