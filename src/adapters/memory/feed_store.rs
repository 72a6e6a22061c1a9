//! In-memory FeedStore.
//!
//! Keeps one row per (recipient, post) in a `HashMap`. Suitable for tests
//! and single-process development runs; nothing survives a restart.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::domain::feed::MaterializedFeedEntry;
use crate::domain::foundation::{DomainError, ErrorCode, PostId, UserId};
use crate::ports::FeedStore;

type Key = (UserId, PostId);

#[derive(Default)]
pub struct InMemoryFeedStore {
    rows: Mutex<HashMap<Key, MaterializedFeedEntry>>,
    unavailable: AtomicBool,
}

impl InMemoryFeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> MutexGuard<'_, HashMap<Key, MaterializedFeedEntry>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<(), DomainError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                "feed store unavailable",
            ));
        }
        Ok(())
    }

    // === Test Helpers ===

    /// Makes every subsequent call fail with `DatabaseError` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn entry(&self, recipient: &UserId, post: &PostId) -> Option<MaterializedFeedEntry> {
        self.rows()
            .get(&(recipient.clone(), post.clone()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    /// Recipients holding a row for `post`.
    pub fn recipients_of(&self, post: &PostId) -> Vec<UserId> {
        self.rows()
            .keys()
            .filter(|(_, p)| p == post)
            .map(|(recipient, _)| recipient.clone())
            .collect()
    }
}

#[async_trait]
impl FeedStore for InMemoryFeedStore {
    async fn upsert_entry(&self, entry: &MaterializedFeedEntry) -> Result<(), DomainError> {
        self.check_available()?;
        let key = (entry.recipient_id.clone(), entry.post_id.clone());
        let mut rows = self.rows();
        match rows.get_mut(&key) {
            Some(existing) => {
                existing.author_id = entry.author_id.clone();
                existing.text = entry.text.clone();
                existing.updated_at = entry.updated_at;
            }
            None => {
                rows.insert(key, entry.clone());
            }
        }
        Ok(())
    }

    async fn remove_entry(&self, recipient: &UserId, post: &PostId) -> Result<bool, DomainError> {
        self.check_available()?;
        Ok(self
            .rows()
            .remove(&(recipient.clone(), post.clone()))
            .is_some())
    }

    async fn get_feed(
        &self,
        recipient: &UserId,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<MaterializedFeedEntry>, DomainError> {
        self.check_available()?;
        let mut feed: Vec<MaterializedFeedEntry> = self
            .rows()
            .values()
            .filter(|entry| &entry.recipient_id == recipient)
            .cloned()
            .collect();
        feed.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
        });
        Ok(feed
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::feed::{FeedEvent, FeedUpdateTask, PostCreatedEvent, Priority};
    use crate::domain::foundation::Timestamp;

    fn entry(recipient: &str, post: &str, text: &str, age_secs: u64) -> MaterializedFeedEntry {
        let mut created = PostCreatedEvent::new(
            PostId::new(post).unwrap(),
            UserId::new("author").unwrap(),
            text,
        );
        created.created_at = Timestamp::now().minus_secs(age_secs);
        let task = FeedUpdateTask::new(
            UserId::new(recipient).unwrap(),
            FeedEvent::from(&created),
            Priority::MEDIUM,
        );
        MaterializedFeedEntry::from_task(&task)
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_per_recipient_and_post() {
        let store = InMemoryFeedStore::new();
        let first = entry("u1", "p1", "original", 0);
        store.upsert_entry(&first).await.unwrap();
        let second = entry("u1", "p1", "edited", 0);
        store.upsert_entry(&second).await.unwrap();

        assert_eq!(store.len(), 1);
        let row = store
            .entry(&UserId::new("u1").unwrap(), &PostId::new("p1").unwrap())
            .unwrap();
        assert_eq!(row.text, "edited");
        assert_eq!(row.id, first.id);
        assert_eq!(row.created_at, first.created_at);
    }

    #[tokio::test]
    async fn feed_is_newest_first_and_paged() {
        let store = InMemoryFeedStore::new();
        store.upsert_entry(&entry("u1", "old", "a", 30)).await.unwrap();
        store.upsert_entry(&entry("u1", "mid", "b", 20)).await.unwrap();
        store.upsert_entry(&entry("u1", "new", "c", 10)).await.unwrap();
        store.upsert_entry(&entry("u2", "other", "d", 0)).await.unwrap();

        let user = UserId::new("u1").unwrap();
        let page: Vec<String> = store
            .get_feed(&user, 0, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.post_id.to_string())
            .collect();
        assert_eq!(page, vec!["new", "mid"]);

        let rest = store.get_feed(&user, 2, 10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].post_id.as_str(), "old");
    }

    #[tokio::test]
    async fn remove_reports_whether_row_existed() {
        let store = InMemoryFeedStore::new();
        store.upsert_entry(&entry("u1", "p1", "x", 0)).await.unwrap();
        let user = UserId::new("u1").unwrap();
        let post = PostId::new("p1").unwrap();

        assert!(store.remove_entry(&user, &post).await.unwrap());
        assert!(!store.remove_entry(&user, &post).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unavailable_store_returns_database_error() {
        let store = InMemoryFeedStore::new();
        store.set_unavailable(true);
        let err = store.upsert_entry(&entry("u1", "p1", "x", 0)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);

        store.set_unavailable(false);
        assert!(store.upsert_entry(&entry("u1", "p1", "x", 0)).await.is_ok());
    }
}
