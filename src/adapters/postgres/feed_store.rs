//! PostgreSQL implementation of FeedStore.
//!
//! Rows live in `materialized_feeds`, unique on (user_id, post_id).

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::feed::MaterializedFeedEntry;
use crate::domain::foundation::{
    DomainError, EntryId, ErrorCode, PostId, Timestamp, UserId,
};
use crate::ports::FeedStore;

#[derive(Clone)]
pub struct PostgresFeedStore {
    pool: PgPool,
}

impl PostgresFeedStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeedStore for PostgresFeedStore {
    async fn upsert_entry(&self, entry: &MaterializedFeedEntry) -> Result<(), DomainError> {
        let record = EntryRecord::from(entry);
        sqlx::query(
            r#"
            INSERT INTO materialized_feeds (
                id, user_id, post_id, author_id, post_text, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, post_id) DO UPDATE SET
                author_id = EXCLUDED.author_id,
                post_text = EXCLUDED.post_text,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.post_id)
        .bind(&record.author_id)
        .bind(&record.post_text)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to upsert feed entry: {}", e),
            )
        })?;

        Ok(())
    }

    async fn remove_entry(&self, recipient: &UserId, post: &PostId) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            DELETE FROM materialized_feeds
            WHERE user_id = $1 AND post_id = $2
            "#,
        )
        .bind(recipient.as_str())
        .bind(post.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to remove feed entry: {}", e),
            )
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_feed(
        &self,
        recipient: &UserId,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<MaterializedFeedEntry>, DomainError> {
        let (limit, offset) = page_binds(offset, limit);
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, post_id, author_id, post_text, created_at, updated_at
            FROM materialized_feeds
            WHERE user_id = $1
            ORDER BY created_at DESC, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(recipient.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to fetch feed: {}", e),
            )
        })?;

        rows.into_iter().map(row_to_entry).collect()
    }
}

/// Column values of one `materialized_feeds` row.
#[derive(Debug, Clone, PartialEq)]
struct EntryRecord {
    id: uuid::Uuid,
    user_id: String,
    post_id: String,
    author_id: String,
    post_text: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&MaterializedFeedEntry> for EntryRecord {
    fn from(entry: &MaterializedFeedEntry) -> Self {
        Self {
            id: *entry.id.as_uuid(),
            user_id: entry.recipient_id.to_string(),
            post_id: entry.post_id.to_string(),
            author_id: entry.author_id.to_string(),
            post_text: entry.text.clone(),
            created_at: *entry.created_at.as_datetime(),
            updated_at: *entry.updated_at.as_datetime(),
        }
    }
}

impl EntryRecord {
    fn into_entry(self) -> Result<MaterializedFeedEntry, DomainError> {
        Ok(MaterializedFeedEntry {
            id: EntryId::from_uuid(self.id),
            recipient_id: UserId::new(self.user_id)?,
            post_id: PostId::new(self.post_id)?,
            author_id: UserId::new(self.author_id)?,
            text: self.post_text,
            created_at: Timestamp::from_datetime(self.created_at),
            updated_at: Timestamp::from_datetime(self.updated_at),
        })
    }
}

/// `(LIMIT, OFFSET)` binds; Postgres takes them as BIGINT.
fn page_binds(offset: u32, limit: u32) -> (i64, i64) {
    (i64::from(limit), i64::from(offset))
}

fn row_to_entry(row: sqlx::postgres::PgRow) -> Result<MaterializedFeedEntry, DomainError> {
    let column_error = |column: &str, e: sqlx::Error| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Failed to get {}: {}", column, e),
        )
    };

    EntryRecord {
        id: row.try_get("id").map_err(|e| column_error("id", e))?,
        user_id: row.try_get("user_id").map_err(|e| column_error("user_id", e))?,
        post_id: row.try_get("post_id").map_err(|e| column_error("post_id", e))?,
        author_id: row
            .try_get("author_id")
            .map_err(|e| column_error("author_id", e))?,
        post_text: row
            .try_get("post_text")
            .map_err(|e| column_error("post_text", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| column_error("created_at", e))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| column_error("updated_at", e))?,
    }
    .into_entry()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry() -> MaterializedFeedEntry {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        MaterializedFeedEntry {
            id: EntryId::new(),
            recipient_id: UserId::new("bob").unwrap(),
            post_id: PostId::new("post-7").unwrap(),
            author_id: UserId::new("alice").unwrap(),
            text: "hello there".to_string(),
            created_at: Timestamp::from_datetime(at),
            updated_at: Timestamp::from_datetime(at),
        }
    }

    #[test]
    fn record_converts_back_to_the_same_entry() {
        let original = entry();
        let record = EntryRecord::from(&original);
        assert_eq!(record.user_id, "bob");
        assert_eq!(record.post_text, "hello there");
        assert_eq!(record.into_entry().unwrap(), original);
    }

    #[test]
    fn blank_stored_identity_is_rejected() {
        let mut record = EntryRecord::from(&entry());
        record.author_id = "  ".to_string();
        assert!(record.into_entry().is_err());
    }

    #[test]
    fn page_binds_are_limit_then_offset() {
        assert_eq!(page_binds(40, 20), (20, 40));
        assert_eq!(page_binds(u32::MAX, 1), (1, i64::from(u32::MAX)));
    }
}
