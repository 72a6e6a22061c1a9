//! PostgreSQL implementation of AudienceResolver.
//!
//! Connections are symmetric: a row in `friends` with status `accepted`
//! links both users regardless of which side sent the request.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::ports::AudienceResolver;

#[derive(Clone)]
pub struct PostgresAudienceResolver {
    pool: PgPool,
}

impl PostgresAudienceResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AudienceResolver for PostgresAudienceResolver {
    async fn connections_of(&self, author: &UserId) -> Result<Vec<String>, DomainError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT friend_id FROM friends
            WHERE user_id = $1 AND status = 'accepted'
            UNION
            SELECT user_id FROM friends
            WHERE friend_id = $1 AND status = 'accepted'
            "#,
        )
        .bind(author.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::AudienceUnavailable,
                format!("Failed to resolve connections of {}: {}", author, e),
            )
        })
    }
}
