//! Audience resolver port - who should see an author's posts.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, UserId};

/// Looks up the connection set of an author.
///
/// Ids are returned as stored. Callers filter out the author and any
/// empty or otherwise invalid identities.
#[async_trait]
pub trait AudienceResolver: Send + Sync {
    /// # Errors
    ///
    /// - `AudienceUnavailable` or `DatabaseError` when the lookup fails
    async fn connections_of(&self, author: &UserId) -> Result<Vec<String>, DomainError>;
}
