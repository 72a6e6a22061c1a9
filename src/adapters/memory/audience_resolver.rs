//! In-memory AudienceResolver backed by a symmetric connection map.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::ports::AudienceResolver;

#[derive(Default)]
pub struct InMemoryAudienceResolver {
    graph: RwLock<HashMap<String, BTreeSet<String>>>,
    unavailable: AtomicBool,
}

impl InMemoryAudienceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Author connected to every id in `connections`.
    ///
    /// Ids are stored verbatim so tests can seed empty or invalid ones.
    pub fn with_connections<I, S>(self, author: &str, connections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for friend in connections {
            self.connect(author, friend);
        }
        self
    }

    /// Records an accepted connection in both directions.
    pub fn connect(&self, a: &str, b: impl Into<String>) {
        let b = b.into();
        let mut graph = self.write();
        graph.entry(a.to_string()).or_default().insert(b.clone());
        graph.entry(b).or_default().insert(a.to_string());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, BTreeSet<String>>> {
        self.graph.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, BTreeSet<String>>> {
        self.graph.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AudienceResolver for InMemoryAudienceResolver {
    async fn connections_of(&self, author: &UserId) -> Result<Vec<String>, DomainError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::AudienceUnavailable,
                format!("Connections of {} unavailable", author),
            ));
        }
        Ok(self
            .read()
            .get(author.as_str())
            .map(|friends| friends.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connections_are_symmetric() {
        let resolver = InMemoryAudienceResolver::new().with_connections("alice", ["bob", "carol"]);

        let alice = resolver
            .connections_of(&UserId::new("alice").unwrap())
            .await
            .unwrap();
        assert_eq!(alice, vec!["bob".to_string(), "carol".to_string()]);

        let bob = resolver
            .connections_of(&UserId::new("bob").unwrap())
            .await
            .unwrap();
        assert_eq!(bob, vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn unknown_author_has_no_connections() {
        let resolver = InMemoryAudienceResolver::new();
        let none = resolver
            .connections_of(&UserId::new("nobody").unwrap())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn unavailable_lookup_fails() {
        let resolver = InMemoryAudienceResolver::new();
        resolver.set_unavailable(true);
        let err = resolver
            .connections_of(&UserId::new("alice").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AudienceUnavailable);
    }
}
