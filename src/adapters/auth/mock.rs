//! Mock token validator for tests.
//!
//! ```ignore
//! let validator = MockTokenValidator::new().with_user("token-a", "alice");
//! assert_eq!(validator.validate("token-a").await?.as_str(), "alice");
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, UserId};
use crate::ports::TokenValidator;

/// Accepts a fixed set of tokens. Anything else is `InvalidToken`.
#[derive(Debug, Default)]
pub struct MockTokenValidator {
    tokens: RwLock<HashMap<String, UserId>>,
}

impl MockTokenValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `token` to `user_id`. Blank user ids are ignored.
    pub fn with_user(self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        if let Ok(user) = UserId::new(user_id) {
            self.tokens
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(token.into(), user);
        }
        self
    }
}

#[async_trait]
impl TokenValidator for MockTokenValidator {
    async fn validate(&self, token: &str) -> Result<UserId, AuthError> {
        self.tokens
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}
