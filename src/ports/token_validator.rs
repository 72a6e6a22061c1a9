//! Token validation port for bearer credentials.

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, UserId};

/// Validates a bearer token and extracts the user it was issued to.
///
/// # Contract
///
/// - `AuthError::InvalidToken` for malformed tokens, bad signatures or a
///   missing/empty user claim
/// - `AuthError::TokenExpired` for expired tokens
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// `token` is the raw credential without the "Bearer " prefix.
    async fn validate(&self, token: &str) -> Result<UserId, AuthError>;
}
