//! Authentication configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Shortest accepted HS256 secret.
pub const MIN_SECRET_BYTES: usize = 32;

/// Bearer token configuration (JWT, HS256)
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared signing secret
    pub jwt_secret: SecretString,
}

impl AuthConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: SecretString::new(secret.into()),
        }
    }

    /// Validate authentication configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let secret = self.jwt_secret.expose_secret();
        if secret.is_empty() {
            return Err(ValidationError::MissingRequired("AUTH_JWT_SECRET"));
        }
        if secret.len() < MIN_SECRET_BYTES {
            return Err(ValidationError::WeakJwtSecret(MIN_SECRET_BYTES));
        }
        Ok(())
    }
}
