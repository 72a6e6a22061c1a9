//! HS256 JWT validation for bearer credentials.
//!
//! Tokens carry the caller in a `user_id` claim and must have an `exp`.

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AuthError, UserId};
use crate::ports::TokenValidator;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    user_id: String,
    exp: u64,
}

/// Validates tokens signed with a shared HMAC secret.
pub struct JwtTokenValidator {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl JwtTokenValidator {
    pub fn new(secret: &SecretString) -> Self {
        let key = secret.expose_secret().as_bytes();
        Self {
            decoding: DecodingKey::from_secret(key),
            encoding: EncodingKey::from_secret(key),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Signs a token for `user_id` valid for `ttl_secs`. Used by tooling and tests.
    pub fn issue(&self, user_id: &UserId, ttl_secs: u64) -> Result<String, AuthError> {
        let claims = Claims {
            user_id: user_id.to_string(),
            exp: jsonwebtoken::get_current_timestamp() + ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            tracing::error!(error = %e, "Failed to sign token");
            AuthError::InvalidToken
        })
    }
}

#[async_trait]
impl TokenValidator for JwtTokenValidator {
    async fn validate(&self, token: &str) -> Result<UserId, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => {
                    tracing::debug!(error = %e, "Rejected bearer token");
                    AuthError::InvalidToken
                }
            }
        })?;

        UserId::new(data.claims.user_id).map_err(|_| AuthError::InvalidToken)
    }
}
