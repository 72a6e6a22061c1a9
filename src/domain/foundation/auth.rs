//! Authentication errors shared by the HTTP and WebSocket edges.

use thiserror::Error;

/// Why a bearer credential was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No `Authorization: Bearer` header on the request.
    #[error("Missing bearer token")]
    MissingToken,

    /// The token is malformed, has a bad signature, or lacks a user claim.
    #[error("Invalid token")]
    InvalidToken,

    /// Signature is valid but the token has expired.
    #[error("Token expired")]
    TokenExpired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_display_human_messages() {
        assert_eq!(AuthError::MissingToken.to_string(), "Missing bearer token");
        assert_eq!(AuthError::TokenExpired.to_string(), "Token expired");
    }
}
