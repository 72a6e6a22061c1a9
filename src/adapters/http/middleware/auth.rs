//! Bearer authentication for the feed endpoints.
//!
//! ```text
//! Request → auth_middleware → injects UserId into extensions
//!                                      ↓
//!                              Handler → RequireAuth extractor reads it
//! ```
//!
//! Only the `Authorization: Bearer <token>` header is accepted; tokens in
//! query parameters are ignored.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::domain::foundation::{AuthError, UserId};
use crate::ports::TokenValidator;

/// Auth middleware state - wraps the token validator.
pub type AuthState = Arc<dyn TokenValidator>;

/// Extracts the raw token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)
}

/// Rejects the request with 401 unless it carries a valid bearer token.
pub async fn auth_middleware(
    State(validator): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let result = match bearer_token(request.headers()) {
        Ok(token) => validator.validate(token).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(user_id) => {
            request.extensions_mut().insert(user_id);
            next.run(request).await
        }
        Err(e) => AuthRejection::Invalid(e).into_response(),
    }
}

/// Extractor for the authenticated user placed by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct RequireAuth(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserId>()
            .cloned()
            .map(RequireAuth)
            .ok_or(AuthRejection::Unauthenticated)
    }
}

/// Rejection type for authentication failures.
#[derive(Debug, Clone)]
pub enum AuthRejection {
    /// Route reached without passing through the middleware.
    Unauthenticated,
    /// Token missing or refused by the validator.
    Invalid(AuthError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let message = match &self {
            AuthRejection::Unauthenticated => "Authentication required".to_string(),
            AuthRejection::Invalid(e) => e.to_string(),
        };

        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": message,
                "code": "UNAUTHORIZED"
            })),
        )
            .into_response()
    }
}
