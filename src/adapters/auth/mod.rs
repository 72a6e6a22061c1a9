//! Authentication adapters implementing the `TokenValidator` port.
//!
//! - `jwt` - HS256 tokens with a `user_id` claim
//! - `mock` - Fixed token table for tests

mod jwt;
mod mock;

pub use jwt::JwtTokenValidator;
pub use mock::MockTokenValidator;
