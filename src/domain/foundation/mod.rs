//! Foundation module - Shared domain primitives.
//!
//! Identifiers, timestamps, the state machine trait and the error
//! vocabulary used across the feed pipeline.

mod auth;
mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use auth::AuthError;
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{EntryId, JobId, PostId, UserId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
