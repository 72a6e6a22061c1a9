//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresFeedStore` - Materialized feed rows
//! - `PostgresFeedJobRepository` - Materialization audit records
//! - `PostgresAudienceResolver` - Accepted connections from `friends`
//!
//! Schema lives in `migrations/` and is applied with [`run_migrations`].

mod audience_resolver;
mod feed_store;
mod job_repository;

pub use audience_resolver::PostgresAudienceResolver;
pub use feed_store::PostgresFeedStore;
pub use job_repository::PostgresFeedJobRepository;

use sqlx::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Applies the embedded schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DomainError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to run migrations: {}", e),
            )
        })
}
