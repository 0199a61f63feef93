//! Database operations for the API's `PostgreSQL` store.
//!
//! ## Tables
//!
//! - `users` - Local and federated accounts
//! - `user_sessions` - Most recently issued token per user
//! - `shops` - Businesses listed in the directory (owned by the catalog CRUD)
//! - `reviews` - Shop reviews with five image slot columns
//! - `comments` - Review comments (soft-deleted)
//! - `tower_sessions.session` - OAuth login state
//!
//! Every store is a trait with a `PostgreSQL` repository and an in-memory
//! implementation in [`memory`].
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p dongne-cli -- migrate
//! ```

pub mod comments;
pub mod memory;
pub mod reviews;
pub mod sessions;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use comments::{CommentRepository, CommentStore};
pub use memory::MemoryDatabase;
pub use reviews::{ReviewRepository, ReviewStore, SlotWrite};
pub use sessions::{SessionRepository, SessionStore};
pub use users::{UserRepository, UserStore};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Map unique and foreign-key violations to domain errors.
pub(crate) fn classify(err: sqlx::Error, conflict: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return RepositoryError::Conflict(conflict.to_owned());
        }
        if db_err.is_foreign_key_violation() {
            return RepositoryError::NotFound;
        }
    }
    RepositoryError::Database(err)
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
