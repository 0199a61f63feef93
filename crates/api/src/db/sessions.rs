//! Per-user session token records.
//!
//! At most one row per user holds the most recently issued bearer token, so a
//! repeat federated login can hand back the same token instead of minting a
//! new one.

use async_trait::async_trait;
use sqlx::PgPool;

use dongne_core::UserId;

use super::RepositoryError;

/// Persistence for the current token of each user.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Upsert the single token record for `user_id`. Same-user races are
    /// last-write-wins.
    async fn save_token(&self, user_id: UserId, token: &str) -> Result<(), RepositoryError>;

    /// The token last saved for `user_id`, if any.
    async fn find_token(&self, user_id: UserId) -> Result<Option<String>, RepositoryError>;
}

/// `PostgreSQL` implementation of [`SessionStore`].
#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    /// Create a new session repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn save_token(&self, user_id: UserId, token: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_sessions (user_id, token) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET token = EXCLUDED.token, updated_at = now()",
        )
        .bind(user_id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_token(&self, user_id: UserId) -> Result<Option<String>, RepositoryError> {
        let token = sqlx::query_scalar("SELECT token FROM user_sessions WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(token)
    }
}
