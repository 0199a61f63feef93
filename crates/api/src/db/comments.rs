//! Comment repository for database operations.

use async_trait::async_trait;
use sqlx::PgPool;

use dongne_core::{CommentId, ReviewId, UserId};

use super::{RepositoryError, classify};
use crate::models::review::{Comment, NewComment};
use crate::services::ownership::OwnedResource;

const COMMENT_COLUMNS: &str = "id, review_id, user_id, body, deleted, created_at, updated_at";

/// Persistence for review comments.
#[async_trait]
pub trait CommentStore: OwnedResource<CommentId> {
    /// Insert a comment. Returns `RepositoryError::NotFound` if the review does not exist.
    async fn create_comment(&self, new: &NewComment) -> Result<Comment, RepositoryError>;

    /// Get a comment by ID, including soft-deleted ones.
    async fn find_comment(&self, id: CommentId) -> Result<Option<Comment>, RepositoryError>;

    /// Live comments on a review, oldest first.
    async fn list_comments(&self, review_id: ReviewId) -> Result<Vec<Comment>, RepositoryError>;

    /// Replace the body of a live comment owned by `owner`.
    async fn update_comment_body(
        &self,
        id: CommentId,
        owner: UserId,
        body: &str,
    ) -> Result<Option<Comment>, RepositoryError>;

    /// Mark a comment owned by `owner` as deleted. Idempotent; returns whether
    /// a row matched.
    async fn soft_delete_comment(
        &self,
        id: CommentId,
        owner: UserId,
    ) -> Result<bool, RepositoryError>;
}

/// `PostgreSQL` implementation of [`CommentStore`].
#[derive(Clone)]
pub struct CommentRepository {
    pool: PgPool,
}

impl CommentRepository {
    /// Create a new comment repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OwnedResource<CommentId> for CommentRepository {
    fn kind(&self) -> &'static str {
        "comment"
    }

    async fn is_owner(&self, id: CommentId, principal: UserId) -> Result<bool, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT count(*) FROM comments WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(principal)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn exists(&self, id: CommentId) -> Result<bool, RepositoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM comments WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

#[async_trait]
impl CommentStore for CommentRepository {
    async fn create_comment(&self, new: &NewComment) -> Result<Comment, RepositoryError> {
        sqlx::query_as::<_, Comment>(&format!(
            "INSERT INTO comments (review_id, user_id, body) VALUES ($1, $2, $3) \
             RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(new.review_id)
        .bind(new.user_id)
        .bind(&new.body)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "comment already exists"))
    }

    async fn find_comment(&self, id: CommentId) -> Result<Option<Comment>, RepositoryError> {
        let comment = sqlx::query_as::<_, Comment>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn list_comments(&self, review_id: ReviewId) -> Result<Vec<Comment>, RepositoryError> {
        let comments = sqlx::query_as::<_, Comment>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments \
             WHERE review_id = $1 AND NOT deleted ORDER BY created_at, id"
        ))
        .bind(review_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    async fn update_comment_body(
        &self,
        id: CommentId,
        owner: UserId,
        body: &str,
    ) -> Result<Option<Comment>, RepositoryError> {
        let comment = sqlx::query_as::<_, Comment>(&format!(
            "UPDATE comments SET body = $3, updated_at = now() \
             WHERE id = $1 AND user_id = $2 AND NOT deleted \
             RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(owner)
        .bind(body)
        .fetch_optional(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn soft_delete_comment(
        &self,
        id: CommentId,
        owner: UserId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE comments SET deleted = true, updated_at = now() \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
