//! Review and comment text operations.
//!
//! Reads are public. Every mutation passes the ownership guard first and is
//! then issued as an owner-scoped store update.

use std::sync::Arc;

use thiserror::Error;

use dongne_core::{CommentId, ReviewId, ShopId, UserId};

use crate::db::{CommentStore, RepositoryError, ReviewStore};
use crate::models::{Comment, NewComment, NewReview, Review};
use crate::services::ownership::{OwnershipError, authorize};
use crate::storage::BlobStore;

/// Longest accepted review or comment body, in characters.
pub const MAX_BODY_CHARS: usize = 5000;

/// Errors from review and comment operations.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error(transparent)]
    Ownership(#[from] OwnershipError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("body must be between 1 and {max} characters", max = MAX_BODY_CHARS)]
    InvalidBody,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn validate_body(body: &str) -> Result<&str, ReviewError> {
    let body = body.trim();
    if body.is_empty() || body.chars().count() > MAX_BODY_CHARS {
        return Err(ReviewError::InvalidBody);
    }
    Ok(body)
}

// =============================================================================
// Reviews
// =============================================================================

/// Review text CRUD.
#[derive(Clone)]
pub struct ReviewService {
    reviews: Arc<dyn ReviewStore>,
    blobs: Arc<dyn BlobStore>,
}

impl ReviewService {
    #[must_use]
    pub fn new(reviews: Arc<dyn ReviewStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { reviews, blobs }
    }

    /// Create a review of `shop_id` owned by `principal`.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::InvalidBody` or `ReviewError::NotFound` if the
    /// shop does not exist.
    pub async fn create(
        &self,
        principal: UserId,
        shop_id: ShopId,
        body: &str,
    ) -> Result<Review, ReviewError> {
        let body = validate_body(body)?;
        let review = self
            .reviews
            .create_review(&NewReview {
                shop_id,
                user_id: principal,
                body: body.to_owned(),
            })
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => ReviewError::NotFound(format!("shop {shop_id}")),
                other => other.into(),
            })?;

        tracing::info!(review_id = %review.id, user_id = %principal, "Review created");
        Ok(review)
    }

    /// Get a review with its image slots.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::NotFound` if there is no such review.
    pub async fn get(&self, id: ReviewId) -> Result<Review, ReviewError> {
        self.reviews
            .find_review(id)
            .await?
            .ok_or_else(|| ReviewError::NotFound(format!("review {id}")))
    }

    /// Replace the body of a review.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::Ownership` if `principal` does not own it.
    pub async fn update_body(
        &self,
        id: ReviewId,
        principal: UserId,
        body: &str,
    ) -> Result<Review, ReviewError> {
        authorize(self.reviews.as_ref(), id, principal).await?;
        let body = validate_body(body)?;

        self.reviews
            .update_review_body(id, principal, body)
            .await?
            .ok_or_else(|| ReviewError::NotFound(format!("review {id}")))
    }

    /// Delete a review and the images attached to it.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::Ownership` if `principal` does not own it.
    pub async fn delete(&self, id: ReviewId, principal: UserId) -> Result<bool, ReviewError> {
        authorize(self.reviews.as_ref(), id, principal).await?;

        let images: Vec<String> = self
            .reviews
            .find_review(id)
            .await?
            .map(|r| r.images.into_iter().flatten().collect())
            .unwrap_or_default();

        let deleted = self.reviews.delete_review(id, principal).await?;
        if deleted {
            tracing::info!(review_id = %id, user_id = %principal, "Review deleted");
            for url in images {
                let Some(key) = self.blobs.key_for_url(&url) else {
                    continue;
                };
                if let Err(e) = self.blobs.delete(&key).await {
                    tracing::warn!(key, error = %e, "Failed to remove image of deleted review");
                }
            }
        }
        Ok(deleted)
    }
}

// =============================================================================
// Comments
// =============================================================================

/// Comment CRUD. Deletion is soft.
#[derive(Clone)]
pub struct CommentService {
    reviews: Arc<dyn ReviewStore>,
    comments: Arc<dyn CommentStore>,
}

impl CommentService {
    #[must_use]
    pub fn new(reviews: Arc<dyn ReviewStore>, comments: Arc<dyn CommentStore>) -> Self {
        Self { reviews, comments }
    }

    /// Live comments on a review, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::NotFound` if there is no such review.
    pub async fn list(&self, review_id: ReviewId) -> Result<Vec<Comment>, ReviewError> {
        if !self.reviews.exists(review_id).await? {
            return Err(ReviewError::NotFound(format!("review {review_id}")));
        }
        Ok(self.comments.list_comments(review_id).await?)
    }

    /// Comment on a review as `principal`.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::InvalidBody` or `ReviewError::NotFound` if the
    /// review does not exist.
    pub async fn create(
        &self,
        review_id: ReviewId,
        principal: UserId,
        body: &str,
    ) -> Result<Comment, ReviewError> {
        let body = validate_body(body)?;
        let comment = self
            .comments
            .create_comment(&NewComment {
                review_id,
                user_id: principal,
                body: body.to_owned(),
            })
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => ReviewError::NotFound(format!("review {review_id}")),
                other => other.into(),
            })?;

        tracing::info!(comment_id = %comment.id, review_id = %review_id, user_id = %principal, "Comment created");
        Ok(comment)
    }

    /// Replace the body of a live comment.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::Ownership` if `principal` does not own it, or
    /// `ReviewError::NotFound` if it was deleted.
    pub async fn update_body(
        &self,
        id: CommentId,
        principal: UserId,
        body: &str,
    ) -> Result<Comment, ReviewError> {
        authorize(self.comments.as_ref(), id, principal).await?;
        let body = validate_body(body)?;

        self.comments
            .update_comment_body(id, principal, body)
            .await?
            .ok_or_else(|| ReviewError::NotFound(format!("comment {id}")))
    }

    /// Soft-delete a comment.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::Ownership` if `principal` does not own it.
    pub async fn delete(&self, id: CommentId, principal: UserId) -> Result<bool, ReviewError> {
        authorize(self.comments.as_ref(), id, principal).await?;
        let deleted = self.comments.soft_delete_comment(id, principal).await?;
        if deleted {
            tracing::info!(comment_id = %id, user_id = %principal, "Comment deleted");
        }
        Ok(deleted)
    }
}
