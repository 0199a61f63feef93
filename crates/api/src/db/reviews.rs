//! Review repository for database operations.
//!
//! Every mutation is scoped by `id AND user_id`, so a write issued by a
//! non-owner affects zero rows even if it slipped past the ownership check.

use async_trait::async_trait;
use sqlx::PgPool;

use dongne_core::{ImageSlot, ReviewId, UserId};

use super::{RepositoryError, classify};
use crate::models::review::{NewReview, Review, ReviewRow};
use crate::services::ownership::OwnedResource;

const REVIEW_COLUMNS: &str = "id, shop_id, user_id, body, like_count, \
                              image_1, image_2, image_3, image_4, image_5, \
                              created_at, updated_at";

/// Outcome of writing one image slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotWrite {
    /// The row was updated; `previous` is the reference the slot held before.
    Applied { previous: Option<String> },
    /// No row matched `id AND owner`; nothing changed.
    NoRowsAffected,
}

/// Persistence for reviews and their image slots.
#[async_trait]
pub trait ReviewStore: OwnedResource<ReviewId> {
    /// Insert a review. Returns `RepositoryError::NotFound` if the shop does not exist.
    async fn create_review(&self, new: &NewReview) -> Result<Review, RepositoryError>;

    /// Get a review by ID.
    async fn find_review(&self, id: ReviewId) -> Result<Option<Review>, RepositoryError>;

    /// Replace the body of a review owned by `owner`.
    async fn update_review_body(
        &self,
        id: ReviewId,
        owner: UserId,
        body: &str,
    ) -> Result<Option<Review>, RepositoryError>;

    /// Hard-delete a review owned by `owner`. Returns whether a row was removed.
    async fn delete_review(&self, id: ReviewId, owner: UserId) -> Result<bool, RepositoryError>;

    /// Set (`Some`) or clear (`None`) one image slot in a single transaction,
    /// scoped by `id AND owner`. Other slots are never touched.
    async fn write_image_slot(
        &self,
        id: ReviewId,
        owner: UserId,
        slot: ImageSlot,
        url: Option<&str>,
    ) -> Result<SlotWrite, RepositoryError>;
}

/// `PostgreSQL` implementation of [`ReviewStore`].
#[derive(Clone)]
pub struct ReviewRepository {
    pool: PgPool,
}

impl ReviewRepository {
    /// Create a new review repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OwnedResource<ReviewId> for ReviewRepository {
    fn kind(&self) -> &'static str {
        "review"
    }

    async fn is_owner(&self, id: ReviewId, principal: UserId) -> Result<bool, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT count(*) FROM reviews WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(principal)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn exists(&self, id: ReviewId) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM reviews WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

#[async_trait]
impl ReviewStore for ReviewRepository {
    async fn create_review(&self, new: &NewReview) -> Result<Review, RepositoryError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "INSERT INTO reviews (shop_id, user_id, body) VALUES ($1, $2, $3) \
             RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(new.shop_id)
        .bind(new.user_id)
        .bind(&new.body)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "review already exists"))?;
        Ok(row.into())
    }

    async fn find_review(&self, id: ReviewId) -> Result<Option<Review>, RepositoryError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Review::from))
    }

    async fn update_review_body(
        &self,
        id: ReviewId,
        owner: UserId,
        body: &str,
    ) -> Result<Option<Review>, RepositoryError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "UPDATE reviews SET body = $3, updated_at = now() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(id)
        .bind(owner)
        .bind(body)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Review::from))
    }

    async fn delete_review(&self, id: ReviewId, owner: UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn write_image_slot(
        &self,
        id: ReviewId,
        owner: UserId,
        slot: ImageSlot,
        url: Option<&str>,
    ) -> Result<SlotWrite, RepositoryError> {
        // Column names come from a closed set, never from input.
        let column = slot.column();
        let mut tx = self.pool.begin().await?;

        let previous: Option<Option<String>> = sqlx::query_scalar(&format!(
            "SELECT {column} FROM reviews WHERE id = $1 AND user_id = $2 FOR UPDATE"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(previous) = previous else {
            tx.rollback().await?;
            return Ok(SlotWrite::NoRowsAffected);
        };

        let result = sqlx::query(&format!(
            "UPDATE reviews SET {column} = $3, updated_at = now() \
             WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(owner)
        .bind(url)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(SlotWrite::NoRowsAffected);
        }

        tx.commit().await?;
        Ok(SlotWrite::Applied { previous })
    }
}
