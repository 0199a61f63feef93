//! Review and comment domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use dongne_core::{CommentId, ImageSlot, ReviewId, ShopId, UserId};

/// A review of a shop with up to five slot-indexed images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Review {
    pub id: ReviewId,
    pub shop_id: ShopId,
    /// Owning principal.
    pub user_id: UserId,
    pub body: String,
    pub like_count: i32,
    /// Public image URLs indexed by `ImageSlot::index()`.
    pub images: [Option<String>; ImageSlot::COUNT],
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    /// The image stored in `slot`, if any.
    #[must_use]
    pub fn image(&self, slot: ImageSlot) -> Option<&str> {
        self.images.get(slot.index()).and_then(Option::as_deref)
    }
}

/// Row shape of the `reviews` table.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ReviewRow {
    pub id: ReviewId,
    pub shop_id: ShopId,
    pub user_id: UserId,
    pub body: String,
    pub like_count: i32,
    pub image_1: Option<String>,
    pub image_2: Option<String>,
    pub image_3: Option<String>,
    pub image_4: Option<String>,
    pub image_5: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Self {
            id: row.id,
            shop_id: row.shop_id,
            user_id: row.user_id,
            body: row.body,
            like_count: row.like_count,
            images: [row.image_1, row.image_2, row.image_3, row.image_4, row.image_5],
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Input for creating a review.
#[derive(Debug, Clone)]
pub struct NewReview {
    pub shop_id: ShopId,
    pub user_id: UserId,
    pub body: String,
}

/// A comment on a review. Deleted comments keep their row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Comment {
    pub id: CommentId,
    pub review_id: ReviewId,
    /// Owning principal.
    pub user_id: UserId,
    pub body: String,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a comment.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub review_id: ReviewId,
    pub user_id: UserId,
    pub body: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_row_maps_columns_to_slots() {
        let now = Utc::now();
        let review = Review::from(ReviewRow {
            id: ReviewId::new(1),
            shop_id: ShopId::new(2),
            user_id: UserId::new(3),
            body: "good".to_owned(),
            like_count: 0,
            image_1: Some("one".to_owned()),
            image_2: None,
            image_3: Some("three".to_owned()),
            image_4: None,
            image_5: Some("five".to_owned()),
            created_at: now,
            updated_at: now,
        });

        let slot = |n| ImageSlot::new(n).unwrap();
        assert_eq!(review.image(slot(1)), Some("one"));
        assert_eq!(review.image(slot(2)), None);
        assert_eq!(review.image(slot(3)), Some("three"));
        assert_eq!(review.image(slot(5)), Some("five"));
    }
}
