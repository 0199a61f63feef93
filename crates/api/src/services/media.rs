//! Review image attachment.
//!
//! Each review has five independent image slots. An upload is a two-step
//! saga across stores that share no transaction: the blob is written first,
//! then the slot column is updated in a database transaction scoped by owner.
//! If that update touches no row, the blob written by this attempt is deleted
//! again before the error is returned.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use dongne_core::{ImageSlot, ReviewId, UserId};

use crate::db::{RepositoryError, ReviewStore, SlotWrite};
use crate::services::ownership::{OwnershipError, authorize};
use crate::storage::{BlobStore, StorageError, review_image_key};

/// Largest accepted image, in bytes.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Accepted image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
}

impl ImageFormat {
    /// Format for a MIME type, ignoring parameters and case.
    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Format for a file extension (`jpg`, `jpeg`, `png`, `gif`).
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
        }
    }
}

/// Errors from image upload and removal.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error(transparent)]
    Ownership(#[from] OwnershipError),

    #[error("unsupported media type '{0}' (expected jpg, jpeg, png or gif)")]
    UnsupportedMediaType(String),

    #[error("image is {size} bytes, larger than the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("image storage failed: {0}")]
    Storage(#[from] StorageError),

    /// The slot update affected no row; the uploaded blob was removed.
    #[error("review {0} was not updated")]
    UpdateFailed(ReviewId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Attaches images to review slots.
#[derive(Clone)]
pub struct MediaService {
    reviews: Arc<dyn ReviewStore>,
    blobs: Arc<dyn BlobStore>,
}

impl MediaService {
    #[must_use]
    pub fn new(reviews: Arc<dyn ReviewStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { reviews, blobs }
    }

    /// Store `bytes` as the image in `slot` of `review_id` and return its URL.
    ///
    /// Checks run in order: ownership, media type, size. Nothing is written
    /// to the blob store unless all three pass. The image previously in the
    /// slot, if any, is deleted after the update commits.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::Ownership` for a missing or foreign review,
    /// `UnsupportedMediaType`, `PayloadTooLarge`, `Storage` if the blob put
    /// fails, or `UpdateFailed` if the slot update affected no row.
    pub async fn upload(
        &self,
        review_id: ReviewId,
        principal: UserId,
        bytes: Bytes,
        mime: &str,
        slot: ImageSlot,
    ) -> Result<String, MediaError> {
        authorize(self.reviews.as_ref(), review_id, principal).await?;

        let format = ImageFormat::from_mime(mime)
            .ok_or_else(|| MediaError::UnsupportedMediaType(mime.to_owned()))?;

        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(MediaError::PayloadTooLarge {
                size: bytes.len(),
                max: MAX_IMAGE_BYTES,
            });
        }

        let key = review_image_key(review_id, slot, format.extension());
        let url = self.blobs.put(&key, bytes, format.mime()).await?;

        let write = self
            .reviews
            .write_image_slot(review_id, principal, slot, Some(&url))
            .await;

        match write {
            Ok(SlotWrite::Applied { previous }) => {
                tracing::info!(
                    review_id = %review_id,
                    user_id = %principal,
                    slot = %slot,
                    "Review image stored"
                );
                if let Some(previous) = previous.filter(|p| *p != url) {
                    self.discard(&previous).await;
                }
                Ok(url)
            }
            Ok(SlotWrite::NoRowsAffected) => {
                tracing::warn!(
                    review_id = %review_id,
                    user_id = %principal,
                    slot = %slot,
                    "Slot update affected no row, removing uploaded image"
                );
                self.compensate(&key).await;
                Err(MediaError::UpdateFailed(review_id))
            }
            Err(e) => {
                self.compensate(&key).await;
                Err(e.into())
            }
        }
    }

    /// Clear `slot` of `review_id`. Returns whether a row was updated.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::Ownership` for a missing or foreign review.
    pub async fn delete(
        &self,
        review_id: ReviewId,
        principal: UserId,
        slot: ImageSlot,
    ) -> Result<bool, MediaError> {
        authorize(self.reviews.as_ref(), review_id, principal).await?;

        match self
            .reviews
            .write_image_slot(review_id, principal, slot, None)
            .await?
        {
            SlotWrite::Applied { previous } => {
                tracing::info!(
                    review_id = %review_id,
                    user_id = %principal,
                    slot = %slot,
                    "Review image cleared"
                );
                if let Some(previous) = previous {
                    self.discard(&previous).await;
                }
                Ok(true)
            }
            SlotWrite::NoRowsAffected => Ok(false),
        }
    }

    /// Undo a put whose slot update did not happen.
    async fn compensate(&self, key: &str) {
        if let Err(e) = self.blobs.delete(key).await {
            tracing::error!(key, error = %e, "Failed to remove orphaned image");
        }
    }

    /// Remove the blob behind a URL that no slot references any more.
    async fn discard(&self, url: &str) {
        let Some(key) = self.blobs.key_for_url(url) else {
            tracing::debug!(url, "Previous image is not in this store, leaving it");
            return;
        };
        if let Err(e) = self.blobs.delete(&key).await {
            tracing::warn!(key, error = %e, "Failed to remove replaced image");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::db::MemoryDatabase;
    use crate::models::{NewReview, Review};
    use crate::services::ownership::OwnedResource;
    use dongne_core::ShopId;

    const OWNER: UserId = UserId::new(1);
    const STRANGER: UserId = UserId::new(2);

    #[derive(Default)]
    struct RecordingBlobs {
        puts: Mutex<Vec<String>>,
        deletes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BlobStore for RecordingBlobs {
        async fn put(
            &self,
            key: &str,
            _bytes: Bytes,
            _content_type: &str,
        ) -> Result<String, StorageError> {
            self.puts.lock().push(key.to_owned());
            Ok(self.url_for(key))
        }

        async fn delete(&self, key: &str) -> Result<(), StorageError> {
            self.deletes.lock().push(key.to_owned());
            Ok(())
        }

        fn url_for(&self, key: &str) -> String {
            format!("https://cdn.test/{key}")
        }

        fn key_for_url(&self, url: &str) -> Option<String> {
            url.strip_prefix("https://cdn.test/").map(str::to_owned)
        }
    }

    #[derive(Clone, Copy)]
    enum SlotFailure {
        /// The review changed hands between the check and the write.
        LostUpdate,
        /// The database went away mid-request.
        DatabaseDown,
    }

    /// Passes ownership checks but fails every slot update.
    struct FailingSlotStore(MemoryDatabase, SlotFailure);

    #[async_trait]
    impl OwnedResource<ReviewId> for FailingSlotStore {
        fn kind(&self) -> &'static str {
            "review"
        }

        async fn is_owner(&self, id: ReviewId, principal: UserId) -> Result<bool, RepositoryError> {
            OwnedResource::<ReviewId>::is_owner(&self.0, id, principal).await
        }

        async fn exists(&self, id: ReviewId) -> Result<bool, RepositoryError> {
            OwnedResource::<ReviewId>::exists(&self.0, id).await
        }
    }

    #[async_trait]
    impl ReviewStore for FailingSlotStore {
        async fn create_review(&self, new: &NewReview) -> Result<Review, RepositoryError> {
            self.0.create_review(new).await
        }

        async fn find_review(&self, id: ReviewId) -> Result<Option<Review>, RepositoryError> {
            self.0.find_review(id).await
        }

        async fn update_review_body(
            &self,
            id: ReviewId,
            owner: UserId,
            body: &str,
        ) -> Result<Option<Review>, RepositoryError> {
            self.0.update_review_body(id, owner, body).await
        }

        async fn delete_review(&self, id: ReviewId, owner: UserId) -> Result<bool, RepositoryError> {
            self.0.delete_review(id, owner).await
        }

        async fn write_image_slot(
            &self,
            _id: ReviewId,
            _owner: UserId,
            _slot: ImageSlot,
            _url: Option<&str>,
        ) -> Result<SlotWrite, RepositoryError> {
            match self.1 {
                SlotFailure::LostUpdate => Ok(SlotWrite::NoRowsAffected),
                SlotFailure::DatabaseDown => {
                    Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))
                }
            }
        }
    }

    async fn setup() -> (MemoryDatabase, Arc<RecordingBlobs>, MediaService, ReviewId) {
        let db = MemoryDatabase::new();
        db.insert_shop(ShopId::new(1));
        let review = db
            .create_review(&NewReview {
                shop_id: ShopId::new(1),
                user_id: OWNER,
                body: "great noodles".to_owned(),
            })
            .await
            .unwrap();
        let blobs = Arc::new(RecordingBlobs::default());
        let media = MediaService::new(Arc::new(db.clone()), blobs.clone());
        (db, blobs, media, review.id)
    }

    fn slot(n: i64) -> ImageSlot {
        ImageSlot::new(n).unwrap()
    }

    fn png() -> Bytes {
        Bytes::from_static(b"\x89PNG\r\n\x1a\n")
    }

    #[test]
    fn test_format_from_mime() {
        assert_eq!(ImageFormat::from_mime("image/JPEG"), Some(ImageFormat::Jpeg));
        assert_eq!(
            ImageFormat::from_mime("image/png; charset=binary"),
            Some(ImageFormat::Png)
        );
        assert_eq!(ImageFormat::from_mime("image/webp"), None);
        assert_eq!(ImageFormat::from_extension("JPG"), Some(ImageFormat::Jpeg));
    }

    #[tokio::test]
    async fn test_upload_sets_only_target_slot() {
        let (db, _, media, id) = setup().await;
        let url = media
            .upload(id, OWNER, png(), "image/png", slot(1))
            .await
            .unwrap();

        let review = db.find_review(id).await.unwrap().unwrap();
        assert_eq!(review.image(slot(1)), Some(url.as_str()));
        for n in 2..=5 {
            assert_eq!(review.image(slot(n)), None);
        }
    }

    #[tokio::test]
    async fn test_upload_leaves_other_slots_untouched() {
        let (db, _, media, id) = setup().await;
        let first = media.upload(id, OWNER, png(), "image/png", slot(2)).await.unwrap();
        let fourth = media.upload(id, OWNER, png(), "image/gif", slot(4)).await.unwrap();
        media.upload(id, OWNER, png(), "image/jpeg", slot(3)).await.unwrap();

        let review = db.find_review(id).await.unwrap().unwrap();
        assert_eq!(review.image(slot(2)), Some(first.as_str()));
        assert_eq!(review.image(slot(4)), Some(fourth.as_str()));
        assert_eq!(review.image(slot(1)), None);
        assert_eq!(review.image(slot(5)), None);
    }

    #[tokio::test]
    async fn test_non_owner_upload_is_forbidden_and_writes_nothing() {
        let (db, blobs, media, id) = setup().await;
        let err = media
            .upload(id, STRANGER, png(), "image/png", slot(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MediaError::Ownership(OwnershipError::Forbidden { .. })
        ));
        assert!(blobs.puts.lock().is_empty());
        assert!(db.find_review(id).await.unwrap().unwrap().images[0].is_none());
    }

    #[tokio::test]
    async fn test_non_owner_delete_is_forbidden() {
        let (_, _, media, id) = setup().await;
        media.upload(id, OWNER, png(), "image/png", slot(1)).await.unwrap();
        assert!(matches!(
            media.delete(id, STRANGER, slot(1)).await,
            Err(MediaError::Ownership(OwnershipError::Forbidden { .. }))
        ));
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected_before_put() {
        let (_, blobs, media, id) = setup().await;
        let big = Bytes::from(vec![0u8; 6 * 1024 * 1024]);
        assert!(matches!(
            media.upload(id, OWNER, big, "image/png", slot(1)).await,
            Err(MediaError::PayloadTooLarge { .. })
        ));
        assert!(blobs.puts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_exact_limit_is_accepted() {
        let (_, _, media, id) = setup().await;
        let max = Bytes::from(vec![0u8; MAX_IMAGE_BYTES]);
        assert!(media.upload(id, OWNER, max, "image/gif", slot(5)).await.is_ok());
    }

    #[tokio::test]
    async fn test_unsupported_type_rejected_before_put() {
        let (_, blobs, media, id) = setup().await;
        assert!(matches!(
            media.upload(id, OWNER, png(), "image/webp", slot(1)).await,
            Err(MediaError::UnsupportedMediaType(_))
        ));
        assert!(blobs.puts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_lost_update_deletes_uploaded_blob() {
        let (db, blobs, _, id) = setup().await;
        let media = MediaService::new(
            Arc::new(FailingSlotStore(db, SlotFailure::LostUpdate)),
            blobs.clone(),
        );

        let err = media
            .upload(id, OWNER, png(), "image/png", slot(1))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::UpdateFailed(r) if r == id));

        let puts = blobs.puts.lock().clone();
        assert_eq!(puts.len(), 1);
        assert_eq!(*blobs.deletes.lock(), puts);
    }

    #[tokio::test]
    async fn test_database_error_after_put_deletes_uploaded_blob() {
        let (db, blobs, _, id) = setup().await;
        let media = MediaService::new(
            Arc::new(FailingSlotStore(db.clone(), SlotFailure::DatabaseDown)),
            blobs.clone(),
        );

        let err = media
            .upload(id, OWNER, png(), "image/png", slot(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MediaError::Repository(RepositoryError::Database(_))
        ));

        let puts = blobs.puts.lock().clone();
        assert_eq!(puts.len(), 1);
        assert_eq!(*blobs.deletes.lock(), puts);
        assert!(db.find_review(id).await.unwrap().unwrap().image(slot(2)).is_none());
    }

    #[tokio::test]
    async fn test_overwrite_removes_previous_blob() {
        let (db, blobs, media, id) = setup().await;
        media.upload(id, OWNER, png(), "image/png", slot(1)).await.unwrap();
        let second = media.upload(id, OWNER, png(), "image/png", slot(1)).await.unwrap();

        let first_key = blobs.puts.lock()[0].clone();
        assert_eq!(*blobs.deletes.lock(), vec![first_key]);
        assert_eq!(
            db.find_review(id).await.unwrap().unwrap().image(slot(1)),
            Some(second.as_str())
        );
    }

    #[tokio::test]
    async fn test_delete_clears_slot_and_blob() {
        let (db, blobs, media, id) = setup().await;
        media.upload(id, OWNER, png(), "image/png", slot(3)).await.unwrap();

        assert!(media.delete(id, OWNER, slot(3)).await.unwrap());
        assert!(db.find_review(id).await.unwrap().unwrap().image(slot(3)).is_none());
        assert_eq!(blobs.deletes.lock().len(), 1);

        // Clearing an empty slot still matches the row.
        assert!(media.delete(id, OWNER, slot(3)).await.unwrap());
        assert_eq!(blobs.deletes.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_to_missing_review_is_not_found() {
        let (_, _, media, _) = setup().await;
        assert!(matches!(
            media
                .upload(ReviewId::new(404), OWNER, png(), "image/png", slot(1))
                .await,
            Err(MediaError::Ownership(OwnershipError::NotFound { .. }))
        ));
    }
}
