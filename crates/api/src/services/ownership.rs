//! Ownership authorization for user-owned resources.
//!
//! Reviews, comments, and review image slots may only be mutated by the
//! principal that created them. The check re-reads ownership from the store on
//! every call and is never cached; the store-side mutation that follows is
//! additionally scoped by owner, so a resource that changes hands between the
//! check and the write is not modified.

use std::fmt::Display;

use async_trait::async_trait;
use thiserror::Error;

use dongne_core::UserId;

use crate::db::RepositoryError;

/// A store that can answer ownership questions for resources keyed by `Id`.
#[async_trait]
pub trait OwnedResource<Id>: Send + Sync
where
    Id: Copy + Send + Sync + 'static,
{
    /// Resource kind used in logs and errors.
    fn kind(&self) -> &'static str;

    /// `true` iff a resource with `id` exists and is owned by `principal`.
    ///
    /// One round trip: `count(*) where id = ? and owner = ?`.
    async fn is_owner(&self, id: Id, principal: UserId) -> Result<bool, RepositoryError>;

    /// `true` iff a resource with `id` exists, regardless of owner.
    async fn exists(&self, id: Id) -> Result<bool, RepositoryError>;
}

/// Ownership check failure.
#[derive(Debug, Error)]
pub enum OwnershipError {
    /// The resource exists but belongs to someone else.
    #[error("{kind} {id} is not owned by user {principal}")]
    Forbidden {
        kind: &'static str,
        id: String,
        principal: UserId,
    },

    /// No resource with this id.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Require `principal` to own the resource `id`.
///
/// A failed ownership check costs a second query to tell a missing resource
/// (`NotFound`) apart from someone else's (`Forbidden`).
///
/// # Errors
///
/// Returns `OwnershipError::Forbidden`, `OwnershipError::NotFound`, or a
/// repository error.
pub async fn authorize<Id, S>(store: &S, id: Id, principal: UserId) -> Result<(), OwnershipError>
where
    Id: Copy + Display + Send + Sync + 'static,
    S: OwnedResource<Id> + ?Sized,
{
    if store.is_owner(id, principal).await? {
        return Ok(());
    }

    let kind = OwnedResource::<Id>::kind(store);
    if store.exists(id).await? {
        tracing::warn!(
            resource = kind,
            resource_id = %id,
            user_id = %principal,
            "Ownership check failed"
        );
        Err(OwnershipError::Forbidden {
            kind,
            id: id.to_string(),
            principal,
        })
    } else {
        Err(OwnershipError::NotFound {
            kind,
            id: id.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryDatabase;
    use crate::db::reviews::ReviewStore;
    use crate::models::NewReview;
    use dongne_core::{ReviewId, ShopId};

    async fn seeded() -> (MemoryDatabase, ReviewId) {
        let db = MemoryDatabase::new();
        db.insert_shop(ShopId::new(1));
        let review = db
            .create_review(&NewReview {
                shop_id: ShopId::new(1),
                user_id: UserId::new(1),
                body: "tasty".to_owned(),
            })
            .await
            .unwrap();
        (db, review.id)
    }

    #[tokio::test]
    async fn test_owner_is_authorized() {
        let (db, id) = seeded().await;
        assert!(authorize(&db, id, UserId::new(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_non_owner_is_forbidden() {
        let (db, id) = seeded().await;
        let err = authorize(&db, id, UserId::new(2)).await.unwrap_err();
        assert!(matches!(err, OwnershipError::Forbidden { kind: "review", .. }));
    }

    #[tokio::test]
    async fn test_missing_resource_is_not_found() {
        let (db, _) = seeded().await;
        let err = authorize(&db, ReviewId::new(999), UserId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, OwnershipError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_ownership_is_reread_on_every_call() {
        let (db, id) = seeded().await;
        assert!(authorize(&db, id, UserId::new(1)).await.is_ok());
        assert!(db.delete_review(id, UserId::new(1)).await.unwrap());
        assert!(matches!(
            authorize(&db, id, UserId::new(1)).await,
            Err(OwnershipError::NotFound { .. })
        ));
    }
}
