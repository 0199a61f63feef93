//! In-memory implementation of every store.
//!
//! Backs the unit and integration tests. Unique email, unique federated
//! identity, the review-to-shop reference and owner-scoped mutations behave
//! as in the `PostgreSQL` schema. Shops are owned by the catalog, so tests
//! seed them with [`MemoryDatabase::insert_shop`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use dongne_core::{AccountType, CommentId, Email, ImageSlot, ReviewId, Role, ShopId, UserId};

use super::{CommentStore, RepositoryError, ReviewStore, SessionStore, SlotWrite, UserStore};
use crate::models::review::{Comment, NewComment, NewReview, Review};
use crate::models::user::{NewFederatedUser, NewLocalUser, User};
use crate::services::ownership::OwnedResource;

#[derive(Debug)]
struct UserRecord {
    user: User,
    password_hash: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<UserId, UserRecord>,
    sessions: HashMap<UserId, String>,
    shops: BTreeSet<ShopId>,
    reviews: BTreeMap<ReviewId, Review>,
    comments: BTreeMap<CommentId, Comment>,
    next_id: i32,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn email_taken(&self, email: &Email) -> bool {
        self.users
            .values()
            .any(|r| r.user.email.as_ref() == Some(email))
    }

    fn federated_taken(&self, provider: AccountType, external_id: &str) -> bool {
        self.users.values().any(|r| {
            r.user.federated_provider == Some(provider)
                && r.user.federated_id.as_deref() == Some(external_id)
        })
    }
}

/// Shared in-memory database. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<RwLock<State>>,
    session_writes: Arc<AtomicUsize>,
}

impl MemoryDatabase {
    /// Create an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save_token` calls so far.
    #[must_use]
    pub fn session_writes(&self) -> usize {
        self.session_writes.load(Ordering::SeqCst)
    }

    /// Make `id` a known shop.
    pub fn insert_shop(&self, id: ShopId) {
        self.state.write().shops.insert(id);
    }

    /// Insert a local account carrying raw password material as stored by an
    /// older system, with `must_reset` set.
    pub fn insert_legacy_user(&self, email: Email, stored_password: &str) -> User {
        let mut state = self.state.write();
        let now = Utc::now();
        let user = User {
            id: UserId::new(state.next_id()),
            account_type: AccountType::Local,
            email: Some(email),
            nickname: None,
            role: Role::User,
            federated_provider: None,
            federated_id: None,
            must_reset: true,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(
            user.id,
            UserRecord {
                user: user.clone(),
                password_hash: Some(stored_password.to_owned()),
            },
        );
        user
    }
}

// =============================================================================
// Users
// =============================================================================

#[async_trait]
impl UserStore for MemoryDatabase {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.state.read().users.get(&id).map(|r| r.user.clone()))
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .state
            .read()
            .users
            .values()
            .find(|r| r.user.email.as_ref() == Some(email))
            .map(|r| r.user.clone()))
    }

    async fn find_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<(User, Option<String>)>, RepositoryError> {
        Ok(self
            .state
            .read()
            .users
            .values()
            .find(|r| r.user.email.as_ref() == Some(email))
            .map(|r| (r.user.clone(), r.password_hash.clone())))
    }

    async fn find_password_hash(&self, id: UserId) -> Result<Option<String>, RepositoryError> {
        Ok(self
            .state
            .read()
            .users
            .get(&id)
            .and_then(|r| r.password_hash.clone()))
    }

    async fn find_by_federated_id(
        &self,
        provider: AccountType,
        external_id: &str,
    ) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .state
            .read()
            .users
            .values()
            .find(|r| {
                r.user.federated_provider == Some(provider)
                    && r.user.federated_id.as_deref() == Some(external_id)
            })
            .map(|r| r.user.clone()))
    }

    async fn create_local(&self, new: &NewLocalUser) -> Result<User, RepositoryError> {
        let mut state = self.state.write();
        if state.email_taken(&new.email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        let now = Utc::now();
        let user = User {
            id: UserId::new(state.next_id()),
            account_type: AccountType::Local,
            email: Some(new.email.clone()),
            nickname: new.nickname.clone(),
            role: new.role,
            federated_provider: None,
            federated_id: None,
            must_reset: false,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(
            user.id,
            UserRecord {
                user: user.clone(),
                password_hash: Some(new.password_hash.clone()),
            },
        );
        Ok(user)
    }

    async fn create_federated(&self, new: &NewFederatedUser) -> Result<User, RepositoryError> {
        let mut state = self.state.write();
        if state.federated_taken(new.provider, &new.external_id)
            || new.email.as_ref().is_some_and(|e| state.email_taken(e))
        {
            return Err(RepositoryError::Conflict(
                "federated identity or email already exists".to_owned(),
            ));
        }
        let now = Utc::now();
        let user = User {
            id: UserId::new(state.next_id()),
            account_type: new.provider,
            email: new.email.clone(),
            nickname: new.nickname.clone(),
            role: Role::User,
            federated_provider: Some(new.provider),
            federated_id: Some(new.external_id.clone()),
            must_reset: false,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(
            user.id,
            UserRecord {
                user: user.clone(),
                password_hash: None,
            },
        );
        Ok(user)
    }

    async fn link_federated_id(
        &self,
        id: UserId,
        provider: AccountType,
        external_id: &str,
    ) -> Result<User, RepositoryError> {
        let mut state = self.state.write();
        if state.federated_taken(provider, external_id) {
            return Err(RepositoryError::Conflict(
                "federated identity already linked".to_owned(),
            ));
        }
        let record = state.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        record.user.federated_provider = Some(provider);
        record.user.federated_id = Some(external_id.to_owned());
        record.user.updated_at = Utc::now();
        Ok(record.user.clone())
    }

    async fn update_password(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        let record = state.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        record.password_hash = Some(password_hash.to_owned());
        record.user.must_reset = false;
        record.user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_role(&self, email: &Email, role: Role) -> Result<User, RepositoryError> {
        let mut state = self.state.write();
        let record = state
            .users
            .values_mut()
            .find(|r| r.user.email.as_ref() == Some(email))
            .ok_or(RepositoryError::NotFound)?;
        record.user.role = role;
        record.user.updated_at = Utc::now();
        Ok(record.user.clone())
    }
}

// =============================================================================
// Sessions
// =============================================================================

#[async_trait]
impl SessionStore for MemoryDatabase {
    async fn save_token(&self, user_id: UserId, token: &str) -> Result<(), RepositoryError> {
        self.session_writes.fetch_add(1, Ordering::SeqCst);
        self.state
            .write()
            .sessions
            .insert(user_id, token.to_owned());
        Ok(())
    }

    async fn find_token(&self, user_id: UserId) -> Result<Option<String>, RepositoryError> {
        Ok(self.state.read().sessions.get(&user_id).cloned())
    }
}

// =============================================================================
// Reviews
// =============================================================================

#[async_trait]
impl OwnedResource<ReviewId> for MemoryDatabase {
    fn kind(&self) -> &'static str {
        "review"
    }

    async fn is_owner(&self, id: ReviewId, principal: UserId) -> Result<bool, RepositoryError> {
        Ok(self
            .state
            .read()
            .reviews
            .get(&id)
            .is_some_and(|r| r.user_id == principal))
    }

    async fn exists(&self, id: ReviewId) -> Result<bool, RepositoryError> {
        Ok(self.state.read().reviews.contains_key(&id))
    }
}

#[async_trait]
impl ReviewStore for MemoryDatabase {
    async fn create_review(&self, new: &NewReview) -> Result<Review, RepositoryError> {
        let mut state = self.state.write();
        if !state.shops.contains(&new.shop_id) {
            return Err(RepositoryError::NotFound);
        }
        let now = Utc::now();
        let review = Review {
            id: ReviewId::new(state.next_id()),
            shop_id: new.shop_id,
            user_id: new.user_id,
            body: new.body.clone(),
            like_count: 0,
            images: Default::default(),
            created_at: now,
            updated_at: now,
        };
        state.reviews.insert(review.id, review.clone());
        Ok(review)
    }

    async fn find_review(&self, id: ReviewId) -> Result<Option<Review>, RepositoryError> {
        Ok(self.state.read().reviews.get(&id).cloned())
    }

    async fn update_review_body(
        &self,
        id: ReviewId,
        owner: UserId,
        body: &str,
    ) -> Result<Option<Review>, RepositoryError> {
        let mut state = self.state.write();
        let Some(review) = state
            .reviews
            .get_mut(&id)
            .filter(|r| r.user_id == owner)
        else {
            return Ok(None);
        };
        body.clone_into(&mut review.body);
        review.updated_at = Utc::now();
        Ok(Some(review.clone()))
    }

    async fn delete_review(&self, id: ReviewId, owner: UserId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write();
        if !state.reviews.get(&id).is_some_and(|r| r.user_id == owner) {
            return Ok(false);
        }
        state.reviews.remove(&id);
        state.comments.retain(|_, c| c.review_id != id);
        Ok(true)
    }

    async fn write_image_slot(
        &self,
        id: ReviewId,
        owner: UserId,
        slot: ImageSlot,
        url: Option<&str>,
    ) -> Result<SlotWrite, RepositoryError> {
        let mut state = self.state.write();
        let Some(review) = state
            .reviews
            .get_mut(&id)
            .filter(|r| r.user_id == owner)
        else {
            return Ok(SlotWrite::NoRowsAffected);
        };
        let Some(cell) = review.images.get_mut(slot.index()) else {
            return Ok(SlotWrite::NoRowsAffected);
        };
        let previous = std::mem::replace(cell, url.map(str::to_owned));
        review.updated_at = Utc::now();
        Ok(SlotWrite::Applied { previous })
    }
}

// =============================================================================
// Comments
// =============================================================================

#[async_trait]
impl OwnedResource<CommentId> for MemoryDatabase {
    fn kind(&self) -> &'static str {
        "comment"
    }

    async fn is_owner(&self, id: CommentId, principal: UserId) -> Result<bool, RepositoryError> {
        Ok(self
            .state
            .read()
            .comments
            .get(&id)
            .is_some_and(|c| c.user_id == principal))
    }

    async fn exists(&self, id: CommentId) -> Result<bool, RepositoryError> {
        Ok(self.state.read().comments.contains_key(&id))
    }
}

#[async_trait]
impl CommentStore for MemoryDatabase {
    async fn create_comment(&self, new: &NewComment) -> Result<Comment, RepositoryError> {
        let mut state = self.state.write();
        if !state.reviews.contains_key(&new.review_id) {
            return Err(RepositoryError::NotFound);
        }
        let now = Utc::now();
        let comment = Comment {
            id: CommentId::new(state.next_id()),
            review_id: new.review_id,
            user_id: new.user_id,
            body: new.body.clone(),
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        state.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn find_comment(&self, id: CommentId) -> Result<Option<Comment>, RepositoryError> {
        Ok(self.state.read().comments.get(&id).cloned())
    }

    async fn list_comments(&self, review_id: ReviewId) -> Result<Vec<Comment>, RepositoryError> {
        Ok(self
            .state
            .read()
            .comments
            .values()
            .filter(|c| c.review_id == review_id && !c.deleted)
            .cloned()
            .collect())
    }

    async fn update_comment_body(
        &self,
        id: CommentId,
        owner: UserId,
        body: &str,
    ) -> Result<Option<Comment>, RepositoryError> {
        let mut state = self.state.write();
        let Some(comment) = state
            .comments
            .get_mut(&id)
            .filter(|c| c.user_id == owner && !c.deleted)
        else {
            return Ok(None);
        };
        body.clone_into(&mut comment.body);
        comment.updated_at = Utc::now();
        Ok(Some(comment.clone()))
    }

    async fn soft_delete_comment(
        &self,
        id: CommentId,
        owner: UserId,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write();
        let Some(comment) = state.comments.get_mut(&id).filter(|c| c.user_id == owner) else {
            return Ok(false);
        };
        comment.deleted = true;
        comment.updated_at = Utc::now();
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn email(s: &str) -> Email {
        Email::parse(s).unwrap()
    }

    async fn review(db: &MemoryDatabase, owner: i32) -> Review {
        db.insert_shop(ShopId::new(1));
        db.create_review(&NewReview {
            shop_id: ShopId::new(1),
            user_id: UserId::new(owner),
            body: "body".to_owned(),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let db = MemoryDatabase::new();
        let new = NewLocalUser {
            email: email("a@x.com"),
            password_hash: "h".to_owned(),
            nickname: None,
            role: Role::User,
        };
        db.create_local(&new).await.unwrap();
        assert!(matches!(
            db.create_local(&new).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_slot_write_returns_previous_and_leaves_others() {
        let db = MemoryDatabase::new();
        let r = review(&db, 1).await;
        let slot2 = ImageSlot::new(2).unwrap();

        let first = db
            .write_image_slot(r.id, UserId::new(1), slot2, Some("a"))
            .await
            .unwrap();
        assert_eq!(first, SlotWrite::Applied { previous: None });

        let second = db
            .write_image_slot(r.id, UserId::new(1), slot2, Some("b"))
            .await
            .unwrap();
        assert_eq!(
            second,
            SlotWrite::Applied {
                previous: Some("a".to_owned())
            }
        );

        let stored = db.find_review(r.id).await.unwrap().unwrap();
        assert_eq!(stored.image(slot2), Some("b"));
        assert_eq!(stored.images.iter().flatten().count(), 1);
    }

    #[tokio::test]
    async fn test_slot_write_by_non_owner_affects_nothing() {
        let db = MemoryDatabase::new();
        let r = review(&db, 1).await;
        let result = db
            .write_image_slot(r.id, UserId::new(2), ImageSlot::new(1).unwrap(), Some("x"))
            .await
            .unwrap();
        assert_eq!(result, SlotWrite::NoRowsAffected);
        assert!(db.find_review(r.id).await.unwrap().unwrap().images[0].is_none());
    }

    #[tokio::test]
    async fn test_soft_deleted_comments_are_hidden_from_list() {
        let db = MemoryDatabase::new();
        let r = review(&db, 1).await;
        let c = db
            .create_comment(&NewComment {
                review_id: r.id,
                user_id: UserId::new(2),
                body: "nice".to_owned(),
            })
            .await
            .unwrap();
        assert_eq!(db.list_comments(r.id).await.unwrap().len(), 1);

        assert!(db.soft_delete_comment(c.id, UserId::new(2)).await.unwrap());
        assert!(db.list_comments(r.id).await.unwrap().is_empty());
        assert!(db.find_comment(c.id).await.unwrap().unwrap().deleted);
    }

    #[tokio::test]
    async fn test_comment_on_missing_review_is_not_found() {
        let db = MemoryDatabase::new();
        let result = db
            .create_comment(&NewComment {
                review_id: ReviewId::new(42),
                user_id: UserId::new(1),
                body: "?".to_owned(),
            })
            .await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_save_token_upserts_and_counts() {
        let db = MemoryDatabase::new();
        db.save_token(UserId::new(1), "a").await.unwrap();
        db.save_token(UserId::new(1), "b").await.unwrap();
        assert_eq!(db.find_token(UserId::new(1)).await.unwrap().as_deref(), Some("b"));
        assert_eq!(db.session_writes(), 2);
    }

    #[tokio::test]
    async fn test_review_of_unknown_shop_is_not_found() {
        let db = MemoryDatabase::new();
        let err = db
            .create_review(&NewReview {
                shop_id: ShopId::new(77),
                user_id: UserId::new(1),
                body: "body".to_owned(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }
}
