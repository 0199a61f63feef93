//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::db::{
    CommentRepository, CommentStore, MemoryDatabase, ReviewRepository, ReviewStore,
    SessionRepository, SessionStore, UserRepository, UserStore,
};
use crate::federation::IdentityGateway;
use crate::services::{CommentService, LoginService, MediaService, ReviewService, TokenService};
use crate::storage::BlobStore;

/// The persistence backends the services run on.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub reviews: Arc<dyn ReviewStore>,
    pub comments: Arc<dyn CommentStore>,
}

impl Stores {
    /// `PostgreSQL` repositories sharing `pool`.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            users: Arc::new(UserRepository::new(pool.clone())),
            sessions: Arc::new(SessionRepository::new(pool.clone())),
            reviews: Arc::new(ReviewRepository::new(pool.clone())),
            comments: Arc::new(CommentRepository::new(pool.clone())),
        }
    }

    /// Every store backed by one in-memory database.
    #[must_use]
    pub fn memory(db: &MemoryDatabase) -> Self {
        Self {
            users: Arc::new(db.clone()),
            sessions: Arc::new(db.clone()),
            reviews: Arc::new(db.clone()),
            comments: Arc::new(db.clone()),
        }
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// configuration and the services built from it.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: Option<PgPool>,
    tokens: TokenService,
    login: LoginService,
    reviews: ReviewService,
    comments: CommentService,
    media: MediaService,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - API configuration
    /// * `stores` - Persistence backends
    /// * `gateway` - Identity provider gateway
    /// * `blobs` - Image blob store
    /// * `pool` - Pool checked by the readiness endpoint, if the stores use one
    #[must_use]
    pub fn new(
        config: ApiConfig,
        stores: Stores,
        gateway: Arc<dyn IdentityGateway>,
        blobs: Arc<dyn BlobStore>,
        pool: Option<PgPool>,
    ) -> Self {
        let tokens = TokenService::new(&config.token.secret, config.token.ttl);
        let login = LoginService::new(
            stores.users,
            stores.sessions,
            gateway,
            tokens.clone(),
        );
        let reviews = ReviewService::new(stores.reviews.clone(), blobs.clone());
        let comments = CommentService::new(stores.reviews.clone(), stores.comments);
        let media = MediaService::new(stores.reviews, blobs);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                tokens,
                login,
                reviews,
                comments,
                media,
            }),
        }
    }

    /// Get a reference to the API configuration.
    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Get the database pool, if the stores are `PostgreSQL`-backed.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.inner.tokens
    }

    #[must_use]
    pub fn login(&self) -> &LoginService {
        &self.inner.login
    }

    #[must_use]
    pub fn reviews(&self) -> &ReviewService {
        &self.inner.reviews
    }

    #[must_use]
    pub fn comments(&self) -> &CommentService {
        &self.inner.comments
    }

    #[must_use]
    pub fn media(&self) -> &MediaService {
        &self.inner.media
    }
}
