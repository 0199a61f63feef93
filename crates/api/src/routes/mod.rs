//! HTTP route handlers for the API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                          - Liveness check
//! GET    /health/ready                    - Readiness check (database)
//!
//! # Auth (strict rate limit)
//! POST   /auth/register                   - Create a password account
//! POST   /auth/login                      - Password login, returns a bearer token
//! GET    /auth/{provider}/login           - Redirect to kakao, naver or google
//! GET    /auth/{provider}/callback        - Provider redirect back, returns a bearer token
//! POST   /auth/{provider}/token           - Code exchange for native clients
//!
//! # API (bearer token unless noted)
//! GET    /api/me                          - Current principal
//! PUT    /api/me/password                 - Change password
//! POST   /api/reviews                     - Create review
//! GET    /api/reviews/{id}                - Review with image slots (public)
//! PATCH  /api/reviews/{id}                - Edit review body
//! DELETE /api/reviews/{id}                - Delete review
//! PUT    /api/reviews/{id}/images/{slot}  - Upload slot image (multipart "image")
//! DELETE /api/reviews/{id}/images/{slot}  - Clear slot
//! GET    /api/reviews/{id}/comments       - Live comments (public)
//! POST   /api/reviews/{id}/comments       - Comment on review
//! PATCH  /api/comments/{id}               - Edit comment
//! DELETE /api/comments/{id}               - Soft-delete comment
//! ```

pub mod auth;
pub mod comments;
pub mod health;
pub mod me;
pub mod oauth;
pub mod reviews;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
};

use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::services::media::MAX_IMAGE_BYTES;
use crate::state::AppState;

/// Body limit on the upload route. Larger than the image limit so oversized
/// images reach the media service and get a precise 413.
const UPLOAD_BODY_LIMIT: usize = MAX_IMAGE_BYTES + 3 * 1024 * 1024;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/{provider}/login", get(oauth::login))
        .route("/{provider}/callback", get(oauth::callback))
        .route("/{provider}/token", post(oauth::token))
}

/// Create the API routes router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(me::show))
        .route("/me/password", put(me::change_password))
        .route("/reviews", post(reviews::create))
        .route(
            "/reviews/{id}",
            get(reviews::show)
                .patch(reviews::update)
                .delete(reviews::delete),
        )
        .route(
            "/reviews/{id}/images/{slot}",
            put(reviews::upload_image)
                .delete(reviews::delete_image)
                .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/reviews/{id}/comments",
            get(comments::list).post(comments::create),
        )
        .route(
            "/comments/{id}",
            patch(comments::update).delete(comments::delete),
        )
}

/// Create all routes, rate limited when `rate_limit` is set.
pub fn routes(rate_limit: bool) -> Router<AppState> {
    let (auth, api) = if rate_limit {
        (
            auth_routes().layer(auth_rate_limiter()),
            api_routes().layer(api_rate_limiter()),
        )
    } else {
        (auth_routes(), api_routes())
    };

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/auth", auth)
        .nest("/api", api)
}
