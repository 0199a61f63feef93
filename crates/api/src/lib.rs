//! Dongne API library.
//!
//! REST backend for shop reviews: password and federated login with bearer
//! tokens, owner-only review and comment editing, and five image slots per
//! review backed by an object store.
//!
//! The binary in `main.rs` wires [`app`] to `PostgreSQL` and the configured
//! blob store; tests wire it to [`db::MemoryDatabase`] instead.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod federation;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;

use axum::{Router, body::Body, http::Request};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tower_sessions::SessionStore;

use crate::config::StorageBackend;
use crate::state::AppState;

/// Build the full application router.
///
/// `session_store` holds OAuth `state` between the login redirect and the
/// provider callback.
pub fn app<S>(state: AppState, session_store: S) -> Router
where
    S: SessionStore + Clone,
{
    let config = state.config();
    let mut router = routes::routes(config.rate_limit);

    if let StorageBackend::Local { root } = &config.storage.backend {
        router = router.nest_service("/uploads", ServeDir::new(root));
    }

    let session_layer = middleware::create_session_layer(session_store, config);

    router
        .layer(session_layer)
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}
