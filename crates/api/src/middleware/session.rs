//! Session middleware configuration.
//!
//! Server-side sessions hold nothing but the pending OAuth `state` between the
//! login redirect and the provider callback. API requests authenticate with
//! bearer tokens and never read the session.

use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};

use crate::config::ApiConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "dongne_oauth";

/// Session expiry time in seconds (10 minutes). Enough to finish a provider
/// consent screen.
const SESSION_EXPIRY_SECONDS: i64 = 10 * 60;

/// Create the session layer over `store`.
///
/// Production passes a `tower_sessions_sqlx_store::PostgresStore`; tests pass
/// `tower_sessions::MemoryStore`.
#[must_use]
pub fn create_session_layer<S>(store: S, config: &ApiConfig) -> SessionManagerLayer<S>
where
    S: SessionStore + Clone,
{
    // Determine if we're in production (HTTPS)
    let is_secure = config.base_url.starts_with("https://");

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(is_secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/auth")
}
