//! HTTP middleware stack for the API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (`main.rs` only)
//! 2. `TraceLayer` (request span)
//! 3. Request ID (adopt or mint `x-request-id`)
//! 4. Security headers
//! 5. Session layer (tower-sessions; cookie scoped to `/auth`, OAuth state only)
//! 6. Rate limiting (governor) on `/auth` and `/api`, when enabled
//!
//! Authentication is not a layer: handlers opt in with [`RequireAuth`].

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{AuthRejection, RequireAuth};
pub use rate_limit::{api_rate_limiter, auth_rate_limiter};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;
