//! Business logic services for the API.
//!
//! # Services
//!
//! - `auth` - Local and federated login, registration, password changes
//! - `token` - Bearer token issuance and verification
//! - `ownership` - Owner-only guard for reviews and comments
//! - `media` - Slot-indexed review image uploads
//! - `reviews` - Review and comment text CRUD

pub mod auth;
pub mod media;
pub mod ownership;
pub mod reviews;
pub mod token;

pub use auth::{AuthError, LoginResult, LoginService};
pub use media::{MediaError, MediaService};
pub use ownership::OwnershipError;
pub use reviews::{CommentService, ReviewError, ReviewService};
pub use token::{TokenError, TokenService};
