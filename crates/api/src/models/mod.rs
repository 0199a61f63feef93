//! Domain models for the API.

pub mod review;
pub mod session;
pub mod user;

pub use review::{Comment, NewComment, NewReview, Review};
pub use session::{Principal, keys as session_keys};
pub use user::{NewFederatedUser, NewLocalUser, User};
