//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::federation::ProviderError;
use crate::services::token::TokenError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] dongne_core::EmailError),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Authorization code could not be exchanged.
    #[error("federated login failed: {0}")]
    FederationExchangeFailed(#[source] ProviderError),

    /// Provider profile could not be retrieved.
    #[error("federated login failed: {0}")]
    FederationProfileFailed(#[source] ProviderError),

    /// Provider is unknown, disabled, or misconfigured.
    #[error(transparent)]
    Provider(ProviderError),

    /// OAuth `state` missing from the session or not matching.
    #[error("invalid session state")]
    InvalidSessionState,

    /// Token could not be issued or verified.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
