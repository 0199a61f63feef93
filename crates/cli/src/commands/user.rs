//! User account management commands.
//!
//! # Usage
//!
//! ```bash
//! dongne user create -e owner@example.com -p 'long password' -n Owner [--admin]
//! dongne user promote -e owner@example.com
//! ```

use dongne_api::db::{RepositoryError, UserRepository, UserStore};
use dongne_api::models::NewLocalUser;
use dongne_api::services::auth::{AuthError, hash_password, validate_password};
use dongne_core::{Email, EmailError, Role};
use thiserror::Error;

use super::{CommandError, connect};

/// Errors that can occur during user operations.
#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Password rejected or could not be hashed.
    #[error(transparent)]
    Password(#[from] AuthError),

    /// User already exists.
    #[error("User already exists with email: {0}")]
    UserExists(String),

    /// No account with this email.
    #[error("No user with email: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Create a password account.
///
/// # Returns
///
/// The ID of the created user.
pub async fn create(
    email: &str,
    password: &str,
    nickname: Option<String>,
    admin: bool,
) -> Result<i32, UserError> {
    let email = Email::parse(email)?;
    validate_password(password)?;
    let password_hash = hash_password(password)?;
    let role = if admin { Role::Admin } else { Role::User };

    let users = UserRepository::new(connect().await?);

    tracing::info!("Creating user: {} ({:?})", email, role);
    let user = users
        .create_local(&NewLocalUser {
            email: email.clone(),
            password_hash,
            nickname,
            role,
        })
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => UserError::UserExists(email.to_string()),
            other => other.into(),
        })?;

    tracing::info!("Created user {} with id {}", email, user.id);
    Ok(user.id.as_i32())
}

/// Grant the admin role to an existing account.
pub async fn promote(email: &str) -> Result<(), UserError> {
    let email = Email::parse(email)?;
    let users = UserRepository::new(connect().await?);

    users
        .set_role(&email, Role::Admin)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => UserError::NotFound(email.to_string()),
            other => other.into(),
        })?;

    tracing::info!("Promoted {} to admin", email);
    Ok(())
}
