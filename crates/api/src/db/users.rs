//! User repository for database operations.

use async_trait::async_trait;
use sqlx::PgPool;

use dongne_core::{AccountType, Email, Role, UserId};

use super::{RepositoryError, classify};
use crate::models::user::{NewFederatedUser, NewLocalUser, User};

const USER_COLUMNS: &str = "id, account_type, email, nickname, role, federated_provider, \
                            federated_id, must_reset, created_at, updated_at";

/// Persistence for accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Get a user by ID.
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Get a user by email address.
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Get a user and their stored password material by email.
    ///
    /// The second element is `None` for accounts that never set a password.
    async fn find_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<(User, Option<String>)>, RepositoryError>;

    /// Get the stored password material for a user.
    async fn find_password_hash(&self, id: UserId) -> Result<Option<String>, RepositoryError>;

    /// Look up the account linked to `(provider, external_id)`.
    async fn find_by_federated_id(
        &self,
        provider: AccountType,
        external_id: &str,
    ) -> Result<Option<User>, RepositoryError>;

    /// Create a password account.
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    async fn create_local(&self, new: &NewLocalUser) -> Result<User, RepositoryError>;

    /// Create an account from a first federated login.
    ///
    /// Returns `RepositoryError::Conflict` if the federated identity or email
    /// already exists.
    async fn create_federated(&self, new: &NewFederatedUser) -> Result<User, RepositoryError>;

    /// Attach a federated identity to an existing account.
    async fn link_federated_id(
        &self,
        id: UserId,
        provider: AccountType,
        external_id: &str,
    ) -> Result<User, RepositoryError>;

    /// Replace the password hash and clear the must-reset flag.
    async fn update_password(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError>;

    /// Change the role of the account with this email.
    async fn set_role(&self, email: &Email, role: Role) -> Result<User, RepositoryError>;
}

/// `PostgreSQL` implementation of [`UserStore`].
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    #[sqlx(flatten)]
    user: User,
    password_hash: Option<String>,
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<(User, Option<String>)>, RepositoryError> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| (r.user, r.password_hash)))
    }

    async fn find_password_hash(&self, id: UserId) -> Result<Option<String>, RepositoryError> {
        let hash: Option<Option<String>> =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(hash.flatten())
    }

    async fn find_by_federated_id(
        &self,
        provider: AccountType,
        external_id: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE federated_provider = $1 AND federated_id = $2"
        ))
        .bind(provider)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_local(&self, new: &NewLocalUser) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (account_type, email, password_hash, nickname, role) \
             VALUES ('local', $1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.nickname)
        .bind(new.role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "email already exists"))
    }

    async fn create_federated(&self, new: &NewFederatedUser) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (account_type, email, nickname, federated_provider, federated_id) \
             VALUES ($1, $2, $3, $1, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(new.provider)
        .bind(&new.email)
        .bind(&new.nickname)
        .bind(&new.external_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "federated identity or email already exists"))
    }

    async fn link_federated_id(
        &self,
        id: UserId,
        provider: AccountType,
        external_id: &str,
    ) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET federated_provider = $2, federated_id = $3, updated_at = now() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(provider)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify(e, "federated identity already linked"))?
        .ok_or(RepositoryError::NotFound)
    }

    async fn update_password(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, must_reset = false, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn set_role(&self, email: &Email, role: Role) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET role = $2, updated_at = now() WHERE email = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }
}
