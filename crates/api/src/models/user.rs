//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use dongne_core::{AccountType, Email, Role, UserId};

/// A platform account (domain type).
///
/// The password hash is not part of this type; it is only read
/// through [`UserStore::find_credentials`](crate::db::users::UserStore::find_credentials).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    /// `local` for password accounts, otherwise the provider that created it.
    pub account_type: AccountType,
    /// Absent for federation-only accounts whose provider shared no email.
    pub email: Option<Email>,
    pub nickname: Option<String>,
    pub role: Role,
    /// Provider of the linked federated identity, if any.
    #[serde(skip)]
    pub federated_provider: Option<AccountType>,
    /// Provider-scoped external user id, unique per provider.
    #[serde(skip)]
    pub federated_id: Option<String>,
    /// Set on accounts migrated with a legacy plaintext password.
    pub must_reset: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a password account.
#[derive(Debug, Clone)]
pub struct NewLocalUser {
    pub email: Email,
    pub password_hash: String,
    pub nickname: Option<String>,
    pub role: Role,
}

/// Input for creating an account from a first federated login.
#[derive(Debug, Clone)]
pub struct NewFederatedUser {
    pub provider: AccountType,
    pub external_id: String,
    pub email: Option<Email>,
    pub nickname: Option<String>,
}
