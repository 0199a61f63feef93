//! Authentication service.
//!
//! Provides local password login, federated login through an identity
//! provider, registration, and password changes. Every successful login ends
//! with a bearer token recorded in the session store.

mod error;
mod password;

pub use error::AuthError;
pub use password::{MIN_PASSWORD_LENGTH, hash_password, validate_password};

use std::sync::Arc;

use dongne_core::{Email, Role, UserId};

use crate::db::{RepositoryError, SessionStore, UserStore};
use crate::federation::{FederatedProfile, IdentityGateway, Provider};
use crate::models::user::{NewFederatedUser, NewLocalUser, User};
use crate::services::token::TokenService;
use password::{reject_without_account, verify_password};

/// A logged-in principal and the bearer token to present on later requests.
#[derive(Debug, Clone)]
pub struct LoginResult {
    pub user: User,
    pub token: String,
}

/// Authentication service.
///
/// Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct LoginService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    gateway: Arc<dyn IdentityGateway>,
    tokens: TokenService,
}

impl LoginService {
    /// Create a new authentication service.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        gateway: Arc<dyn IdentityGateway>,
        tokens: TokenService,
    ) -> Self {
        Self {
            users,
            sessions,
            gateway,
            tokens,
        }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Register a new user with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        nickname: Option<String>,
    ) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let user = self
            .users
            .create_local(&NewLocalUser {
                email,
                password_hash,
                nickname,
                role: Role::User,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Login with email and password.
    ///
    /// Always issues and saves a fresh token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong,
    /// without revealing which.
    pub async fn login_local(&self, email: &str, password: &str) -> Result<LoginResult, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let Some((user, Some(stored))) = self.users.find_credentials(&email).await? else {
            return Err(reject_without_account(password));
        };

        verify_password(user.id, password, &stored, user.must_reset)?;

        let token = self.issue_and_save(&user).await?;
        tracing::info!(user_id = %user.id, "Local login");
        Ok(LoginResult { user, token })
    }

    /// The account behind an authenticated principal.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the account no longer exists.
    pub async fn profile(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)
    }

    /// Change the password of `user_id`, clearing any must-reset flag.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if `current` does not match,
    /// or `AuthError::WeakPassword` if `new` is too short.
    pub async fn change_password(
        &self,
        user_id: UserId,
        current: &str,
        new: &str,
    ) -> Result<(), AuthError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        let stored = self
            .users
            .find_password_hash(user_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(user_id, current, &stored, user.must_reset)?;
        validate_password(new)?;

        let hash = hash_password(new)?;
        self.users.update_password(user_id, &hash).await?;
        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    // =========================================================================
    // Federated Authentication
    // =========================================================================

    /// Authorization URL for `provider` carrying `state`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Provider` if the provider is not configured.
    pub fn authorization_url(&self, provider: Provider, state: &str) -> Result<String, AuthError> {
        self.gateway
            .build_authorization_url(provider, state)
            .map_err(AuthError::Provider)
    }

    /// Complete a federated login with an authorization code.
    ///
    /// A returning principal with a still-valid stored token gets that token
    /// back without a session write. No account is created unless the profile
    /// was retrieved.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::FederationExchangeFailed` or
    /// `AuthError::FederationProfileFailed` when the provider calls fail.
    pub async fn login_federated(
        &self,
        provider: Provider,
        code: &str,
    ) -> Result<LoginResult, AuthError> {
        let provider_token = self
            .gateway
            .exchange_code_for_token(provider, code)
            .await
            .map_err(AuthError::FederationExchangeFailed)?;

        let profile = self
            .gateway
            .fetch_profile(provider, &provider_token.access_token)
            .await
            .map_err(AuthError::FederationProfileFailed)?;

        let user = match self
            .users
            .find_by_federated_id(provider.account_type(), &profile.external_id)
            .await?
        {
            Some(user) => {
                if let Some(token) = self.reusable_token(&user).await? {
                    tracing::info!(user_id = %user.id, provider = %provider, "Federated login, token reused");
                    return Ok(LoginResult { user, token });
                }
                user
            }
            None => self.create_or_link(&profile).await?,
        };

        let token = self.issue_and_save(&user).await?;
        tracing::info!(user_id = %user.id, provider = %provider, "Federated login");
        Ok(LoginResult { user, token })
    }

    /// The stored token for `user`, if it still verifies and carries the
    /// user's current role.
    async fn reusable_token(&self, user: &User) -> Result<Option<String>, AuthError> {
        let Some(token) = self.sessions.find_token(user.id).await? else {
            return Ok(None);
        };
        match self.tokens.verify(&token) {
            Ok(principal) if principal.id == user.id && principal.role == user.role => {
                Ok(Some(token))
            }
            Ok(_) | Err(_) => {
                tracing::debug!(user_id = %user.id, "Stored token no longer valid");
                Ok(None)
            }
        }
    }

    /// First login for this federated identity: attach it to the account
    /// with the same email, or create a new account.
    async fn create_or_link(&self, profile: &FederatedProfile) -> Result<User, AuthError> {
        let account_type = profile.provider.account_type();
        let email = profile
            .email
            .as_deref()
            .and_then(|raw| Email::parse(raw).ok());

        if let Some(email) = &email
            && let Some(existing) = self.users.find_by_email(email).await?
            && existing.federated_id.is_none()
        {
            let user = self
                .users
                .link_federated_id(existing.id, account_type, &profile.external_id)
                .await?;
            tracing::info!(user_id = %user.id, provider = %profile.provider, "Federated identity linked");
            return Ok(user);
        }

        let new = NewFederatedUser {
            provider: account_type,
            external_id: profile.external_id.clone(),
            // An email already owned by another account stays with that account.
            email: match &email {
                Some(e) if self.users.find_by_email(e).await?.is_some() => None,
                other => other.clone(),
            },
            nickname: profile.display_name.clone(),
        };

        match self.users.create_federated(&new).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, provider = %profile.provider, "Federated user created");
                Ok(user)
            }
            // A concurrent first login for the same identity won the insert.
            Err(RepositoryError::Conflict(_)) => self
                .users
                .find_by_federated_id(account_type, &profile.external_id)
                .await?
                .ok_or(AuthError::UserAlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn issue_and_save(&self, user: &User) -> Result<String, AuthError> {
        let token = self.tokens.issue(user.id, user.role)?;
        self.sessions.save_token(user.id, &token).await?;
        Ok(token)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use secrecy::SecretString;

    use super::*;
    use crate::db::MemoryDatabase;
    use crate::federation::{ProviderError, ProviderToken};
    use dongne_core::AccountType;

    struct StubGateway {
        external_id: String,
        email: Option<String>,
        fail_profile: AtomicBool,
    }

    impl StubGateway {
        fn new(external_id: &str, email: Option<&str>) -> Self {
            Self {
                external_id: external_id.to_owned(),
                email: email.map(str::to_owned),
                fail_profile: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl IdentityGateway for StubGateway {
        fn build_authorization_url(
            &self,
            provider: Provider,
            state: &str,
        ) -> Result<String, ProviderError> {
            Ok(format!("https://{provider}.test/authorize?state={state}"))
        }

        async fn exchange_code_for_token(
            &self,
            provider: Provider,
            code: &str,
        ) -> Result<ProviderToken, ProviderError> {
            if code == "bad" {
                return Err(ProviderError::ExchangeFailed {
                    provider,
                    reason: "invalid_grant".to_owned(),
                });
            }
            Ok(ProviderToken {
                access_token: format!("access-{code}"),
                refresh_token: None,
                expires_in: Some(3600),
            })
        }

        async fn fetch_profile(
            &self,
            provider: Provider,
            _access_token: &str,
        ) -> Result<FederatedProfile, ProviderError> {
            if self.fail_profile.load(Ordering::SeqCst) {
                return Err(ProviderError::ProfileFailed {
                    provider,
                    reason: "request timed out".to_owned(),
                });
            }
            Ok(FederatedProfile {
                provider,
                external_id: self.external_id.clone(),
                email: self.email.clone(),
                display_name: Some("Kim".to_owned()),
            })
        }
    }

    fn tokens(ttl: Option<Duration>) -> TokenService {
        TokenService::new(&SecretString::from("Vb7Nq2Xz5Km8Lp1Rt4Wc9Hd3Fg6Js0Ya"), ttl)
    }

    fn service(db: &MemoryDatabase, gateway: StubGateway) -> LoginService {
        LoginService::new(
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            Arc::new(gateway),
            tokens(Some(Duration::from_secs(3600))),
        )
    }

    #[tokio::test]
    async fn test_local_login_with_registered_password() {
        let db = MemoryDatabase::new();
        let auth = service(&db, StubGateway::new("K1", None));
        auth.register("alice@x.com", "pw123456", None).await.unwrap();

        let result = auth.login_local("alice@x.com", "pw123456").await.unwrap();
        assert_eq!(result.user.email.unwrap().as_str(), "alice@x.com");
        assert_eq!(
            db.find_token(result.user.id).await.unwrap(),
            Some(result.token)
        );
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email_look_the_same() {
        let db = MemoryDatabase::new();
        let auth = service(&db, StubGateway::new("K1", None));
        auth.register("alice@x.com", "pw123456", None).await.unwrap();

        for (email, password) in [
            ("alice@x.com", "wrong-password"),
            ("nobody@x.com", "pw123456"),
            ("not-an-email", "pw123456"),
        ] {
            assert!(matches!(
                auth.login_local(email, password).await,
                Err(AuthError::InvalidCredentials)
            ));
        }
    }

    #[tokio::test]
    async fn test_unknown_email_pays_for_a_hash() {
        let db = MemoryDatabase::new();
        let auth = service(&db, StubGateway::new("K1", None));
        auth.register("alice@x.com", "pw123456", None).await.unwrap();

        let started = Instant::now();
        let known = auth.login_local("alice@x.com", "wrong-password").await;
        let known_elapsed = started.elapsed();

        let started = Instant::now();
        let unknown = auth.login_local("nobody@x.com", "wrong-password").await;
        let unknown_elapsed = started.elapsed();

        assert!(matches!(known, Err(AuthError::InvalidCredentials)));
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
        assert!(
            unknown_elapsed * 4 >= known_elapsed,
            "unknown email took {unknown_elapsed:?}, wrong password took {known_elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_legacy_account_logs_in_with_plaintext() {
        let db = MemoryDatabase::new();
        let auth = service(&db, StubGateway::new("K1", None));
        db.insert_legacy_user(Email::parse("alice@x.com").unwrap(), "pw123");

        assert!(auth.login_local("alice@x.com", "pw123").await.is_ok());
        assert!(matches!(
            auth.login_local("alice@x.com", "pw124").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_successive_local_logins_issue_new_tokens() {
        let db = MemoryDatabase::new();
        let auth = service(&db, StubGateway::new("K1", None));
        auth.register("bob@x.com", "hunter2hunter2", None).await.unwrap();

        let first = auth.login_local("bob@x.com", "hunter2hunter2").await.unwrap();
        let second = auth.login_local("bob@x.com", "hunter2hunter2").await.unwrap();
        assert_ne!(first.token, second.token);
        assert_eq!(db.session_writes(), 2);
    }

    #[tokio::test]
    async fn test_change_password_clears_must_reset() {
        let db = MemoryDatabase::new();
        let auth = service(&db, StubGateway::new("K1", None));
        let user = db.insert_legacy_user(Email::parse("carol@x.com").unwrap(), "old");

        assert!(matches!(
            auth.change_password(user.id, "nope", "new-password").await,
            Err(AuthError::InvalidCredentials)
        ));
        auth.change_password(user.id, "old", "new-password").await.unwrap();

        let user = db.find_by_id(user.id).await.unwrap().unwrap();
        assert!(!user.must_reset);
        assert!(auth.login_local("carol@x.com", "old").await.is_err());
        assert!(auth.login_local("carol@x.com", "new-password").await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let db = MemoryDatabase::new();
        let auth = service(&db, StubGateway::new("K1", None));
        auth.register("dave@x.com", "password1", None).await.unwrap();
        assert!(matches!(
            auth.register("DAVE@x.com", "password2", None).await,
            Err(AuthError::UserAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn test_first_federated_login_creates_principal() {
        let db = MemoryDatabase::new();
        let auth = service(&db, StubGateway::new("K1", None));

        let result = auth.login_federated(Provider::Kakao, "code").await.unwrap();
        assert_eq!(result.user.account_type, AccountType::Kakao);
        assert_eq!(result.user.federated_id.as_deref(), Some("K1"));
        assert_eq!(db.find_token(result.user.id).await.unwrap(), Some(result.token));
    }

    #[tokio::test]
    async fn test_repeat_federated_login_reuses_token_without_write() {
        let db = MemoryDatabase::new();
        let auth = service(&db, StubGateway::new("K1", None));

        let first = auth.login_federated(Provider::Kakao, "c1").await.unwrap();
        let writes = db.session_writes();
        let second = auth.login_federated(Provider::Kakao, "c2").await.unwrap();

        assert_eq!(first.token, second.token);
        assert_eq!(first.user.id, second.user.id);
        assert_eq!(db.session_writes(), writes);
    }

    #[tokio::test]
    async fn test_role_change_replaces_stored_token() {
        let db = MemoryDatabase::new();
        let auth = service(&db, StubGateway::new("K1", Some("fed@x.com")));
        let first = auth.login_federated(Provider::Kakao, "c1").await.unwrap();
        assert_eq!(auth.tokens.verify(&first.token).unwrap().role, Role::User);

        db.set_role(&Email::parse("fed@x.com").unwrap(), Role::Admin)
            .await
            .unwrap();
        let second = auth.login_federated(Provider::Kakao, "c2").await.unwrap();

        assert_ne!(second.token, first.token);
        assert_eq!(auth.tokens.verify(&second.token).unwrap().role, Role::Admin);
        assert_eq!(db.find_token(first.user.id).await.unwrap(), Some(second.token));
    }

    #[tokio::test]
    async fn test_expired_stored_token_is_replaced() {
        let db = MemoryDatabase::new();
        let auth = service(&db, StubGateway::new("K1", None));
        let first = auth.login_federated(Provider::Kakao, "c1").await.unwrap();

        db.save_token(first.user.id, "garbage").await.unwrap();
        let second = auth.login_federated(Provider::Kakao, "c2").await.unwrap();
        assert_ne!(second.token, "garbage");
        assert!(auth.tokens.verify(&second.token).is_ok());
    }

    #[tokio::test]
    async fn test_failed_profile_creates_nothing() {
        let db = MemoryDatabase::new();
        let gateway = StubGateway::new("K9", None);
        gateway.fail_profile.store(true, Ordering::SeqCst);
        let auth = service(&db, gateway);

        assert!(matches!(
            auth.login_federated(Provider::Kakao, "code").await,
            Err(AuthError::FederationProfileFailed(_))
        ));
        assert!(
            db.find_by_federated_id(AccountType::Kakao, "K9")
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(db.session_writes(), 0);
    }

    #[tokio::test]
    async fn test_failed_exchange_is_reported() {
        let db = MemoryDatabase::new();
        let auth = service(&db, StubGateway::new("K1", None));
        assert!(matches!(
            auth.login_federated(Provider::Naver, "bad").await,
            Err(AuthError::FederationExchangeFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_federated_email_links_existing_account() {
        let db = MemoryDatabase::new();
        let auth = service(&db, StubGateway::new("G7", Some("Erin@X.com")));
        let local = auth.register("erin@x.com", "password1", None).await.unwrap();

        let result = auth.login_federated(Provider::Google, "code").await.unwrap();
        assert_eq!(result.user.id, local.id);
        assert_eq!(result.user.account_type, AccountType::Local);
        assert_eq!(result.user.federated_provider, Some(AccountType::Google));
        assert!(auth.login_local("erin@x.com", "password1").await.is_ok());
    }
}
