//! Password hashing and verification.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use dongne_core::UserId;

use super::AuthError;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Argon2id hash with the default parameters that matches no password.
/// Logins for unknown accounts verify against it so they cost the same as a
/// wrong password.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Validate password meets requirements.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` if the password is too short.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against stored material.
///
/// Accounts flagged `must_reset` were migrated with raw passwords; for those,
/// stored material that is not a PHC hash string is compared as-is.
pub(crate) fn verify_password(
    user_id: UserId,
    password: &str,
    stored: &str,
    must_reset: bool,
) -> Result<(), AuthError> {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::InvalidCredentials),
        Err(_) if must_reset => {
            tracing::warn!(user_id = %user_id, "Legacy password comparison used");
            if stored == password {
                Ok(())
            } else {
                Err(AuthError::InvalidCredentials)
            }
        }
        Err(_) => Err(AuthError::InvalidCredentials),
    }
}

/// Reject a login that has no stored password to check, after doing the
/// same argon2 work as a real verification.
pub(crate) fn reject_without_account(password: &str) -> AuthError {
    if let Ok(parsed) = PasswordHash::new(DUMMY_HASH) {
        let _ = Argon2::default().verify_password(password.as_bytes(), &parsed);
    }
    AuthError::InvalidCredentials
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ID: UserId = UserId::new(1);

    #[test]
    fn test_hash_then_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(ID, "correct horse", &hash, false).is_ok());
        assert!(matches!(
            verify_password(ID, "wrong horse", &hash, false),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_legacy_plaintext_only_when_flagged() {
        assert!(verify_password(ID, "pw123", "pw123", true).is_ok());
        assert!(verify_password(ID, "pw124", "pw123", true).is_err());
        assert!(verify_password(ID, "pw123", "pw123", false).is_err());
    }

    #[test]
    fn test_flagged_account_with_real_hash_uses_argon2() {
        let hash = hash_password("fresh-password").unwrap();
        assert!(verify_password(ID, "fresh-password", &hash, true).is_ok());
        assert!(verify_password(ID, &hash, &hash, true).is_err());
    }

    #[test]
    fn test_dummy_hash_costs_a_full_verification() {
        let parsed = PasswordHash::new(DUMMY_HASH).unwrap();
        assert_eq!(parsed.algorithm, argon2::Algorithm::Argon2id.ident());

        let params = argon2::Params::try_from(&parsed).unwrap();
        let defaults = argon2::Params::default();
        assert_eq!(params.m_cost(), defaults.m_cost());
        assert_eq!(params.t_cost(), defaults.t_cost());
        assert_eq!(params.p_cost(), defaults.p_cost());

        assert!(matches!(
            Argon2::default().verify_password(b"anything", &parsed),
            Err(argon2::password_hash::Error::Password)
        ));
        assert!(matches!(
            reject_without_account("anything"),
            AuthError::InvalidCredentials
        ));
    }

    #[test]
    fn test_short_password_rejected() {
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password("long enough").is_ok());
    }
}
