//! Bearer token issuance and verification.
//!
//! Tokens are HS256 JWTs signed with `DONGNE_TOKEN_SECRET`. The payload carries
//! the principal id (`sub`) and role. Every token also gets a random `jti`, so
//! two tokens issued for the same principal within the same second still
//! differ.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use dongne_core::{Role, UserId};

use crate::models::Principal;

/// Token verification or signing failure.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Malformed, tampered, or signed with another key.
    #[error("invalid token")]
    InvalidToken,

    /// Well-formed and authentic, but past its `exp` claim.
    #[error("token has expired")]
    ExpiredToken,

    /// Encoding the claims failed.
    #[error("failed to sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: UserId,
    role: Role,
    iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
    jti: String,
}

/// Issues and verifies bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Option<Duration>,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("keys", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenService {
    /// Create a token service. `ttl = None` issues tokens without `exp`.
    #[must_use]
    pub fn new(secret: &SecretString, ttl: Option<Duration>) -> Self {
        let key = secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        // `exp` is checked when present but not required.
        validation.required_spec_claims.clear();
        validation.validate_exp = true;
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            validation,
            ttl,
        }
    }

    /// Issue a token for `principal_id` with `role`.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Signing` if the claims cannot be encoded.
    pub fn issue(&self, principal_id: UserId, role: Role) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let exp = self
            .ttl
            .and_then(|ttl| i64::try_from(ttl.as_secs()).ok())
            .map(|secs| now.saturating_add(secs));

        self.sign(&Claims {
            sub: principal_id,
            role,
            iat: now,
            exp,
            jti: uuid::Uuid::new_v4().to_string(),
        })
    }

    /// Verify a token and return the principal it was issued for.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::ExpiredToken` if the `exp` claim has passed and
    /// `TokenError::InvalidToken` for anything else that fails to verify.
    pub fn verify(&self, token: &str) -> Result<Principal, TokenError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::ExpiredToken,
                _ => TokenError::InvalidToken,
            })?;

        Ok(Principal {
            id: data.claims.sub,
            role: data.claims.role,
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn service(ttl: Option<Duration>) -> TokenService {
        TokenService::new(
            &SecretString::from("k8Jq2mVx9Lp4Rt7Wz1Nc6Hb3Fd5Gs0Ye"),
            ttl,
        )
    }

    #[test]
    fn test_verify_returns_issued_principal() {
        let tokens = service(Some(Duration::from_secs(3600)));
        for (id, role) in [(1, Role::User), (42, Role::Admin)] {
            let token = tokens.issue(UserId::new(id), role).unwrap();
            let principal = tokens.verify(&token).unwrap();
            assert_eq!(principal.id, UserId::new(id));
            assert_eq!(principal.role, role);
        }
    }

    #[test]
    fn test_any_flipped_byte_is_rejected() {
        let tokens = service(None);
        let token = tokens.issue(UserId::new(7), Role::User).unwrap();

        for i in 0..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] ^= 0x01;
            let tampered = String::from_utf8_lossy(&bytes);
            assert!(
                matches!(tokens.verify(&tampered), Err(TokenError::InvalidToken)),
                "byte {i} flipped but token still verified"
            );
        }
    }

    #[test]
    fn test_garbage_is_invalid_not_panic() {
        let tokens = service(None);
        for input in ["", ".", "a.b.c", "not a token", "\u{0}\u{1}"] {
            assert!(matches!(tokens.verify(input), Err(TokenError::InvalidToken)));
        }
    }

    #[test]
    fn test_other_secret_is_invalid() {
        let token = service(None).issue(UserId::new(1), Role::User).unwrap();
        let other = TokenService::new(
            &SecretString::from("Zq9Wm3Tx7Bv1Np5Lk2Hj8Gf4Dc6Sa0Re"),
            None,
        );
        assert!(matches!(other.verify(&token), Err(TokenError::InvalidToken)));
    }

    #[test]
    fn test_elapsed_exp_is_expired() {
        let tokens = service(None);
        let now = Utc::now().timestamp();
        let token = tokens
            .sign(&Claims {
                sub: UserId::new(1),
                role: Role::User,
                iat: now - 7200,
                exp: Some(now - 3600),
                jti: "x".to_owned(),
            })
            .unwrap();
        assert!(matches!(tokens.verify(&token), Err(TokenError::ExpiredToken)));
    }

    #[test]
    fn test_token_without_exp_verifies() {
        let tokens = service(None);
        let token = tokens.issue(UserId::new(3), Role::User).unwrap();
        assert_eq!(tokens.verify(&token).unwrap().id, UserId::new(3));
    }

    #[test]
    fn test_successive_tokens_differ() {
        let tokens = service(Some(Duration::from_secs(60)));
        let a = tokens.issue(UserId::new(1), Role::User).unwrap();
        let b = tokens.issue(UserId::new(1), Role::User).unwrap();
        assert_ne!(a, b);
    }
}
