//! Identity federation with external OAuth providers.
//!
//! Each [`Provider`] knows its default endpoints and how to read its own
//! profile payload; [`FederationGateway`] owns the HTTP client and the
//! configured credentials and drives the authorization-code flow:
//!
//! ```text
//! build_authorization_url(state) ──► browser ──► callback?code&state
//!                                                   │
//!         exchange_code_for_token(code) ◄───────────┘
//!                     │
//!         fetch_profile(access_token) ──► FederatedProfile
//! ```
//!
//! Every call is a single attempt with the configured timeout. Transport and
//! provider-side failures surface as [`ProviderError`] and are never retried.

mod google;
mod kakao;
mod naver;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use dongne_core::AccountType;

// =============================================================================
// Provider
// =============================================================================

/// A supported external identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Kakao,
    Naver,
    Google,
}

impl Provider {
    /// Every provider, in configuration order.
    pub const ALL: [Self; 3] = [Self::Kakao, Self::Naver, Self::Google];

    /// Lowercase tag used in routes and environment variable prefixes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kakao => "kakao",
            Self::Naver => "naver",
            Self::Google => "google",
        }
    }

    /// Account type recorded for principals created through this provider.
    #[must_use]
    pub const fn account_type(self) -> AccountType {
        match self {
            Self::Kakao => AccountType::Kakao,
            Self::Naver => AccountType::Naver,
            Self::Google => AccountType::Google,
        }
    }

    /// Production endpoints for this provider.
    #[must_use]
    pub fn default_endpoints(self) -> ProviderEndpoints {
        match self {
            Self::Kakao => kakao::endpoints(),
            Self::Naver => naver::endpoints(),
            Self::Google => google::endpoints(),
        }
    }

    /// Kakao treats the client secret as optional; the others reject token
    /// requests without one.
    #[must_use]
    pub const fn requires_client_secret(self) -> bool {
        !matches!(self, Self::Kakao)
    }

    const fn scope(self) -> Option<&'static str> {
        match self {
            Self::Google => Some(google::SCOPE),
            Self::Kakao | Self::Naver => None,
        }
    }

    fn parse_profile(self, body: &[u8]) -> Result<FederatedProfile, String> {
        let profile = match self {
            Self::Kakao => kakao::parse_profile(body)?,
            Self::Naver => naver::parse_profile(body)?,
            Self::Google => google::parse_profile(body)?,
        };
        if profile.external_id.is_empty() {
            return Err("profile has an empty id".to_owned());
        }
        Ok(profile)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ProviderError::UnknownProvider(s.to_owned()))
    }
}

// =============================================================================
// Types
// =============================================================================

/// Provider endpoint URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub profile_url: String,
}

/// Credentials and endpoints for one enabled provider.
///
/// Implements `Debug` manually to redact the client secret.
#[derive(Clone)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub client_id: String,
    pub client_secret: Option<SecretString>,
    pub redirect_uri: String,
    pub endpoints: ProviderEndpoints,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

/// Tokens returned by a provider's token endpoint.
#[derive(Clone, Deserialize)]
pub struct ProviderToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds. Naver sends this as a string.
    #[serde(default, deserialize_with = "seconds_from_number_or_string")]
    pub expires_in: Option<i64>,
}

impl fmt::Debug for ProviderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderToken")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Identity returned by a provider, consumed once by the login flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedProfile {
    pub provider: Provider,
    /// Provider-scoped stable user id
    pub external_id: String,
    /// Only set when the provider reports the address as verified.
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Errors from the federation gateway.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Route named a provider this build does not know.
    #[error("unknown identity provider: {0}")]
    UnknownProvider(String),

    /// Provider is known but has no credentials configured.
    #[error("identity provider {0} is not configured")]
    NotConfigured(Provider),

    /// Provider configuration could not be used.
    #[error("identity provider {provider} is misconfigured: {reason}")]
    Misconfigured { provider: Provider, reason: String },

    /// Shared HTTP client could not be built.
    #[error("failed to build provider HTTP client: {0}")]
    HttpClient(String),

    /// Authorization code could not be exchanged for an access token.
    #[error("{provider} token exchange failed: {reason}")]
    ExchangeFailed { provider: Provider, reason: String },

    /// Access token could not be turned into a profile.
    #[error("{provider} profile request failed: {reason}")]
    ProfileFailed { provider: Provider, reason: String },
}

/// Error body returned by token endpoints, sometimes with a 200 status.
#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn seconds_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(i64),
        Text(String),
    }

    match Option::<Seconds>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Seconds::Number(n)) => Ok(Some(n)),
        Some(Seconds::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// The three operations the login flow needs from an identity provider.
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    /// URL to send the browser to, carrying the CSRF `state`.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::NotConfigured` for a disabled provider.
    fn build_authorization_url(
        &self,
        provider: Provider,
        state: &str,
    ) -> Result<String, ProviderError>;

    /// Trade an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::ExchangeFailed` on transport or provider errors.
    async fn exchange_code_for_token(
        &self,
        provider: Provider,
        code: &str,
    ) -> Result<ProviderToken, ProviderError>;

    /// Resolve an access token to the provider's view of the user.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::ProfileFailed` on transport or provider errors.
    async fn fetch_profile(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> Result<FederatedProfile, ProviderError>;
}

/// HTTP implementation of [`IdentityGateway`].
#[derive(Clone)]
pub struct FederationGateway {
    inner: Arc<FederationGatewayInner>,
}

struct FederationGatewayInner {
    client: reqwest::Client,
    providers: HashMap<Provider, ProviderConfig>,
}

impl FederationGateway {
    /// Create a gateway for the given providers.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Misconfigured` if an endpoint is not a valid
    /// URL, or `ProviderError::HttpClient` if the client cannot be built.
    pub fn new(configs: Vec<ProviderConfig>, timeout: Duration) -> Result<Self, ProviderError> {
        let mut providers = HashMap::new();
        for config in configs {
            for endpoint in [
                &config.endpoints.authorize_url,
                &config.endpoints.token_url,
                &config.endpoints.profile_url,
            ] {
                url::Url::parse(endpoint).map_err(|e| ProviderError::Misconfigured {
                    provider: config.provider,
                    reason: format!("invalid endpoint {endpoint}: {e}"),
                })?;
            }
            providers.insert(config.provider, config);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::HttpClient(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(FederationGatewayInner { client, providers }),
        })
    }

    /// Whether `provider` has credentials configured.
    #[must_use]
    pub fn is_enabled(&self, provider: Provider) -> bool {
        self.inner.providers.contains_key(&provider)
    }

    fn config(&self, provider: Provider) -> Result<&ProviderConfig, ProviderError> {
        self.inner
            .providers
            .get(&provider)
            .ok_or(ProviderError::NotConfigured(provider))
    }
}

#[async_trait]
impl IdentityGateway for FederationGateway {
    fn build_authorization_url(
        &self,
        provider: Provider,
        state: &str,
    ) -> Result<String, ProviderError> {
        let config = self.config(provider)?;

        let mut params = vec![
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("response_type", "code"),
            ("state", state),
        ];
        if let Some(scope) = provider.scope() {
            params.push(("scope", scope));
        }

        url::Url::parse_with_params(&config.endpoints.authorize_url, &params)
            .map(String::from)
            .map_err(|e| ProviderError::Misconfigured {
                provider,
                reason: e.to_string(),
            })
    }

    async fn exchange_code_for_token(
        &self,
        provider: Provider,
        code: &str,
    ) -> Result<ProviderToken, ProviderError> {
        let config = self.config(provider)?;
        let fail = |reason: String| ProviderError::ExchangeFailed { provider, reason };

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("code", code),
        ];
        if let Some(secret) = &config.client_secret {
            params.push(("client_secret", secret.expose_secret()));
        }

        let response = self
            .inner
            .client
            .post(&config.endpoints.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| fail(describe_transport_error(&e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| fail(describe_transport_error(&e)))?;

        if let Ok(err) = serde_json::from_slice::<TokenErrorBody>(&body) {
            return Err(fail(match err.error_description {
                Some(description) => format!("{}: {description}", err.error),
                None => err.error,
            }));
        }

        if !status.is_success() {
            return Err(fail(format!(
                "status {status}: {}",
                String::from_utf8_lossy(&body)
            )));
        }

        let token: ProviderToken = serde_json::from_slice(&body)
            .map_err(|e| fail(format!("malformed token response: {e}")))?;

        tracing::debug!(%provider, expires_in = ?token.expires_in, "Exchanged authorization code");
        Ok(token)
    }

    async fn fetch_profile(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> Result<FederatedProfile, ProviderError> {
        let config = self.config(provider)?;
        let fail = |reason: String| ProviderError::ProfileFailed { provider, reason };

        let response = self
            .inner
            .client
            .get(&config.endpoints.profile_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| fail(describe_transport_error(&e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| fail(describe_transport_error(&e)))?;

        if !status.is_success() {
            return Err(fail(format!(
                "status {status}: {}",
                String::from_utf8_lossy(&body)
            )));
        }

        provider.parse_profile(&body).map_err(fail)
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_owned()
    } else {
        err.to_string()
    }
}
