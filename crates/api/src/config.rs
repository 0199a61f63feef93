//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DONGNE_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `DONGNE_BASE_URL` - Public URL of the API, used for OAuth redirect URIs
//! - `DONGNE_TOKEN_SECRET` - Session token signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `DONGNE_HOST` - Bind address (default: 127.0.0.1)
//! - `DONGNE_PORT` - Listen port (default: 8080)
//! - `DONGNE_TOKEN_TTL_HOURS` - Token lifetime in hours, `0` disables expiry (default: 720)
//! - `DONGNE_RATE_LIMIT` - Enable per-IP rate limiting (default: true)
//! - `{KAKAO,NAVER,GOOGLE}_CLIENT_ID` - Enables the provider when set
//! - `{KAKAO,NAVER,GOOGLE}_CLIENT_SECRET` - Provider client secret
//! - `{KAKAO,NAVER,GOOGLE}_REDIRECT_URI` - Override the default callback URL
//! - `{KAKAO,NAVER,GOOGLE}_{AUTHORIZE,TOKEN,PROFILE}_URL` - Override provider endpoints
//! - `PROVIDER_TIMEOUT_SECS` - Timeout for each provider HTTP call (default: 10)
//! - `STORAGE_BACKEND` - `s3`, `local` or `memory` (default: local)
//! - `STORAGE_BUCKET` / `STORAGE_REGION` / `STORAGE_ENDPOINT` - S3 settings
//! - `STORAGE_LOCAL_ROOT` - Directory for the local backend (default: ./uploads)
//! - `STORAGE_PUBLIC_BASE_URL` - Prefix for public image URLs (default: `{base_url}/uploads`)
//! - `STORAGE_TIMEOUT_SECS` - Timeout for each blob store call (default: 30)
//! - `SENTRY_DSN` / `SENTRY_ENVIRONMENT` - Sentry error tracking

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::federation::{Provider, ProviderConfig, ProviderEndpoints};

const MIN_TOKEN_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// API application configuration.
///
/// Built once at startup and handed to [`crate::state::AppState`].
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the API
    pub base_url: String,
    /// Session token settings
    pub token: TokenConfig,
    /// Enabled identity providers
    pub providers: Vec<ProviderConfig>,
    /// Timeout applied to each identity provider HTTP call
    pub provider_timeout: Duration,
    /// Review image storage
    pub storage: StorageConfig,
    /// Whether per-IP rate limiting is applied
    pub rate_limit: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Session token settings.
///
/// Implements `Debug` manually to redact the signing secret.
#[derive(Clone)]
pub struct TokenConfig {
    /// HMAC signing secret
    pub secret: SecretString,
    /// Token lifetime; `None` issues tokens without an expiration claim
    pub ttl: Option<Duration>,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Which object store backs review images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// S3 or an S3-compatible service. Credentials come from the standard
    /// `AWS_*` environment variables.
    S3 {
        bucket: String,
        region: String,
        endpoint: Option<String>,
    },
    /// Local filesystem directory.
    Local { root: PathBuf },
    /// Process memory; contents are lost on restart.
    Memory,
}

/// Review image storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Prefix joined with an object key to form its public URL
    pub public_base_url: String,
    /// Timeout applied to each put/delete call
    pub timeout: Duration,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("DONGNE_DATABASE_URL")?;
        let host = get_parsed_or_default::<IpAddr>("DONGNE_HOST", "127.0.0.1")?;
        let port = get_parsed_or_default::<u16>("DONGNE_PORT", "8080")?;
        let base_url = get_required_env("DONGNE_BASE_URL")?
            .trim_end_matches('/')
            .to_owned();
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("DONGNE_BASE_URL".to_owned(), e.to_string())
        })?;

        let token = TokenConfig::from_env()?;
        let providers = providers_from_env(&base_url)?;
        let provider_timeout =
            Duration::from_secs(get_parsed_or_default::<u64>("PROVIDER_TIMEOUT_SECS", "10")?);
        let storage = StorageConfig::from_env(&base_url)?;
        let rate_limit = get_parsed_or_default::<bool>("DONGNE_RATE_LIMIT", "true")?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            token,
            providers,
            provider_timeout,
            storage,
            rate_limit,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl TokenConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let secret = get_validated_secret("DONGNE_TOKEN_SECRET")?;
        validate_secret_length(&secret, "DONGNE_TOKEN_SECRET")?;
        let hours = get_parsed_or_default::<u64>("DONGNE_TOKEN_TTL_HOURS", "720")?;
        Ok(Self {
            secret,
            ttl: token_ttl(hours)?,
        })
    }
}

/// Token lifetime for `hours`, `None` when expiry is disabled.
fn token_ttl(hours: u64) -> Result<Option<Duration>, ConfigError> {
    if hours == 0 {
        return Ok(None);
    }
    hours
        .checked_mul(60 * 60)
        .map(|secs| Some(Duration::from_secs(secs)))
        .ok_or_else(|| {
            ConfigError::InvalidEnvVar(
                "DONGNE_TOKEN_TTL_HOURS".to_owned(),
                format!("{hours} hours is too long"),
            )
        })
}

impl StorageConfig {
    fn from_env(base_url: &str) -> Result<Self, ConfigError> {
        let backend = match get_env_or_default("STORAGE_BACKEND", "local").as_str() {
            "s3" => StorageBackend::S3 {
                bucket: get_required_env("STORAGE_BUCKET")?,
                region: get_env_or_default("STORAGE_REGION", "ap-northeast-2"),
                endpoint: get_optional_env("STORAGE_ENDPOINT"),
            },
            "local" => StorageBackend::Local {
                root: PathBuf::from(get_env_or_default("STORAGE_LOCAL_ROOT", "./uploads")),
            },
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "STORAGE_BACKEND".to_owned(),
                    format!("unknown backend '{other}' (expected s3, local or memory)"),
                ));
            }
        };

        let public_base_url = get_optional_env("STORAGE_PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("{base_url}/uploads"))
            .trim_end_matches('/')
            .to_owned();

        Ok(Self {
            backend,
            public_base_url,
            timeout: Duration::from_secs(get_parsed_or_default::<u64>(
                "STORAGE_TIMEOUT_SECS",
                "30",
            )?),
        })
    }
}

/// Load every provider whose `{PREFIX}_CLIENT_ID` is set.
fn providers_from_env(base_url: &str) -> Result<Vec<ProviderConfig>, ConfigError> {
    let mut providers = Vec::new();
    for provider in Provider::ALL {
        let prefix = provider.as_str().to_uppercase();
        let Some(client_id) = get_optional_env(&format!("{prefix}_CLIENT_ID")) else {
            continue;
        };

        let defaults = provider.default_endpoints();
        let endpoints = ProviderEndpoints {
            authorize_url: get_optional_env(&format!("{prefix}_AUTHORIZE_URL"))
                .unwrap_or(defaults.authorize_url),
            token_url: get_optional_env(&format!("{prefix}_TOKEN_URL"))
                .unwrap_or(defaults.token_url),
            profile_url: get_optional_env(&format!("{prefix}_PROFILE_URL"))
                .unwrap_or(defaults.profile_url),
        };

        let client_secret = match get_optional_env(&format!("{prefix}_CLIENT_SECRET")) {
            Some(value) => Some(SecretString::from(value)),
            None if provider.requires_client_secret() => {
                return Err(ConfigError::MissingEnvVar(format!("{prefix}_CLIENT_SECRET")));
            }
            None => None,
        };

        providers.push(ProviderConfig {
            provider,
            client_id,
            client_secret,
            redirect_uri: get_optional_env(&format!("{prefix}_REDIRECT_URI")).unwrap_or_else(
                || format!("{base_url}/auth/{}/callback", provider.as_str()),
            ),
            endpoints,
        });
    }
    Ok(providers)
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn get_parsed_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a secret meets minimum length requirements.
fn validate_secret_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_TOKEN_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_TOKEN_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
