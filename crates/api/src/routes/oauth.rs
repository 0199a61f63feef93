//! Federated login route handlers.
//!
//! Browser flow:
//! - Login: stores a random `state` in the session and redirects to the provider
//! - Callback: checks the returned `state` against the session, then logs in
//!
//! Native clients that ran the consent screen themselves post the code to the
//! token endpoint instead.

use axum::{
    Json,
    extract::{Path, Query, State},
    response::Redirect,
};
use rand::Rng;
use serde::Deserialize;
use tower_sessions::Session;

use crate::error::{AppError, Result};
use crate::federation::Provider;
use crate::models::session_keys;
use crate::routes::auth::LoginResponse;
use crate::services::AuthError;
use crate::state::AppState;

/// Length of the generated `state` parameter.
const STATE_LENGTH: usize = 32;

/// Query parameters from a provider callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code to exchange for tokens.
    pub code: Option<String>,
    /// State parameter for CSRF protection.
    pub state: Option<String>,
    /// Error code if authorization failed.
    pub error: Option<String>,
    /// Error description.
    pub error_description: Option<String>,
}

/// Body of the native token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub code: String,
}

/// Generate a cryptographically secure random string.
fn generate_random_string(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..length)
        .filter_map(|_| CHARSET.get(rng.random_range(0..CHARSET.len())))
        .map(|&b| char::from(b))
        .collect()
}

fn parse_provider(tag: &str) -> Result<Provider> {
    tag.parse::<Provider>()
        .map_err(|e| AppError::Auth(AuthError::Provider(e)))
}

fn session_error(e: &tower_sessions::session::Error) -> AppError {
    tracing::error!(error = %e, "OAuth session unavailable");
    AppError::Internal(format!("session error: {e}"))
}

/// Redirect to the provider's consent screen.
///
/// # Route
///
/// `GET /auth/{provider}/login`
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Path(provider): Path<String>,
) -> Result<Redirect> {
    let provider = parse_provider(&provider)?;
    let oauth_state = generate_random_string(STATE_LENGTH);

    // Fails for providers without credentials before touching the session.
    let url = state.login().authorization_url(provider, &oauth_state)?;

    session
        .insert(session_keys::OAUTH_STATE, &oauth_state)
        .await
        .map_err(|e| session_error(&e))?;
    session
        .insert(session_keys::OAUTH_PROVIDER, provider)
        .await
        .map_err(|e| session_error(&e))?;

    tracing::debug!(provider = %provider, "Redirecting to identity provider");
    Ok(Redirect::to(&url))
}

/// Handle the provider redirect back to us.
///
/// # Route
///
/// `GET /auth/{provider}/callback?code&state`
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<LoginResponse>> {
    let provider = parse_provider(&provider)?;

    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        tracing::warn!(provider = %provider, error = %error, description = %description, "Provider denied authorization");
        return Err(AppError::BadRequest(format!(
            "authorization denied by {provider}: {error}"
        )));
    }

    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return Err(AppError::BadRequest("missing authorization code".to_owned()));
    };

    let stored_state: Option<String> = session
        .remove(session_keys::OAUTH_STATE)
        .await
        .map_err(|e| session_error(&e))?;
    let stored_provider: Option<Provider> = session
        .remove(session_keys::OAUTH_PROVIDER)
        .await
        .map_err(|e| session_error(&e))?;

    if stored_state.is_none() || stored_state != query.state || stored_provider != Some(provider)
    {
        tracing::warn!(provider = %provider, "OAuth state mismatch");
        return Err(AuthError::InvalidSessionState.into());
    }

    let result = state.login().login_federated(provider, &code).await?;
    Ok(Json(result.into()))
}

/// Complete a federated login with a code obtained by a native client.
///
/// # Route
///
/// `POST /auth/{provider}/token`
pub async fn token(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<LoginResponse>> {
    let provider = parse_provider(&provider)?;
    if req.code.is_empty() {
        return Err(AppError::BadRequest("missing authorization code".to_owned()));
    }

    let result = state.login().login_federated(provider, &req.code).await?;
    Ok(Json(result.into()))
}
