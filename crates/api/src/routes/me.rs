//! Routes about the authenticated principal.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::User;
use crate::state::AppState;

/// Password change body.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// `GET /api/me`
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
) -> Result<Json<User>> {
    Ok(Json(state.login().profile(principal.id).await?))
}

/// `PUT /api/me/password`
pub async fn change_password(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<StatusCode> {
    state
        .login()
        .change_password(principal.id, &req.current_password, &req.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
