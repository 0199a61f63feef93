//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::federation::ProviderError;
use crate::services::{AuthError, MediaError, OwnershipError, ReviewError};

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Review or comment operation failed.
    #[error("Review error: {0}")]
    Review(#[from] ReviewError),

    /// Image upload or removal failed.
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    /// Multipart body could not be read.
    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Database(err) => repository_status(err),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::InvalidSessionState => {
                    StatusCode::UNAUTHORIZED
                }
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::WeakPassword(_) | AuthError::InvalidEmail(_) => StatusCode::BAD_REQUEST,
                AuthError::FederationExchangeFailed(_) | AuthError::FederationProfileFailed(_) => {
                    StatusCode::BAD_GATEWAY
                }
                AuthError::Provider(
                    ProviderError::UnknownProvider(_) | ProviderError::NotConfigured(_),
                ) => StatusCode::NOT_FOUND,
                AuthError::Repository(err) => repository_status(err),
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Review(err) => match err {
                ReviewError::Ownership(err) => ownership_status(err),
                ReviewError::NotFound(_) => StatusCode::NOT_FOUND,
                ReviewError::InvalidBody => StatusCode::BAD_REQUEST,
                ReviewError::Repository(err) => repository_status(err),
            },
            Self::Media(err) => match err {
                MediaError::Ownership(err) => ownership_status(err),
                MediaError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                MediaError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                MediaError::Storage(_) => StatusCode::BAD_GATEWAY,
                MediaError::UpdateFailed(_) => StatusCode::CONFLICT,
                MediaError::Repository(err) => repository_status(err),
            },
            Self::Multipart(err) => err.status(),
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to clients.
    fn public_message(&self, status: StatusCode) -> String {
        if status.is_server_error() {
            return match status {
                StatusCode::BAD_GATEWAY => "External service error".to_owned(),
                _ => "Internal server error".to_owned(),
            };
        }

        match self {
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "Invalid credentials".to_owned(),
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_owned()
                }
                AuthError::WeakPassword(msg) => msg.clone(),
                AuthError::InvalidEmail(_) => "Invalid email address".to_owned(),
                AuthError::InvalidSessionState => "Session expired, please try again".to_owned(),
                other => other.to_string(),
            },
            Self::Review(ReviewError::Ownership(err)) | Self::Media(MediaError::Ownership(err)) => {
                ownership_message(err)
            }
            Self::Review(err) => err.to_string(),
            Self::Media(err) => err.to_string(),
            Self::Multipart(err) => err.body_text(),
            Self::Database(RepositoryError::NotFound) => "Not found".to_owned(),
            Self::Database(RepositoryError::Conflict(msg)) => msg.clone(),
            _ => self.to_string(),
        }
    }
}

fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict(_) => StatusCode::CONFLICT,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn ownership_status(err: &OwnershipError) -> StatusCode {
    match err {
        OwnershipError::Forbidden { .. } => StatusCode::FORBIDDEN,
        OwnershipError::NotFound { .. } => StatusCode::NOT_FOUND,
        OwnershipError::Repository(err) => repository_status(err),
    }
}

fn ownership_message(err: &OwnershipError) -> String {
    match err {
        OwnershipError::Forbidden { kind, .. } => format!("You do not own this {kind}"),
        OwnershipError::NotFound { kind, id } => format!("{kind} {id} not found"),
        OwnershipError::Repository(_) => "Internal server error".to_owned(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = self.public_message(status);
        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Called by the auth extractor so errors are associated with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
mod tests {
    use dongne_core::{ReviewId, UserId};

    use super::*;
    use crate::services::token::TokenError;

    fn get_status(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("review 123".to_string());
        assert_eq!(err.to_string(), "Not found: review 123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_auth_error_status_codes() {
        assert_eq!(get_status(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(get_status(AuthError::UserAlreadyExists), StatusCode::CONFLICT);
        assert_eq!(
            get_status(AuthError::FederationProfileFailed(
                ProviderError::HttpClient("boom".to_owned())
            )),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            get_status(AuthError::Provider(ProviderError::UnknownProvider(
                "myspace".to_owned()
            ))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AuthError::Token(TokenError::Signing("x".to_owned()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_ownership_status_codes() {
        let forbidden = OwnershipError::Forbidden {
            kind: "review",
            id: "1".to_owned(),
            principal: UserId::new(2),
        };
        assert_eq!(
            get_status(ReviewError::Ownership(forbidden)),
            StatusCode::FORBIDDEN
        );

        let missing = OwnershipError::NotFound {
            kind: "review",
            id: "1".to_owned(),
        };
        assert_eq!(
            get_status(MediaError::Ownership(missing)),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_media_status_codes() {
        assert_eq!(
            get_status(MediaError::UnsupportedMediaType("text/plain".to_owned())),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            get_status(MediaError::PayloadTooLarge { size: 6, max: 5 }),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            get_status(MediaError::UpdateFailed(ReviewId::new(1))),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_server_errors_hide_details() {
        let err = AppError::Internal("connection string leaked".to_owned());
        let status = err.status();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(status), "Internal server error");
    }
}
