//! Unified error handling for the HTTP surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::oauth::OAuthError;
use crate::storage::StorageError;
use crate::sync::SyncError;

/// Application-level error type for the admin and OAuth routes.
///
/// Webhook routes do not use this type; their outcome-to-status mapping is
/// part of the webhook state machine (see [`crate::webhooks`]).
#[derive(Debug, Error)]
pub enum AppError {
    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Sync operation failed.
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// OAuth flow failed.
    #[error("OAuth error: {0}")]
    OAuth(#[from] OAuthError),

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

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log server-side failures with Sentry
        if matches!(
            self,
            Self::Storage(_) | Self::Internal(_) | Self::Sync(SyncError::Storage(_))
        ) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "request error"
            );
        }

        let status = match &self {
            Self::Storage(StorageError::NotFound) => StatusCode::NOT_FOUND,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Sync(err) => match err {
                SyncError::ValidationRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
                SyncError::PlatformUnavailable(_) | SyncError::Platform(_) => {
                    StatusCode::BAD_GATEWAY
                }
                SyncError::ReauthorizationRequired | SyncError::StoreDeactivated => {
                    StatusCode::CONFLICT
                }
                SyncError::SourceNotFound(_) => StatusCode::NOT_FOUND,
                SyncError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::OAuth(err) => match err {
                OAuthError::InvalidState => StatusCode::BAD_REQUEST,
                OAuthError::PlatformRejected(_) => StatusCode::BAD_GATEWAY,
                OAuthError::PlatformUnavailable(_) => StatusCode::BAD_GATEWAY,
                OAuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Storage(_) | Self::Internal(_) | Self::Sync(SyncError::Storage(_)) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("store abc".to_string());
        assert_eq!(err.to_string(), "Not found: store abc");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            status_of(AppError::NotFound("x".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(AppError::BadRequest("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AppError::Internal("x".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(AppError::OAuth(OAuthError::InvalidState)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AppError::Sync(SyncError::ValidationRejected(
                "bad title".to_string()
            ))),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(AppError::Sync(SyncError::PlatformUnavailable(
                "503".to_string()
            ))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(AppError::Sync(SyncError::StoreDeactivated)),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_validation_message_is_surfaced_verbatim() {
        let err = AppError::Sync(SyncError::ValidationRejected(
            "title: can't be blank".to_string(),
        ));
        assert!(err.to_string().contains("title: can't be blank"));
    }
}
