// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types for the auth layer and their HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::services::guard::EMAIL_PENDING_PATH;

/// Failures talking to the Session Store's auth API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("Email address not confirmed")]
    EmailNotConfirmed,

    #[error("Session store unreachable: {0}")]
    Network(String),

    /// Benign: the session was already revoked or never existed.
    #[error("Session already signed out")]
    AlreadyLoggedOut,

    #[error("Session store rejected the request: {0}")]
    Rejected(String),
}

impl AuthError {
    /// Transport-level failures; guards must fail closed on these.
    pub fn is_network(&self) -> bool {
        matches!(self, AuthError::Network(_))
    }
}

/// Failures reading or writing the profile table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    /// Authenticated subject without a profile row. This is a provisioning
    /// defect and is never retried.
    #[error("No profile row for subject {0}")]
    ProfileNotFound(String),

    #[error("Malformed profile row: {0}")]
    Malformed(String),

    #[error("Profile store unreachable: {0}")]
    Network(String),
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("Email address not confirmed")]
    EmailNotConfirmed,

    #[error("Profile missing: {0}")]
    ProfileNotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Session store unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => AppError::InvalidCredentials,
            AuthError::EmailNotConfirmed => AppError::EmailNotConfirmed,
            AuthError::Network(msg) => AppError::ServiceUnavailable(msg),
            AuthError::AlreadyLoggedOut => AppError::Unauthorized,
            AuthError::Rejected(msg) => AppError::BadRequest(msg),
        }
    }
}

impl From<ProfileError> for AppError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::ProfileNotFound(subject) => AppError::ProfileNotFound(subject),
            ProfileError::Network(msg) => AppError::ServiceUnavailable(msg),
            ProfileError::Malformed(msg) => AppError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    /// Page the client should show instead of retrying.
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<&'static str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "invalid_credentials", None)
            }
            AppError::EmailNotConfirmed => (StatusCode::FORBIDDEN, "email_not_confirmed", None),
            AppError::ProfileNotFound(subject) => {
                tracing::error!(subject = %subject, "Authenticated user has no profile row");
                (StatusCode::CONFLICT, "profile_not_found", None)
            }
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Forbidden(reason) => {
                tracing::warn!(reason = %reason, "Refused request");
                (StatusCode::FORBIDDEN, "forbidden", None)
            }
            AppError::ServiceUnavailable(msg) => {
                tracing::warn!(error = %msg, "Session store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    Some("Please try again in a moment".to_string()),
                )
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let redirect = match &self {
            AppError::EmailNotConfirmed => Some(EMAIL_PENDING_PATH),
            _ => None,
        };
        let body = ErrorResponse {
            error: error.to_string(),
            details,
            redirect,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
