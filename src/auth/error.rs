use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::openapi::ErrorResponse;

/// Failures before an [`Actor`](super::Actor) exists. All map to 401 except
/// `RegistrationDisabled` (403) and `Internal` (500).
#[derive(Debug)]
pub enum AuthError {
    /// No `Authorization: Bearer` header
    MissingCredentials,

    /// Unknown handle, wrong password or inactive identity; indistinguishable on purpose
    InvalidCredentials,

    /// Bad signature, malformed claims or an unknown role claim
    InvalidToken,

    ExpiredToken,

    /// `auth.registration_enabled = false`
    RegistrationDisabled,

    /// Hashing or signing failed
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AuthError::MissingCredentials => (
                StatusCode::UNAUTHORIZED,
                "missing_credentials",
                "Authentication credentials required",
            ),
            AuthError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid authentication credentials",
            ),
            AuthError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Invalid authentication token",
            ),
            AuthError::ExpiredToken => (
                StatusCode::UNAUTHORIZED,
                "expired_token",
                "Authentication token has expired",
            ),
            AuthError::RegistrationDisabled => {
                let body = ErrorResponse::with_type(
                    "permission_error",
                    "forbidden",
                    "Forbidden",
                );
                return (StatusCode::FORBIDDEN, Json(body)).into_response();
            }
            AuthError::Internal(msg) => {
                tracing::error!(error = %msg, "Credential handling failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred",
                )
            }
        };

        let body = ErrorResponse::with_type("authentication_error", code, message);
        (status, Json(body)).into_response()
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingCredentials => write!(f, "Authentication credentials required"),
            AuthError::InvalidCredentials => write!(f, "Invalid authentication credentials"),
            AuthError::InvalidToken => write!(f, "Invalid authentication token"),
            AuthError::ExpiredToken => write!(f, "Authentication token has expired"),
            AuthError::RegistrationDisabled => write!(f, "Self-registration is disabled"),
            AuthError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_is_401() {
        let response = AuthError::MissingCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_expired_token_is_401() {
        let response = AuthError::ExpiredToken.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_registration_disabled_is_403() {
        let response = AuthError::RegistrationDisabled.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_internal_is_500() {
        let response = AuthError::Internal("db down".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
