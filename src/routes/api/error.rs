use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    auth::AuthError, authz::AuthzError, db::DbError, openapi::ErrorResponse,
    services::ServiceError,
};

/// Error returned by `/api/v1` handlers.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Conflict(String),
    Validation(String),
    /// Internal reason; logged, never returned to the caller
    Forbidden(String),
    Database(DbError),
    /// Credential failures keep their own 401 body
    Auth(AuthError),
    Internal(String),
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => ApiError::NotFound("Resource not found".to_string()),
            DbError::Conflict(msg) => ApiError::Conflict(msg),
            DbError::Validation(msg) => ApiError::Validation(msg),
            _ => ApiError::Database(err),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Forbidden(reason) => ApiError::Forbidden(reason),
            ServiceError::Db(db) => db.into(),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::AccessDenied(reason) => ApiError::Forbidden(reason),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found_error", "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "invalid_request_error", "conflict", msg),
            ApiError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "validation_error",
                msg,
            ),
            ApiError::Forbidden(reason) => {
                tracing::debug!(reason = %reason, "Request forbidden");
                (
                    StatusCode::FORBIDDEN,
                    "permission_error",
                    "forbidden",
                    "Forbidden".to_string(),
                )
            }
            ApiError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "database_error",
                    "An internal database error occurred".to_string(),
                )
            }
            ApiError::Auth(err) => return err.into_response(),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse::with_type(error_type, code, message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_errors_map_to_client_statuses() {
        let cases = [
            (DbError::NotFound, StatusCode::NOT_FOUND),
            (DbError::Conflict("dup".into()), StatusCode::CONFLICT),
            (DbError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (DbError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn forbidden_reason_is_not_exposed() {
        let response = ApiError::from(ServiceError::forbidden("target is an ADMIN")).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn auth_errors_keep_their_status() {
        let response = ApiError::from(AuthError::InvalidCredentials).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
