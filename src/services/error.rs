use thiserror::Error;

use crate::{authz::AuthzError, db::DbError};

/// Errors raised by the service layer.
///
/// `Forbidden` carries the internal reason for logs only; callers see a
/// generic message.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl ServiceError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }

    pub fn not_found() -> Self {
        Self::Db(DbError::NotFound)
    }
}

impl From<AuthzError> for ServiceError {
    fn from(e: AuthzError) -> Self {
        match e {
            AuthzError::AccessDenied(reason) => ServiceError::Forbidden(reason),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
