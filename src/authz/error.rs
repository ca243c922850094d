//! Authorization errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthzError {
    /// The reason is for logs only; responses always say "Forbidden".
    #[error("Access denied: {0}")]
    AccessDenied(String),
}

impl AuthzError {
    pub fn access_denied(reason: impl Into<String>) -> Self {
        Self::AccessDenied(reason.into())
    }
}
