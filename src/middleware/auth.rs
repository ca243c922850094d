//! Bearer authentication for `/api/v1`.
//!
//! Verifies the `Authorization: Bearer <token>` header through the configured
//! [`CredentialVerifier`](crate::auth::CredentialVerifier) and attaches the
//! resulting [`Actor`] to the request. Reads trust the role claim until the
//! token expires; writes also require the identity to still exist and be
//! active.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

use crate::{
    AppState,
    auth::{Actor, AuthError},
};

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(req.headers())?;
    let credential = state.verifier.verify(token)?;

    let actor = Actor::new(credential.subject_id, credential.role);
    if actor.role.is_none() {
        tracing::debug!(actor_id = %actor.id, role = %actor.role_claim, "Unrecognized role claim");
    }
    tracing::Span::current().record("actor_id", tracing::field::display(actor.id));

    if is_mutating(req.method()) {
        let identity = state
            .db
            .identities()
            .get_by_id(actor.id)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        if !identity.is_some_and(|identity| identity.is_active) {
            tracing::debug!(actor_id = %actor.id, "Token holder is inactive or deleted");
            return Err(AuthError::InvalidToken);
        }
    }

    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}

fn is_mutating(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Extract the bearer token. A missing header or a non-Bearer scheme is
/// reported as missing credentials.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?;
    let value = header.to_str().map_err(|_| AuthError::InvalidToken)?;

    match value.strip_prefix("Bearer ").map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MissingCredentials),
    }
}
