//! Password login, self-registration and the caller's own identity.
//!
//! - `/auth/login` - Exchanges handle and password for a bearer token
//! - `/auth/register` - Creates a STUDENT identity when registration is enabled
//! - `/auth/me` - Returns the authenticated caller

use axum::{Extension, Json, extract::State, http::StatusCode};
use axum_valid::Valid;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    AppState,
    auth::{Actor, AuthError},
    models::{IdentityView, Login, RegisterIdentity},
    routes::api::ApiError,
};

/// Bearer token plus the identity it was issued for.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub identity: IdentityView,
}

/// Log in with handle and password
#[cfg_attr(feature = "utoipa", utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    operation_id = "auth_login",
    request_body = Login,
    security(()),
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.auth.login", skip(state, input), fields(handle = %input.handle))]
pub async fn login(
    State(state): State<AppState>,
    Valid(Json(input)): Valid<Json<Login>>,
) -> Result<Json<LoginResponse>, ApiError> {
    let view = state
        .services
        .identities
        .authenticate(&input.handle, &input.password)
        .await?;

    let identity = &view.identity;
    let issued = state
        .issuer
        .issue(identity.id, identity.role.as_str(), &identity.handle)?;
    tracing::info!(identity_id = %identity.id, role = %identity.role, "Login succeeded");

    Ok(Json(LoginResponse {
        token: issued.token,
        token_type: "Bearer",
        expires_at: issued.expires_at,
        identity: view,
    }))
}

/// Register a student account
#[cfg_attr(feature = "utoipa", utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    operation_id = "auth_register",
    request_body = RegisterIdentity,
    security(()),
    responses(
        (status = 201, description = "Student registered", body = IdentityView),
        (status = 400, description = "Invalid input", body = crate::openapi::ErrorResponse),
        (status = 403, description = "Registration disabled", body = crate::openapi::ErrorResponse),
        (status = 409, description = "Handle or email taken", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.auth.register", skip(state, input), fields(handle = %input.handle))]
pub async fn register(
    State(state): State<AppState>,
    Valid(Json(input)): Valid<Json<RegisterIdentity>>,
) -> Result<(StatusCode, Json<IdentityView>), ApiError> {
    if !state.config.auth.registration_enabled {
        return Err(AuthError::RegistrationDisabled.into());
    }
    let view = state.services.identities.register(input).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// The authenticated caller
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    operation_id = "auth_me",
    responses(
        (status = 200, description = "Current identity", body = IdentityView),
        (status = 401, description = "Unauthenticated", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.auth.me", skip(state, actor), fields(actor_id = %actor.id))]
pub async fn me(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<IdentityView>, ApiError> {
    Ok(Json(state.services.identities.me(&actor).await?))
}
