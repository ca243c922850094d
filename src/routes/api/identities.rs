use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use axum_valid::Valid;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, ListQuery};
use crate::{
    AppState,
    auth::Actor,
    db::{IDENTITY_SORT, PROGRAM_SORT},
    models::{
        ChangeRole, CreateIdentity, Identity, IdentityDeletionResult, IdentityFilter,
        IdentityView, Role, SetActive, UpdateIdentity,
    },
    openapi::PaginationMeta,
    routes::api::programs::ProgramListResponse,
};

/// Paginated list of identities
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct IdentityListResponse {
    pub data: Vec<Identity>,
    pub pagination: PaginationMeta,
}

/// Query for the identity list: paging plus optional role/active narrowing.
#[derive(Debug, Default, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::IntoParams))]
#[serde(default)]
pub struct IdentityListQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort: Option<String>,
    #[serde(rename = "type")]
    pub order: Option<String>,
    /// Only identities currently holding this role
    #[cfg_attr(feature = "utoipa", param(value_type = Option<String>))]
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl IdentityListQuery {
    fn paging(&self) -> ListQuery {
        ListQuery {
            page: self.page,
            size: self.size,
            sort: self.sort.clone(),
            order: self.order.clone(),
        }
    }
}

/// List identities visible to the caller
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/api/v1/identities",
    tag = "identities",
    operation_id = "identity_list",
    params(IdentityListQuery),
    responses(
        (status = 200, description = "Visible identities", body = IdentityListResponse),
        (status = 401, description = "Unauthenticated", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.identities.list", skip(state, actor, query))]
pub async fn list(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<IdentityListQuery>,
) -> Result<Json<IdentityListResponse>, ApiError> {
    let params = query
        .paging()
        .params(&IDENTITY_SORT, &state.config.pagination);
    let filter = IdentityFilter {
        role: query.role,
        is_active: query.is_active,
    };

    let result = state.services.identities.list(&actor, &filter, &params).await?;
    Ok(Json(IdentityListResponse {
        pagination: PaginationMeta::of(&result),
        data: result.items,
    }))
}

/// Create an identity with its role specialization
#[cfg_attr(feature = "utoipa", utoipa::path(
    post,
    path = "/api/v1/identities",
    tag = "identities",
    operation_id = "identity_create",
    request_body = CreateIdentity,
    responses(
        (status = 201, description = "Identity created", body = IdentityView),
        (status = 400, description = "Invalid input or advisor", body = crate::openapi::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 409, description = "Handle or email taken", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.identities.create", skip(state, actor, input))]
pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Valid(Json(input)): Valid<Json<CreateIdentity>>,
) -> Result<(StatusCode, Json<IdentityView>), ApiError> {
    let view = state.services.identities.create(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Get an identity with its current-role specialization
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/api/v1/identities/{id}",
    tag = "identities",
    operation_id = "identity_get",
    params(("id" = Uuid, Path, description = "Identity ID")),
    responses(
        (status = 200, description = "Identity", body = IdentityView),
        (status = 404, description = "Not found or not visible", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.identities.get", skip(state, actor), fields(%id))]
pub async fn get(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<IdentityView>, ApiError> {
    Ok(Json(state.services.identities.get(&actor, id).await?))
}

/// Partially update an identity
#[cfg_attr(feature = "utoipa", utoipa::path(
    patch,
    path = "/api/v1/identities/{id}",
    tag = "identities",
    operation_id = "identity_update",
    params(("id" = Uuid, Path, description = "Identity ID")),
    request_body = UpdateIdentity,
    responses(
        (status = 200, description = "Identity updated", body = IdentityView),
        (status = 400, description = "Invalid input", body = crate::openapi::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Not found", body = crate::openapi::ErrorResponse),
        (status = 409, description = "Email taken", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.identities.update", skip(state, actor, input), fields(%id))]
pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Valid(Json(input)): Valid<Json<UpdateIdentity>>,
) -> Result<Json<IdentityView>, ApiError> {
    Ok(Json(state.services.identities.update(&actor, id, input).await?))
}

/// Hard-delete an identity and its memberships
#[cfg_attr(feature = "utoipa", utoipa::path(
    delete,
    path = "/api/v1/identities/{id}",
    tag = "identities",
    operation_id = "identity_delete",
    params(("id" = Uuid, Path, description = "Identity ID")),
    responses(
        (status = 200, description = "Identity deleted", body = IdentityDeletionResult),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.identities.delete", skip(state, actor), fields(%id))]
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<IdentityDeletionResult>, ApiError> {
    Ok(Json(state.services.identities.delete(&actor, id).await?))
}

/// Change an identity's role
#[cfg_attr(feature = "utoipa", utoipa::path(
    put,
    path = "/api/v1/identities/{id}/role",
    tag = "identities",
    operation_id = "identity_change_role",
    params(("id" = Uuid, Path, description = "Identity ID")),
    request_body = ChangeRole,
    responses(
        (status = 200, description = "Role changed", body = IdentityView),
        (status = 400, description = "Invalid role fields", body = crate::openapi::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.identities.change_role", skip(state, actor, input), fields(%id))]
pub async fn change_role(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Valid(Json(input)): Valid<Json<ChangeRole>>,
) -> Result<Json<IdentityView>, ApiError> {
    Ok(Json(
        state.services.identities.change_role(&actor, id, input).await?,
    ))
}

/// Activate or deactivate an identity
#[cfg_attr(feature = "utoipa", utoipa::path(
    put,
    path = "/api/v1/identities/{id}/active",
    tag = "identities",
    operation_id = "identity_set_active",
    params(("id" = Uuid, Path, description = "Identity ID")),
    request_body = SetActive,
    responses(
        (status = 200, description = "Active flag updated", body = Identity),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.identities.set_active", skip(state, actor, input), fields(%id))]
pub async fn set_active(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Valid(Json(input)): Valid<Json<SetActive>>,
) -> Result<Json<Identity>, ApiError> {
    Ok(Json(
        state
            .services
            .identities
            .set_active(&actor, id, input.is_active)
            .await?,
    ))
}

/// Programs an instructor teaches or a student attends
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/api/v1/identities/{id}/programs",
    tag = "identities",
    operation_id = "identity_programs",
    params(("id" = Uuid, Path, description = "Identity ID"), ListQuery),
    responses(
        (status = 200, description = "Programs of the identity", body = ProgramListResponse),
        (status = 404, description = "Not found or not visible", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.identities.programs", skip(state, actor, query), fields(%id))]
pub async fn programs(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ProgramListResponse>, ApiError> {
    let params = query.params(&PROGRAM_SORT, &state.config.pagination);
    let result = state
        .services
        .identities
        .programs_of(&actor, id, &params)
        .await?;
    Ok(Json(ProgramListResponse {
        pagination: PaginationMeta::of(&result),
        data: result.items,
    }))
}
