use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use axum_valid::Valid;
use serde::Serialize;
use uuid::Uuid;

use super::{ApiError, ListQuery};
use crate::{
    AppState,
    auth::Actor,
    db::TERM_SORT,
    models::{CreateTerm, Term, UpdateTerm},
    openapi::PaginationMeta,
};

/// Paginated list of terms
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct TermListResponse {
    pub data: Vec<Term>,
    pub pagination: PaginationMeta,
}

/// List terms
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/api/v1/terms",
    tag = "terms",
    operation_id = "term_list",
    params(ListQuery),
    responses((status = 200, description = "Terms", body = TermListResponse))
))]
#[tracing::instrument(name = "api.terms.list", skip(state, query))]
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<TermListResponse>, ApiError> {
    let params = query.params(&TERM_SORT, &state.config.pagination);
    let result = state.services.terms.list(&params).await?;
    Ok(Json(TermListResponse {
        pagination: PaginationMeta::of(&result),
        data: result.items,
    }))
}

/// Create a term
#[cfg_attr(feature = "utoipa", utoipa::path(
    post,
    path = "/api/v1/terms",
    tag = "terms",
    operation_id = "term_create",
    request_body = CreateTerm,
    responses(
        (status = 201, description = "Term created", body = Term),
        (status = 400, description = "Invalid date range", body = crate::openapi::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.terms.create", skip(state, actor, input))]
pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Valid(Json(input)): Valid<Json<CreateTerm>>,
) -> Result<(StatusCode, Json<Term>), ApiError> {
    let term = state.services.terms.create(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(term)))
}

/// Get a term
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/api/v1/terms/{id}",
    tag = "terms",
    operation_id = "term_get",
    params(("id" = Uuid, Path, description = "Term ID")),
    responses(
        (status = 200, description = "Term", body = Term),
        (status = 404, description = "Not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.terms.get", skip(state), fields(%id))]
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Term>, ApiError> {
    Ok(Json(state.services.terms.get(id).await?))
}

/// Rename or re-date a term
#[cfg_attr(feature = "utoipa", utoipa::path(
    patch,
    path = "/api/v1/terms/{id}",
    tag = "terms",
    operation_id = "term_update",
    params(("id" = Uuid, Path, description = "Term ID")),
    request_body = UpdateTerm,
    responses(
        (status = 200, description = "Term updated", body = Term),
        (status = 400, description = "Invalid date range", body = crate::openapi::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.terms.update", skip(state, actor, input), fields(%id))]
pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Valid(Json(input)): Valid<Json<UpdateTerm>>,
) -> Result<Json<Term>, ApiError> {
    Ok(Json(state.services.terms.update(&actor, id, input).await?))
}

/// Delete a term no program references
#[cfg_attr(feature = "utoipa", utoipa::path(
    delete,
    path = "/api/v1/terms/{id}",
    tag = "terms",
    operation_id = "term_delete",
    params(("id" = Uuid, Path, description = "Term ID")),
    responses(
        (status = 204, description = "Term deleted"),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Not found", body = crate::openapi::ErrorResponse),
        (status = 409, description = "Term still has programs", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.terms.delete", skip(state, actor), fields(%id))]
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.services.terms.delete(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
