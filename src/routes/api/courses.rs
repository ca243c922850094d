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
    db::COURSE_SORT,
    models::{Course, CreateCourse, UpdateCourse},
    openapi::PaginationMeta,
};

/// Paginated list of courses
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct CourseListResponse {
    pub data: Vec<Course>,
    pub pagination: PaginationMeta,
}

/// List courses
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/api/v1/courses",
    tag = "courses",
    operation_id = "course_list",
    params(ListQuery),
    responses((status = 200, description = "Courses", body = CourseListResponse))
))]
#[tracing::instrument(name = "api.courses.list", skip(state, query))]
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<CourseListResponse>, ApiError> {
    let params = query.params(&COURSE_SORT, &state.config.pagination);
    let result = state.services.courses.list(&params).await?;
    Ok(Json(CourseListResponse {
        pagination: PaginationMeta::of(&result),
        data: result.items,
    }))
}

/// Create a course
#[cfg_attr(feature = "utoipa", utoipa::path(
    post,
    path = "/api/v1/courses",
    tag = "courses",
    operation_id = "course_create",
    request_body = CreateCourse,
    responses(
        (status = 201, description = "Course created", body = Course),
        (status = 400, description = "Invalid input", body = crate::openapi::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 409, description = "Course code taken", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.courses.create", skip(state, actor, input))]
pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Valid(Json(input)): Valid<Json<CreateCourse>>,
) -> Result<(StatusCode, Json<Course>), ApiError> {
    let course = state.services.courses.create(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// Get a course
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/api/v1/courses/{id}",
    tag = "courses",
    operation_id = "course_get",
    params(("id" = Uuid, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Course", body = Course),
        (status = 404, description = "Not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.courses.get", skip(state), fields(%id))]
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Course>, ApiError> {
    Ok(Json(state.services.courses.get(id).await?))
}

/// Rename or describe a course
#[cfg_attr(feature = "utoipa", utoipa::path(
    patch,
    path = "/api/v1/courses/{id}",
    tag = "courses",
    operation_id = "course_update",
    params(("id" = Uuid, Path, description = "Course ID")),
    request_body = UpdateCourse,
    responses(
        (status = 200, description = "Course updated", body = Course),
        (status = 400, description = "Invalid input", body = crate::openapi::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.courses.update", skip(state, actor, input), fields(%id))]
pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Valid(Json(input)): Valid<Json<UpdateCourse>>,
) -> Result<Json<Course>, ApiError> {
    Ok(Json(state.services.courses.update(&actor, id, input).await?))
}

/// Delete a course no program carries
#[cfg_attr(feature = "utoipa", utoipa::path(
    delete,
    path = "/api/v1/courses/{id}",
    tag = "courses",
    operation_id = "course_delete",
    params(("id" = Uuid, Path, description = "Course ID")),
    responses(
        (status = 204, description = "Course deleted"),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Not found", body = crate::openapi::ErrorResponse),
        (status = 409, description = "Course still assigned to programs", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.courses.delete", skip(state, actor), fields(%id))]
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.services.courses.delete(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
