use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
};
use axum_valid::Valid;
use serde::Serialize;
use uuid::Uuid;

use super::{ApiError, ListQuery};
use crate::{
    AppState,
    auth::Actor,
    db::{PROGRAM_SORT, ROSTER_SORT},
    models::{
        AssignCourse, AssignInstructor, BulkEnroll, BulkEnrollResult, CreateProgram,
        EnrollStudent, MembershipOutcome, Program, ProgramMembership, RosterEntry, UpdateProgram,
    },
    openapi::PaginationMeta,
};

/// Paginated list of programs
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ProgramListResponse {
    pub data: Vec<Program>,
    pub pagination: PaginationMeta,
}

/// Paginated program roster
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct RosterListResponse {
    pub data: Vec<RosterEntry>,
    pub pagination: PaginationMeta,
}

/// Program routes, including the `teachers`/`lesson` spellings older clients use.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/programs", get(list).post(create))
        .route("/programs/{id}", get(get_one).patch(update).delete(remove))
        .route("/programs/{id}/course", put(assign_course))
        .route("/programs/{id}/lesson", put(assign_course))
        .route("/programs/{id}/course/{course_id}", delete(unassign_course))
        .route("/programs/{id}/lesson/{course_id}", delete(unassign_course))
        .route(
            "/programs/{id}/instructors",
            get(list_instructors).post(add_instructor),
        )
        .route(
            "/programs/{id}/teachers",
            get(list_instructors).post(add_instructor),
        )
        .route(
            "/programs/{id}/instructors/{instructor_id}",
            delete(remove_instructor),
        )
        .route(
            "/programs/{id}/teachers/{instructor_id}",
            delete(remove_instructor),
        )
        .route("/programs/{id}/students", get(list_students).post(add_student))
        .route("/programs/{id}/students/bulk", post(bulk_enroll))
        .route(
            "/programs/{id}/students/{student_id}",
            delete(remove_student),
        )
}

/// 201 for a new association, 200 when it already existed.
fn membership_response(outcome: MembershipOutcome) -> (StatusCode, Json<ProgramMembership>) {
    let status = if outcome.is_created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, Json(outcome.into_membership()))
}

/// List programs the caller may access
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/api/v1/programs",
    tag = "programs",
    operation_id = "program_list",
    params(ListQuery),
    responses(
        (status = 200, description = "Accessible programs", body = ProgramListResponse),
    )
))]
#[tracing::instrument(name = "api.programs.list", skip(state, actor, query))]
pub async fn list(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ProgramListResponse>, ApiError> {
    let params = query.params(&PROGRAM_SORT, &state.config.pagination);
    let result = state.services.programs.list(&actor, &params).await?;
    Ok(Json(ProgramListResponse {
        pagination: PaginationMeta::of(&result),
        data: result.items,
    }))
}

/// Schedule a program slot in a term
#[cfg_attr(feature = "utoipa", utoipa::path(
    post,
    path = "/api/v1/programs",
    tag = "programs",
    operation_id = "program_create",
    request_body = CreateProgram,
    responses(
        (status = 201, description = "Program created", body = Program),
        (status = 400, description = "Invalid slot, term or course", body = crate::openapi::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.programs.create", skip(state, actor, input))]
pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Valid(Json(input)): Valid<Json<CreateProgram>>,
) -> Result<(StatusCode, Json<Program>), ApiError> {
    let program = state.services.programs.create(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(program)))
}

/// Get a program
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/api/v1/programs/{id}",
    tag = "programs",
    operation_id = "program_get",
    params(("id" = Uuid, Path, description = "Program ID")),
    responses(
        (status = 200, description = "Program", body = Program),
        (status = 403, description = "No access to program", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.programs.get", skip(state, actor), fields(%id))]
pub async fn get_one(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<Program>, ApiError> {
    Ok(Json(state.services.programs.get(&actor, id).await?))
}

/// Move a program slot in time or to another term
#[cfg_attr(feature = "utoipa", utoipa::path(
    patch,
    path = "/api/v1/programs/{id}",
    tag = "programs",
    operation_id = "program_update",
    params(("id" = Uuid, Path, description = "Program ID")),
    request_body = UpdateProgram,
    responses(
        (status = 200, description = "Program updated", body = Program),
        (status = 400, description = "Invalid slot or term", body = crate::openapi::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.programs.update", skip(state, actor, input), fields(%id))]
pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Valid(Json(input)): Valid<Json<UpdateProgram>>,
) -> Result<Json<Program>, ApiError> {
    Ok(Json(state.services.programs.update(&actor, id, input).await?))
}

/// Delete a program with all of its associations
#[cfg_attr(feature = "utoipa", utoipa::path(
    delete,
    path = "/api/v1/programs/{id}",
    tag = "programs",
    operation_id = "program_delete",
    params(("id" = Uuid, Path, description = "Program ID")),
    responses(
        (status = 204, description = "Program deleted"),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.programs.delete", skip(state, actor), fields(%id))]
pub async fn remove(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.services.programs.delete(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Attach a course to the program, replacing any current one
#[cfg_attr(feature = "utoipa", utoipa::path(
    put,
    path = "/api/v1/programs/{id}/course",
    tag = "programs",
    operation_id = "program_assign_course",
    params(("id" = Uuid, Path, description = "Program ID")),
    request_body = AssignCourse,
    responses(
        (status = 200, description = "Course assigned", body = Program),
        (status = 400, description = "Unknown course", body = crate::openapi::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Program not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.programs.assign_course", skip(state, actor, input), fields(%id))]
pub async fn assign_course(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Valid(Json(input)): Valid<Json<AssignCourse>>,
) -> Result<Json<Program>, ApiError> {
    Ok(Json(
        state
            .services
            .programs
            .assign_course(&actor, id, input.course_id)
            .await?,
    ))
}

/// Detach the program's course
#[cfg_attr(feature = "utoipa", utoipa::path(
    delete,
    path = "/api/v1/programs/{id}/course/{course_id}",
    tag = "programs",
    operation_id = "program_unassign_course",
    params(
        ("id" = Uuid, Path, description = "Program ID"),
        ("course_id" = Uuid, Path, description = "Course ID"),
    ),
    responses(
        (status = 200, description = "Course unassigned", body = Program),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Program or assignment not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.programs.unassign_course", skip(state, actor))]
pub async fn unassign_course(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((id, course_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Program>, ApiError> {
    Ok(Json(
        state
            .services
            .programs
            .unassign_course(&actor, id, course_id)
            .await?,
    ))
}

/// Instructors assigned to the program
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/api/v1/programs/{id}/instructors",
    tag = "programs",
    operation_id = "program_list_instructors",
    params(("id" = Uuid, Path, description = "Program ID"), ListQuery),
    responses(
        (status = 200, description = "Instructor roster", body = RosterListResponse),
        (status = 403, description = "No access to program", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Program not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.programs.list_instructors", skip(state, actor, query), fields(%id))]
pub async fn list_instructors(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<RosterListResponse>, ApiError> {
    let params = query.params(&ROSTER_SORT, &state.config.pagination);
    let result = state
        .services
        .programs
        .list_instructors(&actor, id, &params)
        .await?;
    Ok(Json(RosterListResponse {
        pagination: PaginationMeta::of(&result),
        data: result.items,
    }))
}

/// Assign an instructor to the program
#[cfg_attr(feature = "utoipa", utoipa::path(
    post,
    path = "/api/v1/programs/{id}/instructors",
    tag = "programs",
    operation_id = "program_add_instructor",
    params(("id" = Uuid, Path, description = "Program ID")),
    request_body = AssignInstructor,
    responses(
        (status = 201, description = "Instructor assigned", body = ProgramMembership),
        (status = 200, description = "Already assigned", body = ProgramMembership),
        (status = 400, description = "Not an active instructor", body = crate::openapi::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Program not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.programs.add_instructor", skip(state, actor, input), fields(%id))]
pub async fn add_instructor(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Valid(Json(input)): Valid<Json<AssignInstructor>>,
) -> Result<(StatusCode, Json<ProgramMembership>), ApiError> {
    let outcome = state
        .services
        .programs
        .add_instructor(&actor, id, input.instructor_id)
        .await?;
    Ok(membership_response(outcome))
}

/// Remove an instructor from the program
#[cfg_attr(feature = "utoipa", utoipa::path(
    delete,
    path = "/api/v1/programs/{id}/instructors/{instructor_id}",
    tag = "programs",
    operation_id = "program_remove_instructor",
    params(
        ("id" = Uuid, Path, description = "Program ID"),
        ("instructor_id" = Uuid, Path, description = "Instructor identity ID"),
    ),
    responses(
        (status = 204, description = "Instructor removed"),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Program or assignment not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.programs.remove_instructor", skip(state, actor))]
pub async fn remove_instructor(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((id, instructor_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state
        .services
        .programs
        .remove_instructor(&actor, id, instructor_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Students enrolled in the program
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/api/v1/programs/{id}/students",
    tag = "programs",
    operation_id = "program_list_students",
    params(("id" = Uuid, Path, description = "Program ID"), ListQuery),
    responses(
        (status = 200, description = "Student roster", body = RosterListResponse),
        (status = 403, description = "No access to program", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Program not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.programs.list_students", skip(state, actor, query), fields(%id))]
pub async fn list_students(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<RosterListResponse>, ApiError> {
    let params = query.params(&ROSTER_SORT, &state.config.pagination);
    let result = state
        .services
        .programs
        .list_students(&actor, id, &params)
        .await?;
    Ok(Json(RosterListResponse {
        pagination: PaginationMeta::of(&result),
        data: result.items,
    }))
}

/// Enroll a student in the program
#[cfg_attr(feature = "utoipa", utoipa::path(
    post,
    path = "/api/v1/programs/{id}/students",
    tag = "programs",
    operation_id = "program_add_student",
    params(("id" = Uuid, Path, description = "Program ID")),
    request_body = EnrollStudent,
    responses(
        (status = 201, description = "Student enrolled", body = ProgramMembership),
        (status = 200, description = "Already enrolled", body = ProgramMembership),
        (status = 400, description = "Not an active student", body = crate::openapi::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Program not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.programs.add_student", skip(state, actor, input), fields(%id))]
pub async fn add_student(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Valid(Json(input)): Valid<Json<EnrollStudent>>,
) -> Result<(StatusCode, Json<ProgramMembership>), ApiError> {
    let outcome = state
        .services
        .programs
        .add_student(&actor, id, input.student_id)
        .await?;
    Ok(membership_response(outcome))
}

/// Enroll several students, reporting per-student failures
#[cfg_attr(feature = "utoipa", utoipa::path(
    post,
    path = "/api/v1/programs/{id}/students/bulk",
    tag = "programs",
    operation_id = "program_bulk_enroll",
    params(("id" = Uuid, Path, description = "Program ID")),
    request_body = BulkEnroll,
    responses(
        (status = 200, description = "Enrollment summary", body = BulkEnrollResult),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Program not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.programs.bulk_enroll", skip(state, actor, input), fields(%id))]
pub async fn bulk_enroll(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Valid(Json(input)): Valid<Json<BulkEnroll>>,
) -> Result<Json<BulkEnrollResult>, ApiError> {
    Ok(Json(
        state
            .services
            .programs
            .bulk_enroll(&actor, id, &input.student_ids)
            .await?,
    ))
}

/// Withdraw a student from the program
#[cfg_attr(feature = "utoipa", utoipa::path(
    delete,
    path = "/api/v1/programs/{id}/students/{student_id}",
    tag = "programs",
    operation_id = "program_remove_student",
    params(
        ("id" = Uuid, Path, description = "Program ID"),
        ("student_id" = Uuid, Path, description = "Student identity ID"),
    ),
    responses(
        (status = 204, description = "Student removed"),
        (status = 403, description = "Forbidden", body = crate::openapi::ErrorResponse),
        (status = 404, description = "Program or enrollment not found", body = crate::openapi::ErrorResponse),
    )
))]
#[tracing::instrument(name = "api.programs.remove_student", skip(state, actor))]
pub async fn remove_student(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((id, student_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state
        .services
        .programs
        .remove_student(&actor, id, student_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
