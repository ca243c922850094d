use serde::{Deserialize, Serialize};
#[cfg(feature = "utoipa")]
use utoipa::OpenApi;

use crate::db::ListResult;
#[cfg(feature = "utoipa")]
use crate::{
    auth, models,
    routes::{self, api, health},
};

#[cfg(feature = "utoipa")]
/// OpenAPI documentation for Registrar
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Registrar API",
        version = "0.1.0",
        description = r#"**Registrar** manages school identities and the program schedule they are enrolled in.

## Roles

Every identity holds exactly one role, ranked `STUDENT < INSTRUCTOR < ASSISTANT_MANAGER < MANAGER < ADMIN`.
`TEACHER` is accepted as a synonym for `INSTRUCTOR`. A caller only sees identities ranked below
its own role (plus itself); identities outside that view are reported as `404`.

## Authentication

Obtain a token from `POST /api/v1/auth/login` and send it as `Authorization: Bearer <token>`.
Tokens are valid for 24 hours.

## Pagination

List endpoints accept `page` (zero-based), `size`, `sort` and `type` (`asc` or `desc`) and
return `{"data": [...], "pagination": {"page", "size", "total"}}`.

## Errors

Errors use `{"error": {"type", "message", "param", "code"}}`. The `X-Request-Id` response
header correlates a response with server logs.
"#,
        license(name = "Apache-2.0 OR MIT"),
    ),
    servers(
        (url = "/", description = "Default server")
    ),
    tags(
        (name = "health", description = "Liveness and database health."),
        (name = "auth", description = "Password login, student self-registration and the current identity."),
        (name = "identities", description = "Identities with their role-specific profile. Reads are filtered by the caller's visibility."),
        (name = "programs", description = "Scheduled program slots, their course and their instructor and student rosters. `teachers` and `lesson` route spellings are accepted."),
        (name = "terms", description = "Terms that programs are scheduled within."),
        (name = "courses", description = "Courses that can be attached to program slots."),
        (name = "maintenance", description = "Administrative clean-up operations."),
    ),
    paths(
        health::health_check,
        health::liveness,
        routes::auth::login,
        routes::auth::register,
        routes::auth::me,
        api::identities::list,
        api::identities::create,
        api::identities::get,
        api::identities::update,
        api::identities::delete,
        api::identities::change_role,
        api::identities::set_active,
        api::identities::programs,
        api::maintenance::purge_stale_profiles,
        api::terms::list,
        api::terms::create,
        api::terms::get,
        api::terms::update,
        api::terms::delete,
        api::courses::list,
        api::courses::create,
        api::courses::get,
        api::courses::update,
        api::courses::delete,
        api::programs::list,
        api::programs::create,
        api::programs::get_one,
        api::programs::update,
        api::programs::remove,
        api::programs::assign_course,
        api::programs::unassign_course,
        api::programs::list_instructors,
        api::programs::add_instructor,
        api::programs::remove_instructor,
        api::programs::list_students,
        api::programs::add_student,
        api::programs::bulk_enroll,
        api::programs::remove_student,
    ),
    components(schemas(
        ErrorResponse,
        ErrorInfo,
        PaginationMeta,
        auth::IssuedToken,
        routes::auth::LoginResponse,
        models::Role,
        models::Identity,
        models::IdentityView,
        models::Profile,
        models::StudentProfile,
        models::InstructorProfile,
        models::StaffProfile,
        models::ProfileFields,
        models::UpdateProfileFields,
        models::CreateIdentity,
        models::RegisterIdentity,
        models::UpdateIdentity,
        models::ChangeRole,
        models::SetActive,
        models::Login,
        models::IdentityDeletionResult,
        models::StaleProfilePurge,
        models::Term,
        models::CreateTerm,
        models::UpdateTerm,
        models::Course,
        models::CreateCourse,
        models::UpdateCourse,
        models::DayOfWeek,
        models::Program,
        models::CreateProgram,
        models::UpdateProgram,
        models::AssignCourse,
        models::AssignInstructor,
        models::EnrollStudent,
        models::BulkEnroll,
        models::BulkEnrollResult,
        models::BulkEnrollFailure,
        models::ProgramMembership,
        models::RosterEntry,
        api::identities::IdentityListResponse,
        api::programs::ProgramListResponse,
        api::programs::RosterListResponse,
        api::terms::TermListResponse,
        api::courses::CourseListResponse,
        api::maintenance::PurgeStaleProfiles,
        health::HealthStatus,
        health::ComponentStatus,
    )),
    security(
        ("bearer" = [])
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Standard error response body
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ErrorResponse {
    pub error: ErrorInfo,
}

/// `{"type", "message", "param", "code"}`
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ErrorInfo {
    /// Error class, e.g. "invalid_request_error" or "permission_error"
    #[cfg_attr(feature = "utoipa", schema(example = "invalid_request_error"))]
    #[serde(rename = "type")]
    pub error_type: String,
    #[cfg_attr(feature = "utoipa", schema(example = "Handle 'jdoe' is already taken"))]
    pub message: String,
    /// Request field that caused the error, if known
    #[cfg_attr(feature = "utoipa", schema(example = json!(null)))]
    pub param: Option<String>,
    #[cfg_attr(feature = "utoipa", schema(example = "conflict"))]
    pub code: Option<String>,
}

impl ErrorResponse {
    /// An `invalid_request_error`.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_type("invalid_request_error", code, message)
    }

    pub fn with_param(
        code: impl Into<String>,
        message: impl Into<String>,
        param: impl Into<String>,
    ) -> Self {
        let mut response = Self::new(code, message);
        response.error.param = Some(param.into());
        response
    }

    pub fn with_type(
        error_type: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorInfo {
                error_type: error_type.into(),
                message: message.into(),
                param: None,
                code: Some(code.into()),
            },
        }
    }
}

/// Offset pagination metadata returned alongside list data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct PaginationMeta {
    /// Zero-based page index
    #[cfg_attr(feature = "utoipa", schema(example = 0))]
    pub page: u32,
    #[cfg_attr(feature = "utoipa", schema(example = 20))]
    pub size: u32,
    /// Matching records across all pages
    #[cfg_attr(feature = "utoipa", schema(example = 57))]
    pub total: i64,
}

impl PaginationMeta {
    pub fn of<T>(result: &ListResult<T>) -> Self {
        Self {
            page: result.page,
            size: result.size,
            total: result.total,
        }
    }
}

#[cfg(feature = "utoipa")]
struct SecurityAddon;

#[cfg(feature = "utoipa")]
impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::HttpBuilder::new()
                    .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .description(Some("Token issued by POST /api/v1/auth/login"))
                    .build(),
            ),
        );
    }
}
