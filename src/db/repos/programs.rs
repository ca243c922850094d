use async_trait::async_trait;
use uuid::Uuid;

use super::{ListParams, ListResult, SortOrder, SortSpec};
use crate::{
    db::error::DbResult,
    models::{CreateProgram, MembershipOutcome, Program, RosterEntry, UpdateProgram},
};

pub const PROGRAM_SORT: SortSpec = SortSpec {
    columns: &[
        ("day_of_week", "day_of_week"),
        ("start_time", "start_time"),
        ("course_name", "course_name"),
        ("term_name", "term_name"),
        ("created_at", "created_at"),
    ],
    default_column: "created_at",
    default_order: SortOrder::Desc,
};

/// Roster sort columns, resolved against the joined `roster` subquery.
pub const ROSTER_SORT: SortSpec = SortSpec {
    columns: &[
        ("handle", "handle"),
        ("name", "name"),
        ("surname", "surname"),
        ("assigned_at", "assigned_at"),
    ],
    default_column: "assigned_at",
    default_order: SortOrder::Asc,
};

/// Which programs a listing may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramScope {
    All,
    /// Programs the identity is assigned to as instructor
    InstructorOf(Uuid),
    /// Programs the identity is enrolled in
    StudentOf(Uuid),
    Nothing,
}

/// Rows whose denormalized projection must be recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionTarget {
    Program(Uuid),
    /// Every program scheduled in the term
    Term(Uuid),
    /// Every program the course is currently assigned to
    Course(Uuid),
}

/// Storage for program slots and the program↔course, program↔instructor and
/// program↔student association sets.
///
/// Every write that can change a program's course, slot time or term refreshes
/// the denormalized `course_*`/`term_name` columns in the same transaction.
#[async_trait]
pub trait ProgramRepo: Send + Sync {
    /// Create a program in an existing term, optionally with an initial course.
    async fn create(&self, input: &CreateProgram) -> DbResult<Program>;

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Program>>;

    async fn list(&self, scope: ProgramScope, params: &ListParams) -> DbResult<ListResult<Program>>;

    async fn update(&self, id: Uuid, input: &UpdateProgram) -> DbResult<Program>;

    /// Delete a program and all of its associations.
    async fn delete(&self, id: Uuid) -> DbResult<()>;

    /// Make `course_id` the program's only course (overwrite semantics).
    async fn assign_course(&self, program_id: Uuid, course_id: Uuid) -> DbResult<Program>;

    /// Clear the program's course. `NotFound` unless `course_id` is the current one.
    async fn unassign_course(&self, program_id: Uuid, course_id: Uuid) -> DbResult<Program>;

    /// Idempotent; the identity must currently be an INSTRUCTOR.
    async fn add_instructor(
        &self,
        program_id: Uuid,
        instructor_id: Uuid,
    ) -> DbResult<MembershipOutcome>;

    /// `NotFound` if the assignment did not exist.
    async fn remove_instructor(&self, program_id: Uuid, instructor_id: Uuid) -> DbResult<()>;

    /// Idempotent; the identity must currently be a STUDENT.
    async fn add_student(&self, program_id: Uuid, student_id: Uuid)
    -> DbResult<MembershipOutcome>;

    /// `NotFound` if the enrollment did not exist.
    async fn remove_student(&self, program_id: Uuid, student_id: Uuid) -> DbResult<()>;

    async fn is_instructor(&self, program_id: Uuid, identity_id: Uuid) -> DbResult<bool>;

    async fn is_student(&self, program_id: Uuid, identity_id: Uuid) -> DbResult<bool>;

    async fn list_instructors(
        &self,
        program_id: Uuid,
        params: &ListParams,
    ) -> DbResult<ListResult<RosterEntry>>;

    async fn list_students(
        &self,
        program_id: Uuid,
        params: &ListParams,
    ) -> DbResult<ListResult<RosterEntry>>;

    /// Recompute the denormalized projection from source tables.
    async fn refresh_projection(&self, target: ProjectionTarget) -> DbResult<u64>;
}
