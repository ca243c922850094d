use async_trait::async_trait;
use uuid::Uuid;

use super::{ListParams, ListResult, SortOrder, SortSpec};
use crate::{
    db::error::DbResult,
    models::{Course, CreateCourse, UpdateCourse},
};

pub const COURSE_SORT: SortSpec = SortSpec {
    columns: &[
        ("code", "code"),
        ("name", "name"),
        ("created_at", "created_at"),
    ],
    default_column: "code",
    default_order: SortOrder::Asc,
};

#[async_trait]
pub trait CourseRepo: Send + Sync {
    async fn create(&self, input: &CreateCourse) -> DbResult<Course>;

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Course>>;

    async fn list(&self, params: &ListParams) -> DbResult<ListResult<Course>>;

    /// Update a course; a rename refreshes `course_name` on programs carrying it.
    async fn update(&self, id: Uuid, input: &UpdateCourse) -> DbResult<Course>;

    /// Delete a course. Fails with `Conflict` while assigned to any program.
    async fn delete(&self, id: Uuid) -> DbResult<()>;
}
