use async_trait::async_trait;
use uuid::Uuid;

use super::{ListParams, ListResult, SortOrder, SortSpec};
use crate::{
    db::error::DbResult,
    models::{CreateTerm, Term, UpdateTerm},
};

pub const TERM_SORT: SortSpec = SortSpec {
    columns: &[
        ("name", "name"),
        ("start_date", "start_date"),
        ("end_date", "end_date"),
        ("created_at", "created_at"),
    ],
    default_column: "start_date",
    default_order: SortOrder::Desc,
};

#[async_trait]
pub trait TermRepo: Send + Sync {
    async fn create(&self, input: &CreateTerm) -> DbResult<Term>;

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Term>>;

    async fn list(&self, params: &ListParams) -> DbResult<ListResult<Term>>;

    /// Update a term; a rename refreshes `term_name` on every program in it.
    async fn update(&self, id: Uuid, input: &UpdateTerm) -> DbResult<Term>;

    /// Delete a term. Fails with `Conflict` while any program references it.
    async fn delete(&self, id: Uuid) -> DbResult<()>;
}
