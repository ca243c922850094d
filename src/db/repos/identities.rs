use async_trait::async_trait;
use uuid::Uuid;

use super::{ListParams, ListResult, SortOrder, SortSpec};
use crate::{
    authz::VisibilityScope,
    db::error::{DbError, DbResult},
    models::{
        ChangeRole, CreateIdentity, Identity, IdentityCredentials, IdentityDeletionResult,
        IdentityFilter, IdentityView, Role, UpdateIdentity,
    },
};

pub const IDENTITY_SORT: SortSpec = SortSpec {
    columns: &[
        ("handle", "handle"),
        ("name", "name"),
        ("surname", "surname"),
        ("email", "email"),
        ("role", "role"),
        ("created_at", "created_at"),
        ("updated_at", "updated_at"),
    ],
    default_column: "created_at",
    default_order: SortOrder::Desc,
};

/// Specialization table holding role-specific fields for `role`.
pub fn profile_table(role: Role) -> &'static str {
    match role {
        Role::Student => "student_profiles",
        Role::Instructor => "instructor_profiles",
        Role::AssistantManager => "assistant_manager_profiles",
        Role::Manager => "manager_profiles",
        Role::Admin => "admin_profiles",
    }
}

/// Whether the specialization table for `role` carries its own active flag.
/// Instructor deactivation lives on the base identity only.
pub fn profile_has_active_flag(role: Role) -> bool {
    match role {
        Role::Instructor => false,
        Role::Student | Role::AssistantManager | Role::Manager | Role::Admin => true,
    }
}

/// Reject role-specific fields that do not belong to `role`.
pub fn ensure_fields_fit_role(role: Role, foreign: Vec<&'static str>) -> DbResult<()> {
    if foreign.is_empty() {
        Ok(())
    } else {
        Err(DbError::Validation(format!(
            "Fields [{}] do not apply to role {}",
            foreign.join(", "),
            role
        )))
    }
}

/// Identity store and specialization synchronizer.
///
/// Every mutating method runs as one transaction spanning the base identity row
/// and the specialization table for the identity's current role.
#[async_trait]
pub trait IdentityRepo: Send + Sync {
    /// Create an identity and its specialization row.
    ///
    /// Handle and email are unique across all identities (handle case-insensitive).
    /// For STUDENT, a supplied advisor must be an existing INSTRUCTOR.
    async fn create(&self, input: &CreateIdentity, password_hash: &str) -> DbResult<IdentityView>;

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Identity>>;

    /// Identity plus the specialization of its current role only.
    async fn get_view(&self, id: Uuid) -> DbResult<Option<IdentityView>>;

    /// Case-insensitive handle lookup for login.
    async fn get_credentials_by_handle(&self, handle: &str)
    -> DbResult<Option<IdentityCredentials>>;

    /// List identities visible under `scope`.
    async fn list(
        &self,
        scope: &VisibilityScope,
        filter: &IdentityFilter,
        params: &ListParams,
    ) -> DbResult<ListResult<Identity>>;

    /// Partial update of base fields, mirrored into the current-role
    /// specialization (created if missing).
    async fn update(&self, id: Uuid, input: &UpdateIdentity) -> DbResult<IdentityView>;

    /// Change the role and ensure a specialization row for the new role exists.
    /// The previous role's row is left in place and ignored by reads.
    async fn change_role(&self, id: Uuid, input: &ChangeRole) -> DbResult<IdentityView>;

    /// Toggle the active flag on the base row and every flag-carrying specialization.
    async fn set_active(&self, id: Uuid, is_active: bool) -> DbResult<Identity>;

    /// Hard-delete an identity with its memberships and specializations.
    async fn delete(&self, id: Uuid) -> DbResult<IdentityDeletionResult>;

    /// Roles whose specialization table holds a row for `id`.
    async fn profile_presence(&self, id: Uuid) -> DbResult<Vec<Role>>;

    /// Delete specialization rows that do not match their identity's current
    /// role, for one identity or all of them.
    async fn purge_stale_profiles(&self, id: Option<Uuid>) -> DbResult<u64>;

    /// Whether any identity currently holds `role`.
    async fn exists_with_role(&self, role: Role) -> DbResult<bool>;
}
