use std::sync::Arc;

use uuid::Uuid;

use super::{ServiceError, ServiceResult};
use crate::{
    auth::{Actor, AuthError, PasswordHasher},
    authz::{VisibilityScope, gates},
    db::{DbError, DbPool, ListParams, ListResult, ProgramScope},
    models::{
        ChangeRole, CreateIdentity, Identity, IdentityDeletionResult, IdentityFilter,
        IdentityView, Program, RegisterIdentity, Role, StaleProfilePurge, UpdateIdentity,
    },
};

/// Identity lifecycle with role gates and visibility applied.
#[derive(Clone)]
pub struct IdentityService {
    db: Arc<DbPool>,
    hasher: PasswordHasher,
}

impl IdentityService {
    pub fn new(db: Arc<DbPool>, hasher: PasswordHasher) -> Self {
        Self { db, hasher }
    }

    /// Create an identity on behalf of a staff actor.
    ///
    /// The actor must outrank the new identity's role; ADMIN may create any role.
    pub async fn create(&self, actor: &Actor, input: CreateIdentity) -> ServiceResult<IdentityView> {
        gates::IDENTITY_MANAGE.check(actor)?;
        ensure_outranks(actor, input.role)?;

        let hash = self.hash_password(&input.password)?;
        let view = self.db.identities().create(&input, &hash).await?;

        tracing::info!(
            actor_id = %actor.id,
            identity_id = %view.identity.id,
            role = %view.identity.role,
            "Identity created"
        );
        Ok(view)
    }

    /// Unauthenticated self-registration; always yields a STUDENT.
    pub async fn register(&self, input: RegisterIdentity) -> ServiceResult<IdentityView> {
        let input = CreateIdentity::from(input);
        let hash = self.hash_password(&input.password)?;
        let view = self.db.identities().create(&input, &hash).await?;

        tracing::info!(identity_id = %view.identity.id, "Identity self-registered");
        Ok(view)
    }

    /// Create the first ADMIN. Refused once any ADMIN exists.
    pub async fn bootstrap_admin(&self, mut input: CreateIdentity) -> ServiceResult<IdentityView> {
        let repo = self.db.identities();
        if repo.exists_with_role(Role::Admin).await? {
            return Err(DbError::Conflict("An ADMIN identity already exists".to_string()).into());
        }

        input.role = Role::Admin;
        let hash = self.hash_password(&input.password)?;
        let view = repo.create(&input, &hash).await?;

        tracing::info!(identity_id = %view.identity.id, handle = %view.identity.handle, "Bootstrap ADMIN created");
        Ok(view)
    }

    /// Resolve login credentials to an active identity.
    ///
    /// Unknown handle, wrong password and inactive identity are indistinguishable.
    pub async fn authenticate(&self, handle: &str, password: &str) -> Result<IdentityView, AuthError> {
        let repo = self.db.identities();
        let credentials = repo
            .get_credentials_by_handle(handle)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .ok_or(AuthError::InvalidCredentials)?;

        self.hasher.verify(password, &credentials.password_hash)?;
        if !credentials.is_active {
            tracing::debug!(identity_id = %credentials.id, "Login rejected for inactive identity");
            return Err(AuthError::InvalidCredentials);
        }

        repo.get_view(credentials.id)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .ok_or(AuthError::InvalidCredentials)
    }

    /// The caller's own identity.
    pub async fn me(&self, actor: &Actor) -> ServiceResult<IdentityView> {
        self.db
            .identities()
            .get_view(actor.id)
            .await?
            .ok_or_else(ServiceError::not_found)
    }

    /// Fetch one identity; invisible identities are reported as not found.
    pub async fn get(&self, actor: &Actor, id: Uuid) -> ServiceResult<IdentityView> {
        let view = self
            .db
            .identities()
            .get_view(id)
            .await?
            .ok_or_else(ServiceError::not_found)?;

        if !VisibilityScope::for_actor(actor).permits(id, view.identity.role) {
            tracing::debug!(actor_id = %actor.id, target_id = %id, "Identity hidden by visibility scope");
            return Err(ServiceError::not_found());
        }
        Ok(view)
    }

    pub async fn list(
        &self,
        actor: &Actor,
        filter: &IdentityFilter,
        params: &ListParams,
    ) -> ServiceResult<ListResult<Identity>> {
        let scope = VisibilityScope::for_actor(actor);
        Ok(self.db.identities().list(&scope, filter, params).await?)
    }

    /// Partial update. Anyone may update themselves; otherwise the actor must be
    /// staff and outrank the target.
    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        input: UpdateIdentity,
    ) -> ServiceResult<IdentityView> {
        let target = self.visible_target(actor, id).await?;
        if !actor.is(id) {
            gates::IDENTITY_MANAGE.check(actor)?;
            ensure_outranks(actor, target.role)?;
        }

        let view = self.db.identities().update(id, &input).await?;
        tracing::info!(actor_id = %actor.id, identity_id = %id, "Identity updated");
        Ok(view)
    }

    pub async fn change_role(
        &self,
        actor: &Actor,
        id: Uuid,
        input: ChangeRole,
    ) -> ServiceResult<IdentityView> {
        gates::IDENTITY_CHANGE_ROLE.check(actor)?;
        Ok(self.db.identities().change_role(id, &input).await?)
    }

    /// Toggle the active flag. Never on oneself; a MANAGER only on lower ranks.
    pub async fn set_active(
        &self,
        actor: &Actor,
        id: Uuid,
        is_active: bool,
    ) -> ServiceResult<Identity> {
        gates::IDENTITY_SET_ACTIVE.check(actor)?;
        if actor.is(id) {
            return Err(ServiceError::forbidden("cannot change own active flag"));
        }
        let target = self.visible_target(actor, id).await?;
        ensure_outranks(actor, target.role)?;

        let identity = self.db.identities().set_active(id, is_active).await?;
        tracing::info!(actor_id = %actor.id, identity_id = %id, is_active, "Identity active flag set");
        Ok(identity)
    }

    pub async fn delete(&self, actor: &Actor, id: Uuid) -> ServiceResult<IdentityDeletionResult> {
        gates::IDENTITY_DELETE.check(actor)?;
        if actor.is(id) {
            return Err(ServiceError::forbidden("self-deletion is not allowed"));
        }

        let result = self.db.identities().delete(id).await?;
        tracing::info!(
            actor_id = %actor.id,
            identity_id = %id,
            profiles_deleted = result.profiles_deleted,
            enrollments_deleted = result.enrollments_deleted,
            "Identity deleted"
        );
        Ok(result)
    }

    /// Remove specialization rows left behind by earlier role changes.
    pub async fn purge_stale_profiles(
        &self,
        actor: &Actor,
        id: Option<Uuid>,
    ) -> ServiceResult<StaleProfilePurge> {
        gates::MAINTENANCE.check(actor)?;
        let profiles_deleted = self.db.identities().purge_stale_profiles(id).await?;
        tracing::info!(actor_id = %actor.id, profiles_deleted, "Stale profiles purged");
        Ok(StaleProfilePurge { profiles_deleted })
    }

    /// Programs an instructor teaches or a student is enrolled in.
    pub async fn programs_of(
        &self,
        actor: &Actor,
        id: Uuid,
        params: &ListParams,
    ) -> ServiceResult<ListResult<Program>> {
        let target = self.visible_target(actor, id).await?;
        let scope = match target.role {
            Role::Instructor => ProgramScope::InstructorOf(id),
            Role::Student => ProgramScope::StudentOf(id),
            Role::AssistantManager | Role::Manager | Role::Admin => ProgramScope::Nothing,
        };
        Ok(self.db.programs().list(scope, params).await?)
    }

    async fn visible_target(&self, actor: &Actor, id: Uuid) -> ServiceResult<Identity> {
        let identity = self
            .db
            .identities()
            .get_by_id(id)
            .await?
            .ok_or_else(ServiceError::not_found)?;
        if !VisibilityScope::for_actor(actor).permits(id, identity.role) {
            return Err(ServiceError::not_found());
        }
        Ok(identity)
    }

    fn hash_password(&self, password: &str) -> ServiceResult<String> {
        self.hasher
            .hash(password)
            .map_err(|e| ServiceError::Db(DbError::Internal(e.to_string())))
    }
}

fn ensure_outranks(actor: &Actor, target: Role) -> ServiceResult<()> {
    match actor.role {
        Some(Role::Admin) => Ok(()),
        Some(role) if role.outranks(target) => Ok(()),
        _ => Err(ServiceError::forbidden(format!(
            "role '{}' does not outrank {}",
            actor.role_claim, target
        ))),
    }
}
