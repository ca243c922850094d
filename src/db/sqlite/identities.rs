use async_trait::async_trait;
use sqlx::{Row, SqliteConnection, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::{parse_opt_uuid, parse_role, parse_uuid};
use crate::{
    authz::VisibilityScope,
    db::{
        error::{DbError, DbResult},
        repos::{
            IdentityRepo, ListParams, ListResult, ensure_fields_fit_role, profile_has_active_flag,
            profile_table,
        },
    },
    models::{
        ChangeRole, CreateIdentity, Identity, IdentityCredentials, IdentityDeletionResult,
        IdentityFilter, IdentityView, InstructorProfile, Profile, ProfileFields, Role,
        StudentProfile, UpdateIdentity, UpdateProfileFields,
    },
};

const IDENTITY_COLUMNS: &str =
    "id, handle, name, surname, email, role, is_active, phone, gender, birth_date, created_at, updated_at";

pub struct SqliteIdentityRepo {
    pool: SqlitePool,
}

impl SqliteIdentityRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn identity_from_row(row: &SqliteRow) -> DbResult<Identity> {
    Ok(Identity {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        handle: row.get("handle"),
        name: row.get("name"),
        surname: row.get("surname"),
        email: row.get("email"),
        role: parse_role(&row.get::<String, _>("role"))?,
        is_active: row.get("is_active"),
        phone: row.get("phone"),
        gender: row.get("gender"),
        birth_date: row.get("birth_date"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn map_unique_violation(e: sqlx::Error) -> DbError {
    match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            if db_err.message().contains("handle") {
                DbError::Conflict("Handle is already taken".to_string())
            } else {
                DbError::Conflict("Email is already registered".to_string())
            }
        }
        _ => DbError::from(e),
    }
}

async fn fetch_identity(conn: &mut SqliteConnection, id: Uuid) -> DbResult<Option<Identity>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM identities WHERE id = ?",
        IDENTITY_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(identity_from_row).transpose()
}

/// Handle and email uniqueness across every identity, regardless of role.
async fn ensure_unique(
    conn: &mut SqliteConnection,
    handle: Option<&str>,
    email: Option<&str>,
    exclude: Option<Uuid>,
) -> DbResult<()> {
    let exclude = exclude.map(|id| id.to_string()).unwrap_or_default();

    if let Some(handle) = handle {
        let taken = sqlx::query("SELECT 1 FROM identities WHERE lower(handle) = lower(?) AND id != ?")
            .bind(handle)
            .bind(&exclude)
            .fetch_optional(&mut *conn)
            .await?;
        if taken.is_some() {
            return Err(DbError::Conflict(format!("Handle '{}' is already taken", handle)));
        }
    }

    if let Some(email) = email {
        let taken = sqlx::query("SELECT 1 FROM identities WHERE lower(email) = lower(?) AND id != ?")
            .bind(email)
            .bind(&exclude)
            .fetch_optional(&mut *conn)
            .await?;
        if taken.is_some() {
            return Err(DbError::Conflict(format!("Email '{}' is already registered", email)));
        }
    }

    Ok(())
}

/// An advisor must be an existing identity whose current role is INSTRUCTOR.
async fn ensure_advisor(conn: &mut SqliteConnection, advisor_id: Uuid) -> DbResult<()> {
    let role: Option<String> = sqlx::query_scalar("SELECT role FROM identities WHERE id = ?")
        .bind(advisor_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    match role.as_deref().and_then(Role::parse) {
        Some(Role::Instructor) => Ok(()),
        Some(_) => Err(DbError::Validation(format!(
            "Advisor '{}' is not an instructor",
            advisor_id
        ))),
        None => Err(DbError::Validation(format!(
            "Advisor '{}' does not exist",
            advisor_id
        ))),
    }
}

async fn fetch_profile(
    conn: &mut SqliteConnection,
    id: Uuid,
    role: Role,
) -> DbResult<Option<Profile>> {
    let id = id.to_string();
    match role {
        Role::Student => {
            let row = sqlx::query(
                "SELECT father_name, mother_name, advisor_id, is_active FROM student_profiles WHERE id = ?",
            )
            .bind(&id)
            .fetch_optional(&mut *conn)
            .await?;
            row.map(|row| {
                Ok(Profile::Student(StudentProfile {
                    father_name: row.get("father_name"),
                    mother_name: row.get("mother_name"),
                    advisor_id: parse_opt_uuid(row.get("advisor_id"))?,
                    is_active: row.get("is_active"),
                }))
            })
            .transpose()
        }
        Role::Instructor => {
            let row = sqlx::query(
                "SELECT title, bio, image_url FROM instructor_profiles WHERE id = ?",
            )
            .bind(&id)
            .fetch_optional(&mut *conn)
            .await?;
            Ok(row.map(|row| {
                Profile::Instructor(InstructorProfile {
                    title: row.get("title"),
                    bio: row.get("bio"),
                    image_url: row.get("image_url"),
                })
            }))
        }
        Role::AssistantManager | Role::Manager | Role::Admin => {
            let is_active: Option<bool> = sqlx::query_scalar(&format!(
                "SELECT is_active FROM {} WHERE id = ?",
                profile_table(role)
            ))
            .bind(&id)
            .fetch_optional(&mut *conn)
            .await?;
            Ok(is_active.map(|is_active| Profile::seed(role, &ProfileFields::default(), is_active)))
        }
    }
}

/// Insert the specialization row for `identity`'s current role.
/// With `if_missing`, an existing row is left untouched and `false` is returned.
async fn insert_profile(
    conn: &mut SqliteConnection,
    identity: &Identity,
    profile: &Profile,
    if_missing: bool,
) -> DbResult<bool> {
    let on_conflict = if if_missing {
        " ON CONFLICT(id) DO NOTHING"
    } else {
        ""
    };
    let now = identity.updated_at;

    let result = match profile {
        Profile::Student(p) => {
            sqlx::query(&format!(
                r#"
                INSERT INTO student_profiles
                    (id, name, surname, email, father_name, mother_name, advisor_id, is_active, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?){}
                "#,
                on_conflict
            ))
            .bind(identity.id.to_string())
            .bind(&identity.name)
            .bind(&identity.surname)
            .bind(&identity.email)
            .bind(&p.father_name)
            .bind(&p.mother_name)
            .bind(p.advisor_id.map(|id| id.to_string()))
            .bind(p.is_active)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await?
        }
        Profile::Instructor(p) => {
            sqlx::query(&format!(
                r#"
                INSERT INTO instructor_profiles
                    (id, name, surname, email, title, bio, image_url, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?){}
                "#,
                on_conflict
            ))
            .bind(identity.id.to_string())
            .bind(&identity.name)
            .bind(&identity.surname)
            .bind(&identity.email)
            .bind(&p.title)
            .bind(&p.bio)
            .bind(&p.image_url)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await?
        }
        Profile::AssistantManager(p) | Profile::Manager(p) | Profile::Admin(p) => {
            sqlx::query(&format!(
                r#"
                INSERT INTO {} (id, name, surname, email, is_active, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?){}
                "#,
                profile_table(profile.role()),
                on_conflict
            ))
            .bind(identity.id.to_string())
            .bind(&identity.name)
            .bind(&identity.surname)
            .bind(&identity.email)
            .bind(p.is_active)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await?
        }
    };

    Ok(result.rows_affected() > 0)
}

/// Overwrite the specialization row with the mirrored base fields and `profile`.
async fn write_profile(
    conn: &mut SqliteConnection,
    identity: &Identity,
    profile: &Profile,
) -> DbResult<()> {
    let now = identity.updated_at;

    match profile {
        Profile::Student(p) => {
            sqlx::query(
                r#"
                UPDATE student_profiles
                SET name = ?, surname = ?, email = ?, father_name = ?, mother_name = ?,
                    advisor_id = ?, is_active = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&identity.name)
            .bind(&identity.surname)
            .bind(&identity.email)
            .bind(&p.father_name)
            .bind(&p.mother_name)
            .bind(p.advisor_id.map(|id| id.to_string()))
            .bind(p.is_active)
            .bind(now)
            .bind(identity.id.to_string())
            .execute(&mut *conn)
            .await?;
        }
        Profile::Instructor(p) => {
            sqlx::query(
                r#"
                UPDATE instructor_profiles
                SET name = ?, surname = ?, email = ?, title = ?, bio = ?, image_url = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&identity.name)
            .bind(&identity.surname)
            .bind(&identity.email)
            .bind(&p.title)
            .bind(&p.bio)
            .bind(&p.image_url)
            .bind(now)
            .bind(identity.id.to_string())
            .execute(&mut *conn)
            .await?;
        }
        Profile::AssistantManager(p) | Profile::Manager(p) | Profile::Admin(p) => {
            sqlx::query(&format!(
                "UPDATE {} SET name = ?, surname = ?, email = ?, is_active = ?, updated_at = ? WHERE id = ?",
                profile_table(profile.role())
            ))
            .bind(&identity.name)
            .bind(&identity.surname)
            .bind(&identity.email)
            .bind(p.is_active)
            .bind(now)
            .bind(identity.id.to_string())
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}

/// Load the current-role specialization, creating it from base fields if missing,
/// then apply `patch` and write it back mirrored with the base row.
async fn sync_profile(
    conn: &mut SqliteConnection,
    identity: &Identity,
    patch: &UpdateProfileFields,
) -> DbResult<Profile> {
    let mut profile = match fetch_profile(conn, identity.id, identity.role).await? {
        Some(profile) => profile,
        None => {
            let seeded = Profile::seed(identity.role, &ProfileFields::default(), identity.is_active);
            insert_profile(conn, identity, &seeded, true).await?;
            tracing::debug!(identity_id = %identity.id, role = %identity.role, "Recreated missing specialization row");
            seeded
        }
    };
    patch.apply_to(&mut profile);
    profile.set_active(identity.is_active);
    write_profile(conn, identity, &profile).await?;
    Ok(profile)
}

#[async_trait]
impl IdentityRepo for SqliteIdentityRepo {
    async fn create(&self, input: &CreateIdentity, password_hash: &str) -> DbResult<IdentityView> {
        ensure_fields_fit_role(input.role, input.profile.foreign_fields(input.role))?;

        let mut tx = self.pool.begin().await?;

        ensure_unique(&mut tx, Some(input.handle.as_str()), Some(input.email.as_str()), None).await?;
        if let (Role::Student, Some(advisor_id)) = (input.role, input.profile.advisor_id) {
            ensure_advisor(&mut tx, advisor_id).await?;
        }

        let now = chrono::Utc::now();
        let identity = Identity {
            id: Uuid::new_v4(),
            handle: input.handle.clone(),
            name: input.name.clone(),
            surname: input.surname.clone(),
            email: input.email.clone(),
            role: input.role,
            is_active: true,
            phone: input.phone.clone(),
            gender: input.gender.clone(),
            birth_date: input.birth_date,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO identities
                (id, handle, password_hash, name, surname, email, role, is_active, phone, gender, birth_date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(identity.id.to_string())
        .bind(&identity.handle)
        .bind(password_hash)
        .bind(&identity.name)
        .bind(&identity.surname)
        .bind(&identity.email)
        .bind(identity.role.as_str())
        .bind(identity.is_active)
        .bind(&identity.phone)
        .bind(&identity.gender)
        .bind(identity.birth_date)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        let profile = Profile::seed(identity.role, &input.profile, identity.is_active);
        insert_profile(&mut tx, &identity, &profile, false).await?;

        tx.commit().await?;

        Ok(IdentityView {
            identity,
            profile: Some(profile),
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Identity>> {
        let mut conn = self.pool.acquire().await?;
        fetch_identity(&mut conn, id).await
    }

    async fn get_view(&self, id: Uuid) -> DbResult<Option<IdentityView>> {
        let mut conn = self.pool.acquire().await?;
        let Some(identity) = fetch_identity(&mut conn, id).await? else {
            return Ok(None);
        };
        let profile = fetch_profile(&mut conn, identity.id, identity.role).await?;
        Ok(Some(IdentityView { identity, profile }))
    }

    async fn get_credentials_by_handle(
        &self,
        handle: &str,
    ) -> DbResult<Option<IdentityCredentials>> {
        let row = sqlx::query(
            r#"
            SELECT id, handle, password_hash, role, is_active
            FROM identities
            WHERE lower(handle) = lower(?)
            "#,
        )
        .bind(handle)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(IdentityCredentials {
                id: parse_uuid(&row.get::<String, _>("id"))?,
                handle: row.get("handle"),
                password_hash: row.get("password_hash"),
                role: row.get("role"),
                is_active: row.get("is_active"),
            })
        })
        .transpose()
    }

    async fn list(
        &self,
        scope: &VisibilityScope,
        filter: &IdentityFilter,
        params: &ListParams,
    ) -> DbResult<ListResult<Identity>> {
        let mut conditions = vec![scope.sql_predicate("?")];
        if filter.role.is_some() {
            conditions.push("role = ?".to_string());
        }
        if filter.is_active.is_some() {
            conditions.push("is_active = ?".to_string());
        }
        let where_clause = conditions.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) FROM identities WHERE {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(own_id) = scope.own_id() {
            count_query = count_query.bind(own_id.to_string());
        }
        if let Some(role) = filter.role {
            count_query = count_query.bind(role.as_str());
        }
        if let Some(is_active) = filter.is_active {
            count_query = count_query.bind(is_active);
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let list_sql = format!(
            "SELECT {} FROM identities WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            IDENTITY_COLUMNS,
            where_clause,
            params.order_by()
        );
        let mut list_query = sqlx::query(&list_sql);
        if let Some(own_id) = scope.own_id() {
            list_query = list_query.bind(own_id.to_string());
        }
        if let Some(role) = filter.role {
            list_query = list_query.bind(role.as_str());
        }
        if let Some(is_active) = filter.is_active {
            list_query = list_query.bind(is_active);
        }
        let rows = list_query
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .iter()
            .map(identity_from_row)
            .collect::<DbResult<Vec<_>>>()?;

        Ok(ListResult::new(items, total, params))
    }

    async fn update(&self, id: Uuid, input: &UpdateIdentity) -> DbResult<IdentityView> {
        let mut tx = self.pool.begin().await?;

        let mut identity = fetch_identity(&mut tx, id).await?.ok_or(DbError::NotFound)?;
        ensure_fields_fit_role(identity.role, input.profile.foreign_fields(identity.role))?;
        if let Some(Some(advisor_id)) = input.profile.advisor_id {
            ensure_advisor(&mut tx, advisor_id).await?;
        }
        if let Some(email) = &input.email {
            ensure_unique(&mut tx, None, Some(email.as_str()), Some(id)).await?;
        }

        input.apply_to(&mut identity);
        identity.updated_at = chrono::Utc::now();

        sqlx::query(
            r#"
            UPDATE identities
            SET name = ?, surname = ?, email = ?, phone = ?, gender = ?, birth_date = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&identity.name)
        .bind(&identity.surname)
        .bind(&identity.email)
        .bind(&identity.phone)
        .bind(&identity.gender)
        .bind(identity.birth_date)
        .bind(identity.updated_at)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        let profile = sync_profile(&mut tx, &identity, &input.profile).await?;

        tx.commit().await?;

        Ok(IdentityView {
            identity,
            profile: Some(profile),
        })
    }

    async fn change_role(&self, id: Uuid, input: &ChangeRole) -> DbResult<IdentityView> {
        ensure_fields_fit_role(input.role, input.profile.foreign_fields(input.role))?;

        let mut tx = self.pool.begin().await?;

        let mut identity = fetch_identity(&mut tx, id).await?.ok_or(DbError::NotFound)?;
        let previous = identity.role;
        identity.role = input.role;
        identity.updated_at = chrono::Utc::now();

        sqlx::query("UPDATE identities SET role = ?, updated_at = ? WHERE id = ?")
            .bind(identity.role.as_str())
            .bind(identity.updated_at)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        // Checked against the new role, so an identity can never advise itself.
        if let (Role::Student, Some(advisor_id)) = (input.role, input.profile.advisor_id) {
            ensure_advisor(&mut tx, advisor_id).await?;
        }

        // Memberships and advisor links only make sense for the role that owned them.
        if previous == Role::Instructor && identity.role != Role::Instructor {
            sqlx::query("DELETE FROM program_instructors WHERE instructor_id = ?")
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE student_profiles SET advisor_id = NULL, updated_at = ? WHERE advisor_id = ?")
                .bind(identity.updated_at)
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;
        }
        if previous == Role::Student && identity.role != Role::Student {
            sqlx::query("DELETE FROM program_students WHERE student_id = ?")
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        let profile = sync_profile(&mut tx, &identity, &UpdateProfileFields::from(&input.profile)).await?;

        tx.commit().await?;

        tracing::info!(identity_id = %id, from = %previous, to = %identity.role, "Identity role changed");

        Ok(IdentityView {
            identity,
            profile: Some(profile),
        })
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> DbResult<Identity> {
        let mut tx = self.pool.begin().await?;

        let mut identity = fetch_identity(&mut tx, id).await?.ok_or(DbError::NotFound)?;
        identity.is_active = is_active;
        identity.updated_at = chrono::Utc::now();

        sqlx::query("UPDATE identities SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(is_active)
            .bind(identity.updated_at)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        if profile_has_active_flag(identity.role) {
            sync_profile(&mut tx, &identity, &UpdateProfileFields::default()).await?;
        }

        tx.commit().await?;

        Ok(identity)
    }

    async fn delete(&self, id: Uuid) -> DbResult<IdentityDeletionResult> {
        let mut tx = self.pool.begin().await?;
        let id_str = id.to_string();

        if fetch_identity(&mut tx, id).await?.is_none() {
            return Err(DbError::NotFound);
        }

        let instructor_assignments_deleted =
            sqlx::query("DELETE FROM program_instructors WHERE instructor_id = ?")
                .bind(&id_str)
                .execute(&mut *tx)
                .await?
                .rows_affected();

        let enrollments_deleted = sqlx::query("DELETE FROM program_students WHERE student_id = ?")
            .bind(&id_str)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let advisor_links_cleared = sqlx::query(
            "UPDATE student_profiles SET advisor_id = NULL, updated_at = ? WHERE advisor_id = ?",
        )
        .bind(chrono::Utc::now())
        .bind(&id_str)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // Every specialization table, so stale rows from earlier roles go too.
        let mut profiles_deleted = 0;
        for role in Role::ALL {
            profiles_deleted += sqlx::query(&format!(
                "DELETE FROM {} WHERE id = ?",
                profile_table(role)
            ))
            .bind(&id_str)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        sqlx::query("DELETE FROM identities WHERE id = ?")
            .bind(&id_str)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(IdentityDeletionResult {
            instructor_assignments_deleted,
            enrollments_deleted,
            advisor_links_cleared,
            profiles_deleted,
        })
    }

    async fn profile_presence(&self, id: Uuid) -> DbResult<Vec<Role>> {
        let mut present = Vec::new();
        for role in Role::ALL {
            let row = sqlx::query(&format!(
                "SELECT 1 FROM {} WHERE id = ?",
                profile_table(role)
            ))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
            if row.is_some() {
                present.push(role);
            }
        }
        Ok(present)
    }

    async fn purge_stale_profiles(&self, id: Option<Uuid>) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;

        for role in Role::ALL {
            let sql = format!(
                "DELETE FROM {} WHERE id IN (SELECT id FROM identities WHERE role != ?{})",
                profile_table(role),
                if id.is_some() { " AND id = ?" } else { "" }
            );
            let mut query = sqlx::query(&sql).bind(role.as_str());
            if let Some(id) = id {
                query = query.bind(id.to_string());
            }
            deleted += query.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(deleted)
    }

    async fn exists_with_role(&self, role: Role) -> DbResult<bool> {
        let row = sqlx::query("SELECT 1 FROM identities WHERE role = ? LIMIT 1")
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}
