use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

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

pub struct PostgresIdentityRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresIdentityRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }
}

fn parse_role(s: &str) -> DbResult<Role> {
    Role::parse(s).ok_or_else(|| DbError::Internal(format!("Invalid role in database: {}", s)))
}

fn identity_from_row(row: &PgRow) -> DbResult<Identity> {
    Ok(Identity {
        id: row.get("id"),
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
            if db_err.constraint().is_some_and(|c| c.contains("handle")) {
                DbError::Conflict("Handle is already taken".to_string())
            } else {
                DbError::Conflict("Email is already registered".to_string())
            }
        }
        _ => DbError::from(e),
    }
}

async fn fetch_identity(conn: &mut PgConnection, id: Uuid) -> DbResult<Option<Identity>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM identities WHERE id = $1",
        IDENTITY_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(identity_from_row).transpose()
}

/// Same as [`fetch_identity`] but takes a row lock for the rest of the transaction.
async fn lock_identity(conn: &mut PgConnection, id: Uuid) -> DbResult<Option<Identity>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM identities WHERE id = $1 FOR UPDATE",
        IDENTITY_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(identity_from_row).transpose()
}

/// Handle and email uniqueness across every identity, regardless of role.
async fn ensure_unique(
    conn: &mut PgConnection,
    handle: Option<&str>,
    email: Option<&str>,
    exclude: Option<Uuid>,
) -> DbResult<()> {
    if let Some(handle) = handle {
        let taken = sqlx::query(
            "SELECT 1 FROM identities WHERE lower(handle) = lower($1) AND id IS DISTINCT FROM $2",
        )
        .bind(handle)
        .bind(exclude)
        .fetch_optional(&mut *conn)
        .await?;
        if taken.is_some() {
            return Err(DbError::Conflict(format!("Handle '{}' is already taken", handle)));
        }
    }

    if let Some(email) = email {
        let taken = sqlx::query(
            "SELECT 1 FROM identities WHERE lower(email) = lower($1) AND id IS DISTINCT FROM $2",
        )
        .bind(email)
        .bind(exclude)
        .fetch_optional(&mut *conn)
        .await?;
        if taken.is_some() {
            return Err(DbError::Conflict(format!("Email '{}' is already registered", email)));
        }
    }

    Ok(())
}

async fn ensure_advisor(conn: &mut PgConnection, advisor_id: Uuid) -> DbResult<()> {
    let role: Option<String> = sqlx::query_scalar("SELECT role FROM identities WHERE id = $1")
        .bind(advisor_id)
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

async fn fetch_profile(conn: &mut PgConnection, id: Uuid, role: Role) -> DbResult<Option<Profile>> {
    match role {
        Role::Student => {
            let row = sqlx::query(
                "SELECT father_name, mother_name, advisor_id, is_active FROM student_profiles WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
            Ok(row.map(|row| {
                Profile::Student(StudentProfile {
                    father_name: row.get("father_name"),
                    mother_name: row.get("mother_name"),
                    advisor_id: row.get("advisor_id"),
                    is_active: row.get("is_active"),
                })
            }))
        }
        Role::Instructor => {
            let row = sqlx::query(
                "SELECT title, bio, image_url FROM instructor_profiles WHERE id = $1",
            )
            .bind(id)
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
                "SELECT is_active FROM {} WHERE id = $1",
                profile_table(role)
            ))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
            Ok(is_active.map(|is_active| Profile::seed(role, &ProfileFields::default(), is_active)))
        }
    }
}

async fn insert_profile(
    conn: &mut PgConnection,
    identity: &Identity,
    profile: &Profile,
    if_missing: bool,
) -> DbResult<bool> {
    let on_conflict = if if_missing {
        " ON CONFLICT (id) DO NOTHING"
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
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9){}
                "#,
                on_conflict
            ))
            .bind(identity.id)
            .bind(&identity.name)
            .bind(&identity.surname)
            .bind(&identity.email)
            .bind(&p.father_name)
            .bind(&p.mother_name)
            .bind(p.advisor_id)
            .bind(p.is_active)
            .bind(now)
            .execute(&mut *conn)
            .await?
        }
        Profile::Instructor(p) => {
            sqlx::query(&format!(
                r#"
                INSERT INTO instructor_profiles
                    (id, name, surname, email, title, bio, image_url, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8){}
                "#,
                on_conflict
            ))
            .bind(identity.id)
            .bind(&identity.name)
            .bind(&identity.surname)
            .bind(&identity.email)
            .bind(&p.title)
            .bind(&p.bio)
            .bind(&p.image_url)
            .bind(now)
            .execute(&mut *conn)
            .await?
        }
        Profile::AssistantManager(p) | Profile::Manager(p) | Profile::Admin(p) => {
            sqlx::query(&format!(
                r#"
                INSERT INTO {} (id, name, surname, email, is_active, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $6){}
                "#,
                profile_table(profile.role()),
                on_conflict
            ))
            .bind(identity.id)
            .bind(&identity.name)
            .bind(&identity.surname)
            .bind(&identity.email)
            .bind(p.is_active)
            .bind(now)
            .execute(&mut *conn)
            .await?
        }
    };

    Ok(result.rows_affected() > 0)
}

async fn write_profile(conn: &mut PgConnection, identity: &Identity, profile: &Profile) -> DbResult<()> {
    let now = identity.updated_at;

    match profile {
        Profile::Student(p) => {
            sqlx::query(
                r#"
                UPDATE student_profiles
                SET name = $1, surname = $2, email = $3, father_name = $4, mother_name = $5,
                    advisor_id = $6, is_active = $7, updated_at = $8
                WHERE id = $9
                "#,
            )
            .bind(&identity.name)
            .bind(&identity.surname)
            .bind(&identity.email)
            .bind(&p.father_name)
            .bind(&p.mother_name)
            .bind(p.advisor_id)
            .bind(p.is_active)
            .bind(now)
            .bind(identity.id)
            .execute(&mut *conn)
            .await?;
        }
        Profile::Instructor(p) => {
            sqlx::query(
                r#"
                UPDATE instructor_profiles
                SET name = $1, surname = $2, email = $3, title = $4, bio = $5, image_url = $6, updated_at = $7
                WHERE id = $8
                "#,
            )
            .bind(&identity.name)
            .bind(&identity.surname)
            .bind(&identity.email)
            .bind(&p.title)
            .bind(&p.bio)
            .bind(&p.image_url)
            .bind(now)
            .bind(identity.id)
            .execute(&mut *conn)
            .await?;
        }
        Profile::AssistantManager(p) | Profile::Manager(p) | Profile::Admin(p) => {
            sqlx::query(&format!(
                "UPDATE {} SET name = $1, surname = $2, email = $3, is_active = $4, updated_at = $5 WHERE id = $6",
                profile_table(profile.role())
            ))
            .bind(&identity.name)
            .bind(&identity.surname)
            .bind(&identity.email)
            .bind(p.is_active)
            .bind(now)
            .bind(identity.id)
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}

async fn sync_profile(
    conn: &mut PgConnection,
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
impl IdentityRepo for PostgresIdentityRepo {
    async fn create(&self, input: &CreateIdentity, password_hash: &str) -> DbResult<IdentityView> {
        ensure_fields_fit_role(input.role, input.profile.foreign_fields(input.role))?;

        let mut tx = self.write_pool.begin().await?;

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
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            "#,
        )
        .bind(identity.id)
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
        let mut conn = self.read_pool.acquire().await?;
        fetch_identity(&mut conn, id).await
    }

    async fn get_view(&self, id: Uuid) -> DbResult<Option<IdentityView>> {
        let mut conn = self.read_pool.acquire().await?;
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
            WHERE lower(handle) = lower($1)
            "#,
        )
        .bind(handle)
        .fetch_optional(&self.read_pool)
        .await?;

        Ok(row.map(|row| IdentityCredentials {
            id: row.get("id"),
            handle: row.get("handle"),
            password_hash: row.get("password_hash"),
            role: row.get("role"),
            is_active: row.get("is_active"),
        }))
    }

    async fn list(
        &self,
        scope: &VisibilityScope,
        filter: &IdentityFilter,
        params: &ListParams,
    ) -> DbResult<ListResult<Identity>> {
        // Placeholders are numbered in bind order: own id, role, is_active.
        let mut conditions = vec![scope.sql_predicate("$1")];
        let mut next = if scope.own_id().is_some() { 2 } else { 1 };
        if filter.role.is_some() {
            conditions.push(format!("role = ${}", next));
            next += 1;
        }
        if filter.is_active.is_some() {
            conditions.push(format!("is_active = ${}", next));
            next += 1;
        }
        let where_clause = conditions.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) FROM identities WHERE {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(own_id) = scope.own_id() {
            count_query = count_query.bind(own_id);
        }
        if let Some(role) = filter.role {
            count_query = count_query.bind(role.as_str());
        }
        if let Some(is_active) = filter.is_active {
            count_query = count_query.bind(is_active);
        }
        let total = count_query.fetch_one(&self.read_pool).await?;

        let list_sql = format!(
            "SELECT {} FROM identities WHERE {} ORDER BY {} LIMIT ${} OFFSET ${}",
            IDENTITY_COLUMNS,
            where_clause,
            params.order_by(),
            next,
            next + 1
        );
        let mut list_query = sqlx::query(&list_sql);
        if let Some(own_id) = scope.own_id() {
            list_query = list_query.bind(own_id);
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
            .fetch_all(&self.read_pool)
            .await?;

        let items = rows
            .iter()
            .map(identity_from_row)
            .collect::<DbResult<Vec<_>>>()?;

        Ok(ListResult::new(items, total, params))
    }

    async fn update(&self, id: Uuid, input: &UpdateIdentity) -> DbResult<IdentityView> {
        let mut tx = self.write_pool.begin().await?;

        let mut identity = lock_identity(&mut tx, id).await?.ok_or(DbError::NotFound)?;
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
            SET name = $1, surname = $2, email = $3, phone = $4, gender = $5, birth_date = $6, updated_at = $7
            WHERE id = $8
            "#,
        )
        .bind(&identity.name)
        .bind(&identity.surname)
        .bind(&identity.email)
        .bind(&identity.phone)
        .bind(&identity.gender)
        .bind(identity.birth_date)
        .bind(identity.updated_at)
        .bind(id)
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

        let mut tx = self.write_pool.begin().await?;

        let mut identity = lock_identity(&mut tx, id).await?.ok_or(DbError::NotFound)?;
        let previous = identity.role;
        identity.role = input.role;
        identity.updated_at = chrono::Utc::now();

        sqlx::query("UPDATE identities SET role = $1, updated_at = $2 WHERE id = $3")
            .bind(identity.role.as_str())
            .bind(identity.updated_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        // Checked against the new role, so an identity can never advise itself.
        if let (Role::Student, Some(advisor_id)) = (input.role, input.profile.advisor_id) {
            ensure_advisor(&mut tx, advisor_id).await?;
        }

        if previous == Role::Instructor && identity.role != Role::Instructor {
            sqlx::query("DELETE FROM program_instructors WHERE instructor_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE student_profiles SET advisor_id = NULL, updated_at = $1 WHERE advisor_id = $2",
            )
            .bind(identity.updated_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        if previous == Role::Student && identity.role != Role::Student {
            sqlx::query("DELETE FROM program_students WHERE student_id = $1")
                .bind(id)
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
        let mut tx = self.write_pool.begin().await?;

        let mut identity = lock_identity(&mut tx, id).await?.ok_or(DbError::NotFound)?;
        identity.is_active = is_active;
        identity.updated_at = chrono::Utc::now();

        sqlx::query("UPDATE identities SET is_active = $1, updated_at = $2 WHERE id = $3")
            .bind(is_active)
            .bind(identity.updated_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if profile_has_active_flag(identity.role) {
            sync_profile(&mut tx, &identity, &UpdateProfileFields::default()).await?;
        }

        tx.commit().await?;

        Ok(identity)
    }

    async fn delete(&self, id: Uuid) -> DbResult<IdentityDeletionResult> {
        let mut tx = self.write_pool.begin().await?;

        if lock_identity(&mut tx, id).await?.is_none() {
            return Err(DbError::NotFound);
        }

        let instructor_assignments_deleted =
            sqlx::query("DELETE FROM program_instructors WHERE instructor_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

        let enrollments_deleted = sqlx::query("DELETE FROM program_students WHERE student_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let advisor_links_cleared = sqlx::query(
            "UPDATE student_profiles SET advisor_id = NULL, updated_at = $1 WHERE advisor_id = $2",
        )
        .bind(chrono::Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let mut profiles_deleted = 0;
        for role in Role::ALL {
            profiles_deleted += sqlx::query(&format!(
                "DELETE FROM {} WHERE id = $1",
                profile_table(role)
            ))
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        sqlx::query("DELETE FROM identities WHERE id = $1")
            .bind(id)
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
                "SELECT 1 FROM {} WHERE id = $1",
                profile_table(role)
            ))
            .bind(id)
            .fetch_optional(&self.read_pool)
            .await?;
            if row.is_some() {
                present.push(role);
            }
        }
        Ok(present)
    }

    async fn purge_stale_profiles(&self, id: Option<Uuid>) -> DbResult<u64> {
        let mut tx = self.write_pool.begin().await?;
        let mut deleted = 0;

        for role in Role::ALL {
            deleted += sqlx::query(&format!(
                r#"
                DELETE FROM {}
                WHERE id IN (SELECT id FROM identities WHERE role != $1 AND ($2::uuid IS NULL OR id = $2))
                "#,
                profile_table(role)
            ))
            .bind(role.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        Ok(deleted)
    }

    async fn exists_with_role(&self, role: Role) -> DbResult<bool> {
        let row = sqlx::query("SELECT 1 FROM identities WHERE role = $1 LIMIT 1")
            .bind(role.as_str())
            .fetch_optional(&self.read_pool)
            .await?;
        Ok(row.is_some())
    }
}
