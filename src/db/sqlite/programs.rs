use async_trait::async_trait;
use sqlx::{Row, SqliteConnection, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::{parse_opt_uuid, parse_role, parse_uuid};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{ListParams, ListResult, ProgramRepo, ProgramScope, ProjectionTarget},
    },
    models::{
        CreateProgram, DayOfWeek, MembershipOutcome, Program, ProgramMembership, Role,
        RosterEntry, UpdateProgram, validate_time_range,
    },
};

const PROGRAM_COLUMNS: &str = "id, term_id, day_of_week, start_time, stop_time, course_id, course_name, course_day, course_time, term_name, created_at, updated_at";

/// Which association table a membership lives in.
#[derive(Debug, Clone, Copy)]
enum Membership {
    Instructor,
    Student,
}

impl Membership {
    fn table(self) -> &'static str {
        match self {
            Self::Instructor => "program_instructors",
            Self::Student => "program_students",
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::Instructor => "instructor_id",
            Self::Student => "student_id",
        }
    }

    fn role(self) -> Role {
        match self {
            Self::Instructor => Role::Instructor,
            Self::Student => Role::Student,
        }
    }
}

pub struct SqliteProgramRepo {
    pool: SqlitePool,
}

impl SqliteProgramRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn add_member(
        &self,
        kind: Membership,
        program_id: Uuid,
        identity_id: Uuid,
    ) -> DbResult<MembershipOutcome> {
        let mut tx = self.pool.begin().await?;

        ensure_program(&mut tx, program_id).await?;

        let role: Option<String> = sqlx::query_scalar("SELECT role FROM identities WHERE id = ?")
            .bind(identity_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let role = role.ok_or(DbError::NotFound)?;
        if parse_role(&role)? != kind.role() {
            return Err(DbError::Validation(format!(
                "Identity '{}' is not a {}",
                identity_id,
                kind.role()
            )));
        }

        let now = chrono::Utc::now();
        let inserted = sqlx::query(&format!(
            "INSERT INTO {} (program_id, {}, created_at) VALUES (?, ?, ?) ON CONFLICT DO NOTHING",
            kind.table(),
            kind.column()
        ))
        .bind(program_id.to_string())
        .bind(identity_id.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if inserted {
            tx.commit().await?;
            return Ok(MembershipOutcome::Created(ProgramMembership {
                program_id,
                identity_id,
                created_at: now,
            }));
        }

        let created_at = sqlx::query_scalar(&format!(
            "SELECT created_at FROM {} WHERE program_id = ? AND {} = ?",
            kind.table(),
            kind.column()
        ))
        .bind(program_id.to_string())
        .bind(identity_id.to_string())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(MembershipOutcome::AlreadyPresent(ProgramMembership {
            program_id,
            identity_id,
            created_at,
        }))
    }

    async fn remove_member(
        &self,
        kind: Membership,
        program_id: Uuid,
        identity_id: Uuid,
    ) -> DbResult<()> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE program_id = ? AND {} = ?",
            kind.table(),
            kind.column()
        ))
        .bind(program_id.to_string())
        .bind(identity_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }

    async fn has_member(
        &self,
        kind: Membership,
        program_id: Uuid,
        identity_id: Uuid,
    ) -> DbResult<bool> {
        let row = sqlx::query(&format!(
            "SELECT 1 FROM {} WHERE program_id = ? AND {} = ?",
            kind.table(),
            kind.column()
        ))
        .bind(program_id.to_string())
        .bind(identity_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn roster(
        &self,
        kind: Membership,
        program_id: Uuid,
        params: &ListParams,
    ) -> DbResult<ListResult<RosterEntry>> {
        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE program_id = ?",
            kind.table()
        ))
        .bind(program_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT id, handle, name, surname, email, is_active, assigned_at
            FROM (
                SELECT i.id AS id, i.handle AS handle, i.name AS name, i.surname AS surname,
                       i.email AS email, i.is_active AS is_active, m.created_at AS assigned_at
                FROM {table} m
                JOIN identities i ON i.id = m.{column}
                WHERE m.program_id = ?
            ) AS roster
            ORDER BY {order}
            LIMIT ? OFFSET ?
            "#,
            table = kind.table(),
            column = kind.column(),
            order = params.order_by()
        ))
        .bind(program_id.to_string())
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .iter()
            .map(|row| {
                Ok(RosterEntry {
                    identity_id: parse_uuid(&row.get::<String, _>("id"))?,
                    handle: row.get("handle"),
                    name: row.get("name"),
                    surname: row.get("surname"),
                    email: row.get("email"),
                    is_active: row.get("is_active"),
                    assigned_at: row.get("assigned_at"),
                })
            })
            .collect::<DbResult<Vec<_>>>()?;

        Ok(ListResult::new(items, total, params))
    }
}

fn program_from_row(row: &SqliteRow) -> DbResult<Program> {
    let day: String = row.get("day_of_week");
    Ok(Program {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        term_id: parse_uuid(&row.get::<String, _>("term_id"))?,
        day_of_week: DayOfWeek::from_str(&day)
            .ok_or_else(|| DbError::Internal(format!("Invalid day_of_week in database: {}", day)))?,
        start_time: row.get("start_time"),
        stop_time: row.get("stop_time"),
        course_id: parse_opt_uuid(row.get("course_id"))?,
        course_name: row.get("course_name"),
        course_day: row.get("course_day"),
        course_time: row.get("course_time"),
        term_name: row.get("term_name"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

async fn fetch_program(conn: &mut SqliteConnection, id: Uuid) -> DbResult<Option<Program>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM programs WHERE id = ?",
        PROGRAM_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(program_from_row).transpose()
}

async fn ensure_program(conn: &mut SqliteConnection, id: Uuid) -> DbResult<()> {
    let row = sqlx::query("SELECT 1 FROM programs WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|_| ()).ok_or(DbError::NotFound)
}

async fn term_exists(conn: &mut SqliteConnection, id: Uuid) -> DbResult<bool> {
    let row = sqlx::query("SELECT 1 FROM terms WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

async fn course_exists(conn: &mut SqliteConnection, id: Uuid) -> DbResult<bool> {
    let row = sqlx::query("SELECT 1 FROM courses WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

/// Recompute the denormalized course and term columns of the targeted programs.
pub(super) async fn refresh_projection(
    conn: &mut SqliteConnection,
    target: ProjectionTarget,
) -> DbResult<u64> {
    let (filter, id) = match target {
        ProjectionTarget::Program(id) => ("id = ?", id),
        ProjectionTarget::Term(id) => ("term_id = ?", id),
        ProjectionTarget::Course(id) => (
            "id IN (SELECT program_id FROM program_courses WHERE course_id = ?)",
            id,
        ),
    };

    let result = sqlx::query(&format!(
        r#"
        UPDATE programs SET
            course_id = (
                SELECT pc.course_id FROM program_courses pc
                WHERE pc.program_id = programs.id
                ORDER BY pc.created_at DESC LIMIT 1
            ),
            course_name = (
                SELECT c.name FROM program_courses pc
                JOIN courses c ON c.id = pc.course_id
                WHERE pc.program_id = programs.id
                ORDER BY pc.created_at DESC LIMIT 1
            ),
            course_day = day_of_week,
            course_time = start_time || '-' || stop_time,
            term_name = COALESCE((SELECT t.name FROM terms t WHERE t.id = programs.term_id), '')
        WHERE {}
        "#,
        filter
    ))
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

#[async_trait]
impl ProgramRepo for SqliteProgramRepo {
    async fn create(&self, input: &CreateProgram) -> DbResult<Program> {
        let mut tx = self.pool.begin().await?;

        if !term_exists(&mut tx, input.term_id).await? {
            return Err(DbError::Validation(format!(
                "Term '{}' does not exist",
                input.term_id
            )));
        }
        if let Some(course_id) = input.course_id
            && !course_exists(&mut tx, course_id).await?
        {
            return Err(DbError::Validation(format!(
                "Course '{}' does not exist",
                course_id
            )));
        }

        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO programs
                (id, term_id, day_of_week, start_time, stop_time, course_day, course_time, term_name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, '', ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(input.term_id.to_string())
        .bind(input.day_of_week.as_str())
        .bind(&input.start_time)
        .bind(&input.stop_time)
        .bind(input.day_of_week.as_str())
        .bind(format!("{}-{}", input.start_time, input.stop_time))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if let Some(course_id) = input.course_id {
            sqlx::query(
                "INSERT INTO program_courses (program_id, course_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(id.to_string())
            .bind(course_id.to_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        refresh_projection(&mut tx, ProjectionTarget::Program(id)).await?;
        let program = fetch_program(&mut tx, id).await?.ok_or(DbError::NotFound)?;

        tx.commit().await?;

        Ok(program)
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Program>> {
        let mut conn = self.pool.acquire().await?;
        fetch_program(&mut conn, id).await
    }

    async fn list(&self, scope: ProgramScope, params: &ListParams) -> DbResult<ListResult<Program>> {
        let (where_clause, member) = match scope {
            ProgramScope::All => ("1 = 1", None),
            ProgramScope::InstructorOf(id) => (
                "id IN (SELECT program_id FROM program_instructors WHERE instructor_id = ?)",
                Some(id),
            ),
            ProgramScope::StudentOf(id) => (
                "id IN (SELECT program_id FROM program_students WHERE student_id = ?)",
                Some(id),
            ),
            ProgramScope::Nothing => return Ok(ListResult::new(Vec::new(), 0, params)),
        };

        let count_sql = format!("SELECT COUNT(*) FROM programs WHERE {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(id) = member {
            count_query = count_query.bind(id.to_string());
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let sql = format!(
            "SELECT {} FROM programs WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            PROGRAM_COLUMNS,
            where_clause,
            params.order_by()
        );
        let mut query = sqlx::query(&sql);
        if let Some(id) = member {
            query = query.bind(id.to_string());
        }
        let rows = query
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .iter()
            .map(program_from_row)
            .collect::<DbResult<Vec<_>>>()?;

        Ok(ListResult::new(items, total, params))
    }

    async fn update(&self, id: Uuid, input: &UpdateProgram) -> DbResult<Program> {
        let mut tx = self.pool.begin().await?;

        let mut program = fetch_program(&mut tx, id).await?.ok_or(DbError::NotFound)?;

        if let Some(term_id) = input.term_id {
            if !term_exists(&mut tx, term_id).await? {
                return Err(DbError::Validation(format!(
                    "Term '{}' does not exist",
                    term_id
                )));
            }
            program.term_id = term_id;
        }
        if let Some(day) = input.day_of_week {
            program.day_of_week = day;
        }
        if let Some(start_time) = &input.start_time {
            program.start_time = start_time.clone();
        }
        if let Some(stop_time) = &input.stop_time {
            program.stop_time = stop_time.clone();
        }
        validate_time_range(&program.start_time, &program.stop_time).map_err(|_| {
            DbError::Validation("stop_time must be after start_time".to_string())
        })?;

        sqlx::query(
            r#"
            UPDATE programs
            SET term_id = ?, day_of_week = ?, start_time = ?, stop_time = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(program.term_id.to_string())
        .bind(program.day_of_week.as_str())
        .bind(&program.start_time)
        .bind(&program.stop_time)
        .bind(chrono::Utc::now())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        refresh_projection(&mut tx, ProjectionTarget::Program(id)).await?;
        let program = fetch_program(&mut tx, id).await?.ok_or(DbError::NotFound)?;

        tx.commit().await?;

        Ok(program)
    }

    async fn delete(&self, id: Uuid) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        for table in ["program_courses", "program_instructors", "program_students"] {
            sqlx::query(&format!("DELETE FROM {} WHERE program_id = ?", table))
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        let result = sqlx::query("DELETE FROM programs WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn assign_course(&self, program_id: Uuid, course_id: Uuid) -> DbResult<Program> {
        let mut tx = self.pool.begin().await?;

        ensure_program(&mut tx, program_id).await?;
        if !course_exists(&mut tx, course_id).await? {
            return Err(DbError::NotFound);
        }

        // A program carries at most one course; assigning replaces it.
        sqlx::query("DELETE FROM program_courses WHERE program_id = ?")
            .bind(program_id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO program_courses (program_id, course_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(program_id.to_string())
        .bind(course_id.to_string())
        .bind(chrono::Utc::now())
        .execute(&mut *tx)
        .await?;

        refresh_projection(&mut tx, ProjectionTarget::Program(program_id)).await?;
        let program = fetch_program(&mut tx, program_id)
            .await?
            .ok_or(DbError::NotFound)?;

        tx.commit().await?;

        Ok(program)
    }

    async fn unassign_course(&self, program_id: Uuid, course_id: Uuid) -> DbResult<Program> {
        let mut tx = self.pool.begin().await?;

        let result =
            sqlx::query("DELETE FROM program_courses WHERE program_id = ? AND course_id = ?")
                .bind(program_id.to_string())
                .bind(course_id.to_string())
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        refresh_projection(&mut tx, ProjectionTarget::Program(program_id)).await?;
        let program = fetch_program(&mut tx, program_id)
            .await?
            .ok_or(DbError::NotFound)?;

        tx.commit().await?;

        Ok(program)
    }

    async fn add_instructor(
        &self,
        program_id: Uuid,
        instructor_id: Uuid,
    ) -> DbResult<MembershipOutcome> {
        self.add_member(Membership::Instructor, program_id, instructor_id)
            .await
    }

    async fn remove_instructor(&self, program_id: Uuid, instructor_id: Uuid) -> DbResult<()> {
        self.remove_member(Membership::Instructor, program_id, instructor_id)
            .await
    }

    async fn add_student(
        &self,
        program_id: Uuid,
        student_id: Uuid,
    ) -> DbResult<MembershipOutcome> {
        self.add_member(Membership::Student, program_id, student_id)
            .await
    }

    async fn remove_student(&self, program_id: Uuid, student_id: Uuid) -> DbResult<()> {
        self.remove_member(Membership::Student, program_id, student_id)
            .await
    }

    async fn is_instructor(&self, program_id: Uuid, identity_id: Uuid) -> DbResult<bool> {
        self.has_member(Membership::Instructor, program_id, identity_id)
            .await
    }

    async fn is_student(&self, program_id: Uuid, identity_id: Uuid) -> DbResult<bool> {
        self.has_member(Membership::Student, program_id, identity_id)
            .await
    }

    async fn list_instructors(
        &self,
        program_id: Uuid,
        params: &ListParams,
    ) -> DbResult<ListResult<RosterEntry>> {
        self.roster(Membership::Instructor, program_id, params)
            .await
    }

    async fn list_students(
        &self,
        program_id: Uuid,
        params: &ListParams,
    ) -> DbResult<ListResult<RosterEntry>> {
        self.roster(Membership::Student, program_id, params).await
    }

    async fn refresh_projection(&self, target: ProjectionTarget) -> DbResult<u64> {
        let mut conn = self.pool.acquire().await?;
        refresh_projection(&mut conn, target).await
    }
}
