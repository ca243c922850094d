//! Shared tests for ProgramRepo implementations
//!
//! Covers the association sets and the denormalized course/term projection,
//! including how identity lifecycle changes cascade into memberships.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
    db::{
        error::DbError,
        repos::{
            CourseRepo, IdentityRepo, ListParams, PROGRAM_SORT, ProgramRepo, ProgramScope,
            ProjectionTarget, ROSTER_SORT, TermRepo,
        },
    },
    models::{
        ChangeRole, CreateCourse, CreateIdentity, CreateProgram, CreateTerm, DayOfWeek,
        ProfileFields, Role, UpdateCourse, UpdateProgram, UpdateTerm,
    },
};

pub struct ProgramTestContext<'a> {
    pub programs: &'a dyn ProgramRepo,
    pub identities: &'a dyn IdentityRepo,
    pub terms: &'a dyn TermRepo,
    pub courses: &'a dyn CourseRepo,
}

impl ProgramTestContext<'_> {
    async fn term(&self, name: &str) -> Uuid {
        self.terms
            .create(&CreateTerm {
                name: name.to_string(),
                start_date: NaiveDate::from_ymd_opt(2025, 9, 1).expect("valid date"),
                end_date: NaiveDate::from_ymd_opt(2026, 1, 31).expect("valid date"),
            })
            .await
            .expect("Failed to create term")
            .id
    }

    async fn course(&self, code: &str, name: &str) -> Uuid {
        self.courses
            .create(&CreateCourse {
                code: code.to_string(),
                name: name.to_string(),
                description: None,
            })
            .await
            .expect("Failed to create course")
            .id
    }

    async fn identity(&self, handle: &str, role: Role) -> Uuid {
        self.identities
            .create(
                &CreateIdentity {
                    handle: handle.to_string(),
                    password: "correct-horse".to_string(),
                    name: handle.to_string(),
                    surname: "Member".to_string(),
                    email: format!("{}@school.test", handle),
                    role,
                    phone: None,
                    gender: None,
                    birth_date: None,
                    profile: ProfileFields::default(),
                },
                "hash",
            )
            .await
            .expect("Failed to create identity")
            .identity
            .id
    }

    async fn program(&self, term_id: Uuid, course_id: Option<Uuid>) -> Uuid {
        self.programs
            .create(&CreateProgram {
                term_id,
                day_of_week: DayOfWeek::Monday,
                start_time: "09:00".to_string(),
                stop_time: "10:30".to_string(),
                course_id,
            })
            .await
            .expect("Failed to create program")
            .id
    }
}

fn roster_page() -> ListParams {
    ListParams::first_page(&ROSTER_SORT, 100)
}

// ============================================================================
// Program CRUD and projection
// ============================================================================

pub async fn test_create_fills_projection(ctx: &ProgramTestContext<'_>) {
    let term_id = ctx.term("Fall 2025").await;
    let course_id = ctx.course("ALG-1", "Algebra").await;

    let program_id = ctx.program(term_id, Some(course_id)).await;
    let program = ctx.programs.get_by_id(program_id).await.unwrap().unwrap();

    assert_eq!(program.course_id, Some(course_id));
    assert_eq!(program.course_name.as_deref(), Some("Algebra"));
    assert_eq!(program.course_day, "monday");
    assert_eq!(program.course_time, "09:00-10:30");
    assert_eq!(program.term_name, "Fall 2025");
}

pub async fn test_create_with_unknown_term_fails(ctx: &ProgramTestContext<'_>) {
    let result = ctx
        .programs
        .create(&CreateProgram {
            term_id: Uuid::new_v4(),
            day_of_week: DayOfWeek::Friday,
            start_time: "08:00".to_string(),
            stop_time: "09:00".to_string(),
            course_id: None,
        })
        .await;

    assert!(matches!(result, Err(DbError::Validation(_))));
}

pub async fn test_update_slot_refreshes_projection(ctx: &ProgramTestContext<'_>) {
    let term_id = ctx.term("Term").await;
    let program_id = ctx.program(term_id, None).await;

    let program = ctx
        .programs
        .update(
            program_id,
            &UpdateProgram {
                day_of_week: Some(DayOfWeek::Wednesday),
                stop_time: Some("11:00".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(program.course_day, "wednesday");
    assert_eq!(program.course_time, "09:00-11:00");
}

pub async fn test_update_rejects_inverted_times(ctx: &ProgramTestContext<'_>) {
    let term_id = ctx.term("Term").await;
    let program_id = ctx.program(term_id, None).await;

    let result = ctx
        .programs
        .update(
            program_id,
            &UpdateProgram {
                stop_time: Some("08:00".to_string()),
                ..Default::default()
            },
        )
        .await;

    assert!(matches!(result, Err(DbError::Validation(_))));
}

pub async fn test_renames_flow_into_projection(ctx: &ProgramTestContext<'_>) {
    let term_id = ctx.term("Old term").await;
    let course_id = ctx.course("HIS-1", "Old course").await;
    let program_id = ctx.program(term_id, Some(course_id)).await;

    ctx.terms
        .update(
            term_id,
            &UpdateTerm {
                name: Some("New term".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    ctx.courses
        .update(
            course_id,
            &UpdateCourse {
                name: Some("New course".to_string()),
                description: None,
            },
        )
        .await
        .unwrap();

    let program = ctx.programs.get_by_id(program_id).await.unwrap().unwrap();
    assert_eq!(program.term_name, "New term");
    assert_eq!(program.course_name.as_deref(), Some("New course"));
}

pub async fn test_refresh_projection_is_idempotent(ctx: &ProgramTestContext<'_>) {
    let term_id = ctx.term("Term").await;
    let course_id = ctx.course("ART-1", "Art").await;
    let program_id = ctx.program(term_id, Some(course_id)).await;

    let before = ctx.programs.get_by_id(program_id).await.unwrap().unwrap();
    let touched = ctx
        .programs
        .refresh_projection(ProjectionTarget::Term(term_id))
        .await
        .unwrap();
    let after = ctx.programs.get_by_id(program_id).await.unwrap().unwrap();

    assert_eq!(touched, 1);
    assert_eq!(before.course_id, after.course_id);
    assert_eq!(before.course_name, after.course_name);
    assert_eq!(before.course_time, after.course_time);
    assert_eq!(before.term_name, after.term_name);
}

pub async fn test_referenced_term_and_course_cannot_be_deleted(ctx: &ProgramTestContext<'_>) {
    let term_id = ctx.term("Busy").await;
    let course_id = ctx.course("CHE-1", "Chemistry").await;
    let program_id = ctx.program(term_id, Some(course_id)).await;

    assert!(matches!(
        ctx.terms.delete(term_id).await,
        Err(DbError::Conflict(_))
    ));
    assert!(matches!(
        ctx.courses.delete(course_id).await,
        Err(DbError::Conflict(_))
    ));

    ctx.programs.delete(program_id).await.unwrap();
    ctx.courses.delete(course_id).await.unwrap();
    ctx.terms.delete(term_id).await.unwrap();
}

pub async fn test_list_scoped_to_membership(ctx: &ProgramTestContext<'_>) {
    let term_id = ctx.term("Term").await;
    let mine = ctx.program(term_id, None).await;
    ctx.program(term_id, None).await;
    let student = ctx.identity("enrolled", Role::Student).await;
    ctx.programs.add_student(mine, student).await.unwrap();

    let params = ListParams::first_page(&PROGRAM_SORT, 20);

    let all = ctx.programs.list(ProgramScope::All, &params).await.unwrap();
    assert_eq!(all.total, 2);

    let scoped = ctx
        .programs
        .list(ProgramScope::StudentOf(student), &params)
        .await
        .unwrap();
    assert_eq!(scoped.total, 1);
    assert_eq!(scoped.items[0].id, mine);

    let nothing = ctx
        .programs
        .list(ProgramScope::Nothing, &params)
        .await
        .unwrap();
    assert_eq!(nothing.total, 0);
}

// ============================================================================
// Course assignment
// ============================================================================

pub async fn test_assign_course_replaces_previous(ctx: &ProgramTestContext<'_>) {
    let term_id = ctx.term("Term").await;
    let first = ctx.course("GEO-1", "Geography").await;
    let second = ctx.course("GEO-2", "Geology").await;
    let program_id = ctx.program(term_id, Some(first)).await;

    let program = ctx.programs.assign_course(program_id, second).await.unwrap();
    assert_eq!(program.course_id, Some(second));
    assert_eq!(program.course_name.as_deref(), Some("Geology"));

    // The previous course is no longer assigned anywhere
    ctx.courses.delete(first).await.unwrap();
}

pub async fn test_assign_course_missing_targets(ctx: &ProgramTestContext<'_>) {
    let term_id = ctx.term("Term").await;
    let course_id = ctx.course("LIT-1", "Literature").await;
    let program_id = ctx.program(term_id, None).await;

    assert!(matches!(
        ctx.programs.assign_course(Uuid::new_v4(), course_id).await,
        Err(DbError::NotFound)
    ));
    assert!(matches!(
        ctx.programs.assign_course(program_id, Uuid::new_v4()).await,
        Err(DbError::NotFound)
    ));
}

pub async fn test_unassign_course(ctx: &ProgramTestContext<'_>) {
    let term_id = ctx.term("Term").await;
    let course_id = ctx.course("MUS-1", "Music").await;
    let program_id = ctx.program(term_id, Some(course_id)).await;

    let program = ctx
        .programs
        .unassign_course(program_id, course_id)
        .await
        .unwrap();
    assert_eq!(program.course_id, None);
    assert_eq!(program.course_name, None);

    let again = ctx.programs.unassign_course(program_id, course_id).await;
    assert!(matches!(again, Err(DbError::NotFound)));
}

// ============================================================================
// Memberships
// ============================================================================

pub async fn test_add_instructor_is_idempotent(ctx: &ProgramTestContext<'_>) {
    let term_id = ctx.term("Term").await;
    let program_id = ctx.program(term_id, None).await;
    let instructor = ctx.identity("teach", Role::Instructor).await;

    let first = ctx
        .programs
        .add_instructor(program_id, instructor)
        .await
        .unwrap();
    assert!(first.is_created());

    let second = ctx
        .programs
        .add_instructor(program_id, instructor)
        .await
        .unwrap();
    assert!(!second.is_created());
    assert_eq!(second.membership().identity_id, instructor);

    let roster = ctx
        .programs
        .list_instructors(program_id, &roster_page())
        .await
        .unwrap();
    assert_eq!(roster.total, 1);
    assert_eq!(roster.items[0].handle, "teach");
    assert!(ctx.programs.is_instructor(program_id, instructor).await.unwrap());
}

pub async fn test_add_member_checks_role_and_existence(ctx: &ProgramTestContext<'_>) {
    let term_id = ctx.term("Term").await;
    let program_id = ctx.program(term_id, None).await;
    let instructor = ctx.identity("not-a-student", Role::Instructor).await;
    let student = ctx.identity("a-student", Role::Student).await;

    assert!(matches!(
        ctx.programs.add_student(program_id, instructor).await,
        Err(DbError::Validation(_))
    ));
    assert!(matches!(
        ctx.programs.add_instructor(program_id, student).await,
        Err(DbError::Validation(_))
    ));
    assert!(matches!(
        ctx.programs.add_student(program_id, Uuid::new_v4()).await,
        Err(DbError::NotFound)
    ));
    assert!(matches!(
        ctx.programs.add_student(Uuid::new_v4(), student).await,
        Err(DbError::NotFound)
    ));
}

pub async fn test_remove_student(ctx: &ProgramTestContext<'_>) {
    let term_id = ctx.term("Term").await;
    let program_id = ctx.program(term_id, None).await;
    let student = ctx.identity("leaver", Role::Student).await;

    ctx.programs.add_student(program_id, student).await.unwrap();
    assert!(ctx.programs.is_student(program_id, student).await.unwrap());

    ctx.programs.remove_student(program_id, student).await.unwrap();
    assert!(!ctx.programs.is_student(program_id, student).await.unwrap());

    let again = ctx.programs.remove_student(program_id, student).await;
    assert!(matches!(again, Err(DbError::NotFound)));
}

pub async fn test_roster_sorted_by_handle(ctx: &ProgramTestContext<'_>) {
    let term_id = ctx.term("Term").await;
    let program_id = ctx.program(term_id, None).await;
    for handle in ["charlie", "alice", "bob"] {
        let id = ctx.identity(handle, Role::Student).await;
        ctx.programs.add_student(program_id, id).await.unwrap();
    }

    let params = ListParams::resolve(&ROSTER_SORT, None, None, Some("handle"), Some("asc"), 20, 100);
    let roster = ctx.programs.list_students(program_id, &params).await.unwrap();

    let handles: Vec<_> = roster.items.iter().map(|e| e.handle.as_str()).collect();
    assert_eq!(handles, vec!["alice", "bob", "charlie"]);
}

pub async fn test_role_change_drops_memberships(ctx: &ProgramTestContext<'_>) {
    let term_id = ctx.term("Term").await;
    let program_id = ctx.program(term_id, None).await;
    let student = ctx.identity("graduate", Role::Student).await;
    let instructor = ctx.identity("retiring", Role::Instructor).await;

    ctx.programs.add_student(program_id, student).await.unwrap();
    ctx.programs
        .add_instructor(program_id, instructor)
        .await
        .unwrap();

    for (id, role) in [(student, Role::Instructor), (instructor, Role::Manager)] {
        ctx.identities
            .change_role(
                id,
                &ChangeRole {
                    role,
                    profile: ProfileFields::default(),
                },
            )
            .await
            .unwrap();
    }

    assert!(!ctx.programs.is_student(program_id, student).await.unwrap());
    assert!(!ctx.programs.is_instructor(program_id, instructor).await.unwrap());
}

pub async fn test_enroll_racing_role_change_leaves_no_stray_rows(ctx: &ProgramTestContext<'_>) {
    let term_id = ctx.term("Term").await;
    let program_id = ctx.program(term_id, None).await;

    for n in 0..5 {
        let student = ctx.identity(&format!("switcher{}", n), Role::Student).await;
        let promote = ChangeRole {
            role: Role::Instructor,
            profile: ProfileFields::default(),
        };

        let (enrolled, changed) = tokio::join!(
            ctx.programs.add_student(program_id, student),
            ctx.identities.change_role(student, &promote),
        );
        changed.unwrap();
        assert!(matches!(enrolled, Ok(_) | Err(DbError::Validation(_))));
        assert!(!ctx.programs.is_student(program_id, student).await.unwrap());
    }
}

pub async fn test_identity_delete_drops_memberships(ctx: &ProgramTestContext<'_>) {
    let term_id = ctx.term("Term").await;
    let program_id = ctx.program(term_id, None).await;
    let student = ctx.identity("dropout", Role::Student).await;
    ctx.programs.add_student(program_id, student).await.unwrap();

    let result = ctx.identities.delete(student).await.unwrap();
    assert_eq!(result.enrollments_deleted, 1);

    let roster = ctx
        .programs
        .list_students(program_id, &roster_page())
        .await
        .unwrap();
    assert_eq!(roster.total, 0);
}

pub async fn test_program_delete_drops_associations(ctx: &ProgramTestContext<'_>) {
    let term_id = ctx.term("Term").await;
    let course_id = ctx.course("PE-1", "Sports").await;
    let program_id = ctx.program(term_id, Some(course_id)).await;
    let student = ctx.identity("runner", Role::Student).await;
    ctx.programs.add_student(program_id, student).await.unwrap();

    ctx.programs.delete(program_id).await.unwrap();

    assert!(ctx.programs.get_by_id(program_id).await.unwrap().is_none());
    assert!(!ctx.programs.is_student(program_id, student).await.unwrap());
    assert!(matches!(
        ctx.programs.delete(program_id).await,
        Err(DbError::NotFound)
    ));
    // The course is free again
    ctx.courses.delete(course_id).await.unwrap();
}

// ============================================================================
// SQLite Tests
// ============================================================================

#[cfg(all(test, feature = "database-sqlite"))]
mod sqlite_tests {
    use super::*;
    use crate::db::{
        sqlite::{SqliteCourseRepo, SqliteIdentityRepo, SqliteProgramRepo, SqliteTermRepo},
        tests::harness::{create_sqlite_pool, run_sqlite_migrations},
    };

    macro_rules! sqlite_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let pool = create_sqlite_pool().await;
                run_sqlite_migrations(&pool).await;
                let programs = SqliteProgramRepo::new(pool.clone());
                let identities = SqliteIdentityRepo::new(pool.clone());
                let terms = SqliteTermRepo::new(pool.clone());
                let courses = SqliteCourseRepo::new(pool);
                let ctx = ProgramTestContext {
                    programs: &programs,
                    identities: &identities,
                    terms: &terms,
                    courses: &courses,
                };
                super::$name(&ctx).await;
            }
        };
    }

    sqlite_test!(test_create_fills_projection);
    sqlite_test!(test_create_with_unknown_term_fails);
    sqlite_test!(test_update_slot_refreshes_projection);
    sqlite_test!(test_update_rejects_inverted_times);
    sqlite_test!(test_renames_flow_into_projection);
    sqlite_test!(test_refresh_projection_is_idempotent);
    sqlite_test!(test_referenced_term_and_course_cannot_be_deleted);
    sqlite_test!(test_list_scoped_to_membership);
    sqlite_test!(test_assign_course_replaces_previous);
    sqlite_test!(test_assign_course_missing_targets);
    sqlite_test!(test_unassign_course);
    sqlite_test!(test_add_instructor_is_idempotent);
    sqlite_test!(test_add_member_checks_role_and_existence);
    sqlite_test!(test_remove_student);
    sqlite_test!(test_roster_sorted_by_handle);
    sqlite_test!(test_role_change_drops_memberships);
    sqlite_test!(test_enroll_racing_role_change_leaves_no_stray_rows);
    sqlite_test!(test_identity_delete_drops_memberships);
    sqlite_test!(test_program_delete_drops_associations);
}

// ============================================================================
// PostgreSQL Tests - Require Docker, run with `cargo test -- --ignored`
// ============================================================================

#[cfg(all(test, feature = "database-postgres"))]
mod postgres_tests {
    use super::*;
    use crate::db::{
        postgres::{
            PostgresCourseRepo, PostgresIdentityRepo, PostgresProgramRepo, PostgresTermRepo,
        },
        tests::harness::postgres::{create_isolated_postgres_pool, run_postgres_migrations},
    };

    macro_rules! postgres_test {
        ($name:ident) => {
            #[tokio::test]
            #[ignore = "Requires Docker - run with `cargo test -- --ignored`"]
            async fn $name() {
                let pool = create_isolated_postgres_pool().await;
                run_postgres_migrations(&pool).await;
                let programs = PostgresProgramRepo::new(pool.clone(), None);
                let identities = PostgresIdentityRepo::new(pool.clone(), None);
                let terms = PostgresTermRepo::new(pool.clone(), None);
                let courses = PostgresCourseRepo::new(pool, None);
                let ctx = ProgramTestContext {
                    programs: &programs,
                    identities: &identities,
                    terms: &terms,
                    courses: &courses,
                };
                super::$name(&ctx).await;
            }
        };
    }

    postgres_test!(test_create_fills_projection);
    postgres_test!(test_create_with_unknown_term_fails);
    postgres_test!(test_update_slot_refreshes_projection);
    postgres_test!(test_update_rejects_inverted_times);
    postgres_test!(test_renames_flow_into_projection);
    postgres_test!(test_refresh_projection_is_idempotent);
    postgres_test!(test_referenced_term_and_course_cannot_be_deleted);
    postgres_test!(test_list_scoped_to_membership);
    postgres_test!(test_assign_course_replaces_previous);
    postgres_test!(test_assign_course_missing_targets);
    postgres_test!(test_unassign_course);
    postgres_test!(test_add_instructor_is_idempotent);
    postgres_test!(test_add_member_checks_role_and_existence);
    postgres_test!(test_remove_student);
    postgres_test!(test_roster_sorted_by_handle);
    postgres_test!(test_role_change_drops_memberships);
    postgres_test!(test_enroll_racing_role_change_leaves_no_stray_rows);
    postgres_test!(test_identity_delete_drops_memberships);
    postgres_test!(test_program_delete_drops_associations);
}
