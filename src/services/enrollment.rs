use std::sync::Arc;

use uuid::Uuid;

use super::{ServiceError, ServiceResult};
use crate::{
    auth::Actor,
    authz::gates,
    db::{DbError, DbPool, ListParams, ListResult, ProgramScope},
    models::{
        BulkEnrollFailure, BulkEnrollResult, CreateProgram, MembershipOutcome, Program, Role,
        RosterEntry, UpdateProgram,
    },
};

/// Programs and their course, instructor and student association sets.
///
/// Every per-program read or membership write goes through
/// [`EnrollmentService::can_access_program`].
#[derive(Clone)]
pub struct EnrollmentService {
    db: Arc<DbPool>,
}

impl EnrollmentService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Whether `actor` may see and act on the program.
    ///
    /// Staff always may; instructors only on programs they are assigned to,
    /// students only on programs they are enrolled in.
    pub async fn can_access_program(&self, actor: &Actor, program_id: Uuid) -> ServiceResult<bool> {
        let programs = self.db.programs();
        let allowed = match actor.role {
            Some(Role::Admin | Role::Manager | Role::AssistantManager) => true,
            Some(Role::Instructor) => programs.is_instructor(program_id, actor.id).await?,
            Some(Role::Student) => programs.is_student(program_id, actor.id).await?,
            None => false,
        };
        Ok(allowed)
    }

    /// Load a program the actor may access.
    async fn accessible_program(&self, actor: &Actor, program_id: Uuid) -> ServiceResult<Program> {
        let program = self
            .db
            .programs()
            .get_by_id(program_id)
            .await?
            .ok_or_else(ServiceError::not_found)?;

        if !self.can_access_program(actor, program_id).await? {
            tracing::debug!(actor_id = %actor.id, program_id = %program_id, "Program access denied");
            return Err(ServiceError::forbidden("no access to program"));
        }
        Ok(program)
    }

    pub async fn get(&self, actor: &Actor, program_id: Uuid) -> ServiceResult<Program> {
        self.accessible_program(actor, program_id).await
    }

    /// Staff see every program, instructors their assignments, students their enrollments.
    pub async fn list(&self, actor: &Actor, params: &ListParams) -> ServiceResult<ListResult<Program>> {
        let scope = match actor.role {
            Some(Role::Admin | Role::Manager | Role::AssistantManager) => ProgramScope::All,
            Some(Role::Instructor) => ProgramScope::InstructorOf(actor.id),
            Some(Role::Student) => ProgramScope::StudentOf(actor.id),
            None => ProgramScope::Nothing,
        };
        Ok(self.db.programs().list(scope, params).await?)
    }

    pub async fn create(&self, actor: &Actor, input: CreateProgram) -> ServiceResult<Program> {
        gates::SCHEDULE_WRITE.check(actor)?;
        let program = self.db.programs().create(&input).await?;
        tracing::info!(actor_id = %actor.id, program_id = %program.id, "Program created");
        Ok(program)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        program_id: Uuid,
        input: UpdateProgram,
    ) -> ServiceResult<Program> {
        gates::SCHEDULE_WRITE.check(actor)?;
        let program = self.db.programs().update(program_id, &input).await?;
        tracing::info!(actor_id = %actor.id, program_id = %program_id, "Program updated");
        Ok(program)
    }

    pub async fn delete(&self, actor: &Actor, program_id: Uuid) -> ServiceResult<()> {
        gates::SCHEDULE_WRITE.check(actor)?;
        self.db.programs().delete(program_id).await?;
        tracing::info!(actor_id = %actor.id, program_id = %program_id, "Program deleted");
        Ok(())
    }

    pub async fn assign_course(
        &self,
        actor: &Actor,
        program_id: Uuid,
        course_id: Uuid,
    ) -> ServiceResult<Program> {
        gates::PROGRAM_STAFFING.check(actor)?;
        self.accessible_program(actor, program_id).await?;
        let program = self.db.programs().assign_course(program_id, course_id).await?;
        tracing::info!(actor_id = %actor.id, program_id = %program_id, course_id = %course_id, "Course assigned");
        Ok(program)
    }

    pub async fn unassign_course(
        &self,
        actor: &Actor,
        program_id: Uuid,
        course_id: Uuid,
    ) -> ServiceResult<Program> {
        gates::PROGRAM_STAFFING.check(actor)?;
        self.accessible_program(actor, program_id).await?;
        let program = self
            .db
            .programs()
            .unassign_course(program_id, course_id)
            .await?;
        tracing::info!(actor_id = %actor.id, program_id = %program_id, course_id = %course_id, "Course unassigned");
        Ok(program)
    }

    pub async fn add_instructor(
        &self,
        actor: &Actor,
        program_id: Uuid,
        instructor_id: Uuid,
    ) -> ServiceResult<MembershipOutcome> {
        gates::PROGRAM_STAFFING.check(actor)?;
        self.accessible_program(actor, program_id).await?;
        let outcome = self
            .db
            .programs()
            .add_instructor(program_id, instructor_id)
            .await?;
        if outcome.is_created() {
            tracing::info!(actor_id = %actor.id, program_id = %program_id, instructor_id = %instructor_id, "Instructor assigned");
        }
        Ok(outcome)
    }

    pub async fn remove_instructor(
        &self,
        actor: &Actor,
        program_id: Uuid,
        instructor_id: Uuid,
    ) -> ServiceResult<()> {
        gates::PROGRAM_STAFFING.check(actor)?;
        self.accessible_program(actor, program_id).await?;
        self.db
            .programs()
            .remove_instructor(program_id, instructor_id)
            .await?;
        tracing::info!(actor_id = %actor.id, program_id = %program_id, instructor_id = %instructor_id, "Instructor removed");
        Ok(())
    }

    pub async fn add_student(
        &self,
        actor: &Actor,
        program_id: Uuid,
        student_id: Uuid,
    ) -> ServiceResult<MembershipOutcome> {
        gates::PROGRAM_ENROLLMENT.check(actor)?;
        self.accessible_program(actor, program_id).await?;
        let outcome = self.db.programs().add_student(program_id, student_id).await?;
        if outcome.is_created() {
            tracing::info!(actor_id = %actor.id, program_id = %program_id, student_id = %student_id, "Student enrolled");
        }
        Ok(outcome)
    }

    pub async fn remove_student(
        &self,
        actor: &Actor,
        program_id: Uuid,
        student_id: Uuid,
    ) -> ServiceResult<()> {
        gates::PROGRAM_ENROLLMENT.check(actor)?;
        self.accessible_program(actor, program_id).await?;
        self.db
            .programs()
            .remove_student(program_id, student_id)
            .await?;
        tracing::info!(actor_id = %actor.id, program_id = %program_id, student_id = %student_id, "Student removed");
        Ok(())
    }

    /// Enroll each student independently. Per-student rejections are collected
    /// in the result; storage failures abort the remainder.
    pub async fn bulk_enroll(
        &self,
        actor: &Actor,
        program_id: Uuid,
        student_ids: &[Uuid],
    ) -> ServiceResult<BulkEnrollResult> {
        gates::PROGRAM_ENROLLMENT.check(actor)?;
        self.accessible_program(actor, program_id).await?;

        let programs = self.db.programs();
        let mut result = BulkEnrollResult::default();
        for &student_id in student_ids {
            match programs.add_student(program_id, student_id).await {
                Ok(MembershipOutcome::Created(membership)) => {
                    result.enrolled += 1;
                    result.created.push(membership);
                }
                Ok(MembershipOutcome::AlreadyPresent(_)) => result.already_enrolled += 1,
                Err(DbError::NotFound) => result.failures.push(BulkEnrollFailure {
                    student_id,
                    reason: "Student not found".to_string(),
                }),
                Err(DbError::Validation(reason) | DbError::Conflict(reason)) => {
                    result.failures.push(BulkEnrollFailure { student_id, reason })
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(
            actor_id = %actor.id,
            program_id = %program_id,
            enrolled = result.enrolled,
            already_enrolled = result.already_enrolled,
            failed = result.failures.len(),
            "Bulk enrollment finished"
        );
        Ok(result)
    }

    pub async fn list_instructors(
        &self,
        actor: &Actor,
        program_id: Uuid,
        params: &ListParams,
    ) -> ServiceResult<ListResult<RosterEntry>> {
        self.accessible_program(actor, program_id).await?;
        Ok(self.db.programs().list_instructors(program_id, params).await?)
    }

    pub async fn list_students(
        &self,
        actor: &Actor,
        program_id: Uuid,
        params: &ListParams,
    ) -> ServiceResult<ListResult<RosterEntry>> {
        self.accessible_program(actor, program_id).await?;
        Ok(self.db.programs().list_students(program_id, params).await?)
    }
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::{
        db::{PROGRAM_SORT, tests::harness},
        models::{CreateIdentity, CreateTerm, DayOfWeek, ProfileFields},
    };

    struct Fixture {
        db: Arc<DbPool>,
        svc: EnrollmentService,
        admin: Actor,
        program_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let pool = harness::create_sqlite_pool().await;
        harness::run_sqlite_migrations(&pool).await;
        let db = Arc::new(DbPool::from_sqlite(pool));

        let term = db
            .terms()
            .create(&CreateTerm {
                name: "Fall".into(),
                start_date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2025, 12, 20).unwrap(),
            })
            .await
            .unwrap();
        let program = db
            .programs()
            .create(&CreateProgram {
                term_id: term.id,
                day_of_week: DayOfWeek::Tuesday,
                start_time: "14:00".into(),
                stop_time: "15:00".into(),
                course_id: None,
            })
            .await
            .unwrap();

        Fixture {
            svc: EnrollmentService::new(db.clone()),
            db,
            admin: Actor::new(Uuid::new_v4(), "ADMIN"),
            program_id: program.id,
        }
    }

    async fn identity(db: &DbPool, handle: &str, role: Role) -> Actor {
        let view = db
            .identities()
            .create(
                &CreateIdentity {
                    handle: handle.into(),
                    password: "irrelevant".into(),
                    name: handle.into(),
                    surname: "Test".into(),
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
            .unwrap();
        Actor::new(view.identity.id, role.as_str())
    }

    #[tokio::test]
    async fn student_access_follows_enrollment() {
        let f = fixture().await;
        let alice = identity(&f.db, "alice", Role::Student).await;
        let carol = identity(&f.db, "carol", Role::Student).await;

        f.svc.add_student(&f.admin, f.program_id, alice.id).await.unwrap();

        assert!(f.svc.can_access_program(&alice, f.program_id).await.unwrap());
        assert!(!f.svc.can_access_program(&carol, f.program_id).await.unwrap());
        assert!(matches!(
            f.svc.get(&carol, f.program_id).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn unknown_role_never_has_access() {
        let f = fixture().await;
        let stranger = Actor::new(Uuid::new_v4(), "janitor");
        assert!(!f.svc.can_access_program(&stranger, f.program_id).await.unwrap());

        let params = ListParams::first_page(&PROGRAM_SORT, 10);
        assert_eq!(f.svc.list(&stranger, &params).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn instructor_enrolls_only_into_own_program() {
        let f = fixture().await;
        let bob = identity(&f.db, "bob", Role::Instructor).await;
        let alice = identity(&f.db, "alice", Role::Student).await;

        assert!(matches!(
            f.svc.add_student(&bob, f.program_id, alice.id).await,
            Err(ServiceError::Forbidden(_))
        ));

        f.svc.add_instructor(&f.admin, f.program_id, bob.id).await.unwrap();
        let outcome = f.svc.add_student(&bob, f.program_id, alice.id).await.unwrap();
        assert!(outcome.is_created());

        // Staffing stays with assistant managers and above
        let other = identity(&f.db, "dave", Role::Instructor).await;
        assert!(matches!(
            f.svc.add_instructor(&bob, f.program_id, other.id).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn bulk_enroll_continues_past_failures() {
        let f = fixture().await;
        let alice = identity(&f.db, "alice", Role::Student).await;
        let carol = identity(&f.db, "carol", Role::Student).await;
        let bob = identity(&f.db, "bob", Role::Instructor).await;
        f.svc.add_student(&f.admin, f.program_id, carol.id).await.unwrap();

        let missing = Uuid::new_v4();
        let result = f
            .svc
            .bulk_enroll(&f.admin, f.program_id, &[alice.id, missing, bob.id, carol.id])
            .await
            .unwrap();

        assert_eq!(result.enrolled, 1);
        assert_eq!(result.already_enrolled, 1);
        assert_eq!(result.created.len(), 1);
        assert_eq!(result.created[0].identity_id, alice.id);
        let failed: Vec<_> = result.failures.iter().map(|f| f.student_id).collect();
        assert_eq!(failed, vec![missing, bob.id]);
    }

    #[tokio::test]
    async fn list_is_scoped_by_role() {
        let f = fixture().await;
        let alice = identity(&f.db, "alice", Role::Student).await;
        let params = ListParams::first_page(&PROGRAM_SORT, 10);

        assert_eq!(f.svc.list(&f.admin, &params).await.unwrap().total, 1);
        assert_eq!(f.svc.list(&alice, &params).await.unwrap().total, 0);

        f.svc.add_student(&f.admin, f.program_id, alice.id).await.unwrap();
        assert_eq!(f.svc.list(&alice, &params).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn missing_program_is_not_found_before_access_check() {
        let f = fixture().await;
        let alice = identity(&f.db, "alice", Role::Student).await;
        assert!(matches!(
            f.svc.get(&alice, Uuid::new_v4()).await,
            Err(ServiceError::Db(DbError::NotFound))
        ));
    }
}
