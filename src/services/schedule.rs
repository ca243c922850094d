use std::sync::Arc;

use uuid::Uuid;

use super::{ServiceError, ServiceResult};
use crate::{
    auth::Actor,
    authz::gates,
    db::{DbPool, ListParams, ListResult},
    models::{Course, CreateCourse, CreateTerm, Term, UpdateCourse, UpdateTerm},
};

/// Term master data. Any authenticated caller may read.
#[derive(Clone)]
pub struct TermService {
    db: Arc<DbPool>,
}

impl TermService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub async fn create(&self, actor: &Actor, input: CreateTerm) -> ServiceResult<Term> {
        gates::SCHEDULE_WRITE.check(actor)?;
        let term = self.db.terms().create(&input).await?;
        tracing::info!(actor_id = %actor.id, term_id = %term.id, "Term created");
        Ok(term)
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<Term> {
        self.db
            .terms()
            .get_by_id(id)
            .await?
            .ok_or_else(ServiceError::not_found)
    }

    pub async fn list(&self, params: &ListParams) -> ServiceResult<ListResult<Term>> {
        Ok(self.db.terms().list(params).await?)
    }

    pub async fn update(&self, actor: &Actor, id: Uuid, input: UpdateTerm) -> ServiceResult<Term> {
        gates::SCHEDULE_WRITE.check(actor)?;
        let term = self.db.terms().update(id, &input).await?;
        tracing::info!(actor_id = %actor.id, term_id = %id, "Term updated");
        Ok(term)
    }

    pub async fn delete(&self, actor: &Actor, id: Uuid) -> ServiceResult<()> {
        gates::SCHEDULE_WRITE.check(actor)?;
        self.db.terms().delete(id).await?;
        tracing::info!(actor_id = %actor.id, term_id = %id, "Term deleted");
        Ok(())
    }
}

/// Course nodes of the scheduling graph.
#[derive(Clone)]
pub struct CourseService {
    db: Arc<DbPool>,
}

impl CourseService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub async fn create(&self, actor: &Actor, input: CreateCourse) -> ServiceResult<Course> {
        gates::SCHEDULE_WRITE.check(actor)?;
        let course = self.db.courses().create(&input).await?;
        tracing::info!(actor_id = %actor.id, course_id = %course.id, code = %course.code, "Course created");
        Ok(course)
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<Course> {
        self.db
            .courses()
            .get_by_id(id)
            .await?
            .ok_or_else(ServiceError::not_found)
    }

    pub async fn list(&self, params: &ListParams) -> ServiceResult<ListResult<Course>> {
        Ok(self.db.courses().list(params).await?)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        input: UpdateCourse,
    ) -> ServiceResult<Course> {
        gates::SCHEDULE_WRITE.check(actor)?;
        let course = self.db.courses().update(id, &input).await?;
        tracing::info!(actor_id = %actor.id, course_id = %id, "Course updated");
        Ok(course)
    }

    pub async fn delete(&self, actor: &Actor, id: Uuid) -> ServiceResult<()> {
        gates::SCHEDULE_WRITE.check(actor)?;
        self.db.courses().delete(id).await?;
        tracing::info!(actor_id = %actor.id, course_id = %id, "Course deleted");
        Ok(())
    }
}
