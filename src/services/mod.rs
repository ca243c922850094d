mod enrollment;
mod error;
mod identities;
mod schedule;

use std::sync::Arc;

pub use enrollment::EnrollmentService;
pub use error::{ServiceError, ServiceResult};
pub use identities::IdentityService;
pub use schedule::{CourseService, TermService};

use crate::{auth::PasswordHasher, db::DbPool};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub identities: IdentityService,
    pub programs: EnrollmentService,
    pub terms: TermService,
    pub courses: CourseService,
}

impl Services {
    pub fn new(db: Arc<DbPool>, hasher: PasswordHasher) -> Self {
        Self {
            identities: IdentityService::new(db.clone(), hasher),
            programs: EnrollmentService::new(db.clone()),
            terms: TermService::new(db.clone()),
            courses: CourseService::new(db),
        }
    }
}
