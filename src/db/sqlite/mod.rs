mod common;
mod courses;
mod identities;
mod programs;
mod terms;

pub use courses::SqliteCourseRepo;
pub use identities::SqliteIdentityRepo;
pub use programs::SqliteProgramRepo;
pub use terms::SqliteTermRepo;
