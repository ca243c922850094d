mod courses;
mod identities;
mod programs;
mod terms;

pub use courses::PostgresCourseRepo;
pub use identities::PostgresIdentityRepo;
pub use programs::PostgresProgramRepo;
pub use terms::PostgresTermRepo;
