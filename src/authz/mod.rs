//! Authorization: the role hierarchy policy and identity visibility.
//!
//! Program-level access (`CanAccessProgram`) depends on membership data and
//! lives with the enrollment service, but is expressed in terms of these gates.

mod error;
mod policy;
mod visibility;

pub use error::AuthzError;
pub use policy::{RoleGate, gates, has_minimum_rank, is_in_allowed_set, rank};
pub use visibility::VisibilityScope;
