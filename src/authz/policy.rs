//! Role hierarchy policy.
//!
//! Two kinds of gate exist and must not be conflated:
//! - **minimum rank** ([`RoleGate::AtLeast`]): "must be at least X"
//! - **allow-set** ([`RoleGate::AnyOf`]): "must be exactly one of {X, Y}"
//!
//! Deleting an identity is allow-set gated to ADMIN, not "rank >= MANAGER",
//! so a manager can never delete a peer manager.

use super::AuthzError;
use crate::{auth::Actor, models::Role};

/// Rank of a role name. Unknown or malformed names rank 0, below every real role.
pub fn rank(role: &str) -> u8 {
    Role::parse(role).map(Role::rank).unwrap_or(0)
}

/// `rank(role) >= rank(min_role)`
pub fn has_minimum_rank(role: &str, min_role: Role) -> bool {
    rank(role) >= min_role.rank()
}

/// Case-insensitive membership of `role` in `allowed`. An empty set always denies.
pub fn is_in_allowed_set(role: &str, allowed: &[Role]) -> bool {
    match Role::parse(role) {
        Some(role) => allowed.contains(&role),
        None => false,
    }
}

/// A declarative role check attached to an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleGate {
    /// Hierarchical: rank must be at least the given role's rank
    AtLeast(Role),
    /// Enumerated: role must be one of these exactly
    AnyOf(&'static [Role]),
}

impl RoleGate {
    pub fn permits(&self, role: &str) -> bool {
        match self {
            Self::AtLeast(min) => has_minimum_rank(role, *min),
            Self::AnyOf(allowed) => is_in_allowed_set(role, allowed),
        }
    }

    pub fn check(&self, actor: &Actor) -> Result<(), AuthzError> {
        if self.permits(&actor.role_claim) {
            Ok(())
        } else {
            Err(AuthzError::access_denied(format!(
                "role '{}' does not satisfy {:?}",
                actor.role_claim, self
            )))
        }
    }
}

/// Gates for every protected operation, in one place.
pub mod gates {
    use super::RoleGate;
    use crate::models::Role;

    /// Create or update other identities (target must also rank below the actor)
    pub const IDENTITY_MANAGE: RoleGate = RoleGate::AtLeast(Role::AssistantManager);
    pub const IDENTITY_CHANGE_ROLE: RoleGate = RoleGate::AnyOf(&[Role::Admin]);
    pub const IDENTITY_SET_ACTIVE: RoleGate = RoleGate::AnyOf(&[Role::Admin, Role::Manager]);
    pub const IDENTITY_DELETE: RoleGate = RoleGate::AnyOf(&[Role::Admin]);
    pub const MAINTENANCE: RoleGate = RoleGate::AnyOf(&[Role::Admin]);
    /// Terms, courses and program slots
    pub const SCHEDULE_WRITE: RoleGate = RoleGate::AtLeast(Role::AssistantManager);
    /// Course and instructor membership of a program
    pub const PROGRAM_STAFFING: RoleGate = RoleGate::AtLeast(Role::AssistantManager);
    /// Student enrollment in a program
    pub const PROGRAM_ENROLLMENT: RoleGate = RoleGate::AtLeast(Role::Instructor);
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    const NAMES: [&str; 8] = [
        "STUDENT",
        "INSTRUCTOR",
        "TEACHER",
        "ASSISTANT_MANAGER",
        "MANAGER",
        "ADMIN",
        "janitor",
        "",
    ];

    #[test]
    fn rank_is_unknown_safe() {
        assert_eq!(rank("janitor"), 0);
        assert_eq!(rank(""), 0);
        assert_eq!(rank("admin"), 5);
        assert_eq!(rank("Teacher"), rank("INSTRUCTOR"));
    }

    #[test]
    fn minimum_rank_is_monotone() {
        for name in NAMES {
            for min in Role::ALL {
                assert_eq!(
                    has_minimum_rank(name, min),
                    rank(name) >= min.rank(),
                    "{} vs {}",
                    name,
                    min
                );
            }
        }
    }

    #[test]
    fn unknown_role_fails_every_minimum() {
        for min in Role::ALL {
            assert!(!has_minimum_rank("superuser", min));
        }
    }

    #[test]
    fn allow_set_is_case_insensitive() {
        assert!(is_in_allowed_set("admin", &[Role::Admin]));
        assert!(is_in_allowed_set("teacher", &[Role::Instructor]));
        assert!(!is_in_allowed_set("MANAGER", &[Role::Admin]));
    }

    #[test]
    fn empty_allow_set_denies() {
        for name in NAMES {
            assert!(!is_in_allowed_set(name, &[]));
        }
    }

    #[test]
    fn manager_cannot_delete() {
        // Rank alone would admit a manager; the allow-set does not.
        assert!(RoleGate::AtLeast(Role::Manager).permits("MANAGER"));
        assert!(!gates::IDENTITY_DELETE.permits("MANAGER"));
        assert!(gates::IDENTITY_DELETE.permits("ADMIN"));
    }

    #[test]
    fn check_reports_denial() {
        let actor = Actor::new(Uuid::new_v4(), "STUDENT");
        assert!(gates::PROGRAM_ENROLLMENT.check(&actor).is_err());

        let actor = Actor::new(Uuid::new_v4(), "INSTRUCTOR");
        assert!(gates::PROGRAM_ENROLLMENT.check(&actor).is_ok());
        assert!(gates::PROGRAM_STAFFING.check(&actor).is_err());
    }
}
