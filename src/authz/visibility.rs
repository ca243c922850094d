//! Role-conditioned read predicates over the identity space.
//!
//! The same [`VisibilityScope`] backs both listing (as a SQL predicate) and
//! single-record reads (via [`VisibilityScope::permits`]), so the two can never
//! disagree about what an actor may see.

use uuid::Uuid;

use crate::{auth::Actor, models::Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityScope {
    /// Roles visible to the actor
    roles: &'static [Role],
    /// The actor's own id, visible regardless of `roles`
    own_id: Option<Uuid>,
    /// Roles never visible, even for the actor's own record
    excluded: &'static [Role],
}

impl VisibilityScope {
    pub fn for_actor(actor: &Actor) -> Self {
        let own_id = Some(actor.id);
        match actor.role {
            Some(Role::Admin) => Self {
                roles: &Role::ALL,
                own_id: None,
                excluded: &[],
            },
            Some(Role::Manager) => Self {
                roles: &[
                    Role::Student,
                    Role::Instructor,
                    Role::AssistantManager,
                    Role::Manager,
                ],
                own_id,
                excluded: &[Role::Admin],
            },
            Some(Role::AssistantManager) => Self {
                roles: &[Role::Student, Role::Instructor],
                own_id,
                excluded: &[Role::Admin, Role::Manager],
            },
            Some(Role::Instructor) => Self {
                roles: &[Role::Student],
                own_id,
                excluded: &[],
            },
            Some(Role::Student) | None => Self {
                roles: &[],
                own_id,
                excluded: &[],
            },
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.own_id.is_none() && self.excluded.is_empty() && self.roles.len() == Role::ALL.len()
    }

    /// Whether an identity with `id` and `role` is visible.
    pub fn permits(&self, id: Uuid, role: Role) -> bool {
        if self.excluded.contains(&role) {
            return false;
        }
        self.roles.contains(&role) || self.own_id == Some(id)
    }

    /// The actor id the predicate binds, if any.
    pub fn own_id(&self) -> Option<Uuid> {
        self.own_id
    }

    /// SQL predicate over the `id` and `role` columns of `identities`.
    ///
    /// `own_id_placeholder` is the backend's parameter marker for [`Self::own_id`]
    /// (`?` for SQLite, `$n` for Postgres); it is only emitted when `own_id` is set.
    /// Role names come from [`Role::as_str`] and are never caller input.
    pub fn sql_predicate(&self, own_id_placeholder: &str) -> String {
        if self.is_unrestricted() {
            return "1 = 1".to_string();
        }

        let mut included = Vec::new();
        if !self.roles.is_empty() {
            included.push(format!("role IN ({})", role_list(self.roles)));
        }
        if self.own_id.is_some() {
            included.push(format!("id = {}", own_id_placeholder));
        }
        let included = if included.is_empty() {
            "1 = 0".to_string()
        } else {
            included.join(" OR ")
        };

        if self.excluded.is_empty() {
            format!("({})", included)
        } else {
            format!(
                "({}) AND role NOT IN ({})",
                included,
                role_list(self.excluded)
            )
        }
    }
}

fn role_list(roles: &[Role]) -> String {
    roles
        .iter()
        .map(|r| format!("'{}'", r.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: &str) -> Actor {
        Actor::new(Uuid::new_v4(), role)
    }

    #[test]
    fn admin_sees_everything() {
        let scope = VisibilityScope::for_actor(&actor("ADMIN"));
        assert!(scope.is_unrestricted());
        for role in Role::ALL {
            assert!(scope.permits(Uuid::new_v4(), role));
        }
        assert_eq!(scope.sql_predicate("?"), "1 = 1");
    }

    #[test]
    fn only_admin_sees_admins() {
        for name in ["MANAGER", "ASSISTANT_MANAGER", "INSTRUCTOR", "STUDENT", "bogus"] {
            let scope = VisibilityScope::for_actor(&actor(name));
            assert!(!scope.permits(Uuid::new_v4(), Role::Admin), "{}", name);
        }
    }

    #[test]
    fn manager_sees_all_but_admins() {
        let scope = VisibilityScope::for_actor(&actor("MANAGER"));
        assert!(scope.permits(Uuid::new_v4(), Role::Manager));
        assert!(scope.permits(Uuid::new_v4(), Role::Student));
        assert!(!scope.permits(Uuid::new_v4(), Role::Admin));
    }

    #[test]
    fn assistant_manager_sees_instructors_students_and_self() {
        let me = actor("ASSISTANT_MANAGER");
        let scope = VisibilityScope::for_actor(&me);
        assert!(scope.permits(Uuid::new_v4(), Role::Instructor));
        assert!(scope.permits(Uuid::new_v4(), Role::Student));
        assert!(scope.permits(me.id, Role::AssistantManager));
        assert!(!scope.permits(Uuid::new_v4(), Role::AssistantManager));
        assert!(!scope.permits(Uuid::new_v4(), Role::Manager));
        // Exclusion wins even for the actor's own id
        assert!(!scope.permits(me.id, Role::Manager));
    }

    #[test]
    fn instructor_sees_all_students_and_self() {
        let me = actor("INSTRUCTOR");
        let scope = VisibilityScope::for_actor(&me);
        assert!(scope.permits(Uuid::new_v4(), Role::Student));
        assert!(scope.permits(me.id, Role::Instructor));
        assert!(!scope.permits(Uuid::new_v4(), Role::Instructor));
    }

    #[test]
    fn student_and_unknown_see_only_self() {
        for name in ["STUDENT", "janitor"] {
            let me = actor(name);
            let scope = VisibilityScope::for_actor(&me);
            assert!(scope.permits(me.id, Role::Student));
            assert!(!scope.permits(Uuid::new_v4(), Role::Student));
            assert_eq!(scope.sql_predicate("$1"), "(id = $1)");
        }
    }

    #[test]
    fn predicate_shape() {
        let scope = VisibilityScope::for_actor(&actor("ASSISTANT_MANAGER"));
        assert_eq!(
            scope.sql_predicate("?"),
            "(role IN ('STUDENT', 'INSTRUCTOR') OR id = ?) AND role NOT IN ('ADMIN', 'MANAGER')"
        );
    }
}
