use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Ranked identity role.
///
/// Ranks are strictly ordered: `Student(1) < Instructor(2) < AssistantManager(3)
/// < Manager(4) < Admin(5)`. The legacy name `TEACHER` parses to `Instructor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub enum Role {
    Student,
    Instructor,
    AssistantManager,
    Manager,
    Admin,
}

impl Role {
    /// All roles, lowest rank first.
    pub const ALL: [Role; 5] = [
        Role::Student,
        Role::Instructor,
        Role::AssistantManager,
        Role::Manager,
        Role::Admin,
    ];

    /// Ordinal rank. Unknown role strings rank 0 (see [`crate::authz::rank`]).
    pub fn rank(self) -> u8 {
        match self {
            Self::Student => 1,
            Self::Instructor => 2,
            Self::AssistantManager => 3,
            Self::Manager => 4,
            Self::Admin => 5,
        }
    }

    /// Canonical storage / wire name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "STUDENT",
            Self::Instructor => "INSTRUCTOR",
            Self::AssistantManager => "ASSISTANT_MANAGER",
            Self::Manager => "MANAGER",
            Self::Admin => "ADMIN",
        }
    }

    /// Parse a role name, case-insensitive, accepting the legacy `TEACHER` alias.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STUDENT" => Some(Self::Student),
            "INSTRUCTOR" | "TEACHER" => Some(Self::Instructor),
            "ASSISTANT_MANAGER" => Some(Self::AssistantManager),
            "MANAGER" => Some(Self::Manager),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }

    /// True when `self` ranks strictly above `other`.
    pub fn outranks(self, other: Role) -> bool {
        self.rank() > other.rank()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::parse(s).ok_or_else(|| UnknownRole(s.to_string()))
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Role::parse(&raw).ok_or_else(|| {
            de::Error::custom(format!(
                "unknown role '{}', expected one of STUDENT, INSTRUCTOR, ASSISTANT_MANAGER, MANAGER, ADMIN",
                raw
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_are_strictly_ordered() {
        for pair in Role::ALL.windows(2) {
            assert!(pair[1].rank() > pair[0].rank());
        }
        assert_eq!(Role::Student.rank(), 1);
        assert_eq!(Role::Admin.rank(), 5);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Role::parse("student"), Some(Role::Student));
        assert_eq!(Role::parse("Assistant_Manager"), Some(Role::AssistantManager));
        assert_eq!(Role::parse(" ADMIN "), Some(Role::Admin));
        assert_eq!(Role::parse("principal"), None);
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn teacher_is_instructor() {
        assert_eq!(Role::parse("TEACHER"), Some(Role::Instructor));
        assert_eq!(Role::parse("teacher").map(Role::rank), Some(2));
    }

    #[test]
    fn serde_uses_canonical_names() {
        let json = serde_json::to_string(&Role::AssistantManager).unwrap();
        assert_eq!(json, "\"ASSISTANT_MANAGER\"");

        let role: Role = serde_json::from_str("\"teacher\"").unwrap();
        assert_eq!(role, Role::Instructor);

        assert!(serde_json::from_str::<Role>("\"janitor\"").is_err());
    }

    #[test]
    fn outranks_is_strict() {
        assert!(Role::Admin.outranks(Role::Manager));
        assert!(!Role::Manager.outranks(Role::Manager));
        assert!(!Role::Student.outranks(Role::Instructor));
    }
}
