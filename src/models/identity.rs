use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{
    Role,
    validators::{HANDLE_REGEX, deserialize_nullable},
};

/// Base identity record, one per person regardless of role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct Identity {
    pub id: Uuid,
    /// Login handle (unique, case-insensitive)
    pub handle: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The subset of an identity needed to verify a login. Never serialized.
#[derive(Debug, Clone)]
pub struct IdentityCredentials {
    pub id: Uuid,
    pub handle: String,
    pub password_hash: String,
    /// Raw stored role string, carried verbatim into issued tokens.
    pub role: String,
    pub is_active: bool,
}

/// Student specialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct StudentProfile {
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    /// Advising instructor (weak reference)
    pub advisor_id: Option<Uuid>,
    pub is_active: bool,
}

/// Instructor specialization: public-facing profile fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct InstructorProfile {
    pub title: Option<String>,
    pub bio: Option<String>,
    pub image_url: Option<String>,
}

/// Assistant manager, manager and admin specializations carry only the mirrored
/// base fields and their own active flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct StaffProfile {
    pub is_active: bool,
}

/// The specialization row for an identity's current role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[serde(tag = "role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Profile {
    Student(StudentProfile),
    Instructor(InstructorProfile),
    AssistantManager(StaffProfile),
    Manager(StaffProfile),
    Admin(StaffProfile),
}

impl Profile {
    pub fn role(&self) -> Role {
        match self {
            Self::Student(_) => Role::Student,
            Self::Instructor(_) => Role::Instructor,
            Self::AssistantManager(_) => Role::AssistantManager,
            Self::Manager(_) => Role::Manager,
            Self::Admin(_) => Role::Admin,
        }
    }
}

/// Identity joined with the specialization of its current role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct IdentityView {
    #[serde(flatten)]
    pub identity: Identity,
    /// `None` only when the row is missing (pre-dating synchronization);
    /// the next update through the synchronizer recreates it.
    pub profile: Option<Profile>,
}

/// Role-specific fields accepted on create and role change.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ProfileFields {
    #[validate(length(min = 1, max = 100))]
    pub father_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub mother_name: Option<String>,
    #[serde(alias = "advisor_teacher_id")]
    pub advisor_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100))]
    pub title: Option<String>,
    #[validate(length(max = 4000))]
    pub bio: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
}

impl ProfileFields {
    /// Names of supplied fields that do not belong to `role`'s specialization.
    pub fn foreign_fields(&self, role: Role) -> Vec<&'static str> {
        let student = [
            ("father_name", self.father_name.is_some()),
            ("mother_name", self.mother_name.is_some()),
            ("advisor_id", self.advisor_id.is_some()),
        ];
        let instructor = [
            ("title", self.title.is_some()),
            ("bio", self.bio.is_some()),
            ("image_url", self.image_url.is_some()),
        ];
        let foreign: Vec<(&'static str, bool)> = match role {
            Role::Student => instructor.to_vec(),
            Role::Instructor => student.to_vec(),
            Role::AssistantManager | Role::Manager | Role::Admin => {
                student.iter().chain(instructor.iter()).copied().collect()
            }
        };
        foreign
            .into_iter()
            .filter_map(|(name, present)| present.then_some(name))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct CreateIdentity {
    #[validate(length(min = 3, max = 64), regex(path = *HANDLE_REGEX))]
    #[serde(alias = "username")]
    pub handle: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub surname: String,
    #[validate(email, length(max = 255))]
    pub email: String,
    pub role: Role,
    #[validate(length(min = 3, max = 32))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub gender: Option<String>,
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    #[validate(nested)]
    pub profile: ProfileFields,
}

/// Self-registration payload. Always creates a STUDENT.
#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct RegisterIdentity {
    #[validate(length(min = 3, max = 64), regex(path = *HANDLE_REGEX))]
    #[serde(alias = "username")]
    pub handle: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub surname: String,
    #[validate(email, length(max = 255))]
    pub email: String,
}

impl From<RegisterIdentity> for CreateIdentity {
    fn from(input: RegisterIdentity) -> Self {
        CreateIdentity {
            handle: input.handle,
            password: input.password,
            name: input.name,
            surname: input.surname,
            email: input.email,
            role: Role::Student,
            phone: None,
            gender: None,
            birth_date: None,
            profile: ProfileFields::default(),
        }
    }
}

/// Partial update of role-specific fields. Absent fields are untouched,
/// explicit nulls clear.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct UpdateProfileFields {
    #[validate(length(min = 1, max = 100))]
    #[serde(default, deserialize_with = "deserialize_nullable")]
    pub father_name: Option<Option<String>>,
    #[validate(length(min = 1, max = 100))]
    #[serde(default, deserialize_with = "deserialize_nullable")]
    pub mother_name: Option<Option<String>>,
    #[serde(
        default,
        alias = "advisor_teacher_id",
        deserialize_with = "deserialize_nullable"
    )]
    pub advisor_id: Option<Option<Uuid>>,
    #[validate(length(min = 1, max = 100))]
    #[serde(default, deserialize_with = "deserialize_nullable")]
    pub title: Option<Option<String>>,
    #[validate(length(max = 4000))]
    #[serde(default, deserialize_with = "deserialize_nullable")]
    pub bio: Option<Option<String>>,
    #[validate(url)]
    #[serde(default, deserialize_with = "deserialize_nullable")]
    pub image_url: Option<Option<String>>,
}

impl UpdateProfileFields {
    /// Names of supplied fields that do not belong to `role`'s specialization.
    pub fn foreign_fields(&self, role: Role) -> Vec<&'static str> {
        // Presence is what matters, so project onto the create-shape check.
        let present = ProfileFields {
            father_name: self.father_name.as_ref().map(|_| String::new()),
            mother_name: self.mother_name.as_ref().map(|_| String::new()),
            advisor_id: self.advisor_id.as_ref().map(|_| Uuid::nil()),
            title: self.title.as_ref().map(|_| String::new()),
            bio: self.bio.as_ref().map(|_| String::new()),
            image_url: self.image_url.as_ref().map(|_| String::new()),
        };
        present.foreign_fields(role)
    }

    pub fn is_empty(&self) -> bool {
        self.father_name.is_none()
            && self.mother_name.is_none()
            && self.advisor_id.is_none()
            && self.title.is_none()
            && self.bio.is_none()
            && self.image_url.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct UpdateIdentity {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub surname: Option<String>,
    #[validate(email, length(max = 255))]
    pub email: Option<String>,
    #[validate(length(min = 3, max = 32))]
    #[serde(default, deserialize_with = "deserialize_nullable")]
    pub phone: Option<Option<String>>,
    #[validate(length(min = 1, max = 32))]
    #[serde(default, deserialize_with = "deserialize_nullable")]
    pub gender: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_nullable")]
    pub birth_date: Option<Option<NaiveDate>>,
    #[serde(default)]
    #[validate(nested)]
    pub profile: UpdateProfileFields,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ChangeRole {
    pub role: Role,
    /// Optional bootstrap values for the new role's specialization
    #[serde(default)]
    #[validate(nested)]
    pub profile: ProfileFields,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct SetActive {
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct Login {
    #[validate(length(min = 1, max = 64))]
    #[serde(alias = "username")]
    pub handle: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Optional narrowing applied on top of the visibility scope when listing.
#[derive(Debug, Clone, Default)]
pub struct IdentityFilter {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

/// Rows removed by a hard delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct IdentityDeletionResult {
    pub instructor_assignments_deleted: u64,
    pub enrollments_deleted: u64,
    pub advisor_links_cleared: u64,
    pub profiles_deleted: u64,
}

/// Result of the stale-specialization maintenance sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct StaleProfilePurge {
    pub profiles_deleted: u64,
}

impl UpdateIdentity {
    /// Apply present fields to `identity`. Returns whether anything changed.
    pub fn apply_to(&self, identity: &mut Identity) -> bool {
        let before = (
            identity.name.clone(),
            identity.surname.clone(),
            identity.email.clone(),
            identity.phone.clone(),
            identity.gender.clone(),
            identity.birth_date,
        );
        if let Some(name) = &self.name {
            identity.name = name.clone();
        }
        if let Some(surname) = &self.surname {
            identity.surname = surname.clone();
        }
        if let Some(email) = &self.email {
            identity.email = email.clone();
        }
        if let Some(phone) = &self.phone {
            identity.phone = phone.clone();
        }
        if let Some(gender) = &self.gender {
            identity.gender = gender.clone();
        }
        if let Some(birth_date) = &self.birth_date {
            identity.birth_date = *birth_date;
        }
        before
            != (
                identity.name.clone(),
                identity.surname.clone(),
                identity.email.clone(),
                identity.phone.clone(),
                identity.gender.clone(),
                identity.birth_date,
            )
    }
}

impl UpdateProfileFields {
    /// Apply present fields to the matching specialization. Fields for other
    /// roles are ignored here; callers reject them up front.
    pub fn apply_to(&self, profile: &mut Profile) {
        match profile {
            Profile::Student(p) => {
                if let Some(v) = &self.father_name {
                    p.father_name = v.clone();
                }
                if let Some(v) = &self.mother_name {
                    p.mother_name = v.clone();
                }
                if let Some(v) = &self.advisor_id {
                    p.advisor_id = *v;
                }
            }
            Profile::Instructor(p) => {
                if let Some(v) = &self.title {
                    p.title = v.clone();
                }
                if let Some(v) = &self.bio {
                    p.bio = v.clone();
                }
                if let Some(v) = &self.image_url {
                    p.image_url = v.clone();
                }
            }
            Profile::AssistantManager(_) | Profile::Manager(_) | Profile::Admin(_) => {}
        }
    }
}

impl Profile {
    /// Fresh specialization for `role`, seeded from creation fields.
    pub fn seed(role: Role, fields: &ProfileFields, is_active: bool) -> Self {
        match role {
            Role::Student => Self::Student(StudentProfile {
                father_name: fields.father_name.clone(),
                mother_name: fields.mother_name.clone(),
                advisor_id: fields.advisor_id,
                is_active,
            }),
            Role::Instructor => Self::Instructor(InstructorProfile {
                title: fields.title.clone(),
                bio: fields.bio.clone(),
                image_url: fields.image_url.clone(),
            }),
            Role::AssistantManager => Self::AssistantManager(StaffProfile { is_active }),
            Role::Manager => Self::Manager(StaffProfile { is_active }),
            Role::Admin => Self::Admin(StaffProfile { is_active }),
        }
    }

    /// Align the specialization's own active flag (where it has one) with the base row.
    pub fn set_active(&mut self, is_active: bool) {
        match self {
            Self::Student(p) => p.is_active = is_active,
            Self::AssistantManager(p) | Self::Manager(p) | Self::Admin(p) => {
                p.is_active = is_active
            }
            Self::Instructor(_) => {}
        }
    }
}

impl From<&ProfileFields> for UpdateProfileFields {
    /// Supplied creation fields become "set" operations; absent ones stay untouched.
    fn from(fields: &ProfileFields) -> Self {
        UpdateProfileFields {
            father_name: fields.father_name.clone().map(Some),
            mother_name: fields.mother_name.clone().map(Some),
            advisor_id: fields.advisor_id.map(Some),
            title: fields.title.clone().map(Some),
            bio: fields.bio.clone().map(Some),
            image_url: fields.image_url.clone().map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_apply_clears_and_sets() {
        let now = chrono::Utc::now();
        let mut identity = Identity {
            id: Uuid::new_v4(),
            handle: "bob".into(),
            name: "Bob".into(),
            surname: "Stone".into(),
            email: "bob@example.com".into(),
            role: Role::Instructor,
            is_active: true,
            phone: Some("555-0100".into()),
            gender: None,
            birth_date: None,
            created_at: now,
            updated_at: now,
        };
        let patch: UpdateIdentity =
            serde_json::from_str(r#"{"name": "Robert", "phone": null}"#).unwrap();
        assert!(patch.apply_to(&mut identity));
        assert_eq!(identity.name, "Robert");
        assert_eq!(identity.surname, "Stone");
        assert_eq!(identity.phone, None);

        assert!(!UpdateIdentity::default().apply_to(&mut identity));
    }

    #[test]
    fn profile_patch_applies_only_own_fields() {
        let mut profile = Profile::seed(Role::Student, &ProfileFields::default(), true);
        let advisor = Uuid::new_v4();
        let patch = UpdateProfileFields {
            father_name: Some(Some("Omar".into())),
            advisor_id: Some(Some(advisor)),
            ..Default::default()
        };
        patch.apply_to(&mut profile);
        match profile {
            Profile::Student(p) => {
                assert_eq!(p.father_name.as_deref(), Some("Omar"));
                assert_eq!(p.advisor_id, Some(advisor));
                assert!(p.is_active);
            }
            other => panic!("unexpected profile {:?}", other),
        }
    }

    #[test]
    fn foreign_fields_for_student() {
        let fields = ProfileFields {
            father_name: Some("Ali".into()),
            title: Some("Dr.".into()),
            ..Default::default()
        };
        assert_eq!(fields.foreign_fields(Role::Student), vec!["title"]);
        assert_eq!(fields.foreign_fields(Role::Instructor), vec!["father_name"]);
        assert_eq!(
            fields.foreign_fields(Role::Manager),
            vec!["father_name", "title"]
        );
    }

    #[test]
    fn empty_fields_fit_every_role() {
        let fields = ProfileFields::default();
        for role in Role::ALL {
            assert!(fields.foreign_fields(role).is_empty());
        }
    }

    #[test]
    fn update_foreign_fields_counts_explicit_null() {
        let patch: UpdateProfileFields = serde_json::from_str(r#"{"bio": null}"#).unwrap();
        assert_eq!(patch.foreign_fields(Role::Student), vec!["bio"]);
        assert!(patch.foreign_fields(Role::Instructor).is_empty());
        assert!(!patch.is_empty());
    }

    #[test]
    fn legacy_advisor_alias() {
        let id = Uuid::new_v4();
        let json = format!(r#"{{"advisor_teacher_id": "{}"}}"#, id);
        let fields: ProfileFields = serde_json::from_str(&json).unwrap();
        assert_eq!(fields.advisor_id, Some(id));
    }

    #[test]
    fn create_identity_validation() {
        let mut input = CreateIdentity {
            handle: "alice".into(),
            password: "correct horse".into(),
            name: "Alice".into(),
            surname: "Liddell".into(),
            email: "alice@example.com".into(),
            role: Role::Student,
            phone: None,
            gender: None,
            birth_date: None,
            profile: ProfileFields::default(),
        };
        assert!(input.validate().is_ok());

        input.handle = "a b".into();
        assert!(input.validate().is_err());

        input.handle = "alice".into();
        input.email = "not-an-email".into();
        assert!(input.validate().is_err());
    }

    #[test]
    fn profile_serializes_with_role_tag() {
        let profile = Profile::Instructor(InstructorProfile {
            title: Some("Professor".into()),
            bio: None,
            image_url: None,
        });
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["role"], "INSTRUCTOR");
        assert_eq!(json["title"], "Professor");
        assert_eq!(profile.role(), Role::Instructor);
    }
}
