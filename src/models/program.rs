use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::validators::{CLOCK_TIME_REGEX, validate_time_range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
            Self::Sunday => "sunday",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "monday" => Some(Self::Monday),
            "tuesday" => Some(Self::Tuesday),
            "wednesday" => Some(Self::Wednesday),
            "thursday" => Some(Self::Thursday),
            "friday" => Some(Self::Friday),
            "saturday" => Some(Self::Saturday),
            "sunday" => Some(Self::Sunday),
            _ => None,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A scheduled course-program slot.
///
/// The `course_*` and `term_name` columns are denormalized copies maintained by
/// the storage layer whenever the course assignment, slot time or term changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct Program {
    pub id: Uuid,
    pub term_id: Uuid,
    pub day_of_week: DayOfWeek,
    /// "HH:MM"
    pub start_time: String,
    /// "HH:MM"
    pub stop_time: String,
    pub course_id: Option<Uuid>,
    pub course_name: Option<String>,
    pub course_day: String,
    /// "HH:MM-HH:MM"
    pub course_time: String,
    pub term_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[validate(schema(function = "validate_create_program"))]
pub struct CreateProgram {
    pub term_id: Uuid,
    pub day_of_week: DayOfWeek,
    #[validate(regex(path = *CLOCK_TIME_REGEX))]
    pub start_time: String,
    #[validate(regex(path = *CLOCK_TIME_REGEX))]
    pub stop_time: String,
    /// Optional initial course
    #[serde(default, alias = "lesson_id")]
    pub course_id: Option<Uuid>,
}

fn validate_create_program(input: &CreateProgram) -> Result<(), ValidationError> {
    validate_time_range(&input.start_time, &input.stop_time)
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct UpdateProgram {
    pub term_id: Option<Uuid>,
    pub day_of_week: Option<DayOfWeek>,
    #[validate(regex(path = *CLOCK_TIME_REGEX))]
    pub start_time: Option<String>,
    #[validate(regex(path = *CLOCK_TIME_REGEX))]
    pub stop_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct AssignCourse {
    #[serde(alias = "lesson_id")]
    pub course_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct AssignInstructor {
    #[serde(alias = "teacher_id")]
    pub instructor_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct EnrollStudent {
    pub student_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct BulkEnroll {
    #[validate(length(min = 1, max = 500))]
    pub student_ids: Vec<Uuid>,
}

/// A row in one of the program association sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ProgramMembership {
    pub program_id: Uuid,
    pub identity_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Outcome of an idempotent membership assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum MembershipOutcome {
    Created(ProgramMembership),
    AlreadyPresent(ProgramMembership),
}

impl MembershipOutcome {
    pub fn membership(&self) -> &ProgramMembership {
        match self {
            Self::Created(m) | Self::AlreadyPresent(m) => m,
        }
    }

    pub fn into_membership(self) -> ProgramMembership {
        match self {
            Self::Created(m) | Self::AlreadyPresent(m) => m,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct BulkEnrollFailure {
    pub student_id: Uuid,
    pub reason: String,
}

/// Partial-success result of enrolling a batch of students.
#[derive(Debug, Clone, Default, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct BulkEnrollResult {
    /// Newly created enrollments
    pub enrolled: usize,
    /// Students that were already enrolled (no-op)
    pub already_enrolled: usize,
    pub created: Vec<ProgramMembership>,
    pub failures: Vec<BulkEnrollFailure>,
}

/// Identity summary as listed on a program roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct RosterEntry {
    pub identity_id: Uuid,
    pub handle: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub is_active: bool,
    pub assigned_at: DateTime<Utc>,
}
