use std::{borrow::Cow, sync::LazyLock};

use regex::Regex;
use validator::ValidationError;

/// Login handles: letters, digits, dot, dash, underscore. Must start alphanumeric.
/// Examples: "alice", "j.doe", "bob_2"
pub static HANDLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap());

/// 24-hour wall clock time, zero padded ("08:30", "17:05").
pub static CLOCK_TIME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[01][0-9]|2[0-3]):[0-5][0-9]$").unwrap());

/// Course codes such as "MATH-101" or "CS50".
pub static COURSE_CODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+(?:[-_][A-Za-z0-9]+)*$").unwrap());

/// Validate that a slot ends after it starts.
///
/// Both values are expected to already match [`CLOCK_TIME_REGEX`]; zero padding
/// makes lexical comparison equivalent to chronological comparison.
pub fn validate_time_range(start: &str, stop: &str) -> Result<(), ValidationError> {
    if stop <= start {
        let mut err = ValidationError::new("invalid_time_range");
        err.message = Some(Cow::Borrowed("stop_time must be later than start_time"));
        return Err(err);
    }
    Ok(())
}

/// Validate that a date range is not inverted.
pub fn validate_date_range(
    start: chrono::NaiveDate,
    end: chrono::NaiveDate,
) -> Result<(), ValidationError> {
    if end < start {
        let mut err = ValidationError::new("invalid_date_range");
        err.message = Some(Cow::Borrowed("end_date must not be before start_date"));
        return Err(err);
    }
    Ok(())
}

/// Deserialize a field that distinguishes "absent" from "explicit null".
///
/// - Field not present in JSON -> `None` (leave untouched)
/// - Field present as `null` -> `Some(None)` (clear)
/// - Field present with a value -> `Some(Some(value))`
pub fn deserialize_nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    use serde::Deserialize;
    Ok(Some(Option::<T>::deserialize(deserializer)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_regex() {
        assert!(HANDLE_REGEX.is_match("alice"));
        assert!(HANDLE_REGEX.is_match("j.doe_2"));
        assert!(!HANDLE_REGEX.is_match(".alice"));
        assert!(!HANDLE_REGEX.is_match("al ice"));
        assert!(!HANDLE_REGEX.is_match(""));
    }

    #[test]
    fn clock_time_regex() {
        assert!(CLOCK_TIME_REGEX.is_match("00:00"));
        assert!(CLOCK_TIME_REGEX.is_match("23:59"));
        assert!(!CLOCK_TIME_REGEX.is_match("24:00"));
        assert!(!CLOCK_TIME_REGEX.is_match("9:30"));
        assert!(!CLOCK_TIME_REGEX.is_match("09:60"));
    }

    #[test]
    fn time_range() {
        assert!(validate_time_range("09:00", "10:30").is_ok());
        assert!(validate_time_range("09:00", "09:00").is_err());
        assert!(validate_time_range("14:00", "09:00").is_err());
    }

    #[test]
    fn date_range() {
        let d = |s: &str| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        assert!(validate_date_range(d("2025-09-01"), d("2026-01-31")).is_ok());
        assert!(validate_date_range(d("2025-09-01"), d("2025-09-01")).is_ok());
        assert!(validate_date_range(d("2025-09-01"), d("2025-08-31")).is_err());
    }

    #[test]
    fn nullable_distinguishes_absent_and_null() {
        #[derive(serde::Deserialize)]
        struct Patch {
            #[serde(default, deserialize_with = "deserialize_nullable")]
            phone: Option<Option<String>>,
        }

        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.phone, None);
        let null: Patch = serde_json::from_str(r#"{"phone":null}"#).unwrap();
        assert_eq!(null.phone, Some(None));
        let set: Patch = serde_json::from_str(r#"{"phone":"555"}"#).unwrap();
        assert_eq!(set.phone, Some(Some("555".to_string())));
    }
}
