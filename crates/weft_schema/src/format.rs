//! String `format` checks.

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

static URI: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:[^\s]+$").ok());

fn is_match(pattern: &Lazy<Option<Regex>>, value: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(value))
}

/// Whether `value` satisfies the named format.
///
/// Unknown formats are annotations only and always pass.
#[must_use]
pub fn matches_format(format: &str, value: &str) -> bool {
    match format {
        "email" => is_match(&EMAIL, value),
        "uri" | "url" => is_match(&URI, value),
        "date-time" => chrono::DateTime::parse_from_rfc3339(value).is_ok(),
        "date" => chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
        "uuid" => uuid::Uuid::parse_str(value).is_ok(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email() {
        assert!(matches_format("email", "test@example.com"));
        assert!(!matches_format("email", "not-an-email"));
        assert!(!matches_format("email", "a b@example.com"));
    }

    #[test]
    fn test_uri() {
        assert!(matches_format("uri", "https://example.com/x"));
        assert!(!matches_format("uri", "example"));
    }

    #[test]
    fn test_date_time_and_date() {
        assert!(matches_format("date-time", "2024-05-01T10:00:00Z"));
        assert!(!matches_format("date-time", "2024-05-01"));
        assert!(matches_format("date", "2024-05-01"));
        assert!(!matches_format("date", "05/01/2024"));
    }

    #[test]
    fn test_uuid_and_unknown() {
        assert!(matches_format("uuid", "67e55044-10b1-426f-9247-bb680e5fe0c8"));
        assert!(!matches_format("uuid", "xyz"));
        assert!(matches_format("made-up-format", "anything"));
    }
}
