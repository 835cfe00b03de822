//! Record identifiers
//!
//! A record id doubles as the cache key in every group, so it is kept to
//! lowercase ASCII letters and digits.

use std::fmt;

/// Validated record identifier (`[0-9a-z]+`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    /// Create an id, panicking if it is malformed.
    ///
    /// Passing an invalid id is a caller bug, not a runtime condition.
    /// Use [`RecordId::parse`] for input that has not been checked yet.
    pub fn new(id: &str) -> Self {
        assert!(
            Self::is_valid(id),
            "invalid record id {:?}: must be non-empty and match [0-9a-z]+",
            id
        );
        RecordId(id.to_string())
    }

    /// Create an id if `id` is well-formed
    pub fn parse(id: &str) -> Option<Self> {
        Self::is_valid(id).then(|| RecordId(id.to_string()))
    }

    /// Whether `id` is non-empty and only lowercase letters and digits
    pub fn is_valid(id: &str) -> bool {
        !id.is_empty()
            && id
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        assert!(RecordId::is_valid("sess01"));
        assert!(RecordId::is_valid("0"));
        assert_eq!(RecordId::new("abc123").as_str(), "abc123");
        assert_eq!(RecordId::parse("x9").unwrap().to_string(), "x9");
    }

    #[test]
    fn test_invalid_ids() {
        for id in ["", "Sess01", "sess-01", "sess 01", "sess_01", "séss"] {
            assert!(!RecordId::is_valid(id), "{:?} should be rejected", id);
            assert!(RecordId::parse(id).is_none());
        }
    }

    #[test]
    #[should_panic(expected = "invalid record id")]
    fn test_new_panics_on_uppercase() {
        RecordId::new("ABC");
    }
}
