//! Core types used throughout the system
//!
//! Identifiers and timestamps shared by every table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Record ID - opaque, globally unique, immutable after assignment.
///
/// # Format:
/// ULID text (26 chars). Rows persisted by older builds may carry any other
/// string, so parsing never validates the shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// User ID - primary key of the `users` table
pub type UserId = RecordId;

/// Epoch milliseconds, the persisted time format of every table
pub type Timestamp = i64;

/// Chip quantity held by an account
pub type Chips = u64;

/// Current wall-clock time in epoch milliseconds
#[inline]
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = RecordId::generate();
        let b = RecordId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 26);
    }

    #[test]
    fn test_record_id_serializes_as_plain_string() {
        let id = RecordId::from("id_legacy");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"id_legacy\"");
        let back: RecordId = serde_json::from_str("\"id_legacy\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_blank_id() {
        assert!(RecordId::from("  ").is_blank());
        assert!(!RecordId::from("x").is_blank());
    }
}
