//! UUID utilities
//!
//! Identifiers are stored as hyphenated TEXT columns.

use crate::{Error, Result};
use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse a UUID read back from a TEXT column
///
/// A malformed value means the row was written by something other than this
/// service, so it is reported as an internal error.
pub fn parse_column(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("malformed uuid in column {}: {}", column, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_column_round_trip() {
        let id = generate();
        assert_eq!(parse_column("id", &id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_parse_column_rejects_garbage() {
        let err = parse_column("owner_id", "not-a-uuid").unwrap_err();
        assert!(err.to_string().contains("owner_id"));
    }
}
