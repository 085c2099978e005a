//! Prefixed identifiers
//!
//! Ids look like `<prefix>:<uuid v4>`. Books use [`BOOK_ID_PREFIX`], requests
//! use [`REQUEST_ID_PREFIX`].

use uuid::Uuid;

/// Prefix of book ids
pub const BOOK_ID_PREFIX: &str = "b";

/// Prefix of request ids
pub const REQUEST_ID_PREFIX: &str = "r";

/// Generates and checks prefixed ids
pub trait IdGenerator: Send + Sync {
    /// Produce a fresh id carrying `prefix`
    fn generate(&self, prefix: &str) -> String;

    /// Check that `id` carries `prefix` followed by a well-formed id
    fn is_valid(&self, id: &str, prefix: &str) -> bool;
}

/// UUID v4 backed generator
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self, prefix: &str) -> String {
        format!("{}:{}", prefix, Uuid::new_v4())
    }

    fn is_valid(&self, id: &str, prefix: &str) -> bool {
        let Some(rest) = id
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix(':'))
        else {
            return false;
        };
        matches!(Uuid::parse_str(rest), Ok(uuid) if !uuid.is_nil())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_carries_prefix() {
        let ids = UuidGenerator;
        let id = ids.generate(BOOK_ID_PREFIX);
        assert!(id.starts_with("b:"));
        assert!(ids.is_valid(&id, BOOK_ID_PREFIX));
    }

    #[test]
    fn test_wrong_prefix_rejected() {
        let ids = UuidGenerator;
        let id = ids.generate(REQUEST_ID_PREFIX);
        assert!(!ids.is_valid(&id, BOOK_ID_PREFIX));
    }

    #[test]
    fn test_malformed_ids_rejected() {
        let ids = UuidGenerator;
        assert!(!ids.is_valid("b:not-a-uuid", BOOK_ID_PREFIX));
        assert!(!ids.is_valid("b:00000000-0000-0000-0000-000000000000", BOOK_ID_PREFIX));
        assert!(!ids.is_valid("", BOOK_ID_PREFIX));
        assert!(!ids.is_valid("b", BOOK_ID_PREFIX));
    }
}
