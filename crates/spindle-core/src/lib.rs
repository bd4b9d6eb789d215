//! Shared types for the spindle delegation daemon.
//!
//! Everything that crosses a crate boundary lives here: the persisted
//! [`Spool`](types::Spool) record, the permission profile table, the
//! duration parser and the caller-visible error taxonomy.

pub mod duration;
pub mod error;
pub mod permission;
pub mod types;

pub use error::SpindleError;
pub use types::{Harness, ShardInfo, Spool, SpoolStatus};

/// Generate a fresh 8-character spool identifier.
///
/// Uses the random tail of a ULID, lowercased. Short enough to type,
/// unique enough for a single host's spool directory.
pub fn new_spool_id() -> String {
    let ulid = ulid::Ulid::new().to_string();
    ulid[ulid.len() - 8..].to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spool_ids_are_eight_chars() {
        let id = new_spool_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(id, id.to_ascii_lowercase());
    }

    #[test]
    fn spool_ids_are_unique() {
        let a = new_spool_id();
        let b = new_spool_id();
        assert_ne!(a, b);
    }
}
