//! Read-side projections over the spool store.
//!
//! Everything here is pure observation: no record is mutated, no child is
//! touched. Unparseable records were already skipped by the store's list.

pub mod dashboard;
pub mod export;
pub mod inspect;
pub mod list;
pub mod search;

pub use dashboard::dashboard;
pub use export::export;
pub use inspect::{info, peek};
pub use list::{results, spools_projection, stats};
pub use search::{grep, search};

/// Truncate to at most `limit` characters (not bytes).
pub(crate) fn truncate_chars(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}
