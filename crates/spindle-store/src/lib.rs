//! Durable spool persistence and advisory locking.
//!
//! One JSON record per spool under the spool directory, plus the transient
//! stdout/stderr/lock siblings the supervisor works with. The directory is
//! the single source of truth: there is no in-memory registry of spools.

pub mod lock;
pub mod store;

pub use lock::{try_reserve_slot_and_create, AdmissionLock, SlotReservation, SpoolLock};
pub use store::SpoolStore;
