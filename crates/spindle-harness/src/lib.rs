//! Process supervision for spool children.
//!
//! Spawns detached child process groups with stdout/stderr redirected into
//! the spool directory, polls them for completion, enforces wall-clock
//! deadlines, and writes terminal state back through the store. The design
//! prefers polling (stdout completion + pid liveness) over `wait()` so that
//! children survive daemon restarts.

pub mod argv;
pub mod finalize;
pub mod monitor;
pub mod proc;
pub mod recover;
pub mod sandbox;
pub mod spawn;

pub use argv::SpawnSpec;
pub use finalize::check_and_finalize;
pub use monitor::{cancel, spawn_monitor};
pub use recover::startup_sweep;
pub use spawn::spawn_detached;
