//! Advisory file locks for finalization and admission.
//!
//! Two kinds, both `flock(2)` on dedicated files in the spool directory:
//!
//! - the per-spool lock (`<id>.lock`) serializes finalization and is only
//!   ever taken non-blocking: a contended finalizer yields, the holder will
//!   complete the work;
//! - the global admission lock (`.concurrency.lock`) is held blocking across
//!   the whole count-then-create sequence and is the sole mechanism bounding
//!   concurrency.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use spindle_core::{SpindleError, Spool};

use crate::store::SpoolStore;

/// Guard holding a per-spool finalization lock. Releases `flock` on drop.
pub struct SpoolLock {
    file: File,
    path: PathBuf,
    released: bool,
}

impl std::fmt::Debug for SpoolLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpoolLock").field("path", &self.path).finish()
    }
}

impl Drop for SpoolLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let fd = self.file.as_raw_fd();
        // SAFETY: `fd` is a valid file descriptor owned by `self.file`.
        // `LOCK_UN` releases the advisory lock; if it fails the lock is
        // released when the fd is closed moments later.
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
        self.released = true;
    }
}

impl SpoolLock {
    /// Try to take the finalization lock for a spool, non-blocking.
    ///
    /// Returns `None` when another finalizer holds it.
    pub fn try_acquire(store: &SpoolStore, id: &str) -> Result<Option<Self>> {
        fs::create_dir_all(store.root())
            .with_context(|| format!("Failed to create spool dir: {}", store.root().display()))?;
        let path = store.lock_path(id);
        let file = open_lock_file(&path)?;

        let fd = file.as_raw_fd();
        // SAFETY: `fd` is a valid descriptor from the `File` we just opened.
        // `LOCK_EX | LOCK_NB` requests an exclusive non-blocking lock.
        let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if ret != 0 {
            return Ok(None);
        }

        Ok(Some(Self {
            file,
            path,
            released: false,
        }))
    }
}

/// Guard holding the global admission lock. Releases `flock` on drop.
pub struct AdmissionLock {
    file: File,
    released: bool,
}

impl Drop for AdmissionLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let fd = self.file.as_raw_fd();
        // SAFETY: fd is valid; LOCK_UN releases.
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
        self.released = true;
    }
}

impl AdmissionLock {
    /// Take the admission lock, blocking until it is free.
    ///
    /// Admission is a few reads and one write, so contention windows are
    /// short; a blocking wait keeps the reservation contract simple.
    pub fn acquire(store: &SpoolStore) -> Result<Self> {
        fs::create_dir_all(store.root())
            .with_context(|| format!("Failed to create spool dir: {}", store.root().display()))?;
        let file = open_lock_file(&store.concurrency_lock_path())?;

        let fd = file.as_raw_fd();
        // SAFETY: fd is valid; LOCK_EX blocks until the lock is granted.
        let ret = unsafe { libc::flock(fd, libc::LOCK_EX) };
        if ret != 0 {
            anyhow::bail!(
                "failed to acquire admission lock: {}",
                std::io::Error::last_os_error()
            );
        }

        Ok(Self {
            file,
            released: false,
        })
    }
}

/// Outcome of a slot reservation attempt.
#[derive(Debug)]
pub enum SlotReservation {
    /// Slot reserved, stub record persisted.
    Reserved,
    /// At the cap; nothing was written.
    Rejected(SpindleError),
}

/// Reserve a concurrency slot and persist the stub record, atomically.
///
/// Counts `pending` as well as `running`: a record created but not yet
/// pid-stamped still occupies a slot. This is the only code path allowed to
/// create an active record.
pub fn try_reserve_slot_and_create(
    store: &SpoolStore,
    spool: &Spool,
    max_concurrent: usize,
) -> Result<SlotReservation> {
    debug_assert!(spool.status.is_active());

    let _guard = AdmissionLock::acquire(store)?;

    if store.count_active() >= max_concurrent {
        return Ok(SlotReservation::Rejected(SpindleError::SlotLimit {
            max: max_concurrent,
        }));
    }

    store.write(spool)?;
    Ok(SlotReservation::Reserved)
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file: {}", path.display()))
}
