//! Instance slot locking.
//!
//! Each instance id has a lock file under `<base>/locks/` carrying two
//! orthogonal bits of state:
//!
//! - *held*: a process-exclusive advisory lock (flock) on the file.
//!   Serializes setup across cooperating processes; dropped with the
//!   guard or on process exit.
//! - *in-use*: a durable flag stored inside the file, marking that a
//!   device is currently running in the slot. Survives process restarts
//!   and is only ever mutated by the lock holder.
//!
//! Acquisition failure is a normal outcome (`Ok(None)`), not an error:
//! auto-selection probes slots until one is free.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::errors::{CvdResult, LaunchError};
use crate::instance::InstanceId;

/// Marker byte stored in the lock file while a device occupies the slot.
const IN_USE: &[u8] = b"1";

/// Interval between acquisition retries while a deadline is pending.
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Factory for per-instance lock guards.
#[derive(Clone, Debug)]
pub struct InstanceLock {
    lock_dir: PathBuf,
}

impl InstanceLock {
    /// Create the factory, ensuring the lock directory exists.
    pub fn new(lock_dir: &Path) -> CvdResult<Self> {
        std::fs::create_dir_all(lock_dir).map_err(|e| {
            LaunchError::Storage(format!(
                "failed to create lock dir {}: {}",
                lock_dir.display(),
                e
            ))
        })?;
        Ok(Self {
            lock_dir: lock_dir.to_path_buf(),
        })
    }

    fn lock_path(&self, id: InstanceId) -> PathBuf {
        self.lock_dir.join(format!("{}.lock", id.instance_name()))
    }

    /// Try to take the advisory lock for `id` without blocking.
    ///
    /// Returns `Ok(None)` when another process holds it; that is the
    /// expected outcome while scanning for a free slot.
    pub fn try_acquire(&self, id: InstanceId) -> CvdResult<Option<LockGuard>> {
        let path = self.lock_path(id);

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                LaunchError::Storage(format!(
                    "failed to open lock file {}: {}",
                    path.display(),
                    e
                ))
            })?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            let fd = file.as_raw_fd();
            let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
            if result != 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::WouldBlock {
                    tracing::debug!(instance = %id, "slot lock held elsewhere");
                    return Ok(None);
                }
                return Err(LaunchError::Storage(format!(
                    "failed to acquire lock {}: {}",
                    path.display(),
                    err
                )));
            }
        }

        tracing::debug!(lock_path = %path.display(), "acquired instance lock");
        Ok(Some(LockGuard { file, id, path }))
    }

    /// Acquire the lock for `id` only if its persisted in-use bit is
    /// clear, waiting up to `timeout` for the advisory lock itself.
    ///
    /// A slot that is momentarily locked by another process is retried
    /// until the deadline; a slot whose in-use bit is set is skipped
    /// immediately (the occupant is a running device, not a transient
    /// setup).
    pub fn acquire_if_not_in_use(
        &self,
        id: InstanceId,
        timeout: Duration,
    ) -> CvdResult<Option<LockGuard>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(guard) = self.try_acquire(id)? {
                if guard.in_use()? {
                    tracing::debug!(instance = %id, "slot marked in use, skipping");
                    return Ok(None);
                }
                return Ok(Some(guard));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(RETRY_INTERVAL);
        }
    }
}

/// Held advisory lock on one instance slot.
///
/// The in-use flag can only be written through this guard, which makes
/// the "caller must currently hold the lock" precondition a type-level
/// fact rather than a runtime check.
///
/// Dropping the guard releases the advisory lock and leaves the in-use
/// bit intact.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    id: InstanceId,
    path: PathBuf,
}

impl LockGuard {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    #[allow(dead_code)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted in-use flag.
    pub fn in_use(&self) -> CvdResult<bool> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0)).map_err(|e| {
            LaunchError::Storage(format!("failed to seek lock file {}: {}", self.path.display(), e))
        })?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| {
            LaunchError::Storage(format!("failed to read lock file {}: {}", self.path.display(), e))
        })?;
        Ok(contents.trim().as_bytes() == IN_USE)
    }

    /// Write the durable in-use flag.
    pub fn set_in_use(&mut self, in_use: bool) -> CvdResult<()> {
        self.file.set_len(0).map_err(|e| {
            LaunchError::Storage(format!(
                "failed to truncate lock file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        self.file.seek(SeekFrom::Start(0)).map_err(|e| {
            LaunchError::Storage(format!("failed to seek lock file {}: {}", self.path.display(), e))
        })?;
        if in_use {
            self.file.write_all(IN_USE).map_err(|e| {
                LaunchError::Storage(format!(
                    "failed to write lock file {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
        }
        self.file.sync_all().map_err(|e| {
            LaunchError::Storage(format!("failed to sync lock file {}: {}", self.path.display(), e))
        })?;
        tracing::debug!(instance = %self.id, in_use, "updated in-use flag");
        Ok(())
    }

    /// Release the advisory lock explicitly. Equivalent to dropping.
    pub fn release(self) {}
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // The OS releases the lock when the file closes; unlock
        // explicitly for clarity.
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = self.file.as_raw_fd();
            unsafe {
                libc::flock(fd, libc::LOCK_UN);
            }
        }
        tracing::debug!(lock_path = %self.path.display(), "released instance lock");
    }
}
