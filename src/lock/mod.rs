//! Pid-file mutual exclusion over a named resource.
//!
//! A resource `path` is locked by creating `path.lock` containing the
//! owner's decimal pid. Creation is atomic: the pid is written to a private
//! temporary file that is then persisted without clobbering, which fails when
//! the lock file already exists. A lock whose owner is no longer alive, or whose content
//! is not a pid, is stale and may be reclaimed by the next acquirer.

pub mod liveness;

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub use self::liveness::{ProcessLiveness, SignalLiveness};
use crate::models::lock::{lock_path_for, LockRecord};
use crate::{AppError, Result};

/// Acquisition behaviour for [`LockManager::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    /// Reclaim the lock when its owner is dead or the file is corrupted.
    pub stale_check: bool,
    /// Additional attempts after the first one fails against a live owner.
    pub retries: u32,
    /// Delay between attempts.
    pub retry_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            stale_check: true,
            retries: 0,
            retry_interval: Duration::from_millis(100),
        }
    }
}

/// Lock manager acting on behalf of one process id.
#[derive(Debug, Clone)]
pub struct LockManager<L = SignalLiveness> {
    liveness: L,
    pid: u32,
}

impl LockManager<SignalLiveness> {
    /// Manager for the current process using the platform liveness probe.
    #[must_use]
    pub fn new() -> Self {
        Self::with_liveness(SignalLiveness)
    }
}

impl Default for LockManager<SignalLiveness> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ProcessLiveness> LockManager<L> {
    /// Manager for the current process with a custom liveness probe.
    pub fn with_liveness(liveness: L) -> Self {
        Self {
            liveness,
            pid: std::process::id(),
        }
    }

    /// Act as a different owner pid.
    #[must_use]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    /// Pid written into lock files created by this manager.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Acquire the lock for `resource`.
    ///
    /// When the lock file already exists and `stale_check` is set, a dead
    /// or unparsable owner is removed and creation is retried once without
    /// a further stale check. Losing that race falls through to the normal
    /// retry path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Locked` once `options.retries` additional attempts
    /// have failed against a live owner, or `AppError::Io` on file-system
    /// failures.
    pub async fn acquire(
        &self,
        resource: impl AsRef<Path>,
        options: &LockOptions,
    ) -> Result<LockGuard> {
        let lock_path = lock_path_for(resource.as_ref());
        let mut attempt = 0u32;

        loop {
            if self.try_create(&lock_path)? {
                return Ok(self.guard(lock_path));
            }

            if options.stale_check
                && self.reclaim_if_stale(&lock_path)?
                && self.try_create(&lock_path)?
            {
                return Ok(self.guard(lock_path));
            }

            if attempt >= options.retries {
                let owner = read_owner(&lock_path)
                    .map_or_else(|| "unknown".to_owned(), |pid| pid.to_string());
                return Err(AppError::Locked(format!(
                    "{} is held by pid {owner}",
                    lock_path.display()
                )));
            }

            attempt += 1;
            debug!(path = %lock_path.display(), attempt, "lock busy, retrying");
            tokio::time::sleep(options.retry_interval).await;
        }
    }

    /// Release the lock for `resource` if this manager's pid owns it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotAcquired` if no lock file exists or it names a
    /// different owner. The file is left untouched in that case.
    pub fn release(&self, resource: impl AsRef<Path>) -> Result<()> {
        release_lock(&lock_path_for(resource.as_ref()), self.pid)
    }

    /// Whether `resource` is currently locked by a live owner.
    ///
    /// Never removes anything; stale and corrupted locks simply report
    /// `false`.
    pub fn is_held(&self, resource: impl AsRef<Path>) -> bool {
        read_owner(&lock_path_for(resource.as_ref()))
            .is_some_and(|pid| self.liveness.is_alive(pid))
    }

    fn guard(&self, lock_path: PathBuf) -> LockGuard {
        info!(
            path = %lock_path.display(),
            pid = self.pid,
            acquired_at = %Utc::now().to_rfc3339(),
            "lock acquired"
        );
        LockGuard {
            lock_path,
            pid: self.pid,
            released: false,
        }
    }

    /// Atomically create the lock file with our pid. `Ok(false)` means it
    /// already exists.
    fn try_create(&self, lock_path: &Path) -> Result<bool> {
        let mut staged = NamedTempFile::new_in(parent_dir(lock_path)).map_err(|err| {
            AppError::Io(format!(
                "failed to create lock staging file for {}: {err}",
                lock_path.display()
            ))
        })?;
        staged
            .write_all(self.pid.to_string().as_bytes())
            .map_err(|err| AppError::Io(format!("failed to write lock staging file: {err}")))?;

        // The staging file is removed on drop, including on the error path.
        match staged.persist_noclobber(lock_path) {
            Ok(_) => Ok(true),
            Err(err) if err.error.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(AppError::Io(format!(
                "failed to create lock file {}: {}",
                lock_path.display(),
                err.error
            ))),
        }
    }

    /// Remove the lock file if its owner is dead or its content corrupted.
    /// Returns `true` when the path is free to be created again.
    fn reclaim_if_stale(&self, lock_path: &Path) -> Result<bool> {
        let content = match fs::read_to_string(lock_path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(true),
            Err(err) => {
                return Err(AppError::Io(format!(
                    "failed to read lock file {}: {err}",
                    lock_path.display()
                )))
            }
        };

        match LockRecord::parse(lock_path, &content) {
            Some(record) if self.liveness.is_alive(record.owner_pid) => Ok(false),
            Some(record) => {
                info!(
                    path = %lock_path.display(),
                    stale_pid = record.owner_pid,
                    "reclaiming stale lock"
                );
                remove_if_unchanged(lock_path, &content)
            }
            None => {
                warn!(path = %lock_path.display(), "reclaiming corrupted lock file");
                remove_if_unchanged(lock_path, &content)
            }
        }
    }
}

/// Release handle returned by [`LockManager::acquire`].
///
/// Dropping an unreleased guard performs the same ownership-checked release.
#[derive(Debug)]
#[must_use = "dropping the guard releases the lock"]
pub struct LockGuard {
    lock_path: PathBuf,
    pid: u32,
    released: bool,
}

impl LockGuard {
    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    /// Owner pid recorded in the lock file.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Release the lock.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotAcquired` if the file vanished or changed owner
    /// since acquisition.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        release_lock(&self.lock_path, self.pid)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = release_lock(&self.lock_path, self.pid) {
            warn!(path = %self.lock_path.display(), %err, "failed to release lock on drop");
        }
    }
}

fn release_lock(lock_path: &Path, pid: u32) -> Result<()> {
    let content = match fs::read_to_string(lock_path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(AppError::NotAcquired(format!(
                "no lock file at {}",
                lock_path.display()
            )))
        }
        Err(err) => {
            return Err(AppError::Io(format!(
                "failed to read lock file {}: {err}",
                lock_path.display()
            )))
        }
    };

    match LockRecord::parse(lock_path, &content) {
        Some(record) if record.owner_pid == pid => {}
        Some(record) => {
            return Err(AppError::NotAcquired(format!(
                "{} is owned by pid {}, not {pid}",
                lock_path.display(),
                record.owner_pid
            )))
        }
        None => {
            return Err(AppError::NotAcquired(format!(
                "{} does not contain a pid",
                lock_path.display()
            )))
        }
    }

    match fs::remove_file(lock_path) {
        Ok(()) => {
            info!(path = %lock_path.display(), pid, "lock released");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Err(AppError::NotAcquired(format!(
            "lock file {} removed concurrently",
            lock_path.display()
        ))),
        Err(err) => Err(AppError::Io(format!(
            "failed to remove lock file {}: {err}",
            lock_path.display()
        ))),
    }
}

/// Owner pid of a lock file, `None` when missing or corrupted.
fn read_owner(lock_path: &Path) -> Option<u32> {
    let content = fs::read_to_string(lock_path).ok()?;
    LockRecord::parse(lock_path, &content).map(|record| record.owner_pid)
}

/// Remove a stale lock file unless a racer already replaced its content.
fn remove_if_unchanged(lock_path: &Path, observed: &str) -> Result<bool> {
    match fs::read_to_string(lock_path) {
        Ok(current) if current == observed => {}
        Ok(_) => return Ok(false),
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(true),
        Err(err) => {
            return Err(AppError::Io(format!(
                "failed to re-read lock file {}: {err}",
                lock_path.display()
            )))
        }
    }

    match fs::remove_file(lock_path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(true),
        Err(err) => Err(AppError::Io(format!(
            "failed to remove stale lock file {}: {err}",
            lock_path.display()
        ))),
    }
}

/// Directory that receives the staging file, so the final link stays on
/// one file system.
fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
