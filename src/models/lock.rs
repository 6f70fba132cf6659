//! On-disk lock record.

use std::path::{Path, PathBuf};

/// Suffix appended to a resource path to form its lock file.
pub const LOCK_SUFFIX: &str = ".lock";

/// Lock file location and the pid it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Path of the lock file itself (`<resource>.lock`).
    pub path: PathBuf,
    /// Process id of the owner.
    pub owner_pid: u32,
}

impl LockRecord {
    /// Parse lock file content. Returns `None` for anything but a decimal pid.
    #[must_use]
    pub fn parse(path: &Path, content: &str) -> Option<Self> {
        let owner_pid = content.trim().parse::<u32>().ok()?;
        Some(Self {
            path: path.to_path_buf(),
            owner_pid,
        })
    }
}

/// Lock file path for a resource path.
#[must_use]
pub fn lock_path_for(resource: &Path) -> PathBuf {
    let mut raw = resource.as_os_str().to_owned();
    raw.push(LOCK_SUFFIX);
    PathBuf::from(raw)
}
