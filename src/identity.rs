//! Durable devhook identifier.
//!
//! A random identifier created on first access under the data directory and
//! reused by every later call, across processes and restarts.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::info;
use uuid::Uuid;

use crate::{AppError, Result};

/// File name of the identifier inside the data directory.
pub const DEVHOOK_ID_FILE: &str = "devhook-id";

/// Path of the identifier file for `data_dir`.
#[must_use]
pub fn devhook_id_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DEVHOOK_ID_FILE)
}

/// Return the devhook identifier, creating it on first use.
///
/// The identifier is written to a temporary file and persisted without
/// clobbering, so concurrent first callers agree on whichever file landed
/// first and no reader ever sees a half-written file.
///
/// # Errors
///
/// Returns `AppError::Io` if the directory or file cannot be created or
/// read, or if an existing file is empty.
pub fn load_or_create_devhook_id(data_dir: &Path) -> Result<String> {
    let path = devhook_id_path(data_dir);
    if let Some(id) = read_id(&path)? {
        return Ok(id);
    }

    fs::create_dir_all(data_dir).map_err(|err| {
        AppError::Io(format!(
            "failed to create data dir {}: {err}",
            data_dir.display()
        ))
    })?;

    let id = Uuid::new_v4().to_string();
    let mut staged = NamedTempFile::new_in(data_dir)
        .map_err(|err| AppError::Io(format!("failed to create temporary id file: {err}")))?;
    staged
        .write_all(id.as_bytes())
        .map_err(|err| AppError::Io(format!("failed to write temporary id file: {err}")))?;

    match staged.persist_noclobber(&path) {
        Ok(_) => {
            info!(path = %path.display(), "created devhook identifier");
            Ok(id)
        }
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => read_id(&path)?.ok_or_else(|| {
            AppError::Io(format!("{} vanished after creation", path.display()))
        }),
        Err(err) => Err(AppError::Io(format!(
            "failed to create {}: {}",
            path.display(),
            err.error
        ))),
    }
}

fn read_id(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(raw) => {
            let id = raw.trim();
            if id.is_empty() {
                Err(AppError::Io(format!("{} is empty", path.display())))
            } else {
                Ok(Some(id.to_owned()))
            }
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(AppError::Io(format!(
            "failed to read {}: {err}",
            path.display()
        ))),
    }
}
