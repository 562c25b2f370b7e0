//! File-based session storage.

use super::{SessionStore, StoreKey};
use crate::error::SessionError;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// File permissions for session entries (Unix only): owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Directory permissions (Unix only): owner read/write/execute.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// File-based session storage.
///
/// Stores each session entry as an individual file in a configurable
/// directory. File path: `{dir}/{key name}`.
///
/// # Security
/// - File permissions are set to 0600 (owner read/write only) on Unix
/// - Parent directories are created with 0700 permissions
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    /// Directory where session entries are stored.
    dir: PathBuf,
}

impl FileSessionStore {
    /// Create a new FileSessionStore rooted at the specified directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the directory where entries are stored.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the file path for a specific key.
    fn entry_path(&self, key: StoreKey) -> PathBuf {
        self.dir.join(key.name())
    }

    /// Ensure the storage directory exists with correct permissions.
    fn ensure_dir(&self) -> Result<(), SessionError> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|e| {
                SessionError::Storage(format!(
                    "Failed to create session directory '{}': {}",
                    self.dir.display(),
                    e
                ))
            })?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(DIR_MODE);
                std::fs::set_permissions(&self.dir, perms).map_err(|e| {
                    SessionError::Storage(format!(
                        "Failed to set directory permissions on '{}': {}",
                        self.dir.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    #[instrument(skip(self))]
    fn get(&self, key: StoreKey) -> Result<Option<String>, SessionError> {
        let path = self.entry_path(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SessionError::Storage(format!(
                    "Failed to read session file '{}': {}",
                    path.display(),
                    e
                )));
            }
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(content))
    }

    #[instrument(skip(self, value))]
    fn put(&self, key: StoreKey, value: &str) -> Result<(), SessionError> {
        self.ensure_dir()?;

        let path = self.entry_path(key);

        // Write to temp file first, then rename for atomicity.
        // On Unix, set 0600 permissions at creation time to avoid a window
        // where credentials are readable by other users.
        let temp_path = path.with_extension("tmp");

        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(FILE_MODE)
                .open(&temp_path)
                .map_err(|e| {
                    SessionError::Storage(format!(
                        "Failed to create temp file '{}': {}",
                        temp_path.display(),
                        e
                    ))
                })?;
            file.write_all(value.as_bytes()).map_err(|e| {
                SessionError::Storage(format!(
                    "Failed to write temp file '{}': {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.sync_all().map_err(|e| {
                SessionError::Storage(format!(
                    "Failed to sync temp file '{}': {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        #[cfg(not(unix))]
        {
            std::fs::write(&temp_path, value).map_err(|e| {
                SessionError::Storage(format!(
                    "Failed to write temp file '{}': {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Atomic rename
        if let Err(e) = std::fs::rename(&temp_path, &path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(SessionError::Storage(format!(
                "Failed to rename '{}' to '{}': {}",
                temp_path.display(),
                path.display(),
                e
            )));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    fn remove(&self, key: StoreKey) -> Result<(), SessionError> {
        let path = self.entry_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Storage(format!(
                "Failed to remove session file '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    fn name(&self) -> &str {
        "file"
    }
}
