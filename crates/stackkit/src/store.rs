//! State persistence with advisory file locking.
//!
//! The store reads and writes the state blob as pretty-printed JSON and
//! serializes access across cooperating processes with a sibling
//! `<state>.lock` file. The lock is advisory only: presence denotes the
//! lock, the pid and timestamp inside are informational, and a stale lock
//! left by a crashed process must be removed manually.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use crate::codec::TypeRegistry;
use crate::error::Result;
use crate::state::StackState;

/// Prefix routing a state path to the nearest package root.
pub const STATE_PATH_PREFIX: &str = ".drft/";

const LOCK_ATTEMPTS: u32 = 10;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Errors from loading, saving or locking the state blob.
#[derive(Error, Debug)]
pub enum StateError {
    /// State file exists but cannot be read
    #[error("failed to read state file {path}: {source}")]
    Read {
        /// Path of the state file
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// State file is not valid JSON
    #[error("state file {path} is malformed: {source}")]
    Parse {
        /// Path of the state file
        path: PathBuf,
        /// Underlying parse error
        #[source]
        source: serde_json::Error,
    },

    /// Parent directories could not be created
    #[error("failed to create state directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// State file could not be written
    #[error("failed to write state file {path}: {source}")]
    Write {
        /// Path of the state file
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// The lock file could not be created for a reason other than it
    /// already existing
    #[error("failed to write lock file {path}: {source}")]
    LockWrite {
        /// Path of the lock file
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// The lock was still held after every retry
    #[error("could not acquire state lock {path} after {attempts} attempts")]
    LockTimeout {
        /// Path of the lock file
        path: PathBuf,
        /// Number of acquisition attempts made
        attempts: u32,
    },
}

/// Guard over the advisory lock file; releasing is best-effort.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    /// Remove the lock file. Dropping the guard does the same.
    pub fn unlock(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("failed to remove lock file {}: {e}", self.path.display());
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Persistence layer for a stack's actual state.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store backed by the given path.
    ///
    /// Paths beginning with `.drft/` resolve against the nearest ancestor
    /// directory containing a package manifest (`Cargo.toml`); other
    /// relative paths resolve against the current working directory, and
    /// absolute paths are used verbatim.
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            path: resolve_state_path(path.as_ref()),
        }
    }

    /// Store backed by an exact path, without resolution.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolved path of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state, or an empty state when the file does not
    /// exist. A malformed file is a hard error.
    pub fn load(&self, registry: &TypeRegistry) -> Result<StackState> {
        if !self.path.exists() {
            log::debug!("state file {} does not exist, using empty state", self.path.display());
            return Ok(StackState::empty());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| StateError::Read {
            path: self.path.clone(),
            source: e,
        })?;
        let value = serde_json::from_str(&content).map_err(|e| StateError::Parse {
            path: self.path.clone(),
            source: e,
        })?;
        StackState::from_json(&value, registry)
    }

    /// Write the state as pretty-printed JSON, creating missing parent
    /// directories.
    pub fn save(&self, state: &StackState, registry: &TypeRegistry) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| StateError::CreateDir {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let json = state.to_json(registry)?;
        let mut content = serde_json::to_string_pretty(&json).map_err(|e| StateError::Write {
            path: self.path.clone(),
            source: io::Error::other(e),
        })?;
        content.push('\n');

        fs::write(&self.path, content).map_err(|e| StateError::Write {
            path: self.path.clone(),
            source: e,
        })?;
        log::debug!("saved state to {}", self.path.display());
        Ok(())
    }

    /// Acquire the advisory lock, retrying while another process holds it.
    pub fn lock(&self) -> Result<LockGuard> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| StateError::CreateDir {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        for attempt in 1..=LOCK_ATTEMPTS {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut file) => {
                    use std::io::Write;
                    let contents =
                        format!("pid: {}\ntimestamp: {}\n", std::process::id(), Utc::now().to_rfc3339());
                    file.write_all(contents.as_bytes())
                        .map_err(|e| StateError::LockWrite {
                            path: lock_path.clone(),
                            source: e,
                        })?;
                    log::debug!("acquired state lock {}", lock_path.display());
                    return Ok(LockGuard {
                        path: lock_path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    log::debug!(
                        "state lock {} held, retry {attempt}/{LOCK_ATTEMPTS}",
                        lock_path.display()
                    );
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(e) => {
                    return Err(StateError::LockWrite {
                        path: lock_path,
                        source: e,
                    }
                    .into());
                }
            }
        }

        Err(StateError::LockTimeout {
            path: lock_path,
            attempts: LOCK_ATTEMPTS,
        }
        .into())
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }
}

/// Resolve a user-supplied state path per the store's path policy.
pub fn resolve_state_path(path: &str) -> PathBuf {
    let raw = PathBuf::from(path);
    if raw.is_absolute() {
        return raw;
    }

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(_) => return raw,
    };

    if path.starts_with(STATE_PATH_PREFIX) {
        if let Some(root) = package_root(&cwd) {
            return root.join(raw);
        }
    }
    cwd.join(raw)
}

/// Nearest ancestor of `start` containing a package manifest.
fn package_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join("Cargo.toml").is_file())
        .map(Path::to_path_buf)
}
