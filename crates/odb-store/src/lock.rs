use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Where a [`LockedFile`] is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Unopened,
    OpenForRead,
    OpenForWrite,
    Closed,
}

/// A read or write transaction on one file, serialized against writers
/// through `<path>.lock`.
///
/// Writing means creating the lock file exclusively, writing the new
/// content into it, and renaming it over the file on commit. Readers take
/// the same lock so no writer can replace the file underneath them, which
/// also means two readers of one path cannot overlap.
///
/// `open` may be called once. `commit` and `rollback` may be called any
/// number of times after that; only the first has an effect. Dropping an
/// open transaction rolls it back.
#[derive(Debug)]
pub struct LockedFile {
    path: PathBuf,
    file: Option<File>,
    phase: Phase,
}

impl LockedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            phase: Phase::Unopened,
        }
    }

    /// The file this transaction protects.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the lock file, `<path>.lock`.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Take the lock and open the file.
    ///
    /// In write mode the returned handle is the lock file itself; nothing
    /// reaches `path` until [`commit`](Self::commit). In read mode the
    /// handle is `path` opened read-only and the lock only keeps writers
    /// out.
    ///
    /// Fails with [`StoreError::LockUnavailable`] if the lock exists, and
    /// with [`StoreError::Usage`] on a second call.
    pub fn open(&mut self, write: bool) -> StoreResult<&mut File> {
        if self.phase != Phase::Unopened {
            return Err(StoreError::Usage(format!(
                "{} was already opened",
                self.path.display()
            )));
        }

        // any failure from here on leaves the transaction spent
        self.phase = Phase::Closed;
        let lock_path = self.lock_path();
        let lock = create_lock_file(&lock_path).map_err(|e| {
            debug!(path = %lock_path.display(), error = %e, "lock unavailable");
            StoreError::LockUnavailable(lock_path.clone())
        })?;
        debug!(path = %lock_path.display(), write, "lock acquired");

        let file = if write {
            self.phase = Phase::OpenForWrite;
            lock
        } else {
            drop(lock);
            match File::open(&self.path) {
                Ok(file) => {
                    self.phase = Phase::OpenForRead;
                    file
                }
                Err(e) => {
                    fs::remove_file(&lock_path)?;
                    return Err(e.into());
                }
            }
        };

        Ok(self.file.insert(file))
    }

    /// The open handle, if the transaction is still open.
    pub fn file(&mut self) -> Option<&mut File> {
        self.file.as_mut()
    }

    /// Publish the written content to `path`.
    ///
    /// The handle is synced and closed, the lock file renamed over `path`,
    /// and `path` made owner-writable and world-readable. For a read
    /// transaction this is the same as [`rollback`](Self::rollback).
    pub fn commit(&mut self) -> StoreResult<()> {
        self.end(true)
    }

    /// Discard everything written and release the lock.
    pub fn rollback(&mut self) -> StoreResult<()> {
        self.end(false)
    }

    fn end(&mut self, successful: bool) -> StoreResult<()> {
        if self.phase == Phase::Unopened {
            return Err(StoreError::Usage(format!(
                "cannot end a transaction on {} that was never opened",
                self.path.display()
            )));
        }
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        let write = self.phase == Phase::OpenForWrite;
        self.phase = Phase::Closed;

        let lock_path = self.lock_path();
        if write && successful {
            file.sync_all()?;
            drop(file);
            replace_file(&lock_path, &self.path)?;
            set_final_permissions(&self.path)?;
            debug!(path = %self.path.display(), "locked file committed");
        } else {
            drop(file);
            fs::remove_file(&lock_path)?;
            debug!(path = %self.path.display(), "lock released");
        }
        Ok(())
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        if self.file.is_some() {
            if let Err(e) = self.rollback() {
                warn!(path = %self.path.display(), error = %e, "rollback on drop failed");
            }
        }
    }
}

fn create_lock_file(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

fn replace_file(from: &Path, to: &Path) -> io::Result<()> {
    // rename does not overwrite an existing destination on windows
    #[cfg(windows)]
    {
        if to.is_file() {
            fs::remove_file(to)?;
        }
    }
    fs::rename(from, to)
}

#[cfg(unix)]
fn set_final_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_final_permissions(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}
