//! flock(2)-based locks: one per application for the duration of a
//! rotation, and one guarding the audit trail.

use crate::constants;
use crate::util::fs as state_fs;
use anyhow::{Context, Result};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// An exclusive file lock. Released on drop (closing the file releases flock).
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire an exclusive lock, blocking until available.
    pub fn exclusive(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        file.lock_exclusive()
            .with_context(|| format!("acquire lock {}", path.display()))?;
        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    /// Try to acquire an exclusive lock without blocking.
    /// Returns `Ok(None)` if someone else holds it.
    pub fn try_exclusive(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                _file: file,
                path: path.to_path_buf(),
            })),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            // fs2 on Linux may report EAGAIN as Other
            Err(ref e) if e.raw_os_error() == Some(11) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("try lock {}", path.display())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("open lock file {}", path.display()))
}

/// Per-application rotation locks under a single directory.
///
/// Lock files are named by a digest of the application identifier so any
/// subject string maps to a safe file name.
#[derive(Debug, Clone)]
pub struct RotationLocks {
    dir: PathBuf,
}

impl RotationLocks {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn lock_path(&self, application_id: &str) -> PathBuf {
        let digest = Sha256::digest(application_id.as_bytes());
        self.dir.join(format!("{:x}.lock", digest))
    }

    /// Take the lock for `application_id` if nobody holds it.
    pub fn try_acquire(&self, application_id: &str) -> Result<Option<FileLock>> {
        state_fs::ensure_dir(&self.dir, constants::STATE_DIR_MODE)?;
        FileLock::try_exclusive(&self.lock_path(application_id))
    }
}
