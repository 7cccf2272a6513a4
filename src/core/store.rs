/// Durable verification record
///
/// One JSON document at a fixed path, replaced on every run. An advisory lock on a file
/// next to it keeps two runs from racing on the same output.

use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::report::{OverallStatus, VerificationReport};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("{path} does not contain a verification report: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },

    #[error("another verification run holds {0}")]
    Locked(PathBuf),
}

/// Process exit status for a verdict
pub fn exit_code(status: OverallStatus) -> i32 {
    match status {
        OverallStatus::Success => 0,
        OverallStatus::Failed | OverallStatus::Aborted => 1,
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path`
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let tmp = tmp_path(path);
    let result = fs::File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&tmp, path));

    if let Err(source) = result {
        let _ = fs::remove_file(&tmp);
        return Err(write_err(source));
    }

    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub struct ResultStore {
    path: PathBuf,
}

impl ResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the record with `report`
    pub fn persist(&self, report: &VerificationReport) -> Result<(), StoreError> {
        write_json_atomic(&self.path, report)?;
        tracing::info!(path = %self.path.display(), status = %report.overall_status, "report persisted");
        Ok(())
    }

    /// Persist, downgrading a failure to a warning. The verdict is never affected.
    pub fn persist_or_warn(&self, report: &VerificationReport) -> Option<String> {
        match self.persist(report) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(error = %e, "could not persist verification report");
                Some(e.to_string())
            }
        }
    }

    /// Read the last persisted report
    pub fn load(&self) -> Result<VerificationReport, StoreError> {
        let content = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Take the single-run lock for this output path
    ///
    /// The lock is an advisory `flock` on `<path>.lock`, so the kernel drops it when the
    /// holding process exits for any reason. A lock file left behind by a killed run does
    /// not block the next one.
    pub fn lock(&self) -> Result<RunLock, StoreError> {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".lock");
        let lock_path = self.path.with_file_name(name);

        let write_err = |path: &Path, source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| write_err(parent, source))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|source| write_err(&lock_path, source))?;

        match try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(StoreError::Locked(lock_path)),
            Err(source) => return Err(write_err(&lock_path, source)),
        }

        // Holder pid, informational only
        if file.set_len(0).is_ok() {
            let _ = writeln!(file, "{}", std::process::id());
        }
        tracing::debug!(path = %lock_path.display(), "run lock acquired");

        Ok(RunLock { path: lock_path, _file: file })
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `file` and stays open for the duration of the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> io::Result<()> {
    tracing::debug!("advisory run lock not supported on this platform");
    Ok(())
}

/// Held for the duration of a run. Closing the file releases the lock; the file itself
/// stays in place so a waiting run never locks an unlinked inode.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    _file: File,
}

impl RunLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}
