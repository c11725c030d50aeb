//! Boot-lifetime lock and alive marker.
//!
//! The alive marker lives in the tmp directory, which a host reboot
//! clears; its absence (including on first-ever run) means this boot has
//! not been refreshed yet. The lock file serializes the check-and-refresh
//! decision across processes. It guards the decision, not entity state.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use vessel_shared::errors::{VesselError, VesselResult};

/// Guard holding the boot-lifetime lock.
///
/// Released when dropped, which covers every early-error path out of
/// bootstrap as well as process death.
#[derive(Debug)]
pub(crate) struct AliveLock {
    #[allow(dead_code)] // held for its flock, not directly accessed
    file: File,
    path: PathBuf,
}

impl AliveLock {
    /// Acquire the lock, blocking until any other process performing the
    /// reboot check has finished.
    pub(crate) fn acquire(path: &Path) -> VesselResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VesselError::Storage(format!("failed to create tmp dir: {e}")))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                VesselError::Storage(format!(
                    "failed to open boot-lifetime lock {}: {e}",
                    path.display()
                ))
            })?;

        flock_blocking(&file).map_err(|e| {
            VesselError::Internal(format!(
                "failed to acquire boot-lifetime lock {}: {e}",
                path.display()
            ))
        })?;

        tracing::debug!(path = %path.display(), "acquired boot-lifetime lock");

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for AliveLock {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
        tracing::debug!(path = %self.path.display(), "released boot-lifetime lock");
    }
}

/// Does the alive marker exist for this boot?
pub(crate) fn marker_exists(path: &Path) -> VesselResult<bool> {
    match std::fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(VesselError::Storage(format!(
            "error reading runtime status file {}: {e}",
            path.display()
        ))),
    }
}

/// Create the alive marker once recovery has completed.
pub(crate) fn create_marker(path: &Path) -> VesselResult<()> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| {
            VesselError::Storage(format!(
                "failed to create runtime status file {}: {e}",
                path.display()
            ))
        })?;
    Ok(())
}

fn flock_blocking(file: &File) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_release_reacquire() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alive.lck");

        {
            let _guard = AliveLock::acquire(&path).unwrap();
            assert!(path.exists());
        }

        // Released on drop; a second acquire does not block.
        let _guard = AliveLock::acquire(&path).unwrap();
    }

    #[test]
    fn test_marker_lifecycle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alive");

        assert!(!marker_exists(&path).unwrap());
        create_marker(&path).unwrap();
        assert!(marker_exists(&path).unwrap());

        // Creating it again is harmless.
        create_marker(&path).unwrap();
    }
}
