//! Lock pool backed by a directory of per-index lock files.
//!
//! Portable fallback for hosts without a usable tmpfs segment. An index is
//! allocated by creating its numbered file (`O_EXCL`), freed by unlinking
//! it, and locked by `flock(2)` on the file. A `size` file records the pool
//! size; an `alloc.lock` file serializes allocation scans.
//!
//! The directory lives on persistent storage and survives reboots, so the
//! runtime must never infer boot state from this backend; the alive marker
//! is the only reboot signal.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use vessel_shared::errors::{VesselError, VesselResult};

use super::{EntityLock, LockId, LockManager};

const SIZE_FILE: &str = "size";
const ALLOC_LOCK_FILE: &str = "alloc.lock";

/// Handle to a file-backed lock pool.
#[derive(Clone, Debug)]
pub struct FileLockManager {
    dir: PathBuf,
    num_locks: u32,
}

impl FileLockManager {
    /// Create a fresh pool directory sized for `num_locks`.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the directory already holds a pool.
    pub fn create(dir: &Path, num_locks: u32) -> VesselResult<Self> {
        if num_locks == 0 {
            return Err(VesselError::Config(
                "lock pool size must be greater than zero".to_string(),
            ));
        }

        fs::create_dir_all(dir)
            .map_err(|e| VesselError::Storage(format!("failed to create lock dir: {e}")))?;

        let size_path = dir.join(SIZE_FILE);
        let mut opts = OpenOptions::new();
        opts.write(true).create_new(true);
        match opts.open(&size_path) {
            Ok(file) => {
                use std::io::Write;
                let mut file = file;
                file.write_all(num_locks.to_string().as_bytes())
                    .map_err(|e| {
                        VesselError::Storage(format!("failed to record lock pool size: {e}"))
                    })?;
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(VesselError::AlreadyExists(format!(
                    "file lock pool {}",
                    dir.display()
                )));
            }
            Err(e) => {
                return Err(VesselError::Storage(format!(
                    "failed to record lock pool size: {e}"
                )));
            }
        }

        tracing::debug!(dir = %dir.display(), num_locks, "created file lock pool");

        Ok(Self {
            dir: dir.to_path_buf(),
            num_locks,
        })
    }

    /// Open an existing pool, verifying it was sized for `num_locks`.
    ///
    /// # Errors
    ///
    /// - `LockMediumMissing` when no pool exists at `dir`.
    /// - `LockPoolSizeMismatch` when the recorded size differs.
    pub fn open(dir: &Path, num_locks: u32) -> VesselResult<Self> {
        let size_path = dir.join(SIZE_FILE);
        let contents = match fs::read_to_string(&size_path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VesselError::LockMediumMissing(dir.display().to_string()));
            }
            Err(e) => {
                return Err(VesselError::Storage(format!(
                    "failed to read lock pool size: {e}"
                )));
            }
        };

        let found: u32 = contents.trim().parse().map_err(|_| {
            VesselError::Storage(format!(
                "lock pool size file {} is unreadable",
                size_path.display()
            ))
        })?;

        if found != num_locks {
            return Err(VesselError::LockPoolSizeMismatch {
                found,
                configured: num_locks,
            });
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            num_locks,
        })
    }

    /// Remove the pool directory so it can be recreated with a new size.
    /// Discards every allocation; previously issued indices become invalid.
    pub fn destroy(dir: &Path) -> VesselResult<()> {
        match fs::remove_dir_all(dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VesselError::Storage(format!(
                "failed to remove lock dir {}: {e}",
                dir.display()
            ))),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock_path(&self, id: LockId) -> PathBuf {
        self.dir.join(id.index().to_string())
    }

    fn alloc_guard(&self) -> VesselResult<AllocGuard> {
        AllocGuard::acquire(self.dir.join(ALLOC_LOCK_FILE))
    }

    fn check_range(&self, id: LockId) -> VesselResult<()> {
        if id.index() >= self.num_locks {
            return Err(VesselError::LockOutOfRange {
                index: id.index(),
                size: self.num_locks,
            });
        }
        Ok(())
    }
}

impl LockManager for FileLockManager {
    fn allocate(&self) -> VesselResult<LockId> {
        let _guard = self.alloc_guard()?;

        for index in 0..self.num_locks {
            let id = LockId::new(index);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.lock_path(id))
            {
                Ok(_) => return Ok(id),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(VesselError::Storage(format!(
                        "failed to create lock file {index}: {e}"
                    )));
                }
            }
        }

        Err(VesselError::NoFreeLocks(self.num_locks))
    }

    fn retrieve(&self, id: LockId) -> VesselResult<Box<dyn EntityLock>> {
        self.check_range(id)?;
        Ok(Box::new(FileLock {
            id,
            path: self.lock_path(id),
            file: None,
        }))
    }

    fn allocate_given(&self, id: LockId) -> VesselResult<()> {
        self.check_range(id)?;
        let _guard = self.alloc_guard()?;

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.lock_path(id))
        {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(VesselError::Storage(format!(
                "failed to create lock file {id}: {e}"
            ))),
        }
    }

    fn free(&self, id: LockId) -> VesselResult<()> {
        self.check_range(id)?;
        let _guard = self.alloc_guard()?;

        match fs::remove_file(self.lock_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VesselError::Storage(format!(
                "failed to remove lock file {id}: {e}"
            ))),
        }
    }

    fn num_locks(&self) -> u32 {
        self.num_locks
    }

    fn allocated_count(&self) -> VesselResult<u32> {
        let _guard = self.alloc_guard()?;

        let mut count = 0;
        for index in 0..self.num_locks {
            if self.lock_path(LockId::new(index)).exists() {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[derive(Debug)]
struct FileLock {
    id: LockId,
    path: PathBuf,
    file: Option<File>,
}

impl EntityLock for FileLock {
    fn id(&self) -> LockId {
        self.id
    }

    fn lock(&mut self) -> VesselResult<()> {
        if self.file.is_some() {
            return Err(VesselError::Internal(format!(
                "lock {} is already held by this handle",
                self.id
            )));
        }

        let file = match OpenOptions::new().read(true).write(true).open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VesselError::InvalidState(format!(
                    "lock {} is not allocated",
                    self.id
                )));
            }
            Err(e) => {
                return Err(VesselError::Storage(format!(
                    "failed to open lock file {}: {e}",
                    self.id
                )));
            }
        };

        flock_file(&file, libc::LOCK_EX)
            .map_err(|e| VesselError::Internal(format!("failed to lock {}: {e}", self.id)))?;
        self.file = Some(file);
        Ok(())
    }

    fn unlock(&mut self) -> VesselResult<()> {
        let Some(file) = self.file.take() else {
            return Err(VesselError::Internal(format!(
                "lock {} is not held by this handle",
                self.id
            )));
        };

        flock_file(&file, libc::LOCK_UN)
            .map_err(|e| VesselError::Internal(format!("failed to unlock {}: {e}", self.id)))
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Closing the file releases the flock; be explicit anyway.
        if let Some(file) = self.file.take() {
            let _ = flock_file(&file, libc::LOCK_UN);
        }
    }
}

/// Exclusive flock guard serializing allocation scans.
struct AllocGuard {
    file: File,
}

impl AllocGuard {
    fn acquire(path: PathBuf) -> VesselResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                VesselError::Storage(format!("failed to open allocation lock file: {e}"))
            })?;

        flock_file(&file, libc::LOCK_EX)
            .map_err(|e| VesselError::Internal(format!("failed to lock allocation file: {e}")))?;

        Ok(Self { file })
    }
}

impl Drop for AllocGuard {
    fn drop(&mut self) {
        let _ = flock_file(&self.file, libc::LOCK_UN);
    }
}

fn flock_file(file: &File, op: libc::c_int) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}
