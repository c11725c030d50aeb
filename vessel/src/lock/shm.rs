//! Lock pool backed by a single segment file on a tmpfs-backed directory.
//!
//! The segment holds a small header (magic + pool size) followed by one
//! allocation byte per index. Allocation mutations are serialized by an
//! exclusive record lock on the header range; each index is locked by a
//! blocking record lock on its own byte. Open-file-description locks are
//! used so that two handles conflict even inside one process, and the
//! kernel releases everything a crashed process held.
//!
//! On the default `/dev/shm` the segment disappears on host reboot; the
//! runtime detects reboots through its alive marker, not through the
//! segment.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use vessel_shared::errors::{VesselError, VesselResult};

use super::{EntityLock, LockId, LockManager};

const LOCK_MAGIC: u32 = 0x5653_4c4b;
const HEADER_LEN: u64 = 8;

/// Handle to a shared-memory-style lock segment.
#[derive(Clone, Debug)]
pub struct ShmLockManager {
    path: PathBuf,
    num_locks: u32,
}

impl ShmLockManager {
    /// Create a fresh segment sized for `num_locks`.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if a segment with this name is already present.
    pub fn create(dir: &Path, name: &str, num_locks: u32) -> VesselResult<Self> {
        if num_locks == 0 {
            return Err(VesselError::Config(
                "lock pool size must be greater than zero".to_string(),
            ));
        }

        fs::create_dir_all(dir)
            .map_err(|e| VesselError::Storage(format!("failed to create lock dir: {e}")))?;

        let path = dir.join(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    VesselError::AlreadyExists(format!("lock segment {}", path.display()))
                } else {
                    VesselError::Storage(format!(
                        "failed to create lock segment {}: {e}",
                        path.display()
                    ))
                }
            })?;

        let mut header = [0u8; HEADER_LEN as usize];
        header[..4].copy_from_slice(&LOCK_MAGIC.to_le_bytes());
        header[4..].copy_from_slice(&num_locks.to_le_bytes());
        file.write_all_at(&header, 0)
            .and_then(|_| file.set_len(HEADER_LEN + u64::from(num_locks)))
            .map_err(|e| {
                VesselError::Storage(format!(
                    "failed to initialize lock segment {}: {e}",
                    path.display()
                ))
            })?;

        tracing::debug!(path = %path.display(), num_locks, "created lock segment");

        Ok(Self { path, num_locks })
    }

    /// Open an existing segment, verifying it was sized for `num_locks`.
    ///
    /// # Errors
    ///
    /// - `LockMediumMissing` when the segment does not exist, so the caller
    ///   can create it instead.
    /// - `LockPoolSizeMismatch` when it exists with a different pool size,
    ///   so the caller can decide whether to renumber.
    pub fn open(dir: &Path, name: &str, num_locks: u32) -> VesselResult<Self> {
        let path = dir.join(name);
        let file = match OpenOptions::new().read(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VesselError::LockMediumMissing(path.display().to_string()));
            }
            Err(e) => {
                return Err(VesselError::Storage(format!(
                    "failed to open lock segment {}: {e}",
                    path.display()
                )));
            }
        };

        let mut header = [0u8; HEADER_LEN as usize];
        file.read_exact_at(&mut header, 0).map_err(|e| {
            VesselError::Storage(format!("lock segment {} is truncated: {e}", path.display()))
        })?;

        let magic = u32::from_le_bytes(header[..4].try_into().unwrap_or_default());
        if magic != LOCK_MAGIC {
            return Err(VesselError::Storage(format!(
                "{} is not a vessel lock segment",
                path.display()
            )));
        }

        let found = u32::from_le_bytes(header[4..].try_into().unwrap_or_default());
        if found != num_locks {
            return Err(VesselError::LockPoolSizeMismatch {
                found,
                configured: num_locks,
            });
        }

        Ok(Self { path, num_locks })
    }

    /// Remove the segment so it can be recreated with a new size.
    /// Discards every allocation; previously issued indices become invalid.
    pub fn destroy(dir: &Path, name: &str) -> VesselResult<()> {
        let path = dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VesselError::Storage(format!(
                "failed to remove lock segment {}: {e}",
                path.display()
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn segment(&self) -> VesselResult<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| {
                VesselError::Storage(format!(
                    "failed to open lock segment {}: {e}",
                    self.path.display()
                ))
            })
    }

    fn with_alloc_lock<T>(
        &self,
        file: &File,
        f: impl FnOnce(&File) -> VesselResult<T>,
    ) -> VesselResult<T> {
        range_lock(file, 0, HEADER_LEN, true)
            .map_err(|e| VesselError::Internal(format!("failed to lock allocation header: {e}")))?;
        let out = f(file);
        let _ = range_unlock(file, 0, HEADER_LEN);
        out
    }

    fn read_bitmap(&self, file: &File) -> VesselResult<Vec<u8>> {
        let mut bitmap = vec![0u8; self.num_locks as usize];
        file.read_exact_at(&mut bitmap, HEADER_LEN).map_err(|e| {
            VesselError::Storage(format!(
                "lock segment {} is truncated: {e}",
                self.path.display()
            ))
        })?;
        Ok(bitmap)
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

impl LockManager for ShmLockManager {
    fn allocate(&self) -> VesselResult<LockId> {
        let file = self.segment()?;
        self.with_alloc_lock(&file, |file| {
            let bitmap = self.read_bitmap(file)?;
            let Some(index) = bitmap.iter().position(|b| *b == 0) else {
                return Err(VesselError::NoFreeLocks(self.num_locks));
            };

            file.write_all_at(&[1], HEADER_LEN + index as u64)
                .map_err(|e| VesselError::Storage(format!("failed to mark lock in use: {e}")))?;
            Ok(LockId::new(index as u32))
        })
    }

    fn retrieve(&self, id: LockId) -> VesselResult<Box<dyn EntityLock>> {
        self.check_range(id)?;
        // A fresh file handle per lock: open-file-description locks conflict
        // between handles, including within one process.
        let file = self.segment()?;
        Ok(Box::new(ShmLock {
            id,
            file,
            locked: false,
        }))
    }

    fn allocate_given(&self, id: LockId) -> VesselResult<()> {
        self.check_range(id)?;
        let file = self.segment()?;
        self.with_alloc_lock(&file, |file| {
            file.write_all_at(&[1], HEADER_LEN + u64::from(id.index()))
                .map_err(|e| VesselError::Storage(format!("failed to mark lock in use: {e}")))
        })
    }

    fn free(&self, id: LockId) -> VesselResult<()> {
        self.check_range(id)?;
        let file = self.segment()?;
        self.with_alloc_lock(&file, |file| {
            file.write_all_at(&[0], HEADER_LEN + u64::from(id.index()))
                .map_err(|e| VesselError::Storage(format!("failed to mark lock free: {e}")))
        })
    }

    fn num_locks(&self) -> u32 {
        self.num_locks
    }

    fn allocated_count(&self) -> VesselResult<u32> {
        let file = self.segment()?;
        let bitmap = self.read_bitmap(&file)?;
        Ok(bitmap.iter().filter(|b| **b != 0).count() as u32)
    }
}

#[derive(Debug)]
struct ShmLock {
    id: LockId,
    file: File,
    locked: bool,
}

impl EntityLock for ShmLock {
    fn id(&self) -> LockId {
        self.id
    }

    fn lock(&mut self) -> VesselResult<()> {
        if self.locked {
            return Err(VesselError::Internal(format!(
                "lock {} is already held by this handle",
                self.id
            )));
        }
        range_lock(&self.file, HEADER_LEN + u64::from(self.id.index()), 1, true)
            .map_err(|e| VesselError::Internal(format!("failed to lock {}: {e}", self.id)))?;
        self.locked = true;
        Ok(())
    }

    fn unlock(&mut self) -> VesselResult<()> {
        if !self.locked {
            return Err(VesselError::Internal(format!(
                "lock {} is not held by this handle",
                self.id
            )));
        }
        range_unlock(&self.file, HEADER_LEN + u64::from(self.id.index()), 1)
            .map_err(|e| VesselError::Internal(format!("failed to unlock {}: {e}", self.id)))?;
        self.locked = false;
        Ok(())
    }
}

impl Drop for ShmLock {
    fn drop(&mut self) {
        if self.locked {
            let _ = range_unlock(&self.file, HEADER_LEN + u64::from(self.id.index()), 1);
        }
    }
}

fn range_lock(file: &File, start: u64, len: u64, block: bool) -> io::Result<()> {
    fcntl_op(file, libc::F_WRLCK, start, len, block)
}

fn range_unlock(file: &File, start: u64, len: u64) -> io::Result<()> {
    fcntl_op(file, libc::F_UNLCK, start, len, false)
}

fn fcntl_op(file: &File, lock_type: i32, start: u64, len: u64, block: bool) -> io::Result<()> {
    let mut fl: libc::flock = unsafe { std::mem::zeroed() };
    fl.l_type = lock_type as libc::c_short;
    fl.l_whence = libc::SEEK_SET as libc::c_short;
    fl.l_start = start as libc::off_t;
    fl.l_len = len as libc::off_t;
    // l_pid stays 0 as required for open-file-description locks.

    let cmd = if block {
        libc::F_OFD_SETLKW
    } else {
        libc::F_OFD_SETLK
    };

    loop {
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), cmd, &raw const fl) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}
