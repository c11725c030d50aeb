//! Cross-process lock pool shared by every engine invocation on the host.
//!
//! Locks are a fixed pool of numbered OS-level primitives reachable from any
//! process that knows the pool's shared medium. Entities store the index they
//! were assigned; the primitive itself is retrieved fresh by index on each
//! use. Indices must be freed when an entity is destroyed or they leak for
//! the lifetime of the medium.
//!
//! Two interchangeable backends exist:
//! - [`ShmLockManager`]: a single segment file on a tmpfs-backed directory.
//!   Fast, survives process exit, lost on host reboot.
//! - [`FileLockManager`]: a directory of per-index lock files. Portable,
//!   survives reboot.
//!
//! Neither backend detects reboots; the runtime's alive marker is the only
//! reboot signal.

pub mod file;
pub mod shm;

pub use file::FileLockManager;
pub use shm::ShmLockManager;

use std::fmt;

use serde::{Deserialize, Serialize};

use vessel_shared::errors::VesselResult;

/// Numeric handle into the lock pool, stored inside entity records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockId(u32);

impl LockId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One lock from the pool, bound to a fresh handle on the shared medium.
///
/// `lock` blocks without a timeout; callers impose their own deadlines if
/// they need them. A handle that is dropped while held releases the lock.
pub trait EntityLock: Send + fmt::Debug {
    /// Index of this lock in the pool.
    fn id(&self) -> LockId;

    /// Acquire the lock, blocking until it is available.
    fn lock(&mut self) -> VesselResult<()>;

    /// Release the lock.
    fn unlock(&mut self) -> VesselResult<()>;
}

/// Allocator and resolver for the fixed lock pool.
///
/// Implementations are handles onto a named shared medium; every process on
/// the host that opens the same medium sees the same pool. Correctness
/// depends on all of them honoring the allocate/retrieve/free discipline.
pub trait LockManager: Send + Sync {
    /// Reserve the lowest-numbered free index.
    ///
    /// # Errors
    ///
    /// `NoFreeLocks` when the pool is exhausted.
    fn allocate(&self) -> VesselResult<LockId>;

    /// Resolve an existing index to a usable lock handle. Never allocates.
    ///
    /// # Errors
    ///
    /// `LockOutOfRange` when the index does not fall inside the pool.
    fn retrieve(&self, id: LockId) -> VesselResult<Box<dyn EntityLock>>;

    /// Mark a specific index as allocated.
    ///
    /// Used by reboot recovery to reconcile entities' stored indices
    /// against a freshly created medium. Idempotent for indices that are
    /// already allocated.
    ///
    /// # Errors
    ///
    /// `LockOutOfRange` when the index does not fall inside the pool.
    fn allocate_given(&self, id: LockId) -> VesselResult<()>;

    /// Return an index to the pool. Idempotent: freeing an index that is
    /// already free is not an error.
    fn free(&self, id: LockId) -> VesselResult<()>;

    /// Size of the pool.
    fn num_locks(&self) -> u32;

    /// Number of currently allocated indices.
    fn allocated_count(&self) -> VesselResult<u32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_id_accessors() {
        let id = LockId::new(17);
        assert_eq!(id.index(), 17);
        assert_eq!(id.to_string(), "17");
    }

    #[test]
    fn test_lock_id_serde_transparent() {
        let id = LockId::new(5);
        assert_eq!(serde_json::to_string(&id).unwrap(), "5");
        let back: LockId = serde_json::from_str("5").unwrap();
        assert_eq!(back, id);
    }
}
