//! Error types for the vessel engine.
//!
//! Every fallible operation in the engine returns [`VesselResult`]. Callers
//! are expected to match on variants rather than inspect message strings;
//! helper predicates cover the common classes.

use thiserror::Error;

/// Result alias used throughout the engine.
pub type VesselResult<T> = Result<T, VesselError>;

/// Engine-wide error type.
#[derive(Error, Debug)]
pub enum VesselError {
    /// No container matched the given name, ID, or ID prefix.
    #[error("no container with name or ID {0} found")]
    NoSuchContainer(String),

    /// No pod matched the given name, ID, or ID prefix.
    #[error("no pod with name or ID {0} found")]
    NoSuchPod(String),

    /// No volume with the given name exists.
    #[error("no volume with name {0} found")]
    NoSuchVolume(String),

    /// A partial ID matched more than one entity.
    #[error("more than one result for ID prefix {0}")]
    AmbiguousId(String),

    /// An entity with the same name or ID already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// A configuration value is invalid or unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The operation is not permitted in the entity's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The lock pool has no free locks left.
    #[error("allocation failed; exceeded num_locks ({0})")]
    NoFreeLocks(u32),

    /// A lock index does not fall inside the configured pool.
    #[error("lock {index} is out of range (pool holds {size} locks)")]
    LockOutOfRange { index: u32, size: u32 },

    /// The shared lock medium does not exist yet.
    ///
    /// Callers use this to decide between open and create semantics.
    #[error("lock medium {0} does not exist")]
    LockMediumMissing(String),

    /// The shared lock medium exists but was sized for a different pool.
    ///
    /// Only recoverable by renumbering, which discards the medium.
    #[error("lock medium holds {found} locks but configuration requires {configured}")]
    LockPoolSizeMismatch { found: u32, configured: u32 },

    /// The runtime has been shut down; no further operations are possible.
    #[error("runtime has already been stopped")]
    RuntimeStopped,

    /// The supplied configuration conflicts with the store's snapshot.
    #[error("configuration is incompatible with the existing store: {0}")]
    IncompatibleConfig(String),

    /// Bootstrap was cancelled before completing.
    #[error("operation interrupted: {0}")]
    Interrupted(String),

    /// Filesystem-level failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// State database failure.
    #[error("database error: {0}")]
    Database(String),

    /// Invariant violation inside the engine itself.
    #[error("internal error: {0}")]
    Internal(String),
}

impl VesselError {
    /// True for the "entity absent" class of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            VesselError::NoSuchContainer(_)
                | VesselError::NoSuchPod(_)
                | VesselError::NoSuchVolume(_)
        )
    }

    /// True when the error means a shared lock medium has not been created.
    pub fn is_lock_medium_missing(&self) -> bool {
        matches!(self, VesselError::LockMediumMissing(_))
    }
}
