//! Constants every vessel component must agree on.

/// On-disk file names inside the static and tmp directories.
pub mod files {
    /// SQLite state database, inside the static directory.
    pub const STATE_DB: &str = "vessel.db";

    /// Records the shared-memory segment name the lock pool was created
    /// with, inside the static directory.
    pub const LOCK_IDENTITY: &str = "shm-lock-name";

    /// Marker created once per boot after recovery has run, inside the
    /// tmp directory.
    pub const ALIVE: &str = "alive";

    /// Boot-lifetime lock file guarding the recovery decision, inside the
    /// tmp directory.
    pub const ALIVE_LOCK: &str = "alive.lck";
}

/// Directory names inside the engine's home, static, and tmp directories.
pub mod dirs {
    /// Default engine home directory under `$HOME`.
    pub const VESSEL_DIR: &str = ".vessel";

    /// Static (persistent) state directory.
    pub const STORAGE_DIR: &str = "storage";

    /// Image/layer graph root.
    pub const GRAPH_DIR: &str = "graph";

    /// Named volume storage.
    pub const VOLUMES_DIR: &str = "volumes";

    /// Log files.
    pub const LOGS_DIR: &str = "logs";

    /// File-backed lock pool, inside the static directory.
    pub const LOCKS_DIR: &str = "locks";

    /// Per-container transient run state, inside the tmp directory.
    pub const CONTAINERS_DIR: &str = "containers";

    /// Per-pod transient run state, inside the tmp directory.
    pub const PODS_DIR: &str = "pods";
}

/// Built-in sizing defaults.
pub mod defaults {
    /// Size of the cross-process lock pool.
    pub const NUM_LOCKS: u32 = 2048;

    /// Graph driver recorded in the store snapshot.
    pub const GRAPH_DRIVER: &str = "overlay";
}
