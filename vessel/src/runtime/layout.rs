//! Filesystem layout for the engine's persistent and transient state.
//!
//! Two roots matter: the static directory (state database, lock identity,
//! file-backed lock pool, volumes) on persistent storage, and the tmp
//! directory (alive marker, boot-lifetime lock, per-entity run state) on a
//! filesystem that is cleared across host reboots. The tmp directory being
//! cleared is exactly what makes reboot detection work.

use std::path::{Path, PathBuf};

use vessel_shared::constants::{dirs, files};
use vessel_shared::errors::{VesselError, VesselResult};

use crate::entities::{ContainerId, PodId};

/// Resolved directory layout.
#[derive(Clone, Debug)]
pub struct FilesystemLayout {
    static_dir: PathBuf,
    tmp_dir: PathBuf,
    volume_dir: PathBuf,
    logs_dir: PathBuf,
}

impl FilesystemLayout {
    pub fn new(
        static_dir: PathBuf,
        tmp_dir: PathBuf,
        volume_dir: PathBuf,
        logs_dir: PathBuf,
    ) -> Self {
        Self {
            static_dir,
            tmp_dir,
            volume_dir,
            logs_dir,
        }
    }

    pub fn static_dir(&self) -> &Path {
        &self.static_dir
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    pub fn volume_dir(&self) -> &Path {
        &self.volume_dir
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// State database: {static_dir}/vessel.db
    pub fn db_path(&self) -> PathBuf {
        self.static_dir.join(files::STATE_DB)
    }

    /// Shared-memory segment identity file: {static_dir}/shm-lock-name
    pub fn lock_identity_path(&self) -> PathBuf {
        self.static_dir.join(files::LOCK_IDENTITY)
    }

    /// File-backed lock pool: {static_dir}/locks
    pub fn file_locks_dir(&self) -> PathBuf {
        self.static_dir.join(dirs::LOCKS_DIR)
    }

    /// Alive marker: {tmp_dir}/alive
    pub fn alive_path(&self) -> PathBuf {
        self.tmp_dir.join(files::ALIVE)
    }

    /// Boot-lifetime lock file: {tmp_dir}/alive.lck
    pub fn alive_lock_path(&self) -> PathBuf {
        self.tmp_dir.join(files::ALIVE_LOCK)
    }

    /// Transient container run state: {tmp_dir}/containers
    pub fn containers_run_dir(&self) -> PathBuf {
        self.tmp_dir.join(dirs::CONTAINERS_DIR)
    }

    /// Run directory for one container: {tmp_dir}/containers/{id}
    pub fn container_run_dir(&self, id: &ContainerId) -> PathBuf {
        self.containers_run_dir().join(id.as_str())
    }

    /// Transient pod run state: {tmp_dir}/pods
    pub fn pods_run_dir(&self) -> PathBuf {
        self.tmp_dir.join(dirs::PODS_DIR)
    }

    /// Run directory for one pod: {tmp_dir}/pods/{id}
    pub fn pod_run_dir(&self, id: &PodId) -> PathBuf {
        self.pods_run_dir().join(id.as_str())
    }

    /// Create the directory structure.
    pub fn prepare(&self) -> VesselResult<()> {
        std::fs::create_dir_all(&self.static_dir)
            .map_err(|e| VesselError::Storage(format!("failed to create static dir: {e}")))?;

        std::fs::create_dir_all(&self.tmp_dir)
            .map_err(|e| VesselError::Storage(format!("failed to create tmp dir: {e}")))?;

        std::fs::create_dir_all(&self.volume_dir)
            .map_err(|e| VesselError::Storage(format!("failed to create volume dir: {e}")))?;

        std::fs::create_dir_all(&self.logs_dir)
            .map_err(|e| VesselError::Storage(format!("failed to create logs dir: {e}")))?;

        std::fs::create_dir_all(self.containers_run_dir())
            .map_err(|e| VesselError::Storage(format!("failed to create containers dir: {e}")))?;

        std::fs::create_dir_all(self.pods_run_dir())
            .map_err(|e| VesselError::Storage(format!("failed to create pods dir: {e}")))?;

        Ok(())
    }
}
