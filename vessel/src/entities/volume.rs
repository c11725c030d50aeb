//! Persisted volume records.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vessel_shared::errors::{VesselError, VesselResult};

use crate::lock::LockId;

/// User-supplied configuration for a named volume.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Volume driver. Only `local` is handled by the engine itself.
    pub driver: String,

    /// Driver options.
    #[serde(default)]
    pub options: HashMap<String, String>,

    /// User-defined labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            driver: "local".to_string(),
            options: HashMap::new(),
            labels: HashMap::new(),
        }
    }
}

/// Persisted state of one named volume. Volumes are addressed by name;
/// they have no separate ID.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub name: String,

    /// Store namespace the volume was created in. Empty means unscoped.
    pub namespace: String,

    /// Index into the cross-process lock pool.
    pub lock: LockId,

    pub config: VolumeConfig,

    /// Host directory backing the volume's contents.
    pub mount_point: PathBuf,

    pub created_at: DateTime<Utc>,
}

impl VolumeRecord {
    /// Create a fresh volume record rooted under `volume_dir`.
    pub fn new(
        name: String,
        namespace: String,
        lock: LockId,
        config: VolumeConfig,
        volume_dir: &std::path::Path,
    ) -> Self {
        let mount_point = volume_dir.join(&name).join("_data");
        Self {
            name,
            namespace,
            lock,
            config,
            mount_point,
            created_at: Utc::now(),
        }
    }

    /// Recreate the volume's mount point after a reboot, in case it lived
    /// on storage that did not survive. Must not take the volume's lock.
    pub(crate) fn refresh(&mut self) -> VesselResult<()> {
        std::fs::create_dir_all(&self.mount_point).map_err(|e| {
            VesselError::Storage(format!(
                "failed to recreate mount point for volume {}: {e}",
                self.name
            ))
        })
    }
}
