//! Persisted container records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vessel_shared::errors::{VesselError, VesselResult};

use crate::entities::status::ContainerStatus;
use crate::entities::{ContainerId, PodId};
use crate::lock::LockId;
use crate::runtime::layout::FilesystemLayout;

/// User-supplied configuration for a container.
///
/// Serialized as an opaque blob by the state store; never rewritten after
/// creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Image reference the container was created from.
    pub image: String,

    /// Command to run inside the container.
    #[serde(default)]
    pub command: Vec<String>,

    /// Pod this container belongs to, if any.
    #[serde(default)]
    pub pod: Option<PodId>,

    /// OCI runtime to execute the container with. `None` selects the
    /// registry's default.
    #[serde(default)]
    pub oci_runtime: Option<String>,

    /// User-defined labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            image: String::new(),
            command: Vec::new(),
            pod: None,
            oci_runtime: None,
            labels: HashMap::new(),
        }
    }
}

/// Persisted state of one container.
///
/// Owned by the state store. Mutated only while the caller holds the
/// container's lock; the store does not enforce this itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: ContainerId,
    pub name: String,

    /// Store namespace the container was created in. Empty means unscoped.
    pub namespace: String,

    /// Index into the cross-process lock pool.
    pub lock: LockId,

    pub config: ContainerConfig,

    /// Last-known lifecycle status.
    pub status: ContainerStatus,

    /// PID of the container process, if one is running.
    pub pid: Option<u32>,

    pub created_at: DateTime<Utc>,
}

impl ContainerRecord {
    /// Create a fresh record in the `Configured` state.
    pub fn new(name: String, namespace: String, lock: LockId, config: ContainerConfig) -> Self {
        Self {
            id: ContainerId::new(),
            name,
            namespace,
            lock,
            config,
            status: ContainerStatus::Configured,
            pid: None,
            created_at: Utc::now(),
        }
    }

    /// Attempt a status transition, rejecting invalid ones.
    pub fn set_status(&mut self, status: ContainerStatus) -> VesselResult<()> {
        if !self.status.can_transition_to(status) {
            return Err(VesselError::InvalidState(format!(
                "container {}: cannot transition from {} to {}",
                self.id.short(),
                self.status,
                status
            )));
        }
        self.status = status;
        Ok(())
    }

    /// Mark the container stopped and clear its PID.
    pub fn mark_stop(&mut self) {
        self.status = ContainerStatus::Stopped;
        self.pid = None;
    }

    /// Reset state after a host reboot. Active containers become stopped;
    /// the process is gone either way.
    pub fn reset_for_reboot(&mut self) {
        if self.status.is_active() || self.status == ContainerStatus::Stopping {
            self.status = ContainerStatus::Stopped;
        }
        self.pid = None;
    }

    /// Recreate transient per-container resources after a reboot.
    ///
    /// Must not take the container's own lock; the caller serializes the
    /// whole recovery pass.
    pub(crate) fn refresh(&mut self, layout: &FilesystemLayout) -> VesselResult<()> {
        let run_dir = layout.container_run_dir(&self.id);
        std::fs::create_dir_all(&run_dir).map_err(|e| {
            VesselError::Storage(format!(
                "failed to recreate run dir for container {}: {e}",
                self.id.short()
            ))
        })?;
        self.reset_for_reboot();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ContainerRecord {
        ContainerRecord::new(
            "web".to_string(),
            String::new(),
            LockId::new(0),
            ContainerConfig {
                image: "alpine:latest".to_string(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_new_record_is_configured() {
        let rec = record();
        assert_eq!(rec.status, ContainerStatus::Configured);
        assert!(rec.pid.is_none());
    }

    #[test]
    fn test_set_status_validates_transition() {
        let mut rec = record();
        rec.set_status(ContainerStatus::Running).unwrap();
        assert_eq!(rec.status, ContainerStatus::Running);

        let mut rec = record();
        let err = rec.set_status(ContainerStatus::Paused).unwrap_err();
        assert!(matches!(err, VesselError::InvalidState(_)));
        assert_eq!(rec.status, ContainerStatus::Configured);
    }

    #[test]
    fn test_reset_for_reboot() {
        let mut rec = record();
        rec.set_status(ContainerStatus::Running).unwrap();
        rec.pid = Some(4242);

        rec.reset_for_reboot();
        assert_eq!(rec.status, ContainerStatus::Stopped);
        assert!(rec.pid.is_none());

        // Configured containers never ran; they stay configured.
        let mut rec = record();
        rec.reset_for_reboot();
        assert_eq!(rec.status, ContainerStatus::Configured);
    }

    #[test]
    fn test_config_roundtrip() {
        let rec = record();
        let json = serde_json::to_string(&rec.config).unwrap();
        let config: ContainerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.image, "alpine:latest");
        assert!(config.pod.is_none());
    }
}
