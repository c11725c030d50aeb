//! Persisted pod records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vessel_shared::errors::{VesselError, VesselResult};

use crate::entities::PodId;
use crate::lock::LockId;
use crate::runtime::layout::FilesystemLayout;

/// User-supplied configuration for a pod.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PodConfig {
    /// Parent cgroup the pod's cgroup is created under.
    #[serde(default)]
    pub cgroup_parent: Option<String>,

    /// User-defined labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Persisted state of one pod.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PodRecord {
    pub id: PodId,
    pub name: String,

    /// Store namespace the pod was created in. Empty means unscoped.
    pub namespace: String,

    /// Index into the cross-process lock pool.
    pub lock: LockId,

    pub config: PodConfig,

    /// Cgroup path in use this boot. Transient; cleared by recovery.
    pub cgroup_path: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl PodRecord {
    /// Create a fresh pod record.
    pub fn new(name: String, namespace: String, lock: LockId, config: PodConfig) -> Self {
        Self {
            id: PodId::new(),
            name,
            namespace,
            lock,
            config,
            cgroup_path: None,
            created_at: Utc::now(),
        }
    }

    /// Recreate transient per-pod resources after a reboot.
    ///
    /// The pod's cgroup no longer exists; drop the stale path and recreate
    /// the run directory. Must not take the pod's own lock.
    pub(crate) fn refresh(&mut self, layout: &FilesystemLayout) -> VesselResult<()> {
        self.cgroup_path = None;

        let run_dir = layout.pod_run_dir(&self.id);
        std::fs::create_dir_all(&run_dir).map_err(|e| {
            VesselError::Storage(format!(
                "failed to recreate run dir for pod {}: {e}",
                self.id.short()
            ))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pod_has_no_cgroup_path() {
        let pod = PodRecord::new(
            "infra".to_string(),
            String::new(),
            LockId::new(3),
            PodConfig::default(),
        );
        assert!(pod.cgroup_path.is_none());
        assert_eq!(pod.lock.index(), 3);
    }

    #[test]
    fn test_pod_config_roundtrip() {
        let config = PodConfig {
            cgroup_parent: Some("/vessel.slice".to_string()),
            labels: HashMap::from([("tier".to_string(), "db".to_string())]),
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: PodConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cgroup_parent.as_deref(), Some("/vessel.slice"));
        assert_eq!(back.labels.len(), 1);
    }
}
