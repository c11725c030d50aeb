//! Ephemeral in-process state store.
//!
//! Keeps every record in maps; nothing survives the process. Useful for
//! tests and for runtimes that explicitly opt out of persistence. There is
//! no configuration snapshot to reconcile against.

use std::collections::{BTreeMap, HashMap};

use vessel_shared::errors::{VesselError, VesselResult};

use crate::entities::{ContainerId, ContainerRecord, PodId, PodRecord, VolumeRecord};

use super::{DbConfig, State, visible};

/// Map-backed state store.
#[derive(Debug, Default)]
pub struct InMemoryState {
    namespace: String,
    closed: bool,
    containers: HashMap<String, ContainerRecord>,
    pods: HashMap<String, PodRecord>,
    // Keyed by (namespace, name); volume names are only unique per namespace.
    volumes: BTreeMap<(String, String), VolumeRecord>,
}

impl InMemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> VesselResult<()> {
        if self.closed {
            return Err(VesselError::Storage(
                "state store has been closed".to_string(),
            ));
        }
        Ok(())
    }
}

impl State for InMemoryState {
    fn db_config(&self) -> VesselResult<Option<DbConfig>> {
        self.check_open()?;
        Ok(None)
    }

    fn set_namespace(&mut self, ns: &str) -> VesselResult<()> {
        self.check_open()?;
        self.namespace = ns.to_string();
        Ok(())
    }

    fn refresh(&mut self) -> VesselResult<()> {
        self.check_open()?;
        for ctr in self.containers.values_mut() {
            ctr.reset_for_reboot();
        }
        for pod in self.pods.values_mut() {
            pod.cgroup_path = None;
        }
        Ok(())
    }

    fn close(&mut self) -> VesselResult<()> {
        self.closed = true;
        Ok(())
    }

    fn add_container(&mut self, ctr: &ContainerRecord) -> VesselResult<()> {
        self.check_open()?;

        if self.containers.contains_key(ctr.id.as_str()) {
            return Err(VesselError::AlreadyExists(format!(
                "container {}",
                ctr.id.short()
            )));
        }
        if self
            .containers
            .values()
            .any(|c| c.name == ctr.name && c.namespace == ctr.namespace)
        {
            return Err(VesselError::AlreadyExists(format!(
                "container name {}",
                ctr.name
            )));
        }

        self.containers.insert(ctr.id.as_str().to_string(), ctr.clone());
        Ok(())
    }

    fn container(&self, id: &ContainerId) -> VesselResult<ContainerRecord> {
        self.check_open()?;
        self.containers
            .get(id.as_str())
            .filter(|c| visible(&self.namespace, &c.namespace))
            .cloned()
            .ok_or_else(|| VesselError::NoSuchContainer(id.short().to_string()))
    }

    fn lookup_container(&self, term: &str) -> VesselResult<ContainerRecord> {
        self.check_open()?;

        let candidates: Vec<&ContainerRecord> = self
            .containers
            .values()
            .filter(|c| visible(&self.namespace, &c.namespace))
            .collect();

        if let Some(ctr) = candidates.iter().find(|c| c.id.as_str() == term) {
            return Ok((*ctr).clone());
        }

        let by_name: Vec<&&ContainerRecord> =
            candidates.iter().filter(|c| c.name == term).collect();
        match by_name.len() {
            1 => return Ok((**by_name[0]).clone()),
            n if n > 1 => return Err(VesselError::AmbiguousId(term.to_string())),
            _ => {}
        }

        let by_prefix: Vec<&&ContainerRecord> = candidates
            .iter()
            .filter(|c| c.id.as_str().starts_with(term))
            .collect();
        match by_prefix.len() {
            0 => Err(VesselError::NoSuchContainer(term.to_string())),
            1 => Ok((**by_prefix[0]).clone()),
            _ => Err(VesselError::AmbiguousId(term.to_string())),
        }
    }

    fn save_container(&mut self, ctr: &ContainerRecord) -> VesselResult<()> {
        self.check_open()?;

        let existing = self
            .containers
            .get_mut(ctr.id.as_str())
            .filter(|c| visible(&self.namespace, &c.namespace))
            .ok_or_else(|| VesselError::NoSuchContainer(ctr.id.short().to_string()))?;
        *existing = ctr.clone();
        Ok(())
    }

    fn remove_container(&mut self, id: &ContainerId) -> VesselResult<()> {
        self.check_open()?;

        let visible_entry = self
            .containers
            .get(id.as_str())
            .is_some_and(|c| visible(&self.namespace, &c.namespace));
        if !visible_entry {
            return Err(VesselError::NoSuchContainer(id.short().to_string()));
        }
        self.containers.remove(id.as_str());
        Ok(())
    }

    fn all_containers(&self) -> VesselResult<Vec<ContainerRecord>> {
        self.check_open()?;
        Ok(self
            .containers
            .values()
            .filter(|c| visible(&self.namespace, &c.namespace))
            .cloned()
            .collect())
    }

    fn add_pod(&mut self, pod: &PodRecord) -> VesselResult<()> {
        self.check_open()?;

        if self.pods.contains_key(pod.id.as_str()) {
            return Err(VesselError::AlreadyExists(format!("pod {}", pod.id.short())));
        }
        if self
            .pods
            .values()
            .any(|p| p.name == pod.name && p.namespace == pod.namespace)
        {
            return Err(VesselError::AlreadyExists(format!("pod name {}", pod.name)));
        }

        self.pods.insert(pod.id.as_str().to_string(), pod.clone());
        Ok(())
    }

    fn pod(&self, id: &PodId) -> VesselResult<PodRecord> {
        self.check_open()?;
        self.pods
            .get(id.as_str())
            .filter(|p| visible(&self.namespace, &p.namespace))
            .cloned()
            .ok_or_else(|| VesselError::NoSuchPod(id.short().to_string()))
    }

    fn lookup_pod(&self, term: &str) -> VesselResult<PodRecord> {
        self.check_open()?;

        let candidates: Vec<&PodRecord> = self
            .pods
            .values()
            .filter(|p| visible(&self.namespace, &p.namespace))
            .collect();

        if let Some(pod) = candidates.iter().find(|p| p.id.as_str() == term) {
            return Ok((*pod).clone());
        }

        let by_name: Vec<&&PodRecord> = candidates.iter().filter(|p| p.name == term).collect();
        match by_name.len() {
            1 => return Ok((**by_name[0]).clone()),
            n if n > 1 => return Err(VesselError::AmbiguousId(term.to_string())),
            _ => {}
        }

        let by_prefix: Vec<&&PodRecord> = candidates
            .iter()
            .filter(|p| p.id.as_str().starts_with(term))
            .collect();
        match by_prefix.len() {
            0 => Err(VesselError::NoSuchPod(term.to_string())),
            1 => Ok((**by_prefix[0]).clone()),
            _ => Err(VesselError::AmbiguousId(term.to_string())),
        }
    }

    fn save_pod(&mut self, pod: &PodRecord) -> VesselResult<()> {
        self.check_open()?;

        let existing = self
            .pods
            .get_mut(pod.id.as_str())
            .filter(|p| visible(&self.namespace, &p.namespace))
            .ok_or_else(|| VesselError::NoSuchPod(pod.id.short().to_string()))?;
        *existing = pod.clone();
        Ok(())
    }

    fn remove_pod(&mut self, id: &PodId) -> VesselResult<()> {
        self.check_open()?;

        let visible_entry = self
            .pods
            .get(id.as_str())
            .is_some_and(|p| visible(&self.namespace, &p.namespace));
        if !visible_entry {
            return Err(VesselError::NoSuchPod(id.short().to_string()));
        }
        self.pods.remove(id.as_str());
        Ok(())
    }

    fn all_pods(&self) -> VesselResult<Vec<PodRecord>> {
        self.check_open()?;
        Ok(self
            .pods
            .values()
            .filter(|p| visible(&self.namespace, &p.namespace))
            .cloned()
            .collect())
    }

    fn add_volume(&mut self, vol: &VolumeRecord) -> VesselResult<()> {
        self.check_open()?;

        let key = (vol.namespace.clone(), vol.name.clone());
        if self.volumes.contains_key(&key) {
            return Err(VesselError::AlreadyExists(format!("volume {}", vol.name)));
        }
        self.volumes.insert(key, vol.clone());
        Ok(())
    }

    fn volume(&self, name: &str) -> VesselResult<VolumeRecord> {
        self.check_open()?;

        let matches: Vec<&VolumeRecord> = self
            .volumes
            .values()
            .filter(|v| v.name == name && visible(&self.namespace, &v.namespace))
            .collect();
        match matches.len() {
            0 => Err(VesselError::NoSuchVolume(name.to_string())),
            1 => Ok(matches[0].clone()),
            _ => Err(VesselError::AmbiguousId(name.to_string())),
        }
    }

    fn save_volume(&mut self, vol: &VolumeRecord) -> VesselResult<()> {
        self.check_open()?;

        let key = (vol.namespace.clone(), vol.name.clone());
        let existing = self
            .volumes
            .get_mut(&key)
            .filter(|v| visible(&self.namespace, &v.namespace))
            .ok_or_else(|| VesselError::NoSuchVolume(vol.name.clone()))?;
        *existing = vol.clone();
        Ok(())
    }

    fn remove_volume(&mut self, name: &str) -> VesselResult<()> {
        self.check_open()?;

        let key = self
            .volumes
            .values()
            .find(|v| v.name == name && visible(&self.namespace, &v.namespace))
            .map(|v| (v.namespace.clone(), v.name.clone()))
            .ok_or_else(|| VesselError::NoSuchVolume(name.to_string()))?;
        self.volumes.remove(&key);
        Ok(())
    }

    fn all_volumes(&self) -> VesselResult<Vec<VolumeRecord>> {
        self.check_open()?;
        Ok(self
            .volumes
            .values()
            .filter(|v| visible(&self.namespace, &v.namespace))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ContainerConfig, ContainerStatus, PodConfig, VolumeConfig};
    use crate::lock::LockId;
    use std::path::Path;

    fn ctr_with_id(id: &str, name: &str, ns: &str) -> ContainerRecord {
        let mut rec = ContainerRecord::new(
            name.to_string(),
            ns.to_string(),
            LockId::new(0),
            ContainerConfig {
                image: "alpine:latest".to_string(),
                ..Default::default()
            },
        );
        rec.id = ContainerId::parse(&format!("{id:0<64}")).unwrap();
        rec
    }

    #[test]
    fn test_container_roundtrip_by_id_name_prefix() {
        let mut state = InMemoryState::new();
        let rec = ctr_with_id("aa11", "web", "");
        state.add_container(&rec).unwrap();

        let by_id = state.lookup_container(rec.id.as_str()).unwrap();
        let by_name = state.lookup_container("web").unwrap();
        let by_prefix = state.lookup_container("aa11").unwrap();

        assert_eq!(by_id.id, rec.id);
        assert_eq!(by_name.id, rec.id);
        assert_eq!(by_prefix.id, rec.id);
    }

    #[test]
    fn test_ambiguous_prefix_is_distinct_from_not_found() {
        let mut state = InMemoryState::new();
        state.add_container(&ctr_with_id("ab1", "one", "")).unwrap();
        state.add_container(&ctr_with_id("ab2", "two", "")).unwrap();

        let err = state.lookup_container("ab").unwrap_err();
        assert!(matches!(err, VesselError::AmbiguousId(_)));

        let err = state.lookup_container("ff").unwrap_err();
        assert!(matches!(err, VesselError::NoSuchContainer(_)));
    }

    #[test]
    fn test_duplicate_name_rejected_in_same_namespace() {
        let mut state = InMemoryState::new();
        state.add_container(&ctr_with_id("aa", "web", "")).unwrap();

        let err = state
            .add_container(&ctr_with_id("bb", "web", ""))
            .unwrap_err();
        assert!(matches!(err, VesselError::AlreadyExists(_)));

        // Same name in another namespace is fine.
        state.add_container(&ctr_with_id("cc", "web", "dev")).unwrap();
    }

    #[test]
    fn test_namespace_scoping() {
        let mut state = InMemoryState::new();
        state.add_container(&ctr_with_id("aa", "a", "prod")).unwrap();
        state.add_container(&ctr_with_id("bb", "b", "dev")).unwrap();
        state.add_container(&ctr_with_id("cc", "c", "")).unwrap();

        state.set_namespace("prod").unwrap();
        let names: Vec<String> = state
            .all_containers()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"a".to_string()));
        assert!(names.contains(&"c".to_string()));

        assert!(state.lookup_container("b").unwrap_err().is_not_found());

        state.set_namespace("").unwrap();
        assert_eq!(state.all_containers().unwrap().len(), 3);
    }

    #[test]
    fn test_refresh_clears_transient_fields() {
        let mut state = InMemoryState::new();
        let mut rec = ctr_with_id("aa", "web", "");
        rec.set_status(ContainerStatus::Running).unwrap();
        rec.pid = Some(100);
        state.add_container(&rec).unwrap();

        let mut pod = PodRecord::new("p".to_string(), String::new(), LockId::new(1), PodConfig::default());
        pod.cgroup_path = Some("/vessel/pod".to_string());
        state.add_pod(&pod).unwrap();

        state.refresh().unwrap();

        let rec = state.container(&rec.id).unwrap();
        assert_eq!(rec.status, ContainerStatus::Stopped);
        assert!(rec.pid.is_none());
        assert!(state.pod(&pod.id).unwrap().cgroup_path.is_none());
    }

    #[test]
    fn test_volume_lookup_by_name() {
        let mut state = InMemoryState::new();
        let vol = VolumeRecord::new(
            "data".to_string(),
            String::new(),
            LockId::new(2),
            VolumeConfig::default(),
            Path::new("/volumes"),
        );
        state.add_volume(&vol).unwrap();

        assert_eq!(state.volume("data").unwrap().name, "data");
        assert!(state.volume("other").unwrap_err().is_not_found());

        let err = state.add_volume(&vol).unwrap_err();
        assert!(matches!(err, VesselError::AlreadyExists(_)));
    }

    #[test]
    fn test_operations_fail_after_close() {
        let mut state = InMemoryState::new();
        state.close().unwrap();

        let err = state.all_containers().unwrap_err();
        assert!(matches!(err, VesselError::Storage(_)));
    }
}
