//! Pluggable state store for entity records.
//!
//! The store persists containers, pods, and volumes and answers lookups;
//! it does not enforce locking. Callers mutate a record only while holding
//! the entity's lock, by convention enforced at the runtime layer.
//!
//! Two backends: [`InMemoryState`] (ephemeral, for tests and throwaway
//! runtimes) and [`SqliteState`] (embedded transactional store on disk).

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryState;
pub use sqlite::SqliteState;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use vessel_shared::errors::VesselResult;

use crate::entities::{ContainerId, ContainerRecord, PodId, PodRecord, VolumeRecord};

/// Schema version written into fresh stores.
pub const SCHEMA_VERSION: u32 = 1;

/// Snapshot of the configuration in effect when the store was first
/// created.
///
/// Later invocations must reconcile their configuration against this
/// snapshot: unset values adopt it, explicit conflicting values abort
/// bootstrap rather than silently operating on mismatched data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    pub schema_version: u32,
    pub graph_root: PathBuf,
    pub graph_driver: String,
    pub static_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub volume_dir: PathBuf,
}

/// Namespace visibility rule shared by all backends.
///
/// An unscoped runtime (empty active namespace) sees everything; a scoped
/// runtime sees its own namespace plus unscoped entities.
pub(crate) fn visible(active_ns: &str, entity_ns: &str) -> bool {
    active_ns.is_empty() || entity_ns.is_empty() || active_ns == entity_ns
}

/// Persistent entity store.
///
/// Lookup terms resolve in order: exact ID match, exact name match,
/// unambiguous ID-prefix match. A prefix matching several entities fails
/// with `AmbiguousId`, distinctly from not-found.
pub trait State: Send {
    /// The store's creation-time configuration snapshot, if the backend
    /// persists one.
    fn db_config(&self) -> VesselResult<Option<DbConfig>>;

    /// Scope all subsequent operations to `ns` (empty = unscoped).
    fn set_namespace(&mut self, ns: &str) -> VesselResult<()>;

    /// Clear store-level transient fields (PIDs, cgroup paths) in
    /// preparation for a reboot-recovery pass. Entity configuration is
    /// untouched.
    fn refresh(&mut self) -> VesselResult<()>;

    /// Release backend resources. Subsequent operations fail.
    fn close(&mut self) -> VesselResult<()>;

    fn add_container(&mut self, ctr: &ContainerRecord) -> VesselResult<()>;
    fn container(&self, id: &ContainerId) -> VesselResult<ContainerRecord>;
    fn lookup_container(&self, term: &str) -> VesselResult<ContainerRecord>;
    fn save_container(&mut self, ctr: &ContainerRecord) -> VesselResult<()>;
    fn remove_container(&mut self, id: &ContainerId) -> VesselResult<()>;
    fn all_containers(&self) -> VesselResult<Vec<ContainerRecord>>;

    fn add_pod(&mut self, pod: &PodRecord) -> VesselResult<()>;
    fn pod(&self, id: &PodId) -> VesselResult<PodRecord>;
    fn lookup_pod(&self, term: &str) -> VesselResult<PodRecord>;
    fn save_pod(&mut self, pod: &PodRecord) -> VesselResult<()>;
    fn remove_pod(&mut self, id: &PodId) -> VesselResult<()>;
    fn all_pods(&self) -> VesselResult<Vec<PodRecord>>;

    fn add_volume(&mut self, vol: &VolumeRecord) -> VesselResult<()>;
    fn volume(&self, name: &str) -> VesselResult<VolumeRecord>;
    fn save_volume(&mut self, vol: &VolumeRecord) -> VesselResult<()>;
    fn remove_volume(&mut self, name: &str) -> VesselResult<()>;
    fn all_volumes(&self) -> VesselResult<Vec<VolumeRecord>>;
}
