//! Vessel - persistent-state and concurrency core of the vessel container
//! engine.
//!
//! Tracks containers, pods, and volumes across independent, short-lived
//! client invocations (each its own OS process). Concurrent invocations
//! coordinate through a cross-process lock pool; a host reboot is detected
//! through a per-boot alive marker and recovered from exactly once, under
//! a dedicated boot-lifetime lock.
//!
//! Entry point: [`Runtime::new`] with [`RuntimeOptions`].

pub mod entities;
pub mod lock;
pub mod net;
pub mod oci;
pub mod runtime;
pub mod state;

mod util;

pub use entities::{
    ContainerConfig, ContainerId, ContainerRecord, ContainerStatus, PodConfig, PodId, PodRecord,
    VolumeConfig, VolumeRecord,
};
pub use lock::LockId;
pub use runtime::options::{LockBackend, RuntimeOptions, StateBackend};
pub use runtime::{Runtime, RuntimeInfo};
pub use vessel_shared::errors::{VesselError, VesselResult};
