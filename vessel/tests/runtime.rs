//! Integration tests for runtime bootstrap, reboot recovery, and shutdown.

mod common;

use std::path::PathBuf;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use common::test_options;
use vessel::lock::{FileLockManager, LockManager};
use vessel::{
    ContainerConfig, ContainerStatus, LockBackend, PodConfig, Runtime, StateBackend, VesselError,
    VolumeConfig,
};

fn alpine() -> ContainerConfig {
    ContainerConfig {
        image: "alpine:latest".to_string(),
        ..Default::default()
    }
}

#[test]
fn test_bootstrap_creates_layout_and_marker() {
    let root = TempDir::new().unwrap();
    let runtime = Runtime::new(test_options(root.path())).unwrap();

    assert!(root.path().join("storage").is_dir());
    assert!(root.path().join("storage/vessel.db").is_file());
    assert!(root.path().join("tmp/alive").is_file());
    assert!(root.path().join("tmp/alive.lck").is_file());

    runtime.shutdown(false).unwrap();

    // Permanently invalid afterwards.
    assert!(matches!(
        runtime.shutdown(false).unwrap_err(),
        VesselError::RuntimeStopped
    ));
    assert!(matches!(
        runtime.containers().unwrap_err(),
        VesselError::RuntimeStopped
    ));
}

#[test]
fn test_reboot_detection_refreshes_exactly_once_per_boot() {
    let root = TempDir::new().unwrap();

    let (ctr_id, pod_id) = {
        let runtime = Runtime::new(test_options(root.path())).unwrap();
        let mut rec = runtime
            .new_container(Some("web".to_string()), alpine())
            .unwrap();
        let mut pod = runtime
            .new_pod(Some("infra".to_string()), PodConfig::default())
            .unwrap();
        runtime
            .new_volume(Some("data".to_string()), VolumeConfig::default())
            .unwrap();

        rec.set_status(ContainerStatus::Running).unwrap();
        rec.pid = Some(4242);
        runtime.save_container(&rec).unwrap();

        pod.cgroup_path = Some("/vessel.slice/infra".to_string());
        runtime.save_pod(&pod).unwrap();

        drop(runtime);
        (rec.id, pod.id)
    };

    // Same boot: the marker is present, so nothing is refreshed and the
    // last-known state survives.
    {
        let runtime = Runtime::new(test_options(root.path())).unwrap();
        let rec = runtime.container(&ctr_id).unwrap();
        assert_eq!(rec.status, ContainerStatus::Running);
        assert_eq!(rec.pid, Some(4242));
        assert!(runtime.pod(&pod_id).unwrap().cgroup_path.is_some());
        drop(runtime);
    }

    // Simulate a reboot by clearing the marker from the tmp directory.
    std::fs::remove_file(root.path().join("tmp/alive")).unwrap();

    let runtime = Runtime::new(test_options(root.path())).unwrap();
    let rec = runtime.container(&ctr_id).unwrap();
    assert_eq!(rec.status, ContainerStatus::Stopped);
    assert!(rec.pid.is_none());
    assert!(runtime.pod(&pod_id).unwrap().cgroup_path.is_none());
    assert!(root.path().join("tmp/alive").is_file());

    // Transient run state was rebuilt for every entity.
    assert!(
        root.path()
            .join("tmp/containers")
            .join(ctr_id.as_str())
            .is_dir()
    );
    assert!(root.path().join("tmp/pods").join(pod_id.as_str()).is_dir());
    assert!(
        runtime
            .volume("data")
            .unwrap()
            .mount_point
            .is_dir()
    );
}

#[test]
fn test_pool_size_change_requires_renumber() {
    let root = TempDir::new().unwrap();

    {
        let mut opts = test_options(root.path());
        opts.num_locks = Some(8);
        let runtime = Runtime::new(opts).unwrap();
        runtime.new_container(Some("a".to_string()), alpine()).unwrap();
        runtime.new_container(Some("b".to_string()), alpine()).unwrap();
        runtime.new_volume(Some("data".to_string()), VolumeConfig::default()).unwrap();
        drop(runtime);
    }

    // A different pool size without renumbering is fatal.
    let mut opts = test_options(root.path());
    opts.num_locks = Some(4);
    assert!(matches!(
        Runtime::new(opts).unwrap_err(),
        VesselError::LockPoolSizeMismatch {
            found: 8,
            configured: 4
        }
    ));

    // With renumbering, every entity is reconciled to a valid index
    // before the runtime reports usable.
    let mut opts = test_options(root.path());
    opts.num_locks = Some(4);
    opts.renumber = true;
    let runtime = Runtime::new(opts).unwrap();

    let mut indices: Vec<u32> = runtime
        .containers()
        .unwrap()
        .iter()
        .map(|c| c.lock.index())
        .chain(runtime.volumes().unwrap().iter().map(|v| v.lock.index()))
        .collect();
    indices.sort_unstable();
    indices.dedup();
    assert_eq!(indices.len(), 3, "entities must not share an index");
    assert!(indices.iter().all(|i| *i < 4));
    drop(runtime);

    let pool = FileLockManager::open(&root.path().join("storage/locks"), 4).unwrap();
    assert_eq!(pool.allocated_count().unwrap(), 3);
}

#[test]
fn test_shm_medium_lost_on_reboot_is_reconciled() {
    let root = TempDir::new().unwrap();
    let make_opts = || {
        let mut opts = test_options(root.path());
        opts.lock_backend = LockBackend::Shm;
        opts.shm_dir = Some(root.path().join("shm"));
        opts.shm_name = Some("test-locks".to_string());
        opts
    };

    let rec = {
        let runtime = Runtime::new(make_opts()).unwrap();
        let rec = runtime
            .new_container(Some("web".to_string()), alpine())
            .unwrap();
        drop(runtime);
        rec
    };

    // A reboot clears both the tmpfs lock segment and the tmp directory.
    std::fs::remove_file(root.path().join("shm/test-locks")).unwrap();
    std::fs::remove_file(root.path().join("tmp/alive")).unwrap();

    let runtime = Runtime::new(make_opts()).unwrap();

    // The refresh pass re-marked the container's stored index as
    // allocated in the fresh segment, so new entities cannot collide.
    let other = runtime
        .new_container(Some("db".to_string()), alpine())
        .unwrap();
    assert_ne!(other.lock, rec.lock);

    let mut lock = runtime.lock_for(rec.lock).unwrap();
    lock.lock().unwrap();
    lock.unlock().unwrap();
}

#[test]
fn test_shutdown_refuses_running_containers_unless_forced() {
    let root = TempDir::new().unwrap();
    let runtime = Runtime::new(test_options(root.path())).unwrap();

    let mut rec = runtime
        .new_container(Some("web".to_string()), alpine())
        .unwrap();
    rec.set_status(ContainerStatus::Running).unwrap();
    runtime.save_container(&rec).unwrap();

    let err = runtime.shutdown(false).unwrap_err();
    assert!(matches!(err, VesselError::InvalidState(_)));

    // Still usable after the refused shutdown.
    assert_eq!(runtime.containers().unwrap().len(), 1);

    runtime.shutdown(true).unwrap();

    // The forced shutdown stopped the container before closing the store.
    let runtime = Runtime::new(test_options(root.path())).unwrap();
    let rec = runtime.container(&rec.id).unwrap();
    assert_eq!(rec.status, ContainerStatus::Stopped);
}

#[test]
fn test_incompatible_config_fails_fast() {
    let root = TempDir::new().unwrap();
    drop(Runtime::new(test_options(root.path())).unwrap());

    let mut opts = test_options(root.path());
    opts.graph_root = Some(PathBuf::from("/somewhere/else"));
    assert!(matches!(
        Runtime::new(opts).unwrap_err(),
        VesselError::IncompatibleConfig(_)
    ));
}

#[test]
fn test_unset_options_adopt_stored_config() {
    let root = TempDir::new().unwrap();
    drop(Runtime::new(test_options(root.path())).unwrap());

    // Same store, but graph root left unset: the snapshot fills it in.
    let mut opts = test_options(root.path());
    opts.graph_root = None;
    let runtime = Runtime::new(opts).unwrap();
    assert_eq!(
        runtime.config().unwrap().graph_root,
        root.path().join("graph")
    );
}

#[test]
fn test_cancelled_bootstrap_returns_interrupted() {
    let root = TempDir::new().unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let err = Runtime::with_cancellation(test_options(root.path()), &token).unwrap_err();
    assert!(matches!(err, VesselError::Interrupted(_)));
}

#[test]
fn test_in_memory_backend() {
    let root = TempDir::new().unwrap();
    let mut opts = test_options(root.path());
    opts.state_backend = StateBackend::InMemory;

    let runtime = Runtime::new(opts).unwrap();
    let rec = runtime
        .new_container(Some("scratch".to_string()), alpine())
        .unwrap();
    assert_eq!(runtime.lookup_container("scratch").unwrap().id, rec.id);
    runtime.shutdown(false).unwrap();
}

#[test]
fn test_default_runtime_path() {
    let root = TempDir::new().unwrap();
    let runtime = Runtime::new(test_options(root.path())).unwrap();

    assert_eq!(
        runtime.default_runtime_path().unwrap(),
        PathBuf::from("/bin/sh")
    );
    let sh = runtime.oci_runtime("sh").unwrap();
    assert!(!sh.supports_json());
}
