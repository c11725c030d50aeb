//! Shared helpers for integration tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use vessel::net::NetworkConfig;
use vessel::oci::OciConfig;
use vessel::{LockBackend, RuntimeOptions, StateBackend};

/// Options rooted in an isolated directory, with every shared resource
/// (store, lock medium, network config) scoped under it.
pub fn test_options(root: &Path) -> RuntimeOptions {
    RuntimeOptions {
        home_dir: Some(root.join("home")),
        static_dir: Some(root.join("storage")),
        tmp_dir: Some(root.join("tmp")),
        volume_dir: Some(root.join("volumes")),
        graph_root: Some(root.join("graph")),
        num_locks: Some(32),
        lock_backend: LockBackend::File,
        state_backend: StateBackend::Sqlite,
        oci: sh_runtime(),
        network: NetworkConfig {
            config_dir: root.join("cni"),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Registry configuration pointing at /bin/sh, which exists everywhere the
/// tests run.
pub fn sh_runtime() -> OciConfig {
    OciConfig {
        runtimes: HashMap::from([("sh".to_string(), vec![PathBuf::from("/bin/sh")])]),
        default_runtime: Some("sh".to_string()),
        ..Default::default()
    }
}
