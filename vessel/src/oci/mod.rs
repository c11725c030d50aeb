//! OCI runtime registry.
//!
//! Maps configured low-level runtime names to executable paths plus two
//! capability flags (JSON-file logging, cgroup-less operation). Both flags
//! come from static configuration lookups, never from probing the binary.
//! The registry always holds at least one entry and exactly one designated
//! default, or configuration fails.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use vessel_shared::errors::{VesselError, VesselResult};

/// Static OCI runtime configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OciConfig {
    /// Runtime name to candidate executable paths, tried in order.
    #[serde(default)]
    pub runtimes: HashMap<String, Vec<PathBuf>>,

    /// Name of the default runtime, or an absolute path to its executable.
    #[serde(default)]
    pub default_runtime: Option<String>,

    /// Deprecated single path-list configuration. When present, the first
    /// entry's basename names the default runtime and this table wins over
    /// `default_runtime`.
    #[serde(default)]
    pub runtime_path: Option<Vec<PathBuf>>,

    /// Runtimes that support JSON-file log output.
    #[serde(default)]
    pub runtime_supports_json: Vec<String>,

    /// Runtimes that can run containers without cgroups.
    #[serde(default)]
    pub runtime_supports_nocgroups: Vec<String>,
}

/// A usable low-level execution runtime.
#[derive(Clone, Debug)]
pub struct OciRuntime {
    name: String,
    path: PathBuf,
    supports_json: bool,
    supports_nocgroups: bool,
}

impl OciRuntime {
    fn configure(
        name: &str,
        paths: &[PathBuf],
        supports_json: bool,
        supports_nocgroups: bool,
    ) -> VesselResult<Self> {
        for path in paths {
            if path.is_file() {
                return Ok(Self {
                    name: name.to_string(),
                    path: path.clone(),
                    supports_json,
                    supports_nocgroups,
                });
            }
        }
        Err(VesselError::Config(format!(
            "no usable executable found for OCI runtime {name}"
        )))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the runtime executable.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn supports_json(&self) -> bool {
        self.supports_json
    }

    pub fn supports_nocgroups(&self) -> bool {
        self.supports_nocgroups
    }
}

/// Resolved registry of usable runtimes plus the designated default.
#[derive(Clone, Debug)]
pub struct OciRegistry {
    runtimes: HashMap<String, Arc<OciRuntime>>,
    default: Arc<OciRuntime>,
}

impl OciRegistry {
    /// Build the registry from static configuration.
    ///
    /// Resolution order for the default: the deprecated `runtime_path`
    /// list if present, then the `default_runtime` entry. A configured
    /// runtime whose binary is missing is skipped with a warning, unless
    /// it was required as the default, which is fatal.
    pub fn configure(cfg: &OciConfig) -> VesselResult<Self> {
        let supports_json = |name: &str| cfg.runtime_supports_json.iter().any(|n| n == name);
        let supports_nocgroups =
            |name: &str| cfg.runtime_supports_nocgroups.iter().any(|n| n == name);

        let mut runtimes: HashMap<String, Arc<OciRuntime>> = HashMap::new();
        let mut default: Option<Arc<OciRuntime>> = None;

        if let Some(paths) = &cfg.runtime_path {
            tracing::warn!(
                "runtime_path is deprecated; use the runtimes table and default_runtime instead"
            );
            if paths.is_empty() {
                return Err(VesselError::Config(
                    "empty runtime_path array passed".to_string(),
                ));
            }

            let name = basename(&paths[0])?;
            let rt = Arc::new(OciRuntime::configure(
                &name,
                paths,
                supports_json(&name),
                supports_nocgroups(&name),
            )?);
            runtimes.insert(name, Arc::clone(&rt));
            default = Some(rt);
        }

        for (name, paths) in &cfg.runtimes {
            if runtimes.contains_key(name) {
                continue;
            }
            match OciRuntime::configure(name, paths, supports_json(name), supports_nocgroups(name))
            {
                Ok(rt) => {
                    runtimes.insert(name.clone(), Arc::new(rt));
                }
                Err(e) => {
                    // Configs may list optional runtimes that are not
                    // installed; only the default is load-bearing.
                    tracing::warn!(runtime = %name, error = %e, "skipping unusable OCI runtime");
                }
            }
        }

        if default.is_none() {
            match cfg.default_runtime.as_deref() {
                Some(path) if path.starts_with('/') => {
                    let path = PathBuf::from(path);
                    let name = basename(&path)?;
                    let rt = Arc::new(OciRuntime::configure(
                        &name,
                        std::slice::from_ref(&path),
                        supports_json(&name),
                        supports_nocgroups(&name),
                    )?);
                    runtimes.insert(name, Arc::clone(&rt));
                    default = Some(rt);
                }
                Some(name) => {
                    let rt = runtimes.get(name).cloned().ok_or_else(|| {
                        VesselError::Config(format!("default OCI runtime {name} not found"))
                    })?;
                    default = Some(rt);
                }
                None => {}
            }
        }

        if runtimes.is_empty() {
            return Err(VesselError::Config(
                "no OCI runtime has been configured".to_string(),
            ));
        }
        let Some(default) = default else {
            return Err(VesselError::Config(
                "no default OCI runtime was configured".to_string(),
            ));
        };

        tracing::debug!(
            default = %default.name(),
            count = runtimes.len(),
            "configured OCI runtime registry"
        );

        Ok(Self { runtimes, default })
    }

    /// Look up a runtime by name.
    pub fn get(&self, name: &str) -> Option<Arc<OciRuntime>> {
        self.runtimes.get(name).cloned()
    }

    /// The designated default runtime.
    pub fn default_runtime(&self) -> &Arc<OciRuntime> {
        &self.default
    }

    /// Names of all usable runtimes.
    pub fn names(&self) -> Vec<&str> {
        self.runtimes.keys().map(String::as_str).collect()
    }
}

fn basename(path: &Path) -> VesselResult<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            VesselError::Config(format!(
                "cannot derive a runtime name from path {}",
                path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_binary(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        path
    }

    #[test]
    fn test_named_default_with_capabilities() {
        let dir = TempDir::new().unwrap();
        let runc = fake_binary(dir.path(), "runc");
        let crun = fake_binary(dir.path(), "crun");

        let cfg = OciConfig {
            runtimes: HashMap::from([
                ("runc".to_string(), vec![runc]),
                ("crun".to_string(), vec![crun]),
            ]),
            default_runtime: Some("runc".to_string()),
            runtime_supports_json: vec!["crun".to_string()],
            runtime_supports_nocgroups: vec!["crun".to_string()],
            ..Default::default()
        };

        let registry = OciRegistry::configure(&cfg).unwrap();
        assert_eq!(registry.default_runtime().name(), "runc");
        assert!(!registry.default_runtime().supports_json());

        let crun = registry.get("crun").unwrap();
        assert!(crun.supports_json());
        assert!(crun.supports_nocgroups());
        assert!(registry.get("kata").is_none());
    }

    #[test]
    fn test_missing_binary_is_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let runc = fake_binary(dir.path(), "runc");

        let cfg = OciConfig {
            runtimes: HashMap::from([
                ("runc".to_string(), vec![runc]),
                ("kata".to_string(), vec![dir.path().join("no-such-binary")]),
            ]),
            default_runtime: Some("runc".to_string()),
            ..Default::default()
        };

        let registry = OciRegistry::configure(&cfg).unwrap();
        assert!(registry.get("kata").is_none());
        assert_eq!(registry.names().len(), 1);
    }

    #[test]
    fn test_missing_default_is_fatal() {
        let dir = TempDir::new().unwrap();

        let cfg = OciConfig {
            runtimes: HashMap::from([(
                "kata".to_string(),
                vec![dir.path().join("no-such-binary")],
            )]),
            default_runtime: Some("kata".to_string()),
            ..Default::default()
        };

        let err = OciRegistry::configure(&cfg).unwrap_err();
        assert!(matches!(err, VesselError::Config(_)));
    }

    #[test]
    fn test_legacy_runtime_path_wins() {
        let dir = TempDir::new().unwrap();
        let legacy = fake_binary(dir.path(), "oldrunc");
        let runc = fake_binary(dir.path(), "runc");

        let cfg = OciConfig {
            runtime_path: Some(vec![legacy]),
            runtimes: HashMap::from([("runc".to_string(), vec![runc])]),
            default_runtime: Some("runc".to_string()),
            ..Default::default()
        };

        let registry = OciRegistry::configure(&cfg).unwrap();
        assert_eq!(registry.default_runtime().name(), "oldrunc");
        assert!(registry.get("runc").is_some());
    }

    #[test]
    fn test_path_style_default() {
        let dir = TempDir::new().unwrap();
        let crun = fake_binary(dir.path(), "crun");

        let cfg = OciConfig {
            default_runtime: Some(crun.to_string_lossy().into_owned()),
            ..Default::default()
        };

        let registry = OciRegistry::configure(&cfg).unwrap();
        assert_eq!(registry.default_runtime().name(), "crun");
        assert_eq!(registry.default_runtime().path(), crun.as_path());
    }

    #[test]
    fn test_empty_configuration_is_fatal() {
        let err = OciRegistry::configure(&OciConfig::default()).unwrap_err();
        assert!(matches!(err, VesselError::Config(_)));
    }
}
