//! Network-setup plugin handle.
//!
//! The engine selects the plugin once at bootstrap and carries its
//! configuration; the plugin's own behavior (interface creation, address
//! management) lives outside the core. Initialization is skipped entirely
//! in unprivileged execution contexts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use vessel_shared::errors::{VesselError, VesselResult};

/// Static configuration for the network-setup plugin.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network selected when a container does not name one.
    #[serde(default)]
    pub default_network: Option<String>,

    /// Directory holding network configuration files.
    pub config_dir: PathBuf,

    /// Directories searched for plugin executables.
    pub plugin_dirs: Vec<PathBuf>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            default_network: None,
            config_dir: PathBuf::from("/etc/cni/net.d"),
            plugin_dirs: vec![
                PathBuf::from("/usr/libexec/cni"),
                PathBuf::from("/opt/cni/bin"),
            ],
        }
    }
}

/// Handle to the configured network-setup plugin.
#[derive(Clone, Debug)]
pub struct NetworkPlugin {
    config: NetworkConfig,
}

impl NetworkPlugin {
    /// Initialize the plugin, making sure its configuration directory
    /// exists.
    pub fn init(config: &NetworkConfig) -> VesselResult<Self> {
        std::fs::create_dir_all(&config.config_dir).map_err(|e| {
            VesselError::Storage(format!(
                "failed to create network config dir {}: {e}",
                config.config_dir.display()
            ))
        })?;

        tracing::debug!(
            config_dir = %config.config_dir.display(),
            "initialized network plugin"
        );

        Ok(Self {
            config: config.clone(),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config.config_dir
    }

    pub fn default_network(&self) -> Option<&str> {
        self.config.default_network.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_config_dir() {
        let dir = TempDir::new().unwrap();
        let config = NetworkConfig {
            config_dir: dir.path().join("net.d"),
            ..Default::default()
        };

        let plugin = NetworkPlugin::init(&config).unwrap();
        assert!(plugin.config_dir().exists());
        assert!(plugin.default_network().is_none());
    }
}
