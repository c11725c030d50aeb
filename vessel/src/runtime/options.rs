//! Runtime configuration: user-facing options and their resolved form.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use vessel_shared::constants::{defaults, dirs as dir_names};
use vessel_shared::errors::{VesselError, VesselResult};

use crate::net::NetworkConfig;
use crate::oci::OciConfig;
use crate::runtime::constants::envs;
use crate::state::{DbConfig, SCHEMA_VERSION};

/// Which backend holds the cross-process lock pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    /// Segment file on a tmpfs-backed directory. Fast; lost on reboot.
    Shm,
    /// Directory of per-index lock files. Portable; survives reboot.
    File,
}

/// Which backend persists entity records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// Ephemeral in-process maps. Nothing survives the process.
    InMemory,
    /// Embedded transactional store on disk.
    Sqlite,
}

/// User-facing runtime options.
///
/// Path and sizing fields are `Option`: `None` means "not explicitly set",
/// which lets bootstrap adopt the store's persisted values instead of
/// failing on a difference. Explicitly set values that conflict with the
/// store abort bootstrap.
#[derive(Clone, Debug)]
pub struct RuntimeOptions {
    pub home_dir: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
    pub tmp_dir: Option<PathBuf>,
    pub volume_dir: Option<PathBuf>,
    pub graph_root: Option<PathBuf>,
    pub graph_driver: Option<String>,

    /// Store namespace this runtime operates in (empty = unscoped).
    pub namespace: String,

    pub num_locks: Option<u32>,
    pub lock_backend: LockBackend,

    /// Directory holding the shm lock segment. Defaults to `/dev/shm`.
    pub shm_dir: Option<PathBuf>,

    /// Name of the shm lock segment. Defaults to a per-user name; the
    /// name actually used is recorded in the static directory so later
    /// invocations agree on it.
    pub shm_name: Option<String>,

    /// Recreate the lock pool and reassign every entity's lock index when
    /// the configured pool size differs from the existing medium.
    pub renumber: bool,

    pub state_backend: StateBackend,
    pub oci: OciConfig,
    pub network: NetworkConfig,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            home_dir: None,
            static_dir: None,
            tmp_dir: None,
            volume_dir: None,
            graph_root: None,
            graph_driver: None,
            namespace: String::new(),
            num_locks: None,
            lock_backend: LockBackend::Shm,
            shm_dir: None,
            shm_name: None,
            renumber: false,
            state_backend: StateBackend::Sqlite,
            oci: OciConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

/// Effective configuration after defaults are applied.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub home_dir: PathBuf,
    pub static_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub volume_dir: PathBuf,
    pub graph_root: PathBuf,
    pub graph_driver: String,
    pub namespace: String,
    pub num_locks: u32,
    pub lock_backend: LockBackend,
    pub shm_dir: PathBuf,
    pub shm_name: String,
    pub renumber: bool,
    pub state_backend: StateBackend,
    pub oci: OciConfig,
    pub network: NetworkConfig,
}

impl RuntimeConfig {
    /// Apply defaults to the given options.
    pub fn resolve(opts: &RuntimeOptions) -> VesselResult<Self> {
        let home_dir = opts
            .home_dir
            .clone()
            .or_else(|| std::env::var_os(envs::VESSEL_HOME).map(PathBuf::from))
            .or_else(|| dirs::home_dir().map(|h| h.join(dir_names::VESSEL_DIR)))
            .ok_or_else(|| {
                VesselError::Config("cannot determine the engine home directory".to_string())
            })?;

        if !home_dir.is_absolute() {
            return Err(VesselError::Config(format!(
                "home directory must be an absolute path, got {}",
                home_dir.display()
            )));
        }

        let euid = unsafe { libc::geteuid() };

        let tmp_dir = opts.tmp_dir.clone().unwrap_or_else(|| {
            std::env::var_os(envs::XDG_RUNTIME_DIR)
                .map(|d| PathBuf::from(d).join("vessel"))
                .unwrap_or_else(|| std::env::temp_dir().join(format!("vessel-run-{euid}")))
        });

        let num_locks = opts.num_locks.unwrap_or(defaults::NUM_LOCKS);
        if num_locks == 0 {
            return Err(VesselError::Config(
                "num_locks must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            static_dir: opts
                .static_dir
                .clone()
                .unwrap_or_else(|| home_dir.join(dir_names::STORAGE_DIR)),
            tmp_dir,
            volume_dir: opts
                .volume_dir
                .clone()
                .unwrap_or_else(|| home_dir.join(dir_names::VOLUMES_DIR)),
            graph_root: opts
                .graph_root
                .clone()
                .unwrap_or_else(|| home_dir.join(dir_names::GRAPH_DIR)),
            graph_driver: opts
                .graph_driver
                .clone()
                .unwrap_or_else(|| defaults::GRAPH_DRIVER.to_string()),
            namespace: opts.namespace.clone(),
            num_locks,
            lock_backend: opts.lock_backend,
            shm_dir: opts
                .shm_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("/dev/shm")),
            shm_name: opts
                .shm_name
                .clone()
                .unwrap_or_else(|| format!("vessel-locks-{euid}")),
            renumber: opts.renumber,
            state_backend: opts.state_backend,
            oci: opts.oci.clone(),
            network: opts.network.clone(),
            home_dir,
        })
    }

    /// Logs directory derived from the home.
    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join(dir_names::LOGS_DIR)
    }

    /// Reconcile this configuration against the store's snapshot.
    ///
    /// Values the user did not explicitly set adopt the snapshot; values
    /// the user did set must match it or bootstrap fails, rather than
    /// silently operating on mismatched data.
    pub(crate) fn merge_db_config(
        &mut self,
        opts: &RuntimeOptions,
        db: &DbConfig,
    ) -> VesselResult<()> {
        merge_path(
            &mut self.graph_root,
            opts.graph_root.is_some(),
            &db.graph_root,
            "graph root",
        )?;
        merge_string(
            &mut self.graph_driver,
            opts.graph_driver.is_some(),
            &db.graph_driver,
            "graph driver",
        )?;
        merge_path(
            &mut self.volume_dir,
            opts.volume_dir.is_some(),
            &db.volume_dir,
            "volume dir",
        )?;
        merge_path(
            &mut self.tmp_dir,
            opts.tmp_dir.is_some(),
            &db.tmp_dir,
            "tmp dir",
        )?;

        // The static dir is how the store was found in the first place; a
        // difference means the store was moved or copied.
        if self.static_dir != db.static_dir {
            return Err(VesselError::IncompatibleConfig(format!(
                "static dir {} does not match stored static dir {}",
                self.static_dir.display(),
                db.static_dir.display()
            )));
        }

        Ok(())
    }

    /// Snapshot recorded into a freshly created store.
    pub(crate) fn db_snapshot(&self) -> DbConfig {
        DbConfig {
            schema_version: SCHEMA_VERSION,
            graph_root: self.graph_root.clone(),
            graph_driver: self.graph_driver.clone(),
            static_dir: self.static_dir.clone(),
            tmp_dir: self.tmp_dir.clone(),
            volume_dir: self.volume_dir.clone(),
        }
    }
}

fn merge_path(
    current: &mut PathBuf,
    explicit: bool,
    stored: &Path,
    what: &str,
) -> VesselResult<()> {
    if current.as_path() == stored {
        return Ok(());
    }
    if explicit {
        return Err(VesselError::IncompatibleConfig(format!(
            "{what} {} does not match stored {what} {}",
            current.display(),
            stored.display()
        )));
    }
    tracing::debug!(
        what,
        stored = %stored.display(),
        "adopting stored configuration value"
    );
    *current = stored.to_path_buf();
    Ok(())
}

fn merge_string(current: &mut String, explicit: bool, stored: &str, what: &str) -> VesselResult<()> {
    if current == stored {
        return Ok(());
    }
    if explicit {
        return Err(VesselError::IncompatibleConfig(format!(
            "{what} {current} does not match stored {what} {stored}"
        )));
    }
    tracing::debug!(what, stored, "adopting stored configuration value");
    *current = stored.to_string();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts_with_home(home: &Path) -> RuntimeOptions {
        RuntimeOptions {
            home_dir: Some(home.to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_defaults_under_home() {
        let opts = opts_with_home(Path::new("/srv/vessel"));
        let config = RuntimeConfig::resolve(&opts).unwrap();

        assert_eq!(config.static_dir, PathBuf::from("/srv/vessel/storage"));
        assert_eq!(config.graph_root, PathBuf::from("/srv/vessel/graph"));
        assert_eq!(config.volume_dir, PathBuf::from("/srv/vessel/volumes"));
        assert_eq!(config.graph_driver, "overlay");
        assert_eq!(config.num_locks, defaults::NUM_LOCKS);
        assert_eq!(config.lock_backend, LockBackend::Shm);
    }

    #[test]
    fn test_resolve_rejects_relative_home() {
        let opts = opts_with_home(Path::new("relative/home"));
        assert!(matches!(
            RuntimeConfig::resolve(&opts).unwrap_err(),
            VesselError::Config(_)
        ));
    }

    #[test]
    fn test_resolve_rejects_zero_locks() {
        let mut opts = opts_with_home(Path::new("/srv/vessel"));
        opts.num_locks = Some(0);
        assert!(matches!(
            RuntimeConfig::resolve(&opts).unwrap_err(),
            VesselError::Config(_)
        ));
    }

    #[test]
    fn test_merge_adopts_stored_values_when_unset() {
        let opts = opts_with_home(Path::new("/srv/vessel"));
        let mut config = RuntimeConfig::resolve(&opts).unwrap();

        let mut db = config.db_snapshot();
        db.graph_root = PathBuf::from("/previous/graph");
        db.graph_driver = "vfs".to_string();

        config.merge_db_config(&opts, &db).unwrap();
        assert_eq!(config.graph_root, PathBuf::from("/previous/graph"));
        assert_eq!(config.graph_driver, "vfs");
    }

    #[test]
    fn test_merge_rejects_explicit_conflicts() {
        let mut opts = opts_with_home(Path::new("/srv/vessel"));
        opts.graph_root = Some(PathBuf::from("/new/graph"));
        let mut config = RuntimeConfig::resolve(&opts).unwrap();

        let mut db = config.db_snapshot();
        db.graph_root = PathBuf::from("/previous/graph");

        let err = config.merge_db_config(&opts, &db).unwrap_err();
        assert!(matches!(err, VesselError::IncompatibleConfig(_)));
    }

    #[test]
    fn test_merge_rejects_moved_store() {
        let opts = opts_with_home(Path::new("/srv/vessel"));
        let mut config = RuntimeConfig::resolve(&opts).unwrap();

        let mut db = config.db_snapshot();
        db.static_dir = PathBuf::from("/old/location/storage");

        let err = config.merge_db_config(&opts, &db).unwrap_err();
        assert!(matches!(err, VesselError::IncompatibleConfig(_)));
    }
}
