//! Engine runtime: bootstrap, reboot recovery, and shutdown.
//!
//! Exactly one live [`Runtime`] exists per process. Bootstrap opens the
//! state store, reconciles configuration against its snapshot, obtains the
//! cross-process lock pool (renumbering it when requested), initializes
//! the OCI runtime registry and the network plugin, and then - under the
//! boot-lifetime lock - decides whether this host has rebooted since the
//! engine was last used and refreshes every persisted entity if so.
//!
//! Concurrency across processes is carried entirely by the lock pool and
//! the boot-lifetime lock. Inside the process a single read/write guard
//! protects the validity flag: many concurrent readers, one writer during
//! shutdown.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use rand::Rng;
use tokio_util::sync::CancellationToken;

use serde::Serialize;
use vessel_shared::constants::files;
use vessel_shared::errors::{VesselError, VesselResult};

use crate::entities::{
    ContainerConfig, ContainerId, ContainerRecord, ContainerStatus, PodConfig, PodId, PodRecord,
    VolumeConfig, VolumeRecord,
};
use crate::lock::{EntityLock, FileLockManager, LockId, LockManager, ShmLockManager};
use crate::net::NetworkPlugin;
use crate::oci::{OciRegistry, OciRuntime};
use crate::runtime::alive::{self, AliveLock};
use crate::runtime::constants::names;
use crate::runtime::layout::FilesystemLayout;
use crate::runtime::options::{LockBackend, RuntimeConfig, RuntimeOptions, StateBackend};
use crate::state::{InMemoryState, SqliteState, State};
use crate::util::init_logging_for;

/// Aggregate counts computed from every record's last-known status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeInfo {
    pub containers: usize,
    pub running: usize,
    pub paused: usize,
    pub stopped: usize,
    pub pods: usize,
    pub volumes: usize,
}

/// Process-wide engine handle.
///
/// Cheaply cloneable; all clones share the same state. Permanently invalid
/// after [`Runtime::shutdown`]: every later operation fails with
/// `RuntimeStopped`.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    config: RuntimeConfig,
    layout: FilesystemLayout,
    state: Mutex<Box<dyn State>>,
    lock_manager: Arc<dyn LockManager>,
    oci: OciRegistry,
    net_plugin: Option<NetworkPlugin>,
    valid: RwLock<bool>,
}

// ============================================================================
// BOOTSTRAP
// ============================================================================

impl Runtime {
    /// Bootstrap a runtime from the given options.
    pub fn new(options: RuntimeOptions) -> VesselResult<Self> {
        Self::with_cancellation(options, &CancellationToken::new())
    }

    /// Bootstrap a runtime, honoring `token` between phases.
    ///
    /// Cancellation is only acted on before the boot-lifetime lock is
    /// taken. Once the recovery pass has started it runs to completion so
    /// no entity is left with half-rebuilt transient state.
    pub fn with_cancellation(
        options: RuntimeOptions,
        token: &CancellationToken,
    ) -> VesselResult<Self> {
        let mut config = RuntimeConfig::resolve(&options)?;

        check_cancelled(token)?;

        // The static dir must exist before the store can open.
        std::fs::create_dir_all(&config.static_dir).map_err(|e| {
            VesselError::Storage(format!(
                "failed to create static dir {}: {e}",
                config.static_dir.display()
            ))
        })?;

        let mut state = open_state(&config)?;

        if let Some(db) = state.db_config()? {
            config.merge_db_config(&options, &db)?;
        }

        let layout = FilesystemLayout::new(
            config.static_dir.clone(),
            config.tmp_dir.clone(),
            config.volume_dir.clone(),
            config.logs_dir(),
        );
        layout.prepare()?;
        init_logging_for(&layout)?;

        tracing::debug!(graph_driver = %config.graph_driver, "using graph driver");
        tracing::debug!(graph_root = %config.graph_root.display(), "using graph root");
        tracing::debug!(static_dir = %config.static_dir.display(), "using static dir");
        tracing::debug!(tmp_dir = %config.tmp_dir.display(), "using tmp dir");

        check_cancelled(token)?;

        let (lock_manager, renumbered) = get_lock_manager(&config, &layout)?;
        if renumbered {
            renumber_locks(&mut *state, &*lock_manager)?;
        }

        let net_plugin = if unsafe { libc::geteuid() } == 0 {
            Some(NetworkPlugin::init(&config.network)?)
        } else {
            tracing::debug!("unprivileged execution context; skipping network plugin");
            None
        };

        let oci = OciRegistry::configure(&config.oci)?;

        check_cancelled(token)?;

        // Has this host rebooted since the engine was last used? Holding
        // the boot-lifetime lock keeps two processes from racing the
        // decision. It guards the decision, not entity state.
        {
            let _alive_guard = AliveLock::acquire(&layout.alive_lock_path())?;

            if !alive::marker_exists(&layout.alive_path())? {
                refresh_all(&mut *state, &*lock_manager, &layout, token)?;
                alive::create_marker(&layout.alive_path())?;
            }
        }

        // The recovery pass covers every namespace; scope to ours only
        // afterwards.
        state.set_namespace(&config.namespace)?;
        if !config.namespace.is_empty() {
            tracing::debug!(namespace = %config.namespace, "scoped state to namespace");
        }

        tracing::debug!("runtime is valid");

        Ok(Self {
            inner: Arc::new(RuntimeInner {
                config,
                layout,
                state: Mutex::new(state),
                lock_manager,
                oci,
                net_plugin,
                valid: RwLock::new(true),
            }),
        })
    }
}

fn check_cancelled(token: &CancellationToken) -> VesselResult<()> {
    if token.is_cancelled() {
        return Err(VesselError::Interrupted(
            "runtime bootstrap cancelled".to_string(),
        ));
    }
    Ok(())
}

fn open_state(config: &RuntimeConfig) -> VesselResult<Box<dyn State>> {
    match config.state_backend {
        StateBackend::InMemory => Ok(Box::new(InMemoryState::new())),
        StateBackend::Sqlite => {
            let path = config.static_dir.join(files::STATE_DB);
            Ok(Box::new(SqliteState::open(&path, &config.db_snapshot())?))
        }
    }
}

/// Open the configured lock medium, creating it when missing.
///
/// Returns the manager plus whether the medium was recreated with a new
/// size, in which case every stored lock index is provisionally invalid
/// until [`renumber_locks`] has run.
fn get_lock_manager(
    config: &RuntimeConfig,
    layout: &FilesystemLayout,
) -> VesselResult<(Arc<dyn LockManager>, bool)> {
    match config.lock_backend {
        LockBackend::File => {
            let dir = layout.file_locks_dir();
            match FileLockManager::open(&dir, config.num_locks) {
                Ok(manager) => Ok((Arc::new(manager), false)),
                Err(e) if e.is_lock_medium_missing() => Ok((
                    Arc::new(FileLockManager::create(&dir, config.num_locks)?),
                    false,
                )),
                Err(VesselError::LockPoolSizeMismatch { found, configured }) if config.renumber => {
                    tracing::debug!(found, configured, "lock pool size changed; recreating");
                    FileLockManager::destroy(&dir)?;
                    Ok((
                        Arc::new(FileLockManager::create(&dir, config.num_locks)?),
                        true,
                    ))
                }
                Err(e) => Err(e),
            }
        }
        LockBackend::Shm => {
            let name = lock_identity(layout, &config.shm_name)?;
            match ShmLockManager::open(&config.shm_dir, &name, config.num_locks) {
                Ok(manager) => Ok((Arc::new(manager), false)),
                Err(e) if e.is_lock_medium_missing() => Ok((
                    Arc::new(ShmLockManager::create(
                        &config.shm_dir,
                        &name,
                        config.num_locks,
                    )?),
                    false,
                )),
                Err(VesselError::LockPoolSizeMismatch { found, configured }) if config.renumber => {
                    tracing::debug!(found, configured, "lock pool size changed; recreating");
                    ShmLockManager::destroy(&config.shm_dir, &name)?;
                    Ok((
                        Arc::new(ShmLockManager::create(
                            &config.shm_dir,
                            &name,
                            config.num_locks,
                        )?),
                        true,
                    ))
                }
                Err(e) => Err(e),
            }
        }
    }
}

/// Resolve the shm segment name, recording it in the static dir on first
/// use so every later invocation agrees on the medium's identity.
fn lock_identity(layout: &FilesystemLayout, configured: &str) -> VesselResult<String> {
    let path = layout.lock_identity_path();
    match std::fs::read_to_string(&path) {
        Ok(contents) => {
            let stored = contents.trim();
            if !stored.is_empty() {
                if stored != configured {
                    tracing::debug!(stored, configured, "using recorded lock segment name");
                }
                return Ok(stored.to_string());
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(VesselError::Storage(format!(
                "failed to read lock identity file {}: {e}",
                path.display()
            )));
        }
    }

    std::fs::write(&path, configured).map_err(|e| {
        VesselError::Storage(format!(
            "failed to record lock identity file {}: {e}",
            path.display()
        ))
    })?;
    Ok(configured.to_string())
}

/// Reassign a fresh lock index to every persisted entity.
///
/// Runs against a just-recreated medium, so allocation starts from an
/// empty pool. Failures are fatal: a partially renumbered store must not
/// be reported valid.
fn renumber_locks(state: &mut dyn State, lock_manager: &dyn LockManager) -> VesselResult<()> {
    tracing::info!("renumbering entity locks");

    for mut ctr in state.all_containers()? {
        ctr.lock = lock_manager.allocate()?;
        state.save_container(&ctr)?;
    }
    for mut pod in state.all_pods()? {
        pod.lock = lock_manager.allocate()?;
        state.save_pod(&pod)?;
    }
    for mut vol in state.all_volumes()? {
        vol.lock = lock_manager.allocate()?;
        state.save_volume(&vol)?;
    }
    Ok(())
}

/// Rebuild transient OS state for every persisted entity after a reboot.
///
/// No entity locks are taken here and the per-entity refresh must not take
/// them either: indices cannot be trusted until this pass completes. The
/// boot-lifetime lock is the only mutual exclusion in force. One entity
/// failing does not stop recovery of the rest.
fn refresh_all(
    state: &mut dyn State,
    lock_manager: &dyn LockManager,
    layout: &FilesystemLayout,
    token: &CancellationToken,
) -> VesselResult<()> {
    tracing::info!("host reboot detected; refreshing runtime state");

    state.refresh()?;

    if token.is_cancelled() {
        // Refresh is not interruptible: completing it leaves consistent
        // transient state for the next invocation.
        tracing::warn!("cancellation requested during refresh; completing anyway");
    }

    for mut ctr in state.all_containers()? {
        let result = lock_manager
            .allocate_given(ctr.lock)
            .and_then(|()| ctr.refresh(layout))
            .and_then(|()| state.save_container(&ctr));
        if let Err(e) = result {
            tracing::error!(container = %ctr.id.short(), error = %e, "error refreshing container");
        }
    }

    for mut pod in state.all_pods()? {
        let result = lock_manager
            .allocate_given(pod.lock)
            .and_then(|()| pod.refresh(layout))
            .and_then(|()| state.save_pod(&pod));
        if let Err(e) = result {
            tracing::error!(pod = %pod.id.short(), error = %e, "error refreshing pod");
        }
    }

    for mut vol in state.all_volumes()? {
        let result = lock_manager
            .allocate_given(vol.lock)
            .and_then(|()| vol.refresh())
            .and_then(|()| state.save_volume(&vol));
        if let Err(e) = result {
            tracing::error!(volume = %vol.name, error = %e, "error refreshing volume");
        }
    }

    Ok(())
}

// ============================================================================
// RUNTIME API
// ============================================================================

impl Runtime {
    /// Copy of the effective configuration.
    pub fn config(&self) -> VesselResult<RuntimeConfig> {
        self.inner.check_valid()?;
        Ok(self.inner.config.clone())
    }

    /// Aggregate entity counts by last-known status.
    pub fn info(&self) -> VesselResult<RuntimeInfo> {
        self.inner.check_valid()?;
        let state = self.inner.state()?;

        let ctrs = state.all_containers()?;
        let mut info = RuntimeInfo {
            containers: ctrs.len(),
            pods: state.all_pods()?.len(),
            volumes: state.all_volumes()?.len(),
            ..Default::default()
        };
        for ctr in &ctrs {
            match ctr.status {
                ContainerStatus::Running => info.running += 1,
                ContainerStatus::Paused => info.paused += 1,
                ContainerStatus::Stopped => info.stopped += 1,
                _ => {}
            }
        }
        Ok(info)
    }

    /// Generate a random name not taken by any container or pod.
    pub fn generate_name(&self) -> VesselResult<String> {
        self.inner.check_valid()?;
        let state = self.inner.state()?;
        generate_free_name(&**state)
    }

    /// Shut the runtime down, closing the store and marking it
    /// permanently invalid.
    ///
    /// With `force` false this fails while containers are running. With
    /// `force` true all running containers are stopped first,
    /// best-effort, with per-container failures logged.
    pub fn shutdown(&self, force: bool) -> VesselResult<()> {
        let mut valid = self.inner.valid_mut()?;
        if !*valid {
            return Err(VesselError::RuntimeStopped);
        }

        let running: Vec<ContainerRecord> = {
            let state = self.inner.state()?;
            state
                .all_containers()?
                .into_iter()
                .filter(|c| c.status.is_active())
                .collect()
        };

        if !running.is_empty() {
            if !force {
                return Err(VesselError::InvalidState(format!(
                    "{} containers are still running",
                    running.len()
                )));
            }
            for ctr in running {
                if let Err(e) = self.stop_container_record(&ctr) {
                    tracing::error!(
                        container = %ctr.id.short(),
                        error = %e,
                        "error stopping container"
                    );
                }
            }
        }

        *valid = false;

        let mut state = self.inner.state()?;
        state.close()
    }

    /// Shutdown for deferred-cleanup paths: never surfaces errors.
    pub fn shutdown_deferred(&self, force: bool) {
        let _ = self.shutdown(force);
    }
}

// ============================================================================
// ENTITY OPERATIONS
// ============================================================================

impl Runtime {
    /// Create a container record, allocating its lock.
    ///
    /// Without a name, a free random name is generated.
    pub fn new_container(
        &self,
        name: Option<String>,
        config: ContainerConfig,
    ) -> VesselResult<ContainerRecord> {
        self.inner.check_valid()?;
        let mut state = self.inner.state()?;

        let name = match name {
            Some(name) => name,
            None => generate_free_name(&**state)?,
        };

        let lock = self.inner.lock_manager.allocate()?;
        let record = ContainerRecord::new(name, self.inner.config.namespace.clone(), lock, config);

        let run_dir = self.inner.layout.container_run_dir(&record.id);
        let result = std::fs::create_dir_all(&run_dir)
            .map_err(|e| VesselError::Storage(format!("failed to create container run dir: {e}")))
            .and_then(|()| state.add_container(&record));
        if let Err(e) = result {
            // Do not leak the index on a failed create.
            let _ = self.inner.lock_manager.free(lock);
            return Err(e);
        }

        tracing::debug!(
            container = %record.id.short(),
            name = %record.name,
            lock = %record.lock,
            "created container"
        );
        Ok(record)
    }

    /// Create a pod record, allocating its lock.
    pub fn new_pod(&self, name: Option<String>, config: PodConfig) -> VesselResult<PodRecord> {
        self.inner.check_valid()?;
        let mut state = self.inner.state()?;

        let name = match name {
            Some(name) => name,
            None => generate_free_name(&**state)?,
        };

        let lock = self.inner.lock_manager.allocate()?;
        let record = PodRecord::new(name, self.inner.config.namespace.clone(), lock, config);

        let run_dir = self.inner.layout.pod_run_dir(&record.id);
        let result = std::fs::create_dir_all(&run_dir)
            .map_err(|e| VesselError::Storage(format!("failed to create pod run dir: {e}")))
            .and_then(|()| state.add_pod(&record));
        if let Err(e) = result {
            let _ = self.inner.lock_manager.free(lock);
            return Err(e);
        }

        tracing::debug!(pod = %record.id.short(), name = %record.name, "created pod");
        Ok(record)
    }

    /// Create a named volume, allocating its lock and mount point.
    pub fn new_volume(
        &self,
        name: Option<String>,
        config: VolumeConfig,
    ) -> VesselResult<VolumeRecord> {
        self.inner.check_valid()?;
        let mut state = self.inner.state()?;

        let name = match name {
            Some(name) => name,
            None => ContainerId::new().short().to_string(),
        };

        let lock = self.inner.lock_manager.allocate()?;
        let record = VolumeRecord::new(
            name,
            self.inner.config.namespace.clone(),
            lock,
            config,
            self.inner.layout.volume_dir(),
        );

        let result = std::fs::create_dir_all(&record.mount_point)
            .map_err(|e| VesselError::Storage(format!("failed to create volume mount point: {e}")))
            .and_then(|()| state.add_volume(&record));
        if let Err(e) = result {
            let _ = self.inner.lock_manager.free(lock);
            return Err(e);
        }

        tracing::debug!(volume = %record.name, "created volume");
        Ok(record)
    }

    pub fn container(&self, id: &ContainerId) -> VesselResult<ContainerRecord> {
        self.inner.check_valid()?;
        self.inner.state()?.container(id)
    }

    /// Resolve a container by exact ID, exact name, or unambiguous ID
    /// prefix.
    pub fn lookup_container(&self, term: &str) -> VesselResult<ContainerRecord> {
        self.inner.check_valid()?;
        self.inner.state()?.lookup_container(term)
    }

    pub fn containers(&self) -> VesselResult<Vec<ContainerRecord>> {
        self.inner.check_valid()?;
        self.inner.state()?.all_containers()
    }

    pub fn pod(&self, id: &PodId) -> VesselResult<PodRecord> {
        self.inner.check_valid()?;
        self.inner.state()?.pod(id)
    }

    pub fn lookup_pod(&self, term: &str) -> VesselResult<PodRecord> {
        self.inner.check_valid()?;
        self.inner.state()?.lookup_pod(term)
    }

    pub fn pods(&self) -> VesselResult<Vec<PodRecord>> {
        self.inner.check_valid()?;
        self.inner.state()?.all_pods()
    }

    pub fn volume(&self, name: &str) -> VesselResult<VolumeRecord> {
        self.inner.check_valid()?;
        self.inner.state()?.volume(name)
    }

    pub fn volumes(&self) -> VesselResult<Vec<VolumeRecord>> {
        self.inner.check_valid()?;
        self.inner.state()?.all_volumes()
    }

    /// Persist a mutated record. The caller must hold the entity's lock.
    pub fn save_container(&self, ctr: &ContainerRecord) -> VesselResult<()> {
        self.inner.check_valid()?;
        self.inner.state()?.save_container(ctr)
    }

    /// Persist a mutated record. The caller must hold the entity's lock.
    pub fn save_pod(&self, pod: &PodRecord) -> VesselResult<()> {
        self.inner.check_valid()?;
        self.inner.state()?.save_pod(pod)
    }

    /// Remove a container, freeing its lock index.
    ///
    /// Fails while the container is running unless `force`, which stops
    /// it first.
    pub fn remove_container(&self, ctr: &ContainerRecord, force: bool) -> VesselResult<()> {
        self.inner.check_valid()?;

        let mut lock = self.inner.lock_manager.retrieve(ctr.lock)?;
        lock.lock()?;
        let result = self.remove_container_locked(ctr, force);
        let unlocked = lock.unlock();
        result.and(unlocked)
    }

    fn remove_container_locked(&self, ctr: &ContainerRecord, force: bool) -> VesselResult<()> {
        let mut state = self.inner.state()?;

        // Re-read under the lock; the caller's copy may be stale.
        let current = state.container(&ctr.id)?;
        if current.status.is_active() && !force {
            return Err(VesselError::InvalidState(format!(
                "container {} is {}; stop it first",
                current.id.short(),
                current.status
            )));
        }

        state.remove_container(&current.id)?;
        drop(state);

        let _ = std::fs::remove_dir_all(self.inner.layout.container_run_dir(&current.id));
        self.inner.lock_manager.free(current.lock)?;

        tracing::debug!(container = %current.id.short(), "removed container");
        Ok(())
    }

    /// Remove a pod, freeing its lock index. Fails while the pod still
    /// has containers.
    pub fn remove_pod(&self, pod: &PodRecord) -> VesselResult<()> {
        self.inner.check_valid()?;

        let mut lock = self.inner.lock_manager.retrieve(pod.lock)?;
        lock.lock()?;
        let result = self.remove_pod_locked(pod);
        let unlocked = lock.unlock();
        result.and(unlocked)
    }

    fn remove_pod_locked(&self, pod: &PodRecord) -> VesselResult<()> {
        let mut state = self.inner.state()?;

        let current = state.pod(&pod.id)?;
        let members = state
            .all_containers()?
            .into_iter()
            .filter(|c| c.config.pod.as_ref() == Some(&current.id))
            .count();
        if members > 0 {
            return Err(VesselError::InvalidState(format!(
                "pod {} still has {members} containers",
                current.id.short()
            )));
        }

        state.remove_pod(&current.id)?;
        drop(state);

        let _ = std::fs::remove_dir_all(self.inner.layout.pod_run_dir(&current.id));
        self.inner.lock_manager.free(current.lock)?;

        tracing::debug!(pod = %current.id.short(), "removed pod");
        Ok(())
    }

    /// Remove a volume and its contents, freeing its lock index.
    pub fn remove_volume(&self, vol: &VolumeRecord) -> VesselResult<()> {
        self.inner.check_valid()?;

        let mut lock = self.inner.lock_manager.retrieve(vol.lock)?;
        lock.lock()?;
        let result = self.remove_volume_locked(vol);
        let unlocked = lock.unlock();
        result.and(unlocked)
    }

    fn remove_volume_locked(&self, vol: &VolumeRecord) -> VesselResult<()> {
        let mut state = self.inner.state()?;

        let current = state.volume(&vol.name)?;
        state.remove_volume(&current.name)?;
        drop(state);

        if let Some(volume_root) = current.mount_point.parent() {
            if let Err(e) = std::fs::remove_dir_all(volume_root) {
                tracing::warn!(volume = %current.name, error = %e, "failed to remove volume data");
            }
        }
        self.inner.lock_manager.free(current.lock)?;

        tracing::debug!(volume = %current.name, "removed volume");
        Ok(())
    }

    /// Retrieve the cross-process lock for an entity's stored index.
    pub fn lock_for(&self, id: LockId) -> VesselResult<Box<dyn EntityLock>> {
        self.inner.check_valid()?;
        self.inner.lock_manager.retrieve(id)
    }

    /// Stop a running or paused container, persisting the new status.
    pub fn stop_container(&self, ctr: &ContainerRecord) -> VesselResult<()> {
        self.inner.check_valid()?;
        self.stop_container_record(ctr)
    }

    fn stop_container_record(&self, ctr: &ContainerRecord) -> VesselResult<()> {
        let mut lock = self.inner.lock_manager.retrieve(ctr.lock)?;
        lock.lock()?;
        let result = (|| {
            let mut state = self.inner.state()?;
            let mut current = state.container(&ctr.id)?;
            current.mark_stop();
            state.save_container(&current)
        })();
        let unlocked = lock.unlock();
        result.and(unlocked)
    }

    /// Path of the default OCI runtime's executable.
    pub fn default_runtime_path(&self) -> VesselResult<PathBuf> {
        self.inner.check_valid()?;
        Ok(self.inner.oci.default_runtime().path().to_path_buf())
    }

    /// Look up a configured OCI runtime by name.
    pub fn oci_runtime(&self, name: &str) -> VesselResult<Arc<OciRuntime>> {
        self.inner.check_valid()?;
        self.inner
            .oci
            .get(name)
            .ok_or_else(|| VesselError::Config(format!("no OCI runtime named {name}")))
    }

    /// The network plugin handle, absent in unprivileged contexts.
    pub fn network_plugin(&self) -> VesselResult<Option<&NetworkPlugin>> {
        self.inner.check_valid()?;
        Ok(self.inner.net_plugin.as_ref())
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

impl RuntimeInner {
    fn check_valid(&self) -> VesselResult<()> {
        let valid = self.valid.read().map_err(|e| {
            VesselError::Internal(format!("runtime validity lock poisoned (read): {e}"))
        })?;
        if !*valid {
            return Err(VesselError::RuntimeStopped);
        }
        Ok(())
    }

    fn valid_mut(&self) -> VesselResult<std::sync::RwLockWriteGuard<'_, bool>> {
        self.valid.write().map_err(|e| {
            VesselError::Internal(format!("runtime validity lock poisoned (write): {e}"))
        })
    }

    fn state(&self) -> VesselResult<MutexGuard<'_, Box<dyn State>>> {
        self.state
            .lock()
            .map_err(|e| VesselError::Internal(format!("state lock poisoned: {e}")))
    }
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        // Deferred-cleanup path: close the store without surfacing errors.
        let still_valid = match self.valid.get_mut() {
            Ok(valid) => std::mem::replace(valid, false),
            Err(_) => false,
        };
        if still_valid {
            if let Ok(state) = self.state.get_mut() {
                let _ = state.close();
            }
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("static_dir", &self.inner.config.static_dir)
            .field("tmp_dir", &self.inner.config.tmp_dir)
            .finish()
    }
}

fn generate_free_name(state: &dyn State) -> VesselResult<String> {
    let mut rng = rand::rng();
    let mut attempt = 0u32;

    loop {
        let adjective = names::ADJECTIVES[rng.random_range(0..names::ADJECTIVES.len())];
        let noun = names::NOUNS[rng.random_range(0..names::NOUNS.len())];
        let name = if attempt < 10 {
            format!("{adjective}-{noun}")
        } else {
            // The plain combinations are taken; disambiguate.
            format!("{adjective}-{noun}-{}", rng.random_range(0..10_000u32))
        };
        attempt += 1;

        match state.lookup_container(&name) {
            Ok(_) => continue,
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        match state.lookup_pod(&name) {
            Ok(_) => continue,
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        return Ok(name);
    }
}

// Compile-time assertion: the runtime handle must be shareable across
// threads.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<Runtime>;
};
