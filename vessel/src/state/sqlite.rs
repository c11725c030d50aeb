//! Embedded transactional state store backed by SQLite.
//!
//! One database file inside the static directory holds every entity record
//! plus the configuration snapshot taken when the store was first created.
//! All multi-step mutations run inside transactions; the connection is
//! exclusively owned by the runtime that opened it.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use vessel_shared::errors::{VesselError, VesselResult};

use crate::entities::{
    ContainerId, ContainerRecord, ContainerStatus, PodId, PodRecord, VolumeRecord,
};
use crate::lock::LockId;

use super::{DbConfig, State, visible};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS db_config (
    id             INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    graph_root     TEXT NOT NULL,
    graph_driver   TEXT NOT NULL,
    static_dir     TEXT NOT NULL,
    tmp_dir        TEXT NOT NULL,
    volume_dir     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS containers (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    namespace  TEXT NOT NULL DEFAULT '',
    lock_id    INTEGER NOT NULL,
    status     TEXT NOT NULL,
    pid        INTEGER,
    created_at TEXT NOT NULL,
    config     TEXT NOT NULL,
    UNIQUE (name, namespace)
);

CREATE TABLE IF NOT EXISTS pods (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    namespace   TEXT NOT NULL DEFAULT '',
    lock_id     INTEGER NOT NULL,
    cgroup_path TEXT,
    created_at  TEXT NOT NULL,
    config      TEXT NOT NULL,
    UNIQUE (name, namespace)
);

CREATE TABLE IF NOT EXISTS volumes (
    name        TEXT NOT NULL,
    namespace   TEXT NOT NULL DEFAULT '',
    lock_id     INTEGER NOT NULL,
    mount_point TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    config      TEXT NOT NULL,
    PRIMARY KEY (name, namespace)
);
";

const SELECT_CONTAINER: &str =
    "SELECT id, name, namespace, lock_id, status, pid, created_at, config FROM containers";
const SELECT_POD: &str =
    "SELECT id, name, namespace, lock_id, cgroup_path, created_at, config FROM pods";
const SELECT_VOLUME: &str =
    "SELECT name, namespace, lock_id, mount_point, created_at, config FROM volumes";

/// SQLite-backed state store.
pub struct SqliteState {
    conn: Option<Connection>,
    namespace: String,
}

impl SqliteState {
    /// Open (or create) the state database at `path`.
    ///
    /// `initial` is recorded as the store's configuration snapshot if, and
    /// only if, the database is brand new; an existing snapshot is never
    /// overwritten.
    pub fn open(path: &Path, initial: &DbConfig) -> VesselResult<Self> {
        let conn = Connection::open(path).map_err(|e| {
            VesselError::Database(format!(
                "failed to open state database {}: {e}",
                path.display()
            ))
        })?;

        conn.busy_timeout(Duration::from_secs(10)).map_err(db_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        conn.execute(
            "INSERT OR IGNORE INTO db_config
                 (id, schema_version, graph_root, graph_driver, static_dir, tmp_dir, volume_dir)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                initial.schema_version,
                path_str(&initial.graph_root),
                initial.graph_driver,
                path_str(&initial.static_dir),
                path_str(&initial.tmp_dir),
                path_str(&initial.volume_dir),
            ],
        )
        .map_err(db_err)?;

        tracing::debug!(path = %path.display(), "opened state database");

        Ok(Self {
            conn: Some(conn),
            namespace: String::new(),
        })
    }

    fn conn(&self) -> VesselResult<&Connection> {
        self.conn.as_ref().ok_or_else(closed_err)
    }

    fn conn_mut(&mut self) -> VesselResult<&mut Connection> {
        self.conn.as_mut().ok_or_else(closed_err)
    }

    fn containers_where(
        &self,
        suffix: &str,
        args: impl rusqlite::Params,
    ) -> VesselResult<Vec<ContainerRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_CONTAINER} {suffix}"))
            .map_err(db_err)?;
        let rows = stmt.query_map(args, container_row).map_err(db_err)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(container_from_row(row.map_err(db_err)?)?);
        }
        Ok(out)
    }

    fn pods_where(&self, suffix: &str, args: impl rusqlite::Params) -> VesselResult<Vec<PodRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_POD} {suffix}"))
            .map_err(db_err)?;
        let rows = stmt.query_map(args, pod_row).map_err(db_err)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(pod_from_row(row.map_err(db_err)?)?);
        }
        Ok(out)
    }

    fn volumes_where(
        &self,
        suffix: &str,
        args: impl rusqlite::Params,
    ) -> VesselResult<Vec<VolumeRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_VOLUME} {suffix}"))
            .map_err(db_err)?;
        let rows = stmt.query_map(args, volume_row).map_err(db_err)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(volume_from_row(row.map_err(db_err)?)?);
        }
        Ok(out)
    }
}

impl State for SqliteState {
    fn db_config(&self) -> VesselResult<Option<DbConfig>> {
        let conn = self.conn()?;
        let config = conn
            .query_row(
                "SELECT schema_version, graph_root, graph_driver, static_dir, tmp_dir, volume_dir
                 FROM db_config WHERE id = 1",
                [],
                |row| {
                    Ok(DbConfig {
                        schema_version: row.get(0)?,
                        graph_root: row.get::<_, String>(1)?.into(),
                        graph_driver: row.get(2)?,
                        static_dir: row.get::<_, String>(3)?.into(),
                        tmp_dir: row.get::<_, String>(4)?.into(),
                        volume_dir: row.get::<_, String>(5)?.into(),
                    })
                },
            )
            .optional()
            .map_err(db_err)?;
        Ok(config)
    }

    fn set_namespace(&mut self, ns: &str) -> VesselResult<()> {
        self.conn()?;
        self.namespace = ns.to_string();
        Ok(())
    }

    fn refresh(&mut self) -> VesselResult<()> {
        let conn = self.conn_mut()?;
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute(
            "UPDATE containers SET pid = NULL,
                 status = CASE WHEN status IN ('running', 'paused', 'stopping')
                               THEN 'stopped' ELSE status END",
            [],
        )
        .map_err(db_err)?;
        tx.execute("UPDATE pods SET cgroup_path = NULL", [])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)
    }

    fn close(&mut self) -> VesselResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .map_err(|(_, e)| VesselError::Database(format!("failed to close database: {e}")))?;
        }
        Ok(())
    }

    fn add_container(&mut self, ctr: &ContainerRecord) -> VesselResult<()> {
        let tx = self.conn_mut()?.transaction().map_err(db_err)?;

        let id_taken: Option<String> = tx
            .query_row(
                "SELECT id FROM containers WHERE id = ?1",
                params![ctr.id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if id_taken.is_some() {
            return Err(VesselError::AlreadyExists(format!(
                "container {}",
                ctr.id.short()
            )));
        }

        let name_taken: Option<String> = tx
            .query_row(
                "SELECT id FROM containers WHERE name = ?1 AND namespace = ?2",
                params![ctr.name, ctr.namespace],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if name_taken.is_some() {
            return Err(VesselError::AlreadyExists(format!(
                "container name {}",
                ctr.name
            )));
        }

        tx.execute(
            "INSERT INTO containers (id, name, namespace, lock_id, status, pid, created_at, config)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                ctr.id.as_str(),
                ctr.name,
                ctr.namespace,
                ctr.lock.index(),
                ctr.status.as_str(),
                ctr.pid,
                ctr.created_at.to_rfc3339(),
                config_json(&ctr.config)?,
            ],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)
    }

    fn container(&self, id: &ContainerId) -> VesselResult<ContainerRecord> {
        self.containers_where("WHERE id = ?1", params![id.as_str()])?
            .into_iter()
            .find(|c| visible(&self.namespace, &c.namespace))
            .ok_or_else(|| VesselError::NoSuchContainer(id.short().to_string()))
    }

    fn lookup_container(&self, term: &str) -> VesselResult<ContainerRecord> {
        if let Some(ctr) = self
            .containers_where("WHERE id = ?1", params![term])?
            .into_iter()
            .find(|c| visible(&self.namespace, &c.namespace))
        {
            return Ok(ctr);
        }

        let mut by_name: Vec<ContainerRecord> = self
            .containers_where("WHERE name = ?1", params![term])?
            .into_iter()
            .filter(|c| visible(&self.namespace, &c.namespace))
            .collect();
        match by_name.len() {
            1 => return Ok(by_name.remove(0)),
            n if n > 1 => return Err(VesselError::AmbiguousId(term.to_string())),
            _ => {}
        }

        // Only a hex string can be an ID prefix.
        if term.is_empty() || !term.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(VesselError::NoSuchContainer(term.to_string()));
        }

        let mut by_prefix: Vec<ContainerRecord> = self
            .containers_where("WHERE id LIKE ?1", params![format!("{term}%")])?
            .into_iter()
            .filter(|c| visible(&self.namespace, &c.namespace))
            .collect();
        match by_prefix.len() {
            0 => Err(VesselError::NoSuchContainer(term.to_string())),
            1 => Ok(by_prefix.remove(0)),
            _ => Err(VesselError::AmbiguousId(term.to_string())),
        }
    }

    fn save_container(&mut self, ctr: &ContainerRecord) -> VesselResult<()> {
        self.container(&ctr.id)?;

        let conn = self.conn()?;
        conn.execute(
            "UPDATE containers SET name = ?2, lock_id = ?3, status = ?4, pid = ?5, config = ?6
             WHERE id = ?1",
            params![
                ctr.id.as_str(),
                ctr.name,
                ctr.lock.index(),
                ctr.status.as_str(),
                ctr.pid,
                config_json(&ctr.config)?,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn remove_container(&mut self, id: &ContainerId) -> VesselResult<()> {
        self.container(id)?;

        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM containers WHERE id = ?1",
            params![id.as_str()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn all_containers(&self) -> VesselResult<Vec<ContainerRecord>> {
        Ok(self
            .containers_where("", [])?
            .into_iter()
            .filter(|c| visible(&self.namespace, &c.namespace))
            .collect())
    }

    fn add_pod(&mut self, pod: &PodRecord) -> VesselResult<()> {
        let tx = self.conn_mut()?.transaction().map_err(db_err)?;

        let id_taken: Option<String> = tx
            .query_row(
                "SELECT id FROM pods WHERE id = ?1",
                params![pod.id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if id_taken.is_some() {
            return Err(VesselError::AlreadyExists(format!(
                "pod {}",
                pod.id.short()
            )));
        }

        let name_taken: Option<String> = tx
            .query_row(
                "SELECT id FROM pods WHERE name = ?1 AND namespace = ?2",
                params![pod.name, pod.namespace],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if name_taken.is_some() {
            return Err(VesselError::AlreadyExists(format!("pod name {}", pod.name)));
        }

        tx.execute(
            "INSERT INTO pods (id, name, namespace, lock_id, cgroup_path, created_at, config)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                pod.id.as_str(),
                pod.name,
                pod.namespace,
                pod.lock.index(),
                pod.cgroup_path,
                pod.created_at.to_rfc3339(),
                config_json(&pod.config)?,
            ],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)
    }

    fn pod(&self, id: &PodId) -> VesselResult<PodRecord> {
        self.pods_where("WHERE id = ?1", params![id.as_str()])?
            .into_iter()
            .find(|p| visible(&self.namespace, &p.namespace))
            .ok_or_else(|| VesselError::NoSuchPod(id.short().to_string()))
    }

    fn lookup_pod(&self, term: &str) -> VesselResult<PodRecord> {
        if let Some(pod) = self
            .pods_where("WHERE id = ?1", params![term])?
            .into_iter()
            .find(|p| visible(&self.namespace, &p.namespace))
        {
            return Ok(pod);
        }

        let mut by_name: Vec<PodRecord> = self
            .pods_where("WHERE name = ?1", params![term])?
            .into_iter()
            .filter(|p| visible(&self.namespace, &p.namespace))
            .collect();
        match by_name.len() {
            1 => return Ok(by_name.remove(0)),
            n if n > 1 => return Err(VesselError::AmbiguousId(term.to_string())),
            _ => {}
        }

        if term.is_empty() || !term.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(VesselError::NoSuchPod(term.to_string()));
        }

        let mut by_prefix: Vec<PodRecord> = self
            .pods_where("WHERE id LIKE ?1", params![format!("{term}%")])?
            .into_iter()
            .filter(|p| visible(&self.namespace, &p.namespace))
            .collect();
        match by_prefix.len() {
            0 => Err(VesselError::NoSuchPod(term.to_string())),
            1 => Ok(by_prefix.remove(0)),
            _ => Err(VesselError::AmbiguousId(term.to_string())),
        }
    }

    fn save_pod(&mut self, pod: &PodRecord) -> VesselResult<()> {
        self.pod(&pod.id)?;

        let conn = self.conn()?;
        conn.execute(
            "UPDATE pods SET name = ?2, lock_id = ?3, cgroup_path = ?4, config = ?5
             WHERE id = ?1",
            params![
                pod.id.as_str(),
                pod.name,
                pod.lock.index(),
                pod.cgroup_path,
                config_json(&pod.config)?,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn remove_pod(&mut self, id: &PodId) -> VesselResult<()> {
        self.pod(id)?;

        let conn = self.conn()?;
        conn.execute("DELETE FROM pods WHERE id = ?1", params![id.as_str()])
            .map_err(db_err)?;
        Ok(())
    }

    fn all_pods(&self) -> VesselResult<Vec<PodRecord>> {
        Ok(self
            .pods_where("", [])?
            .into_iter()
            .filter(|p| visible(&self.namespace, &p.namespace))
            .collect())
    }

    fn add_volume(&mut self, vol: &VolumeRecord) -> VesselResult<()> {
        let tx = self.conn_mut()?.transaction().map_err(db_err)?;

        let taken: Option<String> = tx
            .query_row(
                "SELECT name FROM volumes WHERE name = ?1 AND namespace = ?2",
                params![vol.name, vol.namespace],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if taken.is_some() {
            return Err(VesselError::AlreadyExists(format!("volume {}", vol.name)));
        }

        tx.execute(
            "INSERT INTO volumes (name, namespace, lock_id, mount_point, created_at, config)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                vol.name,
                vol.namespace,
                vol.lock.index(),
                path_str(&vol.mount_point),
                vol.created_at.to_rfc3339(),
                config_json(&vol.config)?,
            ],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)
    }

    fn volume(&self, name: &str) -> VesselResult<VolumeRecord> {
        let mut matches: Vec<VolumeRecord> = self
            .volumes_where("WHERE name = ?1", params![name])?
            .into_iter()
            .filter(|v| visible(&self.namespace, &v.namespace))
            .collect();
        match matches.len() {
            0 => Err(VesselError::NoSuchVolume(name.to_string())),
            1 => Ok(matches.remove(0)),
            _ => Err(VesselError::AmbiguousId(name.to_string())),
        }
    }

    fn save_volume(&mut self, vol: &VolumeRecord) -> VesselResult<()> {
        let existing = self.volume(&vol.name)?;

        let conn = self.conn()?;
        conn.execute(
            "UPDATE volumes SET lock_id = ?3, mount_point = ?4, config = ?5
             WHERE name = ?1 AND namespace = ?2",
            params![
                vol.name,
                existing.namespace,
                vol.lock.index(),
                path_str(&vol.mount_point),
                config_json(&vol.config)?,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn remove_volume(&mut self, name: &str) -> VesselResult<()> {
        let existing = self.volume(name)?;

        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM volumes WHERE name = ?1 AND namespace = ?2",
            params![existing.name, existing.namespace],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn all_volumes(&self) -> VesselResult<Vec<VolumeRecord>> {
        Ok(self
            .volumes_where("", [])?
            .into_iter()
            .filter(|v| visible(&self.namespace, &v.namespace))
            .collect())
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

type ContainerRow = (
    String,
    String,
    String,
    i64,
    String,
    Option<i64>,
    String,
    String,
);

fn container_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContainerRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn container_from_row(row: ContainerRow) -> VesselResult<ContainerRecord> {
    let (id, name, namespace, lock_id, status, pid, created_at, config) = row;
    Ok(ContainerRecord {
        id: ContainerId::parse(&id)
            .ok_or_else(|| VesselError::Database(format!("corrupt container id {id}")))?,
        name,
        namespace,
        lock: LockId::new(lock_id as u32),
        config: serde_json::from_str(&config)
            .map_err(|e| VesselError::Database(format!("corrupt container config: {e}")))?,
        status: ContainerStatus::from_str(&status)
            .map_err(|()| VesselError::Database(format!("unknown container status {status}")))?,
        pid: pid.map(|p| p as u32),
        created_at: parse_timestamp(&created_at)?,
    })
}

type PodRow = (String, String, String, i64, Option<String>, String, String);

fn pod_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PodRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn pod_from_row(row: PodRow) -> VesselResult<PodRecord> {
    let (id, name, namespace, lock_id, cgroup_path, created_at, config) = row;
    Ok(PodRecord {
        id: PodId::parse(&id)
            .ok_or_else(|| VesselError::Database(format!("corrupt pod id {id}")))?,
        name,
        namespace,
        lock: LockId::new(lock_id as u32),
        config: serde_json::from_str(&config)
            .map_err(|e| VesselError::Database(format!("corrupt pod config: {e}")))?,
        cgroup_path,
        created_at: parse_timestamp(&created_at)?,
    })
}

type VolumeRow = (String, String, i64, String, String, String);

fn volume_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VolumeRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn volume_from_row(row: VolumeRow) -> VesselResult<VolumeRecord> {
    let (name, namespace, lock_id, mount_point, created_at, config) = row;
    Ok(VolumeRecord {
        name,
        namespace,
        lock: LockId::new(lock_id as u32),
        config: serde_json::from_str(&config)
            .map_err(|e| VesselError::Database(format!("corrupt volume config: {e}")))?,
        mount_point: mount_point.into(),
        created_at: parse_timestamp(&created_at)?,
    })
}

fn parse_timestamp(s: &str) -> VesselResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| VesselError::Database(format!("corrupt timestamp {s}: {e}")))
}

fn config_json<T: serde::Serialize>(config: &T) -> VesselResult<String> {
    serde_json::to_string(config)
        .map_err(|e| VesselError::Internal(format!("failed to serialize config: {e}")))
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn db_err(e: rusqlite::Error) -> VesselError {
    VesselError::Database(e.to_string())
}

fn closed_err() -> VesselError {
    VesselError::Storage("state store has been closed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ContainerConfig, PodConfig, VolumeConfig};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn snapshot(dir: &Path) -> DbConfig {
        DbConfig {
            schema_version: super::super::SCHEMA_VERSION,
            graph_root: dir.join("graph"),
            graph_driver: "overlay".to_string(),
            static_dir: dir.join("storage"),
            tmp_dir: dir.join("tmp"),
            volume_dir: dir.join("volumes"),
        }
    }

    fn open_state(dir: &Path) -> SqliteState {
        SqliteState::open(&dir.join("state.db"), &snapshot(dir)).unwrap()
    }

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
    fn test_container_roundtrip_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let rec = ctr_with_id("aa11", "web", "");

        {
            let mut state = open_state(dir.path());
            state.add_container(&rec).unwrap();
            state.close().unwrap();
        }

        let state = open_state(dir.path());
        let by_id = state.lookup_container(rec.id.as_str()).unwrap();
        let by_name = state.lookup_container("web").unwrap();
        let by_prefix = state.lookup_container("aa11").unwrap();

        assert_eq!(by_id.id, rec.id);
        assert_eq!(by_name.id, rec.id);
        assert_eq!(by_prefix.id, rec.id);
        assert_eq!(by_id.config.image, "alpine:latest");
        assert_eq!(by_id.created_at, rec.created_at);
    }

    #[test]
    fn test_ambiguous_prefix_is_distinct_from_not_found() {
        let dir = TempDir::new().unwrap();
        let mut state = open_state(dir.path());
        state.add_container(&ctr_with_id("ab1", "one", "")).unwrap();
        state.add_container(&ctr_with_id("ab2", "two", "")).unwrap();

        assert!(matches!(
            state.lookup_container("ab").unwrap_err(),
            VesselError::AmbiguousId(_)
        ));
        assert!(state.lookup_container("ff").unwrap_err().is_not_found());
    }

    #[test]
    fn test_duplicate_id_and_name_rejected() {
        let dir = TempDir::new().unwrap();
        let mut state = open_state(dir.path());
        let rec = ctr_with_id("aa", "web", "");
        state.add_container(&rec).unwrap();

        assert!(matches!(
            state.add_container(&rec).unwrap_err(),
            VesselError::AlreadyExists(_)
        ));
        assert!(matches!(
            state.add_container(&ctr_with_id("bb", "web", "")).unwrap_err(),
            VesselError::AlreadyExists(_)
        ));

        // Same name in a different namespace is allowed.
        state.add_container(&ctr_with_id("cc", "web", "dev")).unwrap();
    }

    #[test]
    fn test_namespace_scoping() {
        let dir = TempDir::new().unwrap();
        let mut state = open_state(dir.path());
        state.add_container(&ctr_with_id("aa", "a", "prod")).unwrap();
        state.add_container(&ctr_with_id("bb", "b", "dev")).unwrap();
        state.add_container(&ctr_with_id("cc", "c", "")).unwrap();

        state.set_namespace("prod").unwrap();
        assert_eq!(state.all_containers().unwrap().len(), 2);
        assert!(state.lookup_container("b").unwrap_err().is_not_found());

        state.set_namespace("").unwrap();
        assert_eq!(state.all_containers().unwrap().len(), 3);
    }

    #[test]
    fn test_save_persists_status_and_lock() {
        let dir = TempDir::new().unwrap();
        let mut state = open_state(dir.path());
        let mut rec = ctr_with_id("aa", "web", "");
        state.add_container(&rec).unwrap();

        rec.set_status(ContainerStatus::Running).unwrap();
        rec.pid = Some(999);
        rec.lock = LockId::new(7);
        state.save_container(&rec).unwrap();

        let loaded = state.container(&rec.id).unwrap();
        assert_eq!(loaded.status, ContainerStatus::Running);
        assert_eq!(loaded.pid, Some(999));
        assert_eq!(loaded.lock, LockId::new(7));
    }

    #[test]
    fn test_refresh_clears_transient_fields() {
        let dir = TempDir::new().unwrap();
        let mut state = open_state(dir.path());

        let mut rec = ctr_with_id("aa", "web", "");
        rec.set_status(ContainerStatus::Running).unwrap();
        rec.pid = Some(4242);
        state.add_container(&rec).unwrap();

        let mut pod = PodRecord::new(
            "infra".to_string(),
            String::new(),
            LockId::new(1),
            PodConfig::default(),
        );
        pod.cgroup_path = Some("/vessel/infra".to_string());
        state.add_pod(&pod).unwrap();

        state.refresh().unwrap();

        let rec = state.container(&rec.id).unwrap();
        assert_eq!(rec.status, ContainerStatus::Stopped);
        assert!(rec.pid.is_none());
        assert!(state.pod(&pod.id).unwrap().cgroup_path.is_none());
    }

    #[test]
    fn test_db_config_snapshot_is_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let original = snapshot(dir.path());
        {
            let mut state = SqliteState::open(&dir.path().join("state.db"), &original).unwrap();
            state.close().unwrap();
        }

        let mut different = original.clone();
        different.graph_root = PathBuf::from("/somewhere/else");
        let state = SqliteState::open(&dir.path().join("state.db"), &different).unwrap();

        let stored = state.db_config().unwrap().unwrap();
        assert_eq!(stored, original);
    }

    #[test]
    fn test_remove_container() {
        let dir = TempDir::new().unwrap();
        let mut state = open_state(dir.path());
        let rec = ctr_with_id("aa", "web", "");
        state.add_container(&rec).unwrap();

        state.remove_container(&rec.id).unwrap();
        assert!(state.container(&rec.id).unwrap_err().is_not_found());
        assert!(state.remove_container(&rec.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_volume_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut state = open_state(dir.path());

        let vol = VolumeRecord::new(
            "data".to_string(),
            String::new(),
            LockId::new(2),
            VolumeConfig::default(),
            &dir.path().join("volumes"),
        );
        state.add_volume(&vol).unwrap();

        let loaded = state.volume("data").unwrap();
        assert_eq!(loaded.mount_point, vol.mount_point);
        assert_eq!(loaded.config.driver, "local");

        assert!(matches!(
            state.add_volume(&vol).unwrap_err(),
            VesselError::AlreadyExists(_)
        ));

        state.remove_volume("data").unwrap();
        assert!(state.volume("data").unwrap_err().is_not_found());
    }

    #[test]
    fn test_pod_lookup_and_remove() {
        let dir = TempDir::new().unwrap();
        let mut state = open_state(dir.path());

        let pod = PodRecord::new(
            "infra".to_string(),
            String::new(),
            LockId::new(3),
            PodConfig::default(),
        );
        state.add_pod(&pod).unwrap();

        assert_eq!(state.lookup_pod("infra").unwrap().id, pod.id);
        assert_eq!(
            state.lookup_pod(&pod.id.as_str()[..10]).unwrap().id,
            pod.id
        );

        state.remove_pod(&pod.id).unwrap();
        assert!(state.lookup_pod("infra").unwrap_err().is_not_found());
    }

    #[test]
    fn test_operations_fail_after_close() {
        let dir = TempDir::new().unwrap();
        let mut state = open_state(dir.path());
        state.close().unwrap();

        assert!(matches!(
            state.all_containers().unwrap_err(),
            VesselError::Storage(_)
        ));
        assert!(matches!(
            state.db_config().unwrap_err(),
            VesselError::Storage(_)
        ));
    }
}
