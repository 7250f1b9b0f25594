use crate::schema::SCHEMA;
use crate::{ActionLogFilter, ErrorGroupFilter, IncidentFilter, OpsStore, StoreError};
use async_trait::async_trait;
use opscenter_model::{
    ActionLog, ErrorGroup, Incident, ReplayRun, ReplayStep, TenantHealth,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tokio::sync::Mutex;

/// Durable sqlite backend. One connection guarded by an async mutex; every
/// statement is short-lived, so contention stays on the ingest hot path where
/// the optimistic version check already serializes writers per key.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError(e.to_string()))?;
        Self::prepare(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError(e.to_string()))?;
        Self::prepare(conn)
    }

    fn prepare(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000;",
        )
        .map_err(|e| StoreError(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError(format!("encode: {e}")))
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError(format!("decode: {e}")))
}

/// Wire spelling of a unit enum variant, used for indexed status columns.
fn status_text<T: Serialize>(value: &T) -> Result<String, StoreError> {
    match serde_json::to_value(value).map_err(|e| StoreError(e.to_string()))? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(StoreError(format!("expected string status, got {other}"))),
    }
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError(e.to_string())
}

#[async_trait]
impl OpsStore for SqliteStore {
    async fn insert_error_group(&self, group: &ErrorGroup) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO error_groups(id, tenant_id, last_seen_at, version, doc)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    group.id,
                    group.key.tenant_id,
                    group.last_seen_at,
                    group.version,
                    encode(group)?
                ],
            )
            .map_err(db_err)?;
        Ok(changed == 1)
    }

    async fn update_error_group(
        &self,
        group: &ErrorGroup,
        expected_version: u64,
    ) -> Result<bool, StoreError> {
        let mut next = group.clone();
        next.version = expected_version + 1;
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE error_groups
                 SET last_seen_at = ?2, version = ?3, doc = ?4
                 WHERE id = ?1 AND version = ?5",
                params![
                    next.id,
                    next.last_seen_at,
                    next.version,
                    encode(&next)?,
                    expected_version
                ],
            )
            .map_err(db_err)?;
        if changed == 1 {
            return Ok(true);
        }
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM error_groups WHERE id = ?1",
                params![next.id],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err)?;
        match exists {
            Some(_) => Ok(false),
            None => Err(StoreError(format!("error group missing: {}", next.id))),
        }
    }

    async fn get_error_group(&self, id: &str) -> Result<Option<ErrorGroup>, StoreError> {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row(
                "SELECT doc FROM error_groups WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err)?;
        raw.map(|r| decode(&r)).transpose()
    }

    async fn list_error_groups(
        &self,
        filter: &ErrorGroupFilter,
    ) -> Result<Vec<ErrorGroup>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT doc FROM error_groups
                 WHERE (?1 IS NULL OR tenant_id = ?1)
                 ORDER BY last_seen_at DESC, id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![filter.tenant_id], |r| r.get::<_, String>(0))
            .map_err(db_err)?;
        let mut out = Vec::new();
        for raw in rows {
            let group: ErrorGroup = decode(&raw.map_err(db_err)?)?;
            if filter.matches(&group) {
                out.push(group);
            }
        }
        Ok(out)
    }

    async fn insert_incident(&self, incident: &Incident) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO incidents(
                   id, idempotency_key, error_group_id, tenant_id, status, started_at, doc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    incident.id,
                    incident.idempotency_key,
                    incident.error_group_id,
                    incident.tenant_id,
                    status_text(&incident.status)?,
                    incident.started_at,
                    encode(incident)?
                ],
            )
            .map_err(db_err)?;
        Ok(changed == 1)
    }

    async fn update_incident(&self, incident: &Incident) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE incidents SET status = ?2, doc = ?3 WHERE id = ?1",
                params![
                    incident.id,
                    status_text(&incident.status)?,
                    encode(incident)?
                ],
            )
            .map_err(db_err)?;
        Ok(changed == 1)
    }

    async fn get_incident(&self, id: &str) -> Result<Option<Incident>, StoreError> {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row(
                "SELECT doc FROM incidents WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err)?;
        raw.map(|r| decode(&r)).transpose()
    }

    async fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT doc FROM incidents
                 WHERE (?1 IS NULL OR tenant_id = ?1)
                 ORDER BY started_at DESC, id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![filter.tenant_id], |r| r.get::<_, String>(0))
            .map_err(db_err)?;
        let mut out = Vec::new();
        for raw in rows {
            let incident: Incident = decode(&raw.map_err(db_err)?)?;
            if filter.matches(&incident) {
                out.push(incident);
            }
        }
        Ok(out)
    }

    async fn active_incident_for_group(
        &self,
        error_group_id: &str,
    ) -> Result<Option<Incident>, StoreError> {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row(
                "SELECT doc FROM incidents
                 WHERE error_group_id = ?1 AND status != 'RESOLVED'
                 LIMIT 1",
                params![error_group_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err)?;
        raw.map(|r| decode(&r)).transpose()
    }

    async fn insert_run(&self, run: &ReplayRun) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO replay_runs(id, tenant_id, status, created_at, doc)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run.id,
                run.tenant_id,
                status_text(&run.status)?,
                run.created_at,
                encode(run)?
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_run(&self, run: &ReplayRun) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE replay_runs SET status = ?2, doc = ?3 WHERE id = ?1",
                params![run.id, status_text(&run.status)?, encode(run)?],
            )
            .map_err(db_err)?;
        Ok(changed == 1)
    }

    async fn get_run(&self, id: &str) -> Result<Option<ReplayRun>, StoreError> {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row(
                "SELECT doc FROM replay_runs WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err)?;
        raw.map(|r| decode(&r)).transpose()
    }

    async fn list_runs(&self, tenant_id: Option<&str>) -> Result<Vec<ReplayRun>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT doc FROM replay_runs
                 WHERE (?1 IS NULL OR tenant_id = ?1)
                 ORDER BY created_at DESC, id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![tenant_id], |r| r.get::<_, String>(0))
            .map_err(db_err)?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(decode(&raw.map_err(db_err)?)?);
        }
        Ok(out)
    }

    async fn pending_runs_for_tenant(&self, tenant_id: &str) -> Result<Vec<ReplayRun>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT doc FROM replay_runs
                 WHERE tenant_id = ?1 AND status = 'PENDING'
                 ORDER BY created_at ASC, id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![tenant_id], |r| r.get::<_, String>(0))
            .map_err(db_err)?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(decode(&raw.map_err(db_err)?)?);
        }
        Ok(out)
    }

    async fn insert_step(&self, step: &ReplayStep) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO replay_steps(id, run_id, endpoint, created_at, doc)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                step.id,
                step.run_id,
                step.endpoint,
                step.created_at,
                encode(step)?
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn steps_for_run(&self, run_id: &str) -> Result<Vec<ReplayStep>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT doc FROM replay_steps
                 WHERE run_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![run_id], |r| r.get::<_, String>(0))
            .map_err(db_err)?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(decode(&raw.map_err(db_err)?)?);
        }
        Ok(out)
    }

    async fn recent_steps_for_endpoint(
        &self,
        tenant_id: &str,
        endpoint: &str,
        limit: usize,
    ) -> Result<Vec<ReplayStep>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT s.doc FROM replay_steps s
                 JOIN replay_runs r ON r.id = s.run_id
                 WHERE r.tenant_id = ?1 AND s.endpoint = ?2
                 ORDER BY s.created_at DESC, s.id DESC
                 LIMIT ?3",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![tenant_id, endpoint, limit as i64], |r| {
                r.get::<_, String>(0)
            })
            .map_err(db_err)?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(decode(&raw.map_err(db_err)?)?);
        }
        Ok(out)
    }

    async fn acquire_replay_lease(
        &self,
        tenant_id: &str,
        run_id: &str,
        now_ms: u64,
        ttl_ms: u64,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "INSERT INTO replay_leases(tenant_id, run_id, expires_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(tenant_id) DO UPDATE
                   SET run_id = excluded.run_id, expires_at = excluded.expires_at
                   WHERE replay_leases.expires_at <= ?4",
                params![tenant_id, run_id, now_ms + ttl_ms, now_ms],
            )
            .map_err(db_err)?;
        Ok(changed == 1)
    }

    async fn renew_replay_lease(
        &self,
        tenant_id: &str,
        run_id: &str,
        now_ms: u64,
        ttl_ms: u64,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE replay_leases SET expires_at = ?3
                 WHERE tenant_id = ?1 AND run_id = ?2 AND expires_at > ?4",
                params![tenant_id, run_id, now_ms + ttl_ms, now_ms],
            )
            .map_err(db_err)?;
        Ok(changed == 1)
    }

    async fn release_replay_lease(
        &self,
        tenant_id: &str,
        run_id: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM replay_leases WHERE tenant_id = ?1 AND run_id = ?2",
            params![tenant_id, run_id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_action_log(&self, log: &ActionLog) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO action_logs(id, tenant_id, status, created_at, doc)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                log.id,
                log.tenant_id,
                status_text(&log.status)?,
                log.created_at,
                encode(log)?
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_action_log(&self, log: &ActionLog) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE action_logs SET status = ?2, doc = ?3 WHERE id = ?1",
                params![log.id, status_text(&log.status)?, encode(log)?],
            )
            .map_err(db_err)?;
        Ok(changed == 1)
    }

    async fn get_action_log(&self, id: &str) -> Result<Option<ActionLog>, StoreError> {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row(
                "SELECT doc FROM action_logs WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err)?;
        raw.map(|r| decode(&r)).transpose()
    }

    async fn list_action_logs(
        &self,
        filter: &ActionLogFilter,
    ) -> Result<Vec<ActionLog>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT doc FROM action_logs
                 WHERE (?1 IS NULL OR tenant_id = ?1)
                 ORDER BY created_at DESC, id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![filter.tenant_id], |r| r.get::<_, String>(0))
            .map_err(db_err)?;
        let mut out = Vec::new();
        for raw in rows {
            let log: ActionLog = decode(&raw.map_err(db_err)?)?;
            if filter.matches(&log) {
                out.push(log);
            }
        }
        Ok(out)
    }

    async fn pending_actions_before(&self, cutoff_ms: u64) -> Result<Vec<ActionLog>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT doc FROM action_logs
                 WHERE status = 'PENDING_APPROVAL' AND created_at < ?1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![cutoff_ms], |r| r.get::<_, String>(0))
            .map_err(db_err)?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(decode(&raw.map_err(db_err)?)?);
        }
        Ok(out)
    }

    async fn put_tenant_health(&self, health: &TenantHealth) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO tenant_health(tenant_id, doc) VALUES (?1, ?2)
             ON CONFLICT(tenant_id) DO UPDATE SET doc = excluded.doc",
            params![health.tenant_id, encode(health)?],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_tenant_health(&self, tenant_id: &str) -> Result<Option<TenantHealth>, StoreError> {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row(
                "SELECT doc FROM tenant_health WHERE tenant_id = ?1",
                params![tenant_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err)?;
        raw.map(|r| decode(&r)).transpose()
    }

    async fn list_tenant_health(&self) -> Result<Vec<TenantHealth>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT doc FROM tenant_health ORDER BY tenant_id ASC")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |r| r.get::<_, String>(0))
            .map_err(db_err)?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(decode(&raw.map_err(db_err)?)?);
        }
        Ok(out)
    }
}
