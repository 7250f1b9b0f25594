use crate::{ActionLogFilter, ErrorGroupFilter, IncidentFilter, OpsStore, StoreError};
use async_trait::async_trait;
use opscenter_model::{
    ActionLog, ActionLogStatus, ErrorGroup, Incident, ReplayRun, ReplayRunStatus, ReplayStep,
    TenantHealth,
};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Lease {
    expires_at: u64,
}

#[derive(Default)]
struct Inner {
    groups: HashMap<String, ErrorGroup>,
    incidents: HashMap<String, Incident>,
    incident_keys: BTreeSet<String>,
    runs: HashMap<String, ReplayRun>,
    steps: Vec<ReplayStep>,
    leases: HashMap<String, (String, Lease)>,
    actions: HashMap<String, ActionLog>,
    health: HashMap<String, TenantHealth>,
}

/// In-memory backend for tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OpsStore for MemoryStore {
    async fn insert_error_group(&self, group: &ErrorGroup) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.groups.contains_key(&group.id) {
            return Ok(false);
        }
        inner.groups.insert(group.id.clone(), group.clone());
        Ok(true)
    }

    async fn update_error_group(
        &self,
        group: &ErrorGroup,
        expected_version: u64,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.groups.get_mut(&group.id) {
            Some(current) if current.version == expected_version => {
                let mut next = group.clone();
                next.version = expected_version + 1;
                *current = next;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError(format!("error group missing: {}", group.id))),
        }
    }

    async fn get_error_group(&self, id: &str) -> Result<Option<ErrorGroup>, StoreError> {
        Ok(self.inner.lock().await.groups.get(id).cloned())
    }

    async fn list_error_groups(
        &self,
        filter: &ErrorGroupFilter,
    ) -> Result<Vec<ErrorGroup>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<ErrorGroup> = inner
            .groups
            .values()
            .filter(|g| filter.matches(g))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn insert_incident(&self, incident: &Incident) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.incident_keys.insert(incident.idempotency_key.clone()) {
            return Ok(false);
        }
        inner.incidents.insert(incident.id.clone(), incident.clone());
        Ok(true)
    }

    async fn update_incident(&self, incident: &Incident) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.incidents.get_mut(&incident.id) {
            Some(current) => {
                *current = incident.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_incident(&self, id: &str) -> Result<Option<Incident>, StoreError> {
        Ok(self.inner.lock().await.incidents.get(id).cloned())
    }

    async fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<Incident> = inner
            .incidents
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn active_incident_for_group(
        &self,
        error_group_id: &str,
    ) -> Result<Option<Incident>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .incidents
            .values()
            .find(|i| i.error_group_id == error_group_id && i.status.is_active())
            .cloned())
    }

    async fn insert_run(&self, run: &ReplayRun) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .runs
            .insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn update_run(&self, run: &ReplayRun) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.runs.get_mut(&run.id) {
            Some(current) => {
                *current = run.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_run(&self, id: &str) -> Result<Option<ReplayRun>, StoreError> {
        Ok(self.inner.lock().await.runs.get(id).cloned())
    }

    async fn list_runs(&self, tenant_id: Option<&str>) -> Result<Vec<ReplayRun>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<ReplayRun> = inner
            .runs
            .values()
            .filter(|r| tenant_id.is_none_or(|t| r.tenant_id == t))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn pending_runs_for_tenant(&self, tenant_id: &str) -> Result<Vec<ReplayRun>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<ReplayRun> = inner
            .runs
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.status == ReplayRunStatus::Pending)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn insert_step(&self, step: &ReplayStep) -> Result<(), StoreError> {
        self.inner.lock().await.steps.push(step.clone());
        Ok(())
    }

    async fn steps_for_run(&self, run_id: &str) -> Result<Vec<ReplayStep>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .steps
            .iter()
            .filter(|s| s.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn recent_steps_for_endpoint(
        &self,
        tenant_id: &str,
        endpoint: &str,
        limit: usize,
    ) -> Result<Vec<ReplayStep>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<ReplayStep> = inner
            .steps
            .iter()
            .filter(|s| {
                s.endpoint == endpoint
                    && inner
                        .runs
                        .get(&s.run_id)
                        .is_some_and(|r| r.tenant_id == tenant_id)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out.truncate(limit);
        Ok(out)
    }

    async fn acquire_replay_lease(
        &self,
        tenant_id: &str,
        run_id: &str,
        now_ms: u64,
        ttl_ms: u64,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.leases.get(tenant_id) {
            Some((_, lease)) if lease.expires_at > now_ms => Ok(false),
            _ => {
                inner.leases.insert(
                    tenant_id.to_string(),
                    (
                        run_id.to_string(),
                        Lease {
                            expires_at: now_ms + ttl_ms,
                        },
                    ),
                );
                Ok(true)
            }
        }
    }

    async fn renew_replay_lease(
        &self,
        tenant_id: &str,
        run_id: &str,
        now_ms: u64,
        ttl_ms: u64,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.leases.get_mut(tenant_id) {
            Some((holder, lease)) if holder == run_id && lease.expires_at > now_ms => {
                lease.expires_at = now_ms + ttl_ms;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_replay_lease(
        &self,
        tenant_id: &str,
        run_id: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner
            .leases
            .get(tenant_id)
            .is_some_and(|(holder, _)| holder == run_id)
        {
            inner.leases.remove(tenant_id);
        }
        Ok(())
    }

    async fn insert_action_log(&self, log: &ActionLog) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .actions
            .insert(log.id.clone(), log.clone());
        Ok(())
    }

    async fn update_action_log(&self, log: &ActionLog) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.actions.get_mut(&log.id) {
            Some(current) => {
                *current = log.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_action_log(&self, id: &str) -> Result<Option<ActionLog>, StoreError> {
        Ok(self.inner.lock().await.actions.get(id).cloned())
    }

    async fn list_action_logs(
        &self,
        filter: &ActionLogFilter,
    ) -> Result<Vec<ActionLog>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<ActionLog> = inner
            .actions
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn pending_actions_before(&self, cutoff_ms: u64) -> Result<Vec<ActionLog>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .actions
            .values()
            .filter(|l| l.status == ActionLogStatus::PendingApproval && l.created_at < cutoff_ms)
            .cloned()
            .collect())
    }

    async fn put_tenant_health(&self, health: &TenantHealth) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .health
            .insert(health.tenant_id.clone(), health.clone());
        Ok(())
    }

    async fn get_tenant_health(&self, tenant_id: &str) -> Result<Option<TenantHealth>, StoreError> {
        Ok(self.inner.lock().await.health.get(tenant_id).cloned())
    }

    async fn list_tenant_health(&self) -> Result<Vec<TenantHealth>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<TenantHealth> = inner.health.values().cloned().collect();
        out.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        Ok(out)
    }
}
