#![forbid(unsafe_code)]

//! Persistence port for the operations center.
//!
//! Every durable entity lives behind the [`OpsStore`] trait so the service
//! crates can run against the in-memory backend in tests and the sqlite
//! backend in deployments.

use async_trait::async_trait;
use opscenter_model::{
    ActionLog, ActionLogStatus, ErrorGroup, Incident, IncidentStatus, Portal, ReplayRun,
    ReplayStep, TenantHealth,
};
use std::fmt;

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorGroupFilter {
    pub tenant_id: Option<String>,
    pub portal: Option<Portal>,
    pub status_codes: Vec<u16>,
    /// Keep groups whose `last_seen_at` is at or after this timestamp.
    pub since_ms: Option<u64>,
}

impl ErrorGroupFilter {
    #[must_use]
    pub fn matches(&self, group: &ErrorGroup) -> bool {
        if let Some(tenant) = &self.tenant_id {
            if &group.key.tenant_id != tenant {
                return false;
            }
        }
        if let Some(portal) = self.portal {
            if group.key.portal != portal {
                return false;
            }
        }
        if !self.status_codes.is_empty() && !self.status_codes.contains(&group.key.status_code) {
            return false;
        }
        if let Some(since) = self.since_ms {
            if group.last_seen_at < since {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentFilter {
    pub tenant_id: Option<String>,
    pub status: Option<IncidentStatus>,
    /// Keep only OPEN and ACKNOWLEDGED incidents.
    pub active_only: bool,
}

impl IncidentFilter {
    #[must_use]
    pub fn matches(&self, incident: &Incident) -> bool {
        if let Some(tenant) = &self.tenant_id {
            if incident.tenant_id.as_deref() != Some(tenant.as_str()) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if incident.status != status {
                return false;
            }
        }
        if self.active_only && !incident.status.is_active() {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionLogFilter {
    pub tenant_id: Option<String>,
    pub status: Option<ActionLogStatus>,
}

impl ActionLogFilter {
    #[must_use]
    pub fn matches(&self, log: &ActionLog) -> bool {
        if let Some(tenant) = &self.tenant_id {
            if &log.tenant_id != tenant {
                return false;
            }
        }
        if let Some(status) = self.status {
            if log.status != status {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait OpsStore: Send + Sync + 'static {
    /// Inserts a new group; returns false when the id is already present
    /// (a concurrent writer created it first).
    async fn insert_error_group(&self, group: &ErrorGroup) -> Result<bool, StoreError>;

    /// Optimistic write: persists the group with `version = expected + 1`
    /// only when the stored version still equals `expected_version`.
    async fn update_error_group(
        &self,
        group: &ErrorGroup,
        expected_version: u64,
    ) -> Result<bool, StoreError>;

    async fn get_error_group(&self, id: &str) -> Result<Option<ErrorGroup>, StoreError>;

    /// Newest-first by `last_seen_at`.
    async fn list_error_groups(
        &self,
        filter: &ErrorGroupFilter,
    ) -> Result<Vec<ErrorGroup>, StoreError>;

    /// Idempotency-keyed insert; false means the key already exists.
    async fn insert_incident(&self, incident: &Incident) -> Result<bool, StoreError>;

    async fn update_incident(&self, incident: &Incident) -> Result<bool, StoreError>;

    async fn get_incident(&self, id: &str) -> Result<Option<Incident>, StoreError>;

    /// Newest-first by `started_at`.
    async fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, StoreError>;

    async fn active_incident_for_group(
        &self,
        error_group_id: &str,
    ) -> Result<Option<Incident>, StoreError>;

    async fn insert_run(&self, run: &ReplayRun) -> Result<(), StoreError>;

    async fn update_run(&self, run: &ReplayRun) -> Result<bool, StoreError>;

    async fn get_run(&self, id: &str) -> Result<Option<ReplayRun>, StoreError>;

    /// Newest-first by `created_at`.
    async fn list_runs(&self, tenant_id: Option<&str>) -> Result<Vec<ReplayRun>, StoreError>;

    async fn pending_runs_for_tenant(&self, tenant_id: &str) -> Result<Vec<ReplayRun>, StoreError>;

    async fn insert_step(&self, step: &ReplayStep) -> Result<(), StoreError>;

    /// Oldest-first, in execution order.
    async fn steps_for_run(&self, run_id: &str) -> Result<Vec<ReplayStep>, StoreError>;

    /// Newest steps any run of this tenant produced against the endpoint.
    async fn recent_steps_for_endpoint(
        &self,
        tenant_id: &str,
        endpoint: &str,
        limit: usize,
    ) -> Result<Vec<ReplayStep>, StoreError>;

    /// Claims the per-tenant lease when it is absent or expired.
    async fn acquire_replay_lease(
        &self,
        tenant_id: &str,
        run_id: &str,
        now_ms: u64,
        ttl_ms: u64,
    ) -> Result<bool, StoreError>;

    /// Extends a still-held, still-valid lease; false means it was lost.
    async fn renew_replay_lease(
        &self,
        tenant_id: &str,
        run_id: &str,
        now_ms: u64,
        ttl_ms: u64,
    ) -> Result<bool, StoreError>;

    async fn release_replay_lease(&self, tenant_id: &str, run_id: &str)
        -> Result<(), StoreError>;

    async fn insert_action_log(&self, log: &ActionLog) -> Result<(), StoreError>;

    async fn update_action_log(&self, log: &ActionLog) -> Result<bool, StoreError>;

    async fn get_action_log(&self, id: &str) -> Result<Option<ActionLog>, StoreError>;

    /// Newest-first by `created_at`.
    async fn list_action_logs(&self, filter: &ActionLogFilter)
        -> Result<Vec<ActionLog>, StoreError>;

    /// PENDING_APPROVAL entries created strictly before `cutoff_ms`.
    async fn pending_actions_before(&self, cutoff_ms: u64) -> Result<Vec<ActionLog>, StoreError>;

    async fn put_tenant_health(&self, health: &TenantHealth) -> Result<(), StoreError>;

    async fn get_tenant_health(&self, tenant_id: &str) -> Result<Option<TenantHealth>, StoreError>;

    async fn list_tenant_health(&self) -> Result<Vec<TenantHealth>, StoreError>;
}
