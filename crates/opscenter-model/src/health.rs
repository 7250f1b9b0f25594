use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[non_exhaustive]
pub enum TenantStatus {
    Healthy,
    Degraded,
    Down,
    Maintenance,
}

/// Derived per-tenant rollup; recomputed periodically, never mutated directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct TenantHealth {
    pub tenant_id: String,
    pub status: TenantStatus,
    pub active_failures_24h: u64,
    pub open_incidents: u64,
    pub last_check_at: u64,
    #[serde(default)]
    pub last_latency_ms: Option<u64>,
}

impl TenantHealth {
    #[must_use]
    pub fn new(tenant_id: String, status: TenantStatus, last_check_at: u64) -> Self {
        Self {
            tenant_id,
            status,
            active_failures_24h: 0,
            open_incidents: 0,
            last_check_at,
            last_latency_ms: None,
        }
    }
}
