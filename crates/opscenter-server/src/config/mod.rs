// SPDX-License-Identifier: Apache-2.0

/// Deployment tunables for the operations center. Every field has an
/// `OPSC_*` environment knob wired up in `main.rs`.
#[derive(Debug, Clone)]
pub struct OpsConfig {
    /// Status codes that count as alert-worthy failures.
    pub alert_status_codes: Vec<u16>,
    /// Occurrences inside the window before an incident opens (T1).
    pub incident_threshold: u64,
    /// Sliding occurrence window for incident correlation (W).
    pub incident_window_ms: u64,
    /// Quiet period after which an active incident auto-resolves (C).
    pub resolve_cooldown_ms: u64,
    /// How long a PENDING_APPROVAL action stays approvable.
    pub approval_ttl_ms: u64,
    /// Replay lease TTL; an expired lease is claimable by a new run.
    pub replay_lease_ttl_ms: u64,
    /// 24h in-window failure count above which a tenant is DEGRADED.
    pub degraded_failures_24h: u64,
    /// Optimistic upsert attempts before ingest gives up.
    pub upsert_retry_attempts: u32,
    pub health_recompute_interval_ms: u64,
    pub sweep_interval_ms: u64,
    pub max_body_bytes: usize,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            alert_status_codes: vec![500, 429],
            incident_threshold: 5,
            incident_window_ms: 10 * 60 * 1000,
            resolve_cooldown_ms: 30 * 60 * 1000,
            approval_ttl_ms: 24 * 60 * 60 * 1000,
            replay_lease_ttl_ms: 60 * 1000,
            degraded_failures_24h: 20,
            upsert_retry_attempts: 8,
            health_recompute_interval_ms: 30 * 1000,
            sweep_interval_ms: 60 * 1000,
            max_body_bytes: 1024 * 1024,
        }
    }
}
