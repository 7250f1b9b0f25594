// SPDX-License-Identifier: Apache-2.0

//! Tenant health aggregation: periodically folds open incidents, 24h
//! in-window failure counts, synthetic probe results, and the maintenance
//! flag into one status per tenant.

use crate::config::OpsConfig;
use crate::services::directory::{TenantDirectory, TenantInfo};
use async_trait::async_trait;
use opscenter_core::{OpsError, DAY_MS};
use opscenter_model::{IncidentSeverity, TenantHealth, TenantStatus};
use opscenter_store::{ErrorGroupFilter, IncidentFilter, OpsStore, StoreError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub ok: bool,
    pub latency_ms: Option<u64>,
}

#[async_trait]
pub trait HealthProbe: Send + Sync + 'static {
    async fn check(&self, tenant: &TenantInfo) -> ProbeOutcome;
}

/// Synthetic probe against the tenant portal's own health endpoint.
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpHealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self, tenant: &TenantInfo) -> ProbeOutcome {
        let url = format!("{}/healthz", tenant.base_url);
        let started = Instant::now();
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => ProbeOutcome {
                ok: response.status().is_success(),
                latency_ms: Some(started.elapsed().as_millis() as u64),
            },
            Err(e) => {
                warn!(tenant = %tenant.id, error = %e, "health probe failed");
                ProbeOutcome {
                    ok: false,
                    latency_ms: None,
                }
            }
        }
    }
}

pub struct HealthAggregator {
    store: Arc<dyn OpsStore>,
    directory: Arc<dyn TenantDirectory>,
    probe: Arc<dyn HealthProbe>,
    degraded_failures_24h: u64,
}

fn store_err(e: StoreError) -> OpsError {
    OpsError::internal(e.0)
}

impl HealthAggregator {
    #[must_use]
    pub fn new(
        store: Arc<dyn OpsStore>,
        directory: Arc<dyn TenantDirectory>,
        probe: Arc<dyn HealthProbe>,
        config: &OpsConfig,
    ) -> Self {
        Self {
            store,
            directory,
            probe,
            degraded_failures_24h: config.degraded_failures_24h,
        }
    }

    pub async fn recompute_all(&self, now_ms: u64) -> Result<(), OpsError> {
        for tenant in self.directory.tenants() {
            let snapshot = self.recompute_tenant(&tenant, now_ms).await?;
            self.store
                .put_tenant_health(&snapshot)
                .await
                .map_err(store_err)?;
        }
        Ok(())
    }

    async fn recompute_tenant(
        &self,
        tenant: &TenantInfo,
        now_ms: u64,
    ) -> Result<TenantHealth, OpsError> {
        let probe = self.probe.check(tenant).await;
        let open = self
            .store
            .list_incidents(&IncidentFilter {
                tenant_id: Some(tenant.id.clone()),
                active_only: true,
                ..IncidentFilter::default()
            })
            .await
            .map_err(store_err)?;
        let any_p1 = open.iter().any(|i| i.severity == IncidentSeverity::P1);

        let groups = self
            .store
            .list_error_groups(&ErrorGroupFilter {
                tenant_id: Some(tenant.id.clone()),
                ..ErrorGroupFilter::default()
            })
            .await
            .map_err(store_err)?;
        let failures_24h: u64 = groups
            .iter()
            .map(|g| g.count_since(now_ms.saturating_sub(DAY_MS)))
            .sum();

        let status = if any_p1 || !probe.ok {
            TenantStatus::Down
        } else if !open.is_empty() || failures_24h > self.degraded_failures_24h {
            TenantStatus::Degraded
        } else if tenant.maintenance {
            TenantStatus::Maintenance
        } else {
            TenantStatus::Healthy
        };

        let mut health = TenantHealth::new(tenant.id.clone(), status, now_ms);
        health.open_incidents = open.len() as u64;
        health.active_failures_24h = failures_24h;
        health.last_latency_ms = probe.latency_ms;
        Ok(health)
    }

    pub async fn snapshots(&self) -> Result<Vec<TenantHealth>, OpsError> {
        self.store.list_tenant_health().await.map_err(store_err)
    }
}
