// SPDX-License-Identifier: Apache-2.0

//! Incident correlation: opens an incident when an unlocked error group
//! crosses the in-window threshold, and resolves it again after a quiet
//! cool-down. One active incident per group, one incident per
//! `tenant|group|day` key, enforced in the store.

use crate::config::OpsConfig;
use opscenter_core::{unix_millis, OpsError};
use opscenter_model::{ErrorGroup, Incident, IncidentSeverity};
use opscenter_store::{IncidentFilter, OpsStore, StoreError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Correlator {
    store: Arc<dyn OpsStore>,
    threshold: u64,
    window_ms: u64,
    cooldown_ms: u64,
    /// Incidents opened by this process, scraped into `/metrics`.
    pub opened_total: AtomicU64,
}

fn store_err(e: StoreError) -> OpsError {
    OpsError::internal(e.0)
}

impl Correlator {
    #[must_use]
    pub fn new(store: Arc<dyn OpsStore>, config: &OpsConfig) -> Self {
        Self {
            store,
            threshold: config.incident_threshold,
            window_ms: config.incident_window_ms,
            cooldown_ms: config.resolve_cooldown_ms,
            opened_total: AtomicU64::new(0),
        }
    }

    /// Called after every successful ingest upsert. Returns the incident it
    /// opened, if any.
    pub async fn observe(&self, group: &ErrorGroup, now_ms: u64) -> Result<Option<Incident>, OpsError> {
        if group.is_locked {
            return Ok(None);
        }
        let in_window = group.count_since(now_ms.saturating_sub(self.window_ms));
        if in_window < self.threshold {
            return Ok(None);
        }
        if self
            .store
            .active_incident_for_group(&group.id)
            .await
            .map_err(store_err)?
            .is_some()
        {
            return Ok(None);
        }
        let severity = if group.key.status_code == 429 {
            IncidentSeverity::P2
        } else {
            IncidentSeverity::P1
        };
        let title = format!(
            "{} {} {} returning {} for {}",
            group.key.portal, group.key.method, group.key.endpoint, group.key.status_code,
            group.key.tenant_id
        );
        let incident = Incident::open(
            severity,
            group.key.tenant_id.clone(),
            title,
            group.id.clone(),
            now_ms,
        );
        // A loser on the idempotency key means another pass already opened
        // today's incident for this group.
        if self.store.insert_incident(&incident).await.map_err(store_err)? {
            self.opened_total.fetch_add(1, Ordering::Relaxed);
            info!(incident = %incident.id, group = %group.id, "incident opened");
            Ok(Some(incident))
        } else {
            Ok(None)
        }
    }

    pub async fn acknowledge(&self, id: &str, operator: &str) -> Result<Incident, OpsError> {
        let mut incident = self
            .store
            .get_incident(id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| OpsError::not_found(format!("incident not found: {id}")))?;
        incident
            .acknowledge(operator, unix_millis())
            .map_err(|e| OpsError::conflict(e.0))?;
        self.store
            .update_incident(&incident)
            .await
            .map_err(store_err)?;
        Ok(incident)
    }

    pub async fn resolve(&self, id: &str, operator: &str) -> Result<Incident, OpsError> {
        let mut incident = self
            .store
            .get_incident(id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| OpsError::not_found(format!("incident not found: {id}")))?;
        incident
            .resolve(operator, unix_millis())
            .map_err(|e| OpsError::conflict(e.0))?;
        self.store
            .update_incident(&incident)
            .await
            .map_err(store_err)?;
        Ok(incident)
    }

    /// Auto-resolves active incidents whose group has been quiet for the
    /// whole cool-down. Runs on the background tick.
    pub async fn auto_resolve_pass(&self, now_ms: u64) -> Result<u64, OpsError> {
        let active = self
            .store
            .list_incidents(&IncidentFilter {
                active_only: true,
                ..IncidentFilter::default()
            })
            .await
            .map_err(store_err)?;
        let mut resolved = 0;
        for mut incident in active {
            let quiet_since = match self
                .store
                .get_error_group(&incident.error_group_id)
                .await
                .map_err(store_err)?
            {
                Some(group) => group.last_seen_at,
                None => incident.started_at,
            };
            if now_ms.saturating_sub(quiet_since) < self.cooldown_ms {
                continue;
            }
            if let Err(e) = incident.resolve("system", now_ms) {
                warn!(incident = %incident.id, error = %e.0, "auto-resolve skipped");
                continue;
            }
            self.store
                .update_incident(&incident)
                .await
                .map_err(store_err)?;
            info!(incident = %incident.id, "incident auto-resolved after cool-down");
            resolved += 1;
        }
        Ok(resolved)
    }
}
