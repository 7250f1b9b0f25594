// SPDX-License-Identifier: Apache-2.0

//! Per-tenant timeline: merges incidents, replay runs, and action logs into
//! one timestamp-ordered feed. Cursor-free; callers page with `from`/`to`.

use opscenter_api::dto::{TimelineEvent, TimelineEventKind};
use opscenter_core::OpsError;
use opscenter_store::{ActionLogFilter, IncidentFilter, OpsStore, StoreError};
use std::sync::Arc;

const TIMELINE_LIMIT: usize = 200;

fn store_err(e: StoreError) -> OpsError {
    OpsError::internal(e.0)
}

pub struct TimelineService {
    store: Arc<dyn OpsStore>,
}

impl TimelineService {
    #[must_use]
    pub fn new(store: Arc<dyn OpsStore>) -> Self {
        Self { store }
    }

    /// Events for one tenant inside `[from_ms, to_ms]`, oldest first,
    /// capped at 200 entries.
    pub async fn events(
        &self,
        tenant_id: &str,
        from_ms: u64,
        to_ms: u64,
    ) -> Result<Vec<TimelineEvent>, OpsError> {
        if from_ms > to_ms {
            return Err(OpsError::invalid_argument("from must not exceed to"));
        }
        let mut events = Vec::new();

        let incidents = self
            .store
            .list_incidents(&IncidentFilter {
                tenant_id: Some(tenant_id.to_string()),
                status: None,
                active_only: false,
            })
            .await
            .map_err(store_err)?;
        for incident in incidents {
            events.push(TimelineEvent {
                at_ms: incident.started_at,
                kind: TimelineEventKind::Incident,
                reference_id: incident.id,
                summary: incident.title,
            });
        }

        let runs = self
            .store
            .list_runs(Some(tenant_id))
            .await
            .map_err(store_err)?;
        for run in runs {
            events.push(TimelineEvent {
                at_ms: run.created_at,
                kind: TimelineEventKind::ReplayRun,
                reference_id: run.id,
                summary: format!(
                    "{:?} replay of {} cases ({:?})",
                    run.portal,
                    run.cases.len(),
                    run.status
                ),
            });
        }

        let actions = self
            .store
            .list_action_logs(&ActionLogFilter {
                tenant_id: Some(tenant_id.to_string()),
                status: None,
            })
            .await
            .map_err(store_err)?;
        for log in actions {
            events.push(TimelineEvent {
                at_ms: log.created_at,
                kind: TimelineEventKind::Action,
                reference_id: log.id,
                summary: format!("{} requested by {} ({:?})", log.action_key, log.requested_by, log.status),
            });
        }

        events.retain(|e| e.at_ms >= from_ms && e.at_ms <= to_ms);
        // Ties break on reference id so paging stays stable across reloads.
        events.sort_by(|a, b| a.at_ms.cmp(&b.at_ms).then_with(|| a.reference_id.cmp(&b.reference_id)));
        events.truncate(TIMELINE_LIMIT);
        Ok(events)
    }
}
