// SPDX-License-Identifier: Apache-2.0

//! Error-group deduplication: folds the failed-request feed into stable
//! groups keyed by `(tenant, portal, tab, method, endpoint, status)`.
//! Writes go through an optimistic version check with a bounded retry so
//! concurrent ingests for the same key converge on a single group.

use crate::config::OpsConfig;
use crate::services::correlator::Correlator;
use opscenter_core::{unix_millis, OpsError};
use opscenter_model::{DedupKey, ErrorGroup, TelemetryRecord};
use opscenter_store::{OpsStore, StoreError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct Deduplicator {
    store: Arc<dyn OpsStore>,
    correlator: Arc<Correlator>,
    alert_status_codes: Vec<u16>,
    retry_attempts: u32,
    pub ignored_total: AtomicU64,
}

fn store_err(e: StoreError) -> OpsError {
    OpsError::internal(e.0)
}

impl Deduplicator {
    #[must_use]
    pub fn new(store: Arc<dyn OpsStore>, correlator: Arc<Correlator>, config: &OpsConfig) -> Self {
        Self {
            store,
            correlator,
            alert_status_codes: config.alert_status_codes.clone(),
            retry_attempts: config.upsert_retry_attempts,
            ignored_total: AtomicU64::new(0),
        }
    }

    /// Ingests one telemetry record. Returns the group id it landed in, or
    /// `None` when the status code is not alert-worthy.
    pub async fn ingest(&self, record: &TelemetryRecord) -> Result<Option<String>, OpsError> {
        record
            .validate_strict()
            .map_err(|e| OpsError::invalid_argument(e.0))?;
        if !self.alert_status_codes.contains(&record.status_code) {
            self.ignored_total.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }
        let key = DedupKey::from_record(record);
        let group_id = key.group_id();

        let mut attempt = 0;
        let group = loop {
            match self
                .store
                .get_error_group(&group_id)
                .await
                .map_err(store_err)?
            {
                None => {
                    let group = ErrorGroup::open(key.clone(), record);
                    if self.store.insert_error_group(&group).await.map_err(store_err)? {
                        break group;
                    }
                    // Lost the insert race; fall through to the update path.
                }
                Some(current) => {
                    let expected = current.version;
                    let mut next = current;
                    next.record_occurrence(record);
                    if self
                        .store
                        .update_error_group(&next, expected)
                        .await
                        .map_err(store_err)?
                    {
                        next.version = expected + 1;
                        break next;
                    }
                }
            }
            attempt += 1;
            if attempt >= self.retry_attempts {
                return Err(OpsError::internal(format!(
                    "upsert contention on group {group_id} after {attempt} attempts"
                )));
            }
            tokio::time::sleep(Duration::from_millis(u64::from(attempt) * 5)).await;
        };

        // Correlation failures never surface to the feed.
        if let Err(e) = self.correlator.observe(&group, unix_millis()).await {
            warn!(group = %group.id, error = %e, "correlation failed after ingest");
        }
        Ok(Some(group_id))
    }

    pub async fn lock(
        &self,
        group_id: &str,
        operator: &str,
        note: Option<String>,
    ) -> Result<ErrorGroup, OpsError> {
        self.set_lock(group_id, Some((operator.to_string(), note))).await
    }

    pub async fn unlock(&self, group_id: &str, _operator: &str) -> Result<ErrorGroup, OpsError> {
        self.set_lock(group_id, None).await
    }

    async fn set_lock(
        &self,
        group_id: &str,
        lock: Option<(String, Option<String>)>,
    ) -> Result<ErrorGroup, OpsError> {
        let mut attempt = 0;
        loop {
            let current = self
                .store
                .get_error_group(group_id)
                .await
                .map_err(store_err)?
                .ok_or_else(|| OpsError::not_found(format!("error group not found: {group_id}")))?;
            if current.is_locked == lock.is_some() {
                let state = if current.is_locked { "locked" } else { "unlocked" };
                return Err(OpsError::conflict(format!(
                    "error group {group_id} is already {state}"
                )));
            }
            let expected = current.version;
            let mut next = current;
            match &lock {
                Some((operator, note)) => {
                    next.is_locked = true;
                    next.locked_by = Some(operator.clone());
                    next.lock_note = note.clone();
                }
                None => {
                    next.is_locked = false;
                    next.locked_by = None;
                    next.lock_note = None;
                }
            }
            if self
                .store
                .update_error_group(&next, expected)
                .await
                .map_err(store_err)?
            {
                next.version = expected + 1;
                return Ok(next);
            }
            attempt += 1;
            if attempt >= self.retry_attempts {
                return Err(OpsError::internal(format!(
                    "lock contention on group {group_id}"
                )));
            }
        }
    }
}
