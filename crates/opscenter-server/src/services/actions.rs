// SPDX-License-Identifier: Apache-2.0

//! Approval-gated action gateway: every remediation request becomes an
//! `ActionLog` entry before anything touches a tenant backend. Low-risk
//! actions run immediately, high-risk ones park in PENDING_APPROVAL until a
//! second operator approves or rejects them, and a sweep expires stale
//! pending entries.

use crate::config::OpsConfig;
use crate::services::directory::TenantDirectory;
use async_trait::async_trait;
use opscenter_core::{unix_millis, IdGen, OpsError};
use opscenter_model::{ActionCatalogItem, ActionLog, ActionLogStatus};
use opscenter_store::{ActionLogFilter, OpsStore, StoreError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Outbound port for the mutation itself. Implementations return a short
/// human-readable effect description on success.
#[async_trait]
pub trait ActionExecutor: Send + Sync + 'static {
    async fn execute(
        &self,
        item: &ActionCatalogItem,
        tenant_id: &str,
        base_url: &str,
        target: &BTreeMap<String, String>,
    ) -> Result<String, String>;
}

/// Calls the tenant backend's internal ops endpoint for the action.
pub struct HttpActionExecutor {
    client: reqwest::Client,
    bearer: Option<String>,
}

impl HttpActionExecutor {
    #[must_use]
    pub fn new(bearer: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            bearer,
        }
    }
}

#[async_trait]
impl ActionExecutor for HttpActionExecutor {
    async fn execute(
        &self,
        item: &ActionCatalogItem,
        tenant_id: &str,
        base_url: &str,
        target: &BTreeMap<String, String>,
    ) -> Result<String, String> {
        let url = format!("{base_url}/internal/ops/actions/{}", item.key);
        let mut request = self
            .client
            .post(&url)
            .header("x-tenant-id", tenant_id)
            .json(target)
            .timeout(std::time::Duration::from_secs(30));
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if status.is_success() {
            Ok(format!("{} applied to {tenant_id}", item.key))
        } else {
            Err(format!("backend returned {status} for {}", item.key))
        }
    }
}

fn store_err(e: StoreError) -> OpsError {
    OpsError::internal(e.0)
}

pub struct ActionGateway {
    store: Arc<dyn OpsStore>,
    executor: Arc<dyn ActionExecutor>,
    directory: Arc<dyn TenantDirectory>,
    catalog: Vec<ActionCatalogItem>,
    ids: IdGen,
    approval_ttl_ms: u64,
}

/// What `execute` hands back to the HTTP layer.
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    pub log: ActionLog,
    pub requires_approval: bool,
}

impl ActionGateway {
    #[must_use]
    pub fn new(
        store: Arc<dyn OpsStore>,
        executor: Arc<dyn ActionExecutor>,
        directory: Arc<dyn TenantDirectory>,
        catalog: Vec<ActionCatalogItem>,
        config: &OpsConfig,
    ) -> Self {
        Self {
            store,
            executor,
            directory,
            catalog,
            ids: IdGen::new("act"),
            approval_ttl_ms: config.approval_ttl_ms,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &[ActionCatalogItem] {
        &self.catalog
    }

    fn item(&self, action_key: &str) -> Option<&ActionCatalogItem> {
        self.catalog.iter().find(|i| i.key == action_key)
    }

    pub async fn execute(
        &self,
        tenant_id: &str,
        action_key: &str,
        target: BTreeMap<String, String>,
        reason: String,
        dry_run: bool,
        requested_by: &str,
    ) -> Result<ExecuteOutcome, OpsError> {
        let tenant = self
            .directory
            .get(tenant_id)
            .ok_or_else(|| OpsError::invalid_argument(format!("unknown tenant: {tenant_id}")))?;
        let item = self
            .item(action_key)
            .ok_or_else(|| OpsError::invalid_argument(format!("unknown action: {action_key}")))?
            .clone();
        let missing = item.missing_target_keys(&target);
        if !missing.is_empty() {
            return Err(OpsError::invalid_argument(format!(
                "missing target keys: {}",
                missing.join(", ")
            )));
        }
        let now = unix_millis();
        let mut log = ActionLog::new(
            self.ids.next(),
            tenant.id.clone(),
            item.key.clone(),
            target,
            reason,
            dry_run,
            ActionLogStatus::PendingApproval,
            requested_by.to_string(),
            now,
        );

        if dry_run {
            log.status = ActionLogStatus::Simulated;
            log.effect = Some(format!("would apply {} to {}", item.key, tenant.id));
            log.validate_strict()
                .map_err(|e| OpsError::invalid_argument(e.0))?;
            self.store.insert_action_log(&log).await.map_err(store_err)?;
            return Ok(ExecuteOutcome {
                log,
                requires_approval: false,
            });
        }

        log.validate_strict()
            .map_err(|e| OpsError::invalid_argument(e.0))?;

        if item.requires_approval {
            self.store.insert_action_log(&log).await.map_err(store_err)?;
            info!(
                action_log_id = %log.id,
                action_key = %item.key,
                tenant_id = %tenant.id,
                "action parked pending approval"
            );
            return Ok(ExecuteOutcome {
                log,
                requires_approval: true,
            });
        }

        self.run_mutation(&mut log, &item, &tenant.base_url).await;
        self.store.insert_action_log(&log).await.map_err(store_err)?;
        Ok(ExecuteOutcome {
            log,
            requires_approval: false,
        })
    }

    /// Second-operator approval. Runs the mutation exactly once; the log
    /// moves to EXECUTED or FAILED and is terminal either way.
    pub async fn approve(
        &self,
        id: &str,
        approver: &str,
        note: Option<String>,
    ) -> Result<ActionLog, OpsError> {
        let mut log = self.load_pending(id).await?;
        if log.requested_by == approver {
            return Err(OpsError::conflict(
                "actions may not be approved by their requester",
            ));
        }
        let now = unix_millis();
        if now.saturating_sub(log.created_at) > self.approval_ttl_ms {
            log.status = ActionLogStatus::Expired;
            self.store.update_action_log(&log).await.map_err(store_err)?;
            return Err(OpsError::expired(format!("approval window elapsed for {id}")));
        }
        let item = self.item(&log.action_key).cloned().ok_or_else(|| {
            OpsError::internal(format!("action {} vanished from catalog", log.action_key))
        })?;
        let tenant = self.directory.get(&log.tenant_id).ok_or_else(|| {
            OpsError::internal(format!("tenant {} vanished from directory", log.tenant_id))
        })?;
        log.approved_by = Some(approver.to_string());
        log.approved_at = Some(now);
        log.decision_note = note;
        self.run_mutation(&mut log, &item, &tenant.base_url).await;
        self.store.update_action_log(&log).await.map_err(store_err)?;
        Ok(log)
    }

    pub async fn reject(
        &self,
        id: &str,
        approver: &str,
        note: Option<String>,
    ) -> Result<ActionLog, OpsError> {
        let mut log = self.load_pending(id).await?;
        if log.requested_by == approver {
            return Err(OpsError::conflict(
                "actions may not be rejected by their requester",
            ));
        }
        log.status = ActionLogStatus::Rejected;
        log.approved_by = Some(approver.to_string());
        log.approved_at = Some(unix_millis());
        log.decision_note = note;
        self.store.update_action_log(&log).await.map_err(store_err)?;
        info!(action_log_id = %log.id, approver, "action rejected");
        Ok(log)
    }

    /// Expires PENDING_APPROVAL entries older than the TTL. Returns how many
    /// were expired.
    pub async fn sweep(&self, now_ms: u64) -> Result<u64, OpsError> {
        let cutoff = now_ms.saturating_sub(self.approval_ttl_ms);
        let stale = self
            .store
            .pending_actions_before(cutoff)
            .await
            .map_err(store_err)?;
        let mut expired = 0u64;
        for mut log in stale {
            log.status = ActionLogStatus::Expired;
            if self.store.update_action_log(&log).await.map_err(store_err)? {
                expired += 1;
                warn!(action_log_id = %log.id, "pending action expired unapproved");
            }
        }
        Ok(expired)
    }

    pub async fn get(&self, id: &str) -> Result<ActionLog, OpsError> {
        self.store
            .get_action_log(id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| OpsError::not_found(format!("action log not found: {id}")))
    }

    pub async fn list(&self, filter: &ActionLogFilter) -> Result<Vec<ActionLog>, OpsError> {
        self.store.list_action_logs(filter).await.map_err(store_err)
    }

    async fn load_pending(&self, id: &str) -> Result<ActionLog, OpsError> {
        let log = self.get(id).await?;
        if log.status != ActionLogStatus::PendingApproval {
            return Err(OpsError::conflict(format!(
                "action log {id} is not pending approval"
            )));
        }
        Ok(log)
    }

    async fn run_mutation(&self, log: &mut ActionLog, item: &ActionCatalogItem, base_url: &str) {
        match self
            .executor
            .execute(item, &log.tenant_id, base_url, &log.target)
            .await
        {
            Ok(effect) => {
                log.status = ActionLogStatus::Executed;
                log.effect = Some(effect);
                info!(
                    action_log_id = %log.id,
                    action_key = %log.action_key,
                    tenant_id = %log.tenant_id,
                    "action executed"
                );
            }
            Err(reason) => {
                log.status = ActionLogStatus::Failed;
                log.failure_reason = Some(reason.clone());
                warn!(
                    action_log_id = %log.id,
                    action_key = %log.action_key,
                    reason,
                    "action failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::directory::{StaticTenantDirectory, TenantInfo};
    use opscenter_model::builtin_action_catalog;
    use opscenter_store::MemoryStore;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FakeExecutor {
        fail: bool,
        calls: AtomicU64,
    }

    impl FakeExecutor {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                calls: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl ActionExecutor for FakeExecutor {
        async fn execute(
            &self,
            item: &ActionCatalogItem,
            tenant_id: &str,
            _base_url: &str,
            _target: &BTreeMap<String, String>,
        ) -> Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err("backend returned 503".to_string())
            } else {
                Ok(format!("{} applied to {tenant_id}", item.key))
            }
        }
    }

    fn gateway(fail: bool) -> (ActionGateway, Arc<FakeExecutor>) {
        let executor = Arc::new(FakeExecutor::new(fail));
        let directory = Arc::new(StaticTenantDirectory::new(vec![TenantInfo {
            id: "acme".to_string(),
            base_url: "http://acme.internal".to_string(),
            maintenance: false,
        }]));
        let gateway = ActionGateway::new(
            Arc::new(MemoryStore::new()),
            executor.clone(),
            directory,
            builtin_action_catalog(),
            &OpsConfig::default(),
        );
        (gateway, executor)
    }

    fn target(key: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(key.to_string(), "all".to_string())])
    }

    #[tokio::test]
    async fn unknown_action_and_tenant_rejected() {
        let (gateway, _) = gateway(false);
        let err = gateway
            .execute("ghost", "clear_tenant_cache", target("scope"), "r".into(), false, "ana")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
        let err = gateway
            .execute("acme", "delete_everything", target("scope"), "r".into(), false, "ana")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }

    #[tokio::test]
    async fn missing_target_keys_rejected() {
        let (gateway, executor) = gateway(false);
        let err = gateway
            .execute("acme", "clear_tenant_cache", BTreeMap::new(), "r".into(), false, "ana")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
        assert!(err.message().contains("scope"));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dry_run_simulates_without_mutation() {
        let (gateway, executor) = gateway(false);
        let outcome = gateway
            .execute("acme", "rotate_tenant_api_key", target("key_id"), "drill".into(), true, "ana")
            .await
            .unwrap();
        assert_eq!(outcome.log.status, ActionLogStatus::Simulated);
        assert!(outcome.log.effect.as_deref().unwrap_or("").contains("would apply"));
        assert!(!outcome.requires_approval);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn low_risk_action_executes_immediately() {
        let (gateway, executor) = gateway(false);
        let outcome = gateway
            .execute("acme", "clear_tenant_cache", target("scope"), "stale dashboards".into(), false, "ana")
            .await
            .unwrap();
        assert_eq!(outcome.log.status, ActionLogStatus::Executed);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        let stored = gateway.get(&outcome.log.id).await.unwrap();
        assert_eq!(stored.status, ActionLogStatus::Executed);
    }

    #[tokio::test]
    async fn executor_failure_recorded_as_failed() {
        let (gateway, _) = gateway(true);
        let outcome = gateway
            .execute("acme", "requeue_failed_jobs", target("queue"), "dlq backlog".into(), false, "ana")
            .await
            .unwrap();
        assert_eq!(outcome.log.status, ActionLogStatus::Failed);
        assert!(outcome.log.failure_reason.as_deref().unwrap_or("").contains("503"));
    }

    #[tokio::test]
    async fn high_risk_action_parks_pending() {
        let (gateway, executor) = gateway(false);
        let outcome = gateway
            .execute("acme", "rotate_tenant_api_key", target("key_id"), "leaked key".into(), false, "ana")
            .await
            .unwrap();
        assert!(outcome.requires_approval);
        assert_eq!(outcome.log.status, ActionLogStatus::PendingApproval);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn approval_runs_mutation_once() {
        let (gateway, executor) = gateway(false);
        let outcome = gateway
            .execute("acme", "rotate_tenant_api_key", target("key_id"), "leaked key".into(), false, "ana")
            .await
            .unwrap();
        let approved = gateway
            .approve(&outcome.log.id, "ben", Some("verified leak".into()))
            .await
            .unwrap();
        assert_eq!(approved.status, ActionLogStatus::Executed);
        assert_eq!(approved.approved_by.as_deref(), Some("ben"));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);

        // Terminal now, a second approval conflicts.
        let err = gateway.approve(&outcome.log.id, "ben", None).await.unwrap_err();
        assert_eq!(err.code(), "conflict");
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn self_approval_conflicts() {
        let (gateway, executor) = gateway(false);
        let outcome = gateway
            .execute("acme", "force_session_logout", target("portal"), "compromise".into(), false, "ana")
            .await
            .unwrap();
        let err = gateway.approve(&outcome.log.id, "ana", None).await.unwrap_err();
        assert_eq!(err.code(), "conflict");
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn self_rejection_conflicts() {
        let (gateway, executor) = gateway(false);
        let outcome = gateway
            .execute("acme", "force_session_logout", target("portal"), "compromise".into(), false, "ana")
            .await
            .unwrap();
        let err = gateway.reject(&outcome.log.id, "ana", None).await.unwrap_err();
        assert_eq!(err.code(), "conflict");
        // Still pending; a second operator can decide it.
        let stored = gateway.get(&outcome.log.id).await.unwrap();
        assert_eq!(stored.status, ActionLogStatus::PendingApproval);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reject_moves_pending_to_rejected() {
        let (gateway, executor) = gateway(false);
        let outcome = gateway
            .execute("acme", "rotate_tenant_api_key", target("key_id"), "leaked key".into(), false, "ana")
            .await
            .unwrap();
        let rejected = gateway
            .reject(&outcome.log.id, "ben", Some("false alarm".into()))
            .await
            .unwrap();
        assert_eq!(rejected.status, ActionLogStatus::Rejected);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        let err = gateway.approve(&outcome.log.id, "ben", None).await.unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[tokio::test]
    async fn stale_approval_expires_the_log() {
        let (gateway, executor) = gateway(false);
        let outcome = gateway
            .execute("acme", "rotate_tenant_api_key", target("key_id"), "leaked key".into(), false, "ana")
            .await
            .unwrap();
        let mut log = gateway.get(&outcome.log.id).await.unwrap();
        log.created_at = 1;
        gateway.store.update_action_log(&log).await.unwrap();

        let err = gateway.approve(&log.id, "ben", None).await.unwrap_err();
        assert_eq!(err.code(), "expired");
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        let stored = gateway.get(&log.id).await.unwrap();
        assert_eq!(stored.status, ActionLogStatus::Expired);
    }

    #[tokio::test]
    async fn sweep_expires_old_pending_entries() {
        let (gateway, _) = gateway(false);
        let outcome = gateway
            .execute("acme", "rotate_tenant_api_key", target("key_id"), "leaked key".into(), false, "ana")
            .await
            .unwrap();
        let mut log = gateway.get(&outcome.log.id).await.unwrap();
        log.created_at = 1;
        gateway.store.update_action_log(&log).await.unwrap();

        let expired = gateway.sweep(unix_millis()).await.unwrap();
        assert_eq!(expired, 1);
        let stored = gateway.get(&log.id).await.unwrap();
        assert_eq!(stored.status, ActionLogStatus::Expired);
        // Idempotent: nothing pending left.
        assert_eq!(gateway.sweep(unix_millis()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dry_run_requires_reason() {
        let (gateway, _) = gateway(false);
        let err = gateway
            .execute("acme", "clear_tenant_cache", target("scope"), "  ".into(), true, "ana")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }
}
