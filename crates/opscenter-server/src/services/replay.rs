// SPDX-License-Identifier: Apache-2.0

//! Replay orchestration: queued runs per tenant, a TTL lease that keeps at
//! most one run executing per tenant, and serial case execution through the
//! `ReplayTransport` port on a spawned task. Dry-run mode skips mutating
//! cases without touching the transport.

use crate::config::OpsConfig;
use crate::services::directory::TenantDirectory;
use async_trait::async_trait;
use opscenter_api::dto::CreateRunRequest;
use opscenter_core::{unix_millis, IdGen, OpsError};
use opscenter_model::{
    ReplayCase, ReplayPriority, ReplayRun, ReplayRunStatus, ReplayStep, StepOutcome,
};
use opscenter_store::{OpsStore, StoreError};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Outcome of pushing one case at a tenant portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaseResult {
    pub status: u16,
    pub latency_ms: u64,
}

/// A case-level failure marks the step FAILED and the run continues; an
/// infrastructure failure (credential or transport outage) aborts the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Case(String),
    Infrastructure(String),
}

#[async_trait]
pub trait ReplayTransport: Send + Sync + 'static {
    async fn execute(&self, tenant_id: &str, case: &ReplayCase)
        -> Result<CaseResult, TransportError>;
}

/// Executes cases against the deployment's portal gateway with the
/// non-impersonating service credential.
pub struct HttpReplayTransport {
    client: reqwest::Client,
    base_url: String,
    bearer: Option<String>,
}

impl HttpReplayTransport {
    #[must_use]
    pub fn new(base_url: String, bearer: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer,
        }
    }
}

#[async_trait]
impl ReplayTransport for HttpReplayTransport {
    async fn execute(
        &self,
        tenant_id: &str,
        case: &ReplayCase,
    ) -> Result<CaseResult, TransportError> {
        let method = reqwest::Method::from_bytes(case.method.as_bytes())
            .map_err(|_| TransportError::Case(format!("bad method {}", case.method)))?;
        let url = format!("{}{}", self.base_url, case.endpoint);
        let mut request = self
            .client
            .request(method, &url)
            .header("x-tenant-id", tenant_id)
            .timeout(Duration::from_secs(30));
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }
        let started = Instant::now();
        match request.send().await {
            Ok(response) => Ok(CaseResult {
                status: response.status().as_u16(),
                latency_ms: started.elapsed().as_millis() as u64,
            }),
            Err(e) if e.is_timeout() || e.is_status() => {
                Err(TransportError::Case(e.to_string()))
            }
            Err(e) => Err(TransportError::Infrastructure(e.to_string())),
        }
    }
}

pub struct ReplayOrchestrator {
    store: Arc<dyn OpsStore>,
    transport: Arc<dyn ReplayTransport>,
    directory: Arc<dyn TenantDirectory>,
    catalog: Arc<Vec<ReplayCase>>,
    run_ids: IdGen,
    step_ids: IdGen,
    lease_ttl_ms: u64,
}

fn store_err(e: StoreError) -> OpsError {
    OpsError::internal(e.0)
}

impl ReplayOrchestrator {
    #[must_use]
    pub fn new(
        store: Arc<dyn OpsStore>,
        transport: Arc<dyn ReplayTransport>,
        directory: Arc<dyn TenantDirectory>,
        catalog: Vec<ReplayCase>,
        config: &OpsConfig,
    ) -> Self {
        Self {
            store,
            transport,
            directory,
            catalog: Arc::new(catalog),
            run_ids: IdGen::new("run"),
            step_ids: IdGen::new("step"),
            lease_ttl_ms: config.replay_lease_ttl_ms,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &[ReplayCase] {
        &self.catalog
    }

    fn case(&self, case_id: &str) -> Option<&ReplayCase> {
        self.catalog.iter().find(|c| c.case_id == case_id)
    }

    /// Validates and enqueues a run, then tries to start it. A HIGH request
    /// displaces a queued NORMAL run; nothing ever preempts a RUNNING run.
    pub async fn create_run(self: &Arc<Self>, req: &CreateRunRequest) -> Result<ReplayRun, OpsError> {
        if self.directory.get(&req.tenant_id).is_none() {
            return Err(OpsError::invalid_argument(format!(
                "unknown tenant: {}",
                req.tenant_id
            )));
        }
        if req.cases.is_empty() {
            return Err(OpsError::invalid_argument("cases must not be empty"));
        }
        for case_id in &req.cases {
            let case = self.case(case_id).ok_or_else(|| {
                OpsError::invalid_argument(format!("unknown replay case: {case_id}"))
            })?;
            if case.portal != req.portal {
                return Err(OpsError::invalid_argument(format!(
                    "case {case_id} belongs to portal {}, not {}",
                    case.portal, req.portal
                )));
            }
        }

        let now = unix_millis();
        let queued = self
            .store
            .pending_runs_for_tenant(&req.tenant_id)
            .await
            .map_err(store_err)?;
        if let Some(existing) = queued.first() {
            if req.priority == ReplayPriority::High && existing.priority == ReplayPriority::Normal {
                let mut displaced = existing.clone();
                displaced.status = ReplayRunStatus::Canceled;
                displaced.finished_at = Some(now);
                displaced.failure_reason = Some("displaced by high-priority run".to_string());
                self.store.update_run(&displaced).await.map_err(store_err)?;
                info!(run = %displaced.id, "queued run displaced");
            } else {
                return Err(OpsError::conflict(format!(
                    "tenant {} already has a queued run: {}",
                    req.tenant_id, existing.id
                )));
            }
        }

        let run = ReplayRun::pending(
            self.run_ids.next(),
            req.tenant_id.clone(),
            req.portal,
            req.cases.clone(),
            req.dry_run,
            req.priority,
            now,
        );
        run.validate_strict()
            .map_err(|e| OpsError::invalid_argument(e.0))?;
        self.store.insert_run(&run).await.map_err(store_err)?;
        info!(run = %run.id, tenant = %run.tenant_id, dry_run = run.dry_run, "run queued");

        self.clone().pump(req.tenant_id.clone()).await?;
        self.store
            .get_run(&run.id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| OpsError::internal(format!("run vanished: {}", run.id)))
    }

    /// Promotes the tenant's oldest queued run to RUNNING if the tenant
    /// lease is free, and spawns its executor.
    pub async fn pump(self: Arc<Self>, tenant_id: String) -> Result<(), OpsError> {
        let pending = self
            .store
            .pending_runs_for_tenant(&tenant_id)
            .await
            .map_err(store_err)?;
        let Some(mut run) = pending.into_iter().next() else {
            return Ok(());
        };
        let now = unix_millis();
        if !self
            .store
            .acquire_replay_lease(&tenant_id, &run.id, now, self.lease_ttl_ms)
            .await
            .map_err(store_err)?
        {
            return Ok(());
        }
        run.status = ReplayRunStatus::Running;
        run.started_at = Some(now);
        self.store.update_run(&run).await.map_err(store_err)?;
        info!(run = %run.id, tenant = %tenant_id, "run started");
        let orchestrator = self.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.execute_run(run).await {
                error!(error = %e, "run executor failed");
            }
        });
        Ok(())
    }

    fn execute_run(
        self: Arc<Self>,
        mut run: ReplayRun,
    ) -> Pin<Box<dyn Future<Output = Result<(), OpsError>> + Send>> {
        Box::pin(async move {
        let mut infra_failure: Option<String> = None;
        for case_id in run.cases.clone() {
            // Reload so a stop request lands between cases.
            let current = self
                .store
                .get_run(&run.id)
                .await
                .map_err(store_err)?
                .ok_or_else(|| OpsError::internal(format!("run vanished: {}", run.id)))?;
            run.stop_requested = current.stop_requested;

            let Some(case) = self.case(&case_id).cloned() else {
                return Err(OpsError::internal(format!("case vanished: {case_id}")));
            };

            if run.stop_requested || (run.dry_run && case.is_mutating()) {
                self.record_step(&mut run, &case, StepOutcome::Skipped, None, None, None)
                    .await?;
                continue;
            }

            match self.transport.execute(&run.tenant_id, &case).await {
                Ok(result) => {
                    let outcome = if (200..300).contains(&result.status) {
                        StepOutcome::Pass
                    } else {
                        StepOutcome::Fail
                    };
                    self.record_step(
                        &mut run,
                        &case,
                        outcome,
                        Some(result.status),
                        Some(result.latency_ms),
                        None,
                    )
                    .await?;
                }
                Err(TransportError::Case(detail)) => {
                    self.record_step(
                        &mut run,
                        &case,
                        StepOutcome::Fail,
                        None,
                        None,
                        Some(detail),
                    )
                    .await?;
                }
                Err(TransportError::Infrastructure(detail)) => {
                    infra_failure = Some(detail);
                    break;
                }
            }

            // A failed renewal means the lease expired and another run
            // claimed it; continuing would put two runs on one tenant.
            if !self
                .store
                .renew_replay_lease(&run.tenant_id, &run.id, unix_millis(), self.lease_ttl_ms)
                .await
                .map_err(store_err)?
            {
                infra_failure = Some("replay lease lost to another run".to_string());
                break;
            }
        }

        let now = unix_millis();
        match infra_failure {
            Some(detail) => {
                run.status = ReplayRunStatus::Failed;
                run.failure_reason = Some(detail);
                warn!(run = %run.id, "run aborted on infrastructure failure");
            }
            None => {
                run.status = ReplayRunStatus::Completed;
            }
        }
        run.finished_at = Some(now);
        self.store.update_run(&run).await.map_err(store_err)?;
        self.store
            .release_replay_lease(&run.tenant_id, &run.id)
            .await
            .map_err(store_err)?;
        info!(run = %run.id, status = ?run.status, "run finished");

        // Whatever ended this run, the tenant's queue keeps moving. The
        // executor and `pump` call each other, so the executor returns a
        // boxed future to give the recursion a nameable type.
        self.clone().pump(run.tenant_id.clone()).await
        })
    }

    async fn record_step(
        &self,
        run: &mut ReplayRun,
        case: &ReplayCase,
        outcome: StepOutcome,
        response_status: Option<u16>,
        latency_ms: Option<u64>,
        detail: Option<String>,
    ) -> Result<(), OpsError> {
        let mut step = ReplayStep::new(
            self.step_ids.next(),
            run.id.clone(),
            case,
            outcome,
            unix_millis(),
        );
        step.response_status = response_status;
        step.latency_ms = latency_ms;
        step.detail = detail;
        run.summary.record(outcome);
        self.store.insert_step(&step).await.map_err(store_err)?;
        // A stop flagged while the case was in flight must survive this write.
        if let Some(current) = self.store.get_run(&run.id).await.map_err(store_err)? {
            run.stop_requested = run.stop_requested || current.stop_requested;
        }
        self.store.update_run(run).await.map_err(store_err)?;
        Ok(())
    }

    pub async fn get_run(&self, id: &str) -> Result<ReplayRun, OpsError> {
        self.store
            .get_run(id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| OpsError::not_found(format!("run not found: {id}")))
    }

    pub async fn steps(&self, id: &str) -> Result<Vec<ReplayStep>, OpsError> {
        let _ = self.get_run(id).await?;
        self.store.steps_for_run(id).await.map_err(store_err)
    }

    pub async fn list(&self, tenant_id: Option<&str>) -> Result<Vec<ReplayRun>, OpsError> {
        self.store.list_runs(tenant_id).await.map_err(store_err)
    }

    /// Cancels a queued run outright. Running runs can only be stopped.
    pub async fn cancel(&self, id: &str) -> Result<ReplayRun, OpsError> {
        let mut run = self.get_run(id).await?;
        if run.status != ReplayRunStatus::Pending {
            return Err(OpsError::conflict(format!(
                "run {id} is {:?}; only queued runs can be canceled",
                run.status
            )));
        }
        run.status = ReplayRunStatus::Canceled;
        run.finished_at = Some(unix_millis());
        self.store.update_run(&run).await.map_err(store_err)?;
        Ok(run)
    }

    /// Flags a running run to stop after the current case; the remaining
    /// cases are recorded as SKIPPED and the run completes.
    pub async fn stop(&self, id: &str) -> Result<ReplayRun, OpsError> {
        let mut run = self.get_run(id).await?;
        if run.status != ReplayRunStatus::Running {
            return Err(OpsError::conflict(format!(
                "run {id} is {:?}; only running runs can be stopped",
                run.status
            )));
        }
        run.stop_requested = true;
        self.store.update_run(&run).await.map_err(store_err)?;
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::directory::{StaticTenantDirectory, TenantInfo};
    use opscenter_model::builtin_replay_catalog;
    use opscenter_store::MemoryStore;
    use std::collections::HashMap;
    use tokio::sync::{Mutex, Notify};

    #[derive(Clone)]
    enum Behavior {
        Respond(u16),
        CaseError,
        InfraError,
    }

    #[derive(Default)]
    struct FakeTransport {
        by_case: Mutex<HashMap<String, Behavior>>,
        hold: Option<Arc<Notify>>,
        executed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReplayTransport for FakeTransport {
        async fn execute(
            &self,
            _tenant_id: &str,
            case: &ReplayCase,
        ) -> Result<CaseResult, TransportError> {
            if let Some(gate) = &self.hold {
                gate.notified().await;
            }
            self.executed.lock().await.push(case.case_id.clone());
            let behavior = self
                .by_case
                .lock()
                .await
                .get(&case.case_id)
                .cloned()
                .unwrap_or(Behavior::Respond(200));
            match behavior {
                Behavior::Respond(status) => Ok(CaseResult {
                    status,
                    latency_ms: 3,
                }),
                Behavior::CaseError => Err(TransportError::Case("connect timeout".to_string())),
                Behavior::InfraError => {
                    Err(TransportError::Infrastructure("gateway unreachable".to_string()))
                }
            }
        }
    }

    fn directory() -> Arc<StaticTenantDirectory> {
        Arc::new(StaticTenantDirectory::new(vec![TenantInfo {
            id: "t1".to_string(),
            base_url: "https://t1.example.com".to_string(),
            maintenance: false,
        }]))
    }

    fn orchestrator(
        store: Arc<MemoryStore>,
        transport: Arc<FakeTransport>,
    ) -> Arc<ReplayOrchestrator> {
        Arc::new(ReplayOrchestrator::new(
            store,
            transport,
            directory(),
            builtin_replay_catalog(),
            &OpsConfig::default(),
        ))
    }

    fn request(cases: &[&str], dry_run: bool, priority: ReplayPriority) -> CreateRunRequest {
        serde_json::from_value(serde_json::json!({
            "tenant_id": "t1",
            "portal": "admin",
            "cases": cases,
            "dry_run": dry_run,
            "priority": priority,
        }))
        .unwrap()
    }

    async fn wait_terminal(store: &MemoryStore, id: &str) -> ReplayRun {
        for _ in 0..200 {
            let run = store.get_run(id).await.unwrap().unwrap();
            if run.status.is_terminal() {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("run {id} never reached a terminal state");
    }

    fn admin_cases() -> Vec<&'static str> {
        vec!["admin_courses_list", "admin_course_publish", "admin_users_page"]
    }

    #[tokio::test]
    async fn unknown_tenant_and_cases_are_invalid() {
        let store = Arc::new(MemoryStore::new());
        let orch = orchestrator(store, Arc::new(FakeTransport::default()));

        let mut req = request(&["admin_courses_list"], false, ReplayPriority::Normal);
        req.tenant_id = "nobody".to_string();
        assert!(matches!(
            orch.create_run(&req).await.unwrap_err(),
            OpsError::InvalidArgument(_)
        ));

        let req = request(&["no_such_case"], false, ReplayPriority::Normal);
        assert!(matches!(
            orch.create_run(&req).await.unwrap_err(),
            OpsError::InvalidArgument(_)
        ));

        let req = request(&[], false, ReplayPriority::Normal);
        assert!(matches!(
            orch.create_run(&req).await.unwrap_err(),
            OpsError::InvalidArgument(_)
        ));
    }

    #[tokio::test]
    async fn portal_mismatch_is_invalid() {
        let store = Arc::new(MemoryStore::new());
        let orch = orchestrator(store, Arc::new(FakeTransport::default()));
        // teacher_gradebook_export belongs to the teacher portal.
        let req = request(&["teacher_gradebook_export"], false, ReplayPriority::Normal);
        assert!(matches!(
            orch.create_run(&req).await.unwrap_err(),
            OpsError::InvalidArgument(_)
        ));
    }

    #[tokio::test]
    async fn dry_run_skips_mutating_cases() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(FakeTransport::default());
        let orch = orchestrator(store.clone(), transport.clone());

        let req = request(&admin_cases(), true, ReplayPriority::Normal);
        let run = orch.create_run(&req).await.unwrap();
        let done = wait_terminal(&store, &run.id).await;

        assert_eq!(done.status, ReplayRunStatus::Completed);
        assert_eq!(done.summary.total(), 3);
        assert_eq!(done.summary.skipped, 1);
        assert_eq!(done.summary.passed, 2);
        // The mutating case never reached the transport.
        let executed = transport.executed.lock().await.clone();
        assert!(!executed.contains(&"admin_course_publish".to_string()));
    }

    #[tokio::test]
    async fn failed_case_continues_infra_failure_aborts() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(FakeTransport::default());
        transport
            .by_case
            .lock()
            .await
            .insert("admin_courses_list".to_string(), Behavior::Respond(500));
        let orch = orchestrator(store.clone(), transport.clone());
        let req = request(&admin_cases(), true, ReplayPriority::Normal);
        let run = orch.create_run(&req).await.unwrap();
        let done = wait_terminal(&store, &run.id).await;
        assert_eq!(done.status, ReplayRunStatus::Completed);
        assert_eq!(done.summary.failed, 1);

        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(FakeTransport::default());
        transport
            .by_case
            .lock()
            .await
            .insert("admin_courses_list".to_string(), Behavior::InfraError);
        let orch = orchestrator(store.clone(), transport.clone());
        let req = request(&admin_cases(), true, ReplayPriority::Normal);
        let run = orch.create_run(&req).await.unwrap();
        let done = wait_terminal(&store, &run.id).await;
        assert_eq!(done.status, ReplayRunStatus::Failed);
        assert!(done.failure_reason.is_some());
    }

    #[tokio::test]
    async fn case_transport_error_records_failed_step() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(FakeTransport::default());
        transport
            .by_case
            .lock()
            .await
            .insert("admin_courses_list".to_string(), Behavior::CaseError);
        let orch = orchestrator(store.clone(), transport);
        let req = request(&["admin_courses_list"], false, ReplayPriority::Normal);
        let run = orch.create_run(&req).await.unwrap();
        let done = wait_terminal(&store, &run.id).await;
        assert_eq!(done.status, ReplayRunStatus::Completed);
        let steps = store.steps_for_run(&run.id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].outcome, StepOutcome::Fail);
        assert_eq!(steps[0].detail.as_deref(), Some("connect timeout"));
    }

    #[tokio::test]
    async fn second_run_queues_behind_running_and_starts_after() {
        let store = Arc::new(MemoryStore::new());
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(FakeTransport {
            hold: Some(gate.clone()),
            ..FakeTransport::default()
        });
        let orch = orchestrator(store.clone(), transport);

        let first = orch
            .create_run(&request(&["admin_courses_list"], false, ReplayPriority::Normal))
            .await
            .unwrap();
        assert_eq!(
            store.get_run(&first.id).await.unwrap().unwrap().status,
            ReplayRunStatus::Running
        );

        let second = orch
            .create_run(&request(&["admin_users_page"], false, ReplayPriority::Normal))
            .await
            .unwrap();
        assert_eq!(second.status, ReplayRunStatus::Pending);

        gate.notify_one();
        let done_first = wait_terminal(&store, &first.id).await;
        assert_eq!(done_first.status, ReplayRunStatus::Completed);
        // The queued run starts once the lease frees; release the gate for it.
        for _ in 0..200 {
            gate.notify_one();
            let run = store.get_run(&second.id).await.unwrap().unwrap();
            if run.status.is_terminal() {
                assert_eq!(run.status, ReplayRunStatus::Completed);
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("queued run never started");
    }

    #[tokio::test]
    async fn high_priority_displaces_queued_normal_run() {
        let store = Arc::new(MemoryStore::new());
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(FakeTransport {
            hold: Some(gate.clone()),
            ..FakeTransport::default()
        });
        let orch = orchestrator(store.clone(), transport);

        let running = orch
            .create_run(&request(&["admin_courses_list"], false, ReplayPriority::Normal))
            .await
            .unwrap();
        let queued = orch
            .create_run(&request(&["admin_users_page"], false, ReplayPriority::Normal))
            .await
            .unwrap();

        // A second NORMAL request conflicts.
        let err = orch
            .create_run(&request(&["admin_users_page"], false, ReplayPriority::Normal))
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Conflict(_)));

        let high = orch
            .create_run(&request(&["admin_users_page"], false, ReplayPriority::High))
            .await
            .unwrap();
        let displaced = store.get_run(&queued.id).await.unwrap().unwrap();
        assert_eq!(displaced.status, ReplayRunStatus::Canceled);
        // The running run is untouched.
        assert_eq!(
            store.get_run(&running.id).await.unwrap().unwrap().status,
            ReplayRunStatus::Running
        );
        assert_eq!(high.status, ReplayRunStatus::Pending);
    }

    #[tokio::test]
    async fn stop_skips_remaining_cases() {
        let store = Arc::new(MemoryStore::new());
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(FakeTransport {
            hold: Some(gate.clone()),
            ..FakeTransport::default()
        });
        let orch = orchestrator(store.clone(), transport);
        let run = orch
            .create_run(&request(&admin_cases(), true, ReplayPriority::Normal))
            .await
            .unwrap();

        orch.stop(&run.id).await.unwrap();
        gate.notify_waiters();
        let done = wait_terminal(&store, &run.id).await;
        assert_eq!(done.status, ReplayRunStatus::Completed);
        // First case may have run; everything after the stop is skipped.
        assert!(done.summary.skipped >= 2);
        assert_eq!(done.summary.total(), 3);
    }

    #[tokio::test]
    async fn cancel_only_applies_to_queued_runs() {
        let store = Arc::new(MemoryStore::new());
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(FakeTransport {
            hold: Some(gate.clone()),
            ..FakeTransport::default()
        });
        let orch = orchestrator(store.clone(), transport);
        let running = orch
            .create_run(&request(&["admin_courses_list"], false, ReplayPriority::Normal))
            .await
            .unwrap();
        let queued = orch
            .create_run(&request(&["admin_users_page"], false, ReplayPriority::Normal))
            .await
            .unwrap();

        let canceled = orch.cancel(&queued.id).await.unwrap();
        assert_eq!(canceled.status, ReplayRunStatus::Canceled);
        assert!(matches!(
            orch.cancel(&running.id).await.unwrap_err(),
            OpsError::Conflict(_)
        ));
        gate.notify_waiters();
    }

    #[tokio::test]
    async fn lost_lease_aborts_the_run() {
        let store = Arc::new(MemoryStore::new());
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(FakeTransport {
            hold: Some(gate.clone()),
            ..FakeTransport::default()
        });
        let orch = orchestrator(store.clone(), transport);
        let run = orch
            .create_run(&request(&admin_cases(), false, ReplayPriority::Normal))
            .await
            .unwrap();

        // While the first case is in flight the lease expires and a rival
        // run claims it; the renewal after the case must then fail.
        store.release_replay_lease("t1", &run.id).await.unwrap();
        assert!(store
            .acquire_replay_lease("t1", "run-rival", unix_millis(), 60_000)
            .await
            .unwrap());

        for _ in 0..200 {
            gate.notify_waiters();
            let current = store.get_run(&run.id).await.unwrap().unwrap();
            if current.status.is_terminal() {
                assert_eq!(current.status, ReplayRunStatus::Failed);
                assert!(current
                    .failure_reason
                    .as_deref()
                    .is_some_and(|r| r.contains("lease")));
                // The rival's lease survives the aborted run's release.
                assert!(!store
                    .acquire_replay_lease("t1", "run-other", unix_millis(), 60_000)
                    .await
                    .unwrap());
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("run kept executing after losing its lease");
    }

    #[tokio::test]
    async fn expired_lease_is_claimable() {
        let store = Arc::new(MemoryStore::new());
        // Simulate a crashed run holding a lease far in the past.
        let expired_at = unix_millis().saturating_sub(10 * 60 * 1000);
        store
            .acquire_replay_lease("t1", "run-crashed", expired_at, 60_000)
            .await
            .unwrap();

        let orch = orchestrator(store.clone(), Arc::new(FakeTransport::default()));
        let run = orch
            .create_run(&request(&["admin_courses_list"], true, ReplayPriority::Normal))
            .await
            .unwrap();
        let done = wait_terminal(&store, &run.id).await;
        assert_eq!(done.status, ReplayRunStatus::Completed);
    }
}
