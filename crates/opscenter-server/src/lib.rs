#![forbid(unsafe_code)]

//! Operations center backend for the multi-tenant learning platform:
//! telemetry dedup into error groups, incident correlation, tenant health
//! aggregation, replay orchestration, and the approval-gated action gateway,
//! all behind one axum router.

pub mod config;
pub mod http;
pub mod services;
pub mod telemetry;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use config::OpsConfig;
use opscenter_model::{
    builtin_action_catalog, builtin_replay_catalog, ActionCatalogItem, ReplayCase,
};
use opscenter_store::OpsStore;
use services::actions::{ActionExecutor, ActionGateway};
use services::correlator::Correlator;
use services::dedup::Deduplicator;
use services::directory::TenantDirectory;
use services::health::{HealthAggregator, HealthProbe};
use services::replay::{ReplayOrchestrator, ReplayTransport};
use services::timeline::TimelineService;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use telemetry::RequestMetrics;

pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OpsStore>,
    pub config: Arc<OpsConfig>,
    pub dedup: Arc<Deduplicator>,
    pub correlator: Arc<Correlator>,
    pub health: Arc<HealthAggregator>,
    pub replay: Arc<ReplayOrchestrator>,
    pub actions: Arc<ActionGateway>,
    pub timeline: Arc<TimelineService>,
    pub directory: Arc<dyn TenantDirectory>,
    pub ready: Arc<AtomicBool>,
    pub metrics: Arc<RequestMetrics>,
    pub(crate) request_id_seed: Arc<AtomicU64>,
}

impl AppState {
    /// Wires every service to the same store and directory with the builtin
    /// catalogs. Ports are injected so tests can swap in fakes.
    #[must_use]
    pub fn new(
        store: Arc<dyn OpsStore>,
        directory: Arc<dyn TenantDirectory>,
        transport: Arc<dyn ReplayTransport>,
        executor: Arc<dyn ActionExecutor>,
        probe: Arc<dyn HealthProbe>,
        config: OpsConfig,
    ) -> Self {
        Self::with_catalogs(
            store,
            directory,
            transport,
            executor,
            probe,
            config,
            builtin_replay_catalog(),
            builtin_action_catalog(),
        )
    }

    /// Like `new`, but with deployment-supplied catalogs instead of the
    /// builtin sets.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn with_catalogs(
        store: Arc<dyn OpsStore>,
        directory: Arc<dyn TenantDirectory>,
        transport: Arc<dyn ReplayTransport>,
        executor: Arc<dyn ActionExecutor>,
        probe: Arc<dyn HealthProbe>,
        config: OpsConfig,
        replay_catalog: Vec<ReplayCase>,
        action_catalog: Vec<ActionCatalogItem>,
    ) -> Self {
        let correlator = Arc::new(Correlator::new(store.clone(), &config));
        let dedup = Arc::new(Deduplicator::new(
            store.clone(),
            correlator.clone(),
            &config,
        ));
        let health = Arc::new(HealthAggregator::new(
            store.clone(),
            directory.clone(),
            probe,
            &config,
        ));
        let replay = Arc::new(ReplayOrchestrator::new(
            store.clone(),
            transport,
            directory.clone(),
            replay_catalog,
            &config,
        ));
        let actions = Arc::new(ActionGateway::new(
            store.clone(),
            executor,
            directory.clone(),
            action_catalog,
            &config,
        ));
        let timeline = Arc::new(TimelineService::new(store.clone()));
        Self {
            store,
            config: Arc::new(config),
            dedup,
            correlator,
            health,
            replay,
            actions,
            timeline,
            directory,
            ready: Arc::new(AtomicBool::new(true)),
            metrics: Arc::new(RequestMetrics::default()),
            request_id_seed: Arc::new(AtomicU64::new(1)),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;
    Router::new()
        .route("/healthz", get(http::handlers::healthz_handler))
        .route("/readyz", get(http::handlers::readyz_handler))
        .route("/metrics", get(http::handlers::metrics_handler))
        .route("/v1/version", get(http::handlers::version_handler))
        .route("/v1/openapi.json", get(http::handlers::openapi_handler))
        .route("/v1/telemetry", post(http::handlers::telemetry_handler))
        .route(
            "/v1/error-groups",
            get(http::handlers::list_error_groups_handler),
        )
        .route(
            "/v1/error-groups/:id/lock",
            post(http::handlers::lock_error_group_handler),
        )
        .route(
            "/v1/error-groups/:id/unlock",
            post(http::handlers::unlock_error_group_handler),
        )
        .route(
            "/v1/error-groups/:id/detail",
            get(http::handlers::error_group_detail_handler),
        )
        .route("/v1/replay-cases", get(http::handlers::replay_cases_handler))
        .route(
            "/v1/replay-runs",
            post(http::handlers::create_run_handler).get(http::handlers::list_runs_handler),
        )
        .route("/v1/replay-runs/:id", get(http::handlers::get_run_handler))
        .route(
            "/v1/replay-runs/:id/steps",
            get(http::handlers::run_steps_handler),
        )
        .route(
            "/v1/replay-runs/:id/cancel",
            post(http::handlers::cancel_run_handler),
        )
        .route(
            "/v1/replay-runs/:id/stop",
            post(http::handlers::stop_run_handler),
        )
        .route(
            "/v1/actions/catalog",
            get(http::handlers::action_catalog_handler),
        )
        .route(
            "/v1/actions/execute",
            post(http::handlers::execute_action_handler),
        )
        .route(
            "/v1/actions/:id/approve",
            post(http::handlers::approve_action_handler),
        )
        .route(
            "/v1/actions/:id/reject",
            post(http::handlers::reject_action_handler),
        )
        .route("/v1/actions/log", get(http::handlers::action_log_handler))
        .route("/v1/incidents", get(http::handlers::list_incidents_handler))
        .route(
            "/v1/incidents/:id/acknowledge",
            post(http::handlers::acknowledge_incident_handler),
        )
        .route(
            "/v1/incidents/:id/resolve",
            post(http::handlers::resolve_incident_handler),
        )
        .route(
            "/v1/tenants/health",
            get(http::handlers::tenant_health_handler),
        )
        .route(
            "/v1/tenants/:id/timeline",
            get(http::handlers::tenant_timeline_handler),
        )
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}
