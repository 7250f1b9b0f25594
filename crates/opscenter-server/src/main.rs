#![forbid(unsafe_code)]

use opscenter_core::unix_millis;
use opscenter_model::{
    builtin_action_catalog, builtin_replay_catalog, parse_action_catalog, parse_replay_catalog,
};
use opscenter_server::config::OpsConfig;
use opscenter_server::services::actions::HttpActionExecutor;
use opscenter_server::services::directory::StaticTenantDirectory;
use opscenter_server::services::health::HttpHealthProbe;
use opscenter_server::services::replay::HttpReplayTransport;
use opscenter_server::{build_router, AppState};
use opscenter_store::{MemoryStore, OpsStore, SqliteStore};
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_status_codes(name: &str, default: &[u16]) -> Vec<u16> {
    let parsed: Vec<u16> = env::var(name)
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse::<u16>().ok())
        .collect();
    if parsed.is_empty() {
        default.to_vec()
    } else {
        parsed
    }
}

fn config_from_env() -> OpsConfig {
    let defaults = OpsConfig::default();
    OpsConfig {
        alert_status_codes: env_status_codes(
            "OPSC_ALERT_STATUS_CODES",
            &defaults.alert_status_codes,
        ),
        incident_threshold: env_u64("OPSC_INCIDENT_THRESHOLD", defaults.incident_threshold),
        incident_window_ms: env_u64("OPSC_INCIDENT_WINDOW_MS", defaults.incident_window_ms),
        resolve_cooldown_ms: env_u64("OPSC_RESOLVE_COOLDOWN_MS", defaults.resolve_cooldown_ms),
        approval_ttl_ms: env_u64("OPSC_APPROVAL_TTL_MS", defaults.approval_ttl_ms),
        replay_lease_ttl_ms: env_u64("OPSC_REPLAY_LEASE_TTL_MS", defaults.replay_lease_ttl_ms),
        degraded_failures_24h: env_u64(
            "OPSC_DEGRADED_FAILURES_24H",
            defaults.degraded_failures_24h,
        ),
        upsert_retry_attempts: env_u32(
            "OPSC_UPSERT_RETRY_ATTEMPTS",
            defaults.upsert_retry_attempts,
        ),
        health_recompute_interval_ms: env_u64(
            "OPSC_HEALTH_RECOMPUTE_MS",
            defaults.health_recompute_interval_ms,
        ),
        sweep_interval_ms: env_u64("OPSC_SWEEP_INTERVAL_MS", defaults.sweep_interval_ms),
        max_body_bytes: env_usize("OPSC_MAX_BODY_BYTES", defaults.max_body_bytes),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_bool("OPSC_LOG_JSON", true) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn spawn_background_tasks(state: &AppState) {
    let correlator = state.correlator.clone();
    let metrics = state.metrics.clone();
    let cooldown_tick = Duration::from_millis(state.config.sweep_interval_ms);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(cooldown_tick).await;
            match correlator.auto_resolve_pass(unix_millis()).await {
                Ok(resolved) if resolved > 0 => {
                    metrics
                        .incidents_auto_resolved_total
                        .fetch_add(resolved, std::sync::atomic::Ordering::Relaxed);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e.message(), "auto-resolve pass failed"),
            }
        }
    });

    let actions = state.actions.clone();
    let metrics = state.metrics.clone();
    let sweep_tick = Duration::from_millis(state.config.sweep_interval_ms);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(sweep_tick).await;
            match actions.sweep(unix_millis()).await {
                Ok(expired) if expired > 0 => {
                    metrics
                        .actions_expired_total
                        .fetch_add(expired, std::sync::atomic::Ordering::Relaxed);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e.message(), "approval sweep failed"),
            }
        }
    });

    let health = state.health.clone();
    let health_tick = Duration::from_millis(state.config.health_recompute_interval_ms);
    tokio::spawn(async move {
        loop {
            match health.recompute_all(unix_millis()).await {
                Ok(()) => {}
                Err(e) => warn!(error = %e.message(), "health recompute failed"),
            }
            tokio::time::sleep(health_tick).await;
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), String> {
    init_tracing();

    let bind_addr = env::var("OPSC_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let config = config_from_env();

    let store: Arc<dyn OpsStore> = match env::var("OPSC_DB_PATH") {
        Ok(path) if !path.trim().is_empty() => {
            let sqlite = SqliteStore::open(Path::new(path.trim()))
                .map_err(|e| format!("open sqlite store at {path}: {e}"))?;
            info!(path = %path, "sqlite store opened");
            Arc::new(sqlite)
        }
        _ => {
            warn!("OPSC_DB_PATH unset; state is in-memory and lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let tenants_raw = env::var("OPSC_TENANTS").unwrap_or_default();
    if tenants_raw.trim().is_empty() {
        error!("OPSC_TENANTS is empty; no tenant can be probed or replayed");
    }
    let directory = Arc::new(StaticTenantDirectory::from_env_specs(
        &tenants_raw,
        &env::var("OPSC_MAINTENANCE_TENANTS").unwrap_or_default(),
    ));

    let replay_catalog = match env::var("OPSC_REPLAY_CATALOG") {
        Ok(path) if !path.trim().is_empty() => {
            let raw = std::fs::read_to_string(path.trim())
                .map_err(|e| format!("read replay catalog {path}: {e}"))?;
            let cases =
                parse_replay_catalog(&raw).map_err(|e| format!("parse replay catalog: {e}"))?;
            info!(path = %path, cases = cases.len(), "replay catalog loaded from file");
            cases
        }
        _ => builtin_replay_catalog(),
    };
    let action_catalog = match env::var("OPSC_ACTION_CATALOG") {
        Ok(path) if !path.trim().is_empty() => {
            let raw = std::fs::read_to_string(path.trim())
                .map_err(|e| format!("read action catalog {path}: {e}"))?;
            let actions =
                parse_action_catalog(&raw).map_err(|e| format!("parse action catalog: {e}"))?;
            info!(path = %path, actions = actions.len(), "action catalog loaded from file");
            actions
        }
        _ => builtin_action_catalog(),
    };

    let replay_base_url =
        env::var("OPSC_REPLAY_BASE_URL").unwrap_or_else(|_| "http://localhost:9090".to_string());
    let replay_bearer = env::var("OPSC_REPLAY_BEARER").ok();
    let transport = Arc::new(HttpReplayTransport::new(
        replay_base_url,
        replay_bearer.clone(),
    ));
    let executor = Arc::new(HttpActionExecutor::new(replay_bearer));
    let probe = Arc::new(HttpHealthProbe::new());

    let state = AppState::with_catalogs(
        store,
        directory,
        transport,
        executor,
        probe,
        config,
        replay_catalog,
        action_catalog,
    );
    spawn_background_tasks(&state);

    let app = build_router(state);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| format!("bind {bind_addr}: {e}"))?;
    info!("opscenter-server listening on {bind_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .map_err(|e| format!("server failed: {e}"))
}
