// SPDX-License-Identifier: Apache-2.0

//! One handler per route. Every handler stamps `x-request-id`, records the
//! route's latency, and renders failures as the shared error envelope.

use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use opscenter_api::dto::{
    ActionCatalogResponse, ActionLogListResponse, ApprovalRequest, CreateRunRequest,
    ErrorGroupDetailResponse, ErrorGroupListResponse, ExecuteActionRequest, ExecuteActionResponse,
    IncidentListResponse, LockRequest, ReplayCatalogResponse, RunDetailResponse, RunListResponse,
    TelemetryBatchRequest, TelemetryBatchResponse, TenantHealthListResponse, TimelineResponse,
    VersionResponse,
};
use opscenter_api::params::{
    parse_list_action_logs_params, parse_list_error_groups_params, parse_list_incidents_params,
};
use opscenter_api::{map_error, ApiError};
use opscenter_core::{unix_millis, OpsError};
use opscenter_model::Portal;
use opscenter_store::{ActionLogFilter, ErrorGroupFilter, IncidentFilter};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::info;

const RECENT_STEPS_LIMIT: usize = 20;
const MAX_REJECTION_DETAILS: usize = 10;

pub(crate) fn make_request_id(state: &AppState) -> String {
    let id = state.request_id_seed.fetch_add(1, Ordering::Relaxed);
    format!("req-{id:016x}")
}

pub(crate) fn propagated_request_id(headers: &HeaderMap, state: &AppState) -> String {
    if let Some(raw) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    make_request_id(state)
}

pub(crate) fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(v) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", v);
    }
    response
}

pub(crate) fn api_error_response(err: ApiError) -> Response {
    let status = StatusCode::from_u16(map_error(&err).status_code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"error": err}))).into_response()
}

pub(crate) fn ops_error_response(err: &OpsError, request_id: &str) -> Response {
    api_error_response(ApiError::from_ops(err, request_id))
}

fn operator_from_headers(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-operator")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .ok_or_else(ApiError::missing_operator)
}

async fn finish(
    state: &AppState,
    route: &'static str,
    started: Instant,
    request_id: &str,
    response: Response,
) -> Response {
    state
        .metrics
        .observe_request(route, response.status().as_u16(), started.elapsed())
        .await;
    with_request_id(response, request_id)
}

pub(crate) async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub(crate) async fn readyz_handler(State(state): State<AppState>) -> Response {
    if state.ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting").into_response()
    }
}

pub(crate) async fn metrics_handler(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let request_id = make_request_id(&state);
    state.metrics.telemetry_ignored_total.store(
        state.dedup.ignored_total.load(Ordering::Relaxed),
        Ordering::Relaxed,
    );
    state.metrics.incidents_opened_total.store(
        state.correlator.opened_total.load(Ordering::Relaxed),
        Ordering::Relaxed,
    );
    let body = state.metrics.render().await;
    let resp = (StatusCode::OK, body).into_response();
    finish(&state, "/metrics", started, &request_id, resp).await
}

pub(crate) async fn version_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let resp = Json(VersionResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
    .into_response();
    with_request_id(resp, &request_id)
}

pub(crate) async fn openapi_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let resp = Json(opscenter_api::openapi_v1_spec()).into_response();
    with_request_id(resp, &request_id)
}

pub(crate) async fn telemetry_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(batch): Json<TelemetryBatchRequest>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let mut accepted = 0u64;
    let mut rejected = 0u64;
    let mut rejections = Vec::new();
    for record in &batch.records {
        match state.dedup.ingest(record).await {
            Ok(_) => accepted += 1,
            Err(err) => {
                rejected += 1;
                if rejections.len() < MAX_REJECTION_DETAILS {
                    rejections.push(err.message().to_string());
                }
            }
        }
    }
    state
        .metrics
        .telemetry_ingested_total
        .fetch_add(accepted, Ordering::Relaxed);
    info!(request_id = %request_id, accepted, rejected, "telemetry batch ingested");
    let resp = (
        StatusCode::ACCEPTED,
        Json(TelemetryBatchResponse {
            accepted,
            rejected,
            rejections,
        }),
    )
        .into_response();
    finish(&state, "/v1/telemetry", started, &request_id, resp).await
}

pub(crate) async fn list_error_groups_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match parse_list_error_groups_params(&query) {
        Ok(params) => {
            let filter = ErrorGroupFilter {
                tenant_id: params.tenant_id,
                portal: params.portal,
                status_codes: params.status_codes,
                since_ms: params.since_ms,
            };
            match state.store.list_error_groups(&filter).await {
                Ok(groups) => Json(ErrorGroupListResponse { groups }).into_response(),
                Err(e) => ops_error_response(&OpsError::internal(e.0), &request_id),
            }
        }
        Err(err) => api_error_response(err.with_request_id(&request_id)),
    };
    finish(&state, "/v1/error-groups", started, &request_id, resp).await
}

pub(crate) async fn lock_error_group_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<LockRequest>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match operator_from_headers(&headers) {
        Ok(operator) => match state.dedup.lock(&id, &operator, body.note).await {
            Ok(group) => Json(group).into_response(),
            Err(err) => ops_error_response(&err, &request_id),
        },
        Err(err) => api_error_response(err.with_request_id(&request_id)),
    };
    finish(&state, "/v1/error-groups/:id/lock", started, &request_id, resp).await
}

pub(crate) async fn unlock_error_group_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match operator_from_headers(&headers) {
        Ok(operator) => match state.dedup.unlock(&id, &operator).await {
            Ok(group) => Json(group).into_response(),
            Err(err) => ops_error_response(&err, &request_id),
        },
        Err(err) => api_error_response(err.with_request_id(&request_id)),
    };
    finish(&state, "/v1/error-groups/:id/unlock", started, &request_id, resp).await
}

pub(crate) async fn error_group_detail_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match error_group_detail(&state, &id).await {
        Ok(detail) => Json(detail).into_response(),
        Err(err) => ops_error_response(&err, &request_id),
    };
    finish(&state, "/v1/error-groups/:id/detail", started, &request_id, resp).await
}

async fn error_group_detail(
    state: &AppState,
    id: &str,
) -> Result<ErrorGroupDetailResponse, OpsError> {
    let group = state
        .store
        .get_error_group(id)
        .await
        .map_err(|e| OpsError::internal(e.0))?
        .ok_or_else(|| OpsError::not_found(format!("error group not found: {id}")))?;
    let active_incident = state
        .store
        .active_incident_for_group(&group.id)
        .await
        .map_err(|e| OpsError::internal(e.0))?;
    let recent_steps = state
        .store
        .recent_steps_for_endpoint(&group.key.tenant_id, &group.key.endpoint, RECENT_STEPS_LIMIT)
        .await
        .map_err(|e| OpsError::internal(e.0))?;
    Ok(ErrorGroupDetailResponse {
        group,
        active_incident,
        recent_steps,
    })
}

pub(crate) async fn replay_cases_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let portal = match query.get("portal") {
        Some(raw) => match Portal::parse(raw) {
            Ok(p) => Some(p),
            Err(_) => {
                let resp = api_error_response(
                    ApiError::invalid_param("portal", raw).with_request_id(&request_id),
                );
                return finish(&state, "/v1/replay-cases", started, &request_id, resp).await;
            }
        },
        None => None,
    };
    let cases = state
        .replay
        .catalog()
        .iter()
        .filter(|c| portal.is_none_or(|p| c.portal == p))
        .cloned()
        .collect();
    let resp = Json(ReplayCatalogResponse { cases }).into_response();
    finish(&state, "/v1/replay-cases", started, &request_id, resp).await
}

pub(crate) async fn create_run_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateRunRequest>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match operator_from_headers(&headers) {
        Ok(operator) => match state.replay.create_run(&req).await {
            Ok(run) => {
                info!(request_id = %request_id, run_id = %run.id, operator = %operator, "replay run created");
                (StatusCode::CREATED, Json(run)).into_response()
            }
            Err(err) => ops_error_response(&err, &request_id),
        },
        Err(err) => api_error_response(err.with_request_id(&request_id)),
    };
    finish(&state, "/v1/replay-runs", started, &request_id, resp).await
}

pub(crate) async fn list_runs_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match state
        .replay
        .list(query.get("tenant").map(String::as_str))
        .await
    {
        Ok(runs) => Json(RunListResponse { runs }).into_response(),
        Err(err) => ops_error_response(&err, &request_id),
    };
    finish(&state, "/v1/replay-runs", started, &request_id, resp).await
}

pub(crate) async fn get_run_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match run_detail(&state, &id).await {
        Ok(detail) => Json(detail).into_response(),
        Err(err) => ops_error_response(&err, &request_id),
    };
    finish(&state, "/v1/replay-runs/:id", started, &request_id, resp).await
}

async fn run_detail(state: &AppState, id: &str) -> Result<RunDetailResponse, OpsError> {
    let run = state.replay.get_run(id).await?;
    let steps = state.replay.steps(id).await?;
    Ok(RunDetailResponse { run, steps })
}

pub(crate) async fn run_steps_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match state.replay.steps(&id).await {
        Ok(steps) => Json(steps).into_response(),
        Err(err) => ops_error_response(&err, &request_id),
    };
    finish(&state, "/v1/replay-runs/:id/steps", started, &request_id, resp).await
}

pub(crate) async fn cancel_run_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match operator_from_headers(&headers) {
        Ok(_operator) => match state.replay.cancel(&id).await {
            Ok(run) => Json(run).into_response(),
            Err(err) => ops_error_response(&err, &request_id),
        },
        Err(err) => api_error_response(err.with_request_id(&request_id)),
    };
    finish(&state, "/v1/replay-runs/:id/cancel", started, &request_id, resp).await
}

pub(crate) async fn stop_run_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match operator_from_headers(&headers) {
        Ok(_operator) => match state.replay.stop(&id).await {
            Ok(run) => Json(run).into_response(),
            Err(err) => ops_error_response(&err, &request_id),
        },
        Err(err) => api_error_response(err.with_request_id(&request_id)),
    };
    finish(&state, "/v1/replay-runs/:id/stop", started, &request_id, resp).await
}

pub(crate) async fn action_catalog_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = Json(ActionCatalogResponse {
        actions: state.actions.catalog().to_vec(),
    })
    .into_response();
    finish(&state, "/v1/actions/catalog", started, &request_id, resp).await
}

pub(crate) async fn execute_action_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ExecuteActionRequest>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match operator_from_headers(&headers) {
        Ok(operator) => match state
            .actions
            .execute(
                &req.tenant_id,
                &req.action_key,
                req.target,
                req.reason,
                req.dry_run,
                &operator,
            )
            .await
        {
            Ok(outcome) => Json(ExecuteActionResponse {
                action_log_id: outcome.log.id,
                status: outcome.log.status,
                requires_approval: outcome.requires_approval,
                effect: outcome.log.effect,
            })
            .into_response(),
            Err(err) => ops_error_response(&err, &request_id),
        },
        Err(err) => api_error_response(err.with_request_id(&request_id)),
    };
    finish(&state, "/v1/actions/execute", started, &request_id, resp).await
}

pub(crate) async fn approve_action_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ApprovalRequest>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match operator_from_headers(&headers) {
        Ok(operator) => match state.actions.approve(&id, &operator, body.note).await {
            Ok(log) => Json(log).into_response(),
            Err(err) => ops_error_response(&err, &request_id),
        },
        Err(err) => api_error_response(err.with_request_id(&request_id)),
    };
    finish(&state, "/v1/actions/:id/approve", started, &request_id, resp).await
}

pub(crate) async fn reject_action_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ApprovalRequest>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match operator_from_headers(&headers) {
        Ok(operator) => match state.actions.reject(&id, &operator, body.note).await {
            Ok(log) => Json(log).into_response(),
            Err(err) => ops_error_response(&err, &request_id),
        },
        Err(err) => api_error_response(err.with_request_id(&request_id)),
    };
    finish(&state, "/v1/actions/:id/reject", started, &request_id, resp).await
}

pub(crate) async fn action_log_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match parse_list_action_logs_params(&query) {
        Ok(params) => {
            let filter = ActionLogFilter {
                tenant_id: params.tenant_id,
                status: params.status,
            };
            match state.actions.list(&filter).await {
                Ok(actions) => Json(ActionLogListResponse { actions }).into_response(),
                Err(err) => ops_error_response(&err, &request_id),
            }
        }
        Err(err) => api_error_response(err.with_request_id(&request_id)),
    };
    finish(&state, "/v1/actions/log", started, &request_id, resp).await
}

pub(crate) async fn list_incidents_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match parse_list_incidents_params(&query) {
        Ok(params) => {
            let filter = IncidentFilter {
                tenant_id: params.tenant_id,
                status: params.status,
                active_only: params.active_only,
            };
            match state.store.list_incidents(&filter).await {
                Ok(incidents) => Json(IncidentListResponse { incidents }).into_response(),
                Err(e) => ops_error_response(&OpsError::internal(e.0), &request_id),
            }
        }
        Err(err) => api_error_response(err.with_request_id(&request_id)),
    };
    finish(&state, "/v1/incidents", started, &request_id, resp).await
}

pub(crate) async fn acknowledge_incident_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match operator_from_headers(&headers) {
        Ok(operator) => match state.correlator.acknowledge(&id, &operator).await {
            Ok(incident) => Json(incident).into_response(),
            Err(err) => ops_error_response(&err, &request_id),
        },
        Err(err) => api_error_response(err.with_request_id(&request_id)),
    };
    finish(&state, "/v1/incidents/:id/acknowledge", started, &request_id, resp).await
}

pub(crate) async fn resolve_incident_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match operator_from_headers(&headers) {
        Ok(operator) => match state.correlator.resolve(&id, &operator).await {
            Ok(incident) => Json(incident).into_response(),
            Err(err) => ops_error_response(&err, &request_id),
        },
        Err(err) => api_error_response(err.with_request_id(&request_id)),
    };
    finish(&state, "/v1/incidents/:id/resolve", started, &request_id, resp).await
}

pub(crate) async fn tenant_health_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match state.health.snapshots().await {
        Ok(mut tenants) => {
            if let Some(needle) = query.get("search") {
                tenants.retain(|t| t.tenant_id.contains(needle.as_str()));
            }
            let page_size = query
                .get("page_size")
                .and_then(|v| v.parse::<usize>().ok())
                .map_or(50, |v| v.clamp(1, 500));
            tenants.truncate(page_size);
            Json(TenantHealthListResponse { tenants }).into_response()
        }
        Err(err) => ops_error_response(&err, &request_id),
    };
    finish(&state, "/v1/tenants/health", started, &request_id, resp).await
}

pub(crate) async fn tenant_timeline_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = match timeline_response(&state, &id, &query).await {
        Ok(timeline) => Json(timeline).into_response(),
        Err(err) => api_error_response(err.with_request_id(&request_id)),
    };
    finish(&state, "/v1/tenants/:id/timeline", started, &request_id, resp).await
}

async fn timeline_response(
    state: &AppState,
    tenant_id: &str,
    query: &BTreeMap<String, String>,
) -> Result<TimelineResponse, ApiError> {
    let from = match query.get("from") {
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::invalid_param("from", raw))?,
        None => 0,
    };
    let to = match query.get("to") {
        Some(raw) => raw.parse().map_err(|_| ApiError::invalid_param("to", raw))?,
        None => unix_millis(),
    };
    let events = state
        .timeline
        .events(tenant_id, from, to)
        .await
        .map_err(|e| ApiError::from_ops(&e, "req-unknown"))?;
    Ok(TimelineResponse {
        tenant_id: tenant_id.to_string(),
        events,
    })
}
