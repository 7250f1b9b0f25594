// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use opscenter_core::unix_millis;
use opscenter_model::{ActionCatalogItem, ReplayCase};
use opscenter_server::config::OpsConfig;
use opscenter_server::services::actions::ActionExecutor;
use opscenter_server::services::directory::{StaticTenantDirectory, TenantInfo};
use opscenter_server::services::health::{HealthProbe, ProbeOutcome};
use opscenter_server::services::replay::{CaseResult, ReplayTransport, TransportError};
use opscenter_server::{build_router, AppState};
use opscenter_store::MemoryStore;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

struct OkTransport;

#[async_trait]
impl ReplayTransport for OkTransport {
    async fn execute(
        &self,
        _tenant_id: &str,
        _case: &ReplayCase,
    ) -> Result<CaseResult, TransportError> {
        Ok(CaseResult {
            status: 200,
            latency_ms: 3,
        })
    }
}

struct OkExecutor;

#[async_trait]
impl ActionExecutor for OkExecutor {
    async fn execute(
        &self,
        item: &ActionCatalogItem,
        tenant_id: &str,
        _base_url: &str,
        _target: &BTreeMap<String, String>,
    ) -> Result<String, String> {
        Ok(format!("{} applied to {tenant_id}", item.key))
    }
}

/// Healthy everywhere except the tenant named `globex`.
struct FlakyProbe;

#[async_trait]
impl HealthProbe for FlakyProbe {
    async fn check(&self, tenant: &TenantInfo) -> ProbeOutcome {
        ProbeOutcome {
            ok: tenant.id != "globex",
            latency_ms: Some(4),
        }
    }
}

fn test_state() -> AppState {
    let directory = Arc::new(StaticTenantDirectory::new(vec![
        TenantInfo {
            id: "acme".to_string(),
            base_url: "http://acme.internal".to_string(),
            maintenance: false,
        },
        TenantInfo {
            id: "globex".to_string(),
            base_url: "http://globex.internal".to_string(),
            maintenance: false,
        },
        TenantInfo {
            id: "initech".to_string(),
            base_url: "http://initech.internal".to_string(),
            maintenance: true,
        },
    ]));
    AppState::new(
        Arc::new(MemoryStore::new()),
        directory,
        Arc::new(OkTransport),
        Arc::new(OkExecutor),
        Arc::new(FlakyProbe),
        OpsConfig::default(),
    )
}

async fn spawn_server(state: AppState) -> SocketAddr {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
    addr
}

async fn send_raw(
    addr: SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> (u16, String, String) {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    for (k, v) in headers {
        req.push_str(&format!("{k}: {v}\r\n"));
    }
    if let Some(body) = body {
        req.push_str("content-type: application/json\r\n");
        req.push_str(&format!("content-length: {}\r\n", body.len()));
    }
    req.push_str("\r\n");
    if let Some(body) = body {
        req.push_str(body);
    }
    stream
        .write_all(req.as_bytes())
        .await
        .expect("write request");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response must have separator");
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("http status");
    (status, head.to_string(), body.to_string())
}

async fn get(addr: SocketAddr, path: &str) -> (u16, Value) {
    let (status, _, body) = send_raw(addr, "GET", path, &[], None).await;
    let json = serde_json::from_str(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn post_json(
    addr: SocketAddr,
    path: &str,
    headers: &[(&str, &str)],
    body: Value,
) -> (u16, Value) {
    let body = body.to_string();
    let (status, _, body) = send_raw(addr, "POST", path, headers, Some(&body)).await;
    let json = serde_json::from_str(&body).unwrap_or(Value::Null);
    (status, json)
}

fn failure_record(request_id: &str, status_code: u16) -> Value {
    json!({
        "tenant_id": "acme",
        "portal": "admin",
        "method": "GET",
        "endpoint": "/api/admin/courses",
        "tab_key": "courses",
        "status_code": status_code,
        "request_id": request_id,
        "response_excerpt": "{\"error\":\"boom\"}",
        "occurred_at": unix_millis(),
    })
}

#[tokio::test]
async fn ambient_endpoints_respond() {
    let addr = spawn_server(test_state()).await;

    let (status, _, body) = send_raw(addr, "GET", "/healthz", &[], None).await;
    assert_eq!(status, 200);
    assert_eq!(body, "ok");

    let (status, _, _) = send_raw(addr, "GET", "/readyz", &[], None).await;
    assert_eq!(status, 200);

    let (status, json) = get(addr, "/v1/version").await;
    assert_eq!(status, 200);
    assert_eq!(json["name"], "opscenter-server");

    let (_, _) = post_json(addr, "/v1/telemetry", &[], json!({"records": []})).await;
    let (status, _, body) = send_raw(addr, "GET", "/metrics", &[], None).await;
    assert_eq!(status, 200);
    assert!(body.contains("opsc_telemetry_ingested_total{"));
    assert!(body.contains("route=\"/v1/telemetry\""));
}

#[tokio::test]
async fn request_id_header_is_propagated() {
    let addr = spawn_server(test_state()).await;
    let (_, head, _) = send_raw(
        addr,
        "GET",
        "/v1/error-groups",
        &[("x-request-id", "req-client-7")],
        None,
    )
    .await;
    assert!(head.to_lowercase().contains("x-request-id: req-client-7"));
}

#[tokio::test]
async fn telemetry_dedup_and_incident_flow() {
    let state = test_state();
    let addr = spawn_server(state.clone()).await;

    let mut records: Vec<Value> = (0..5).map(|i| failure_record(&format!("r{i}"), 500)).collect();
    records.push(failure_record("r-ok", 200)); // non-alert, counted but ignored
    records.push(json!({
        "tenant_id": "",
        "portal": "admin",
        "method": "GET",
        "endpoint": "/api/admin/courses",
        "tab_key": "courses",
        "status_code": 500,
        "request_id": "r-bad",
        "occurred_at": unix_millis(),
    }));

    let (status, json) = post_json(addr, "/v1/telemetry", &[], json!({"records": records})).await;
    assert_eq!(status, 202);
    assert_eq!(json["accepted"], 6);
    assert_eq!(json["rejected"], 1);
    // Counters hang off the shared state, readable outside the router the
    // same way the binary's background tasks read them.
    assert_eq!(
        state.metrics.telemetry_ingested_total.load(Ordering::Relaxed),
        6
    );
    assert_eq!(state.correlator.opened_total.load(Ordering::Relaxed), 1);

    let (status, json) = get(addr, "/v1/error-groups?tenant=acme&status_codes=500").await;
    assert_eq!(status, 200);
    let groups = json["groups"].as_array().expect("groups array");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["total_count"], 5);
    let group_id = groups[0]["id"].as_str().expect("group id").to_string();

    // Five occurrences inside the window crossed the default threshold.
    let (status, json) = get(addr, "/v1/incidents?status=OPEN&tenant=acme").await;
    assert_eq!(status, 200);
    let incidents = json["incidents"].as_array().expect("incidents array");
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0]["severity"], "P1");
    assert_eq!(incidents[0]["error_group_id"], group_id);
    let incident_id = incidents[0]["id"].as_str().expect("incident id").to_string();

    let (status, json) = get(addr, &format!("/v1/error-groups/{group_id}/detail")).await;
    assert_eq!(status, 200);
    assert_eq!(json["group"]["id"], group_id.as_str());
    assert_eq!(json["active_incident"]["id"], incident_id.as_str());

    let (status, json) = post_json(
        addr,
        &format!("/v1/incidents/{incident_id}/acknowledge"),
        &[("x-operator", "ana")],
        json!({}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["status"], "ACKNOWLEDGED");
    assert_eq!(json["acknowledged_by"], "ana");

    let (status, json) = post_json(
        addr,
        &format!("/v1/incidents/{incident_id}/resolve"),
        &[("x-operator", "ana")],
        json!({}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["status"], "RESOLVED");

    // Monotonic lifecycle: a resolved incident cannot go back.
    let (status, json) = post_json(
        addr,
        &format!("/v1/incidents/{incident_id}/acknowledge"),
        &[("x-operator", "ana")],
        json!({}),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(json["error"]["code"], "conflict");

    // The exposition reflects the opened incident.
    let (status, _, body) = send_raw(addr, "GET", "/metrics", &[], None).await;
    assert_eq!(status, 200);
    let opened = body
        .lines()
        .find(|l| l.starts_with("opsc_incidents_opened_total"))
        .expect("opened counter line");
    assert!(opened.ends_with(" 1"), "unexpected line: {opened}");
}

#[tokio::test]
async fn lock_requires_operator_and_conflicts_when_relocked() {
    let addr = spawn_server(test_state()).await;

    let (status, _) = post_json(
        addr,
        "/v1/telemetry",
        &[],
        json!({"records": [failure_record("r1", 500)]}),
    )
    .await;
    assert_eq!(status, 202);

    let (_, json) = get(addr, "/v1/error-groups").await;
    let group_id = json["groups"][0]["id"].as_str().expect("group id").to_string();

    let (status, json) = post_json(
        addr,
        &format!("/v1/error-groups/{group_id}/lock"),
        &[],
        json!({"note": "known upstream outage"}),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(json["error"]["code"], "invalid_argument");
    assert!(json["error"]["message"]
        .as_str()
        .expect("message")
        .contains("x-operator"));

    let (status, json) = post_json(
        addr,
        &format!("/v1/error-groups/{group_id}/lock"),
        &[("x-operator", "ana")],
        json!({"note": "known upstream outage"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["is_locked"], true);
    assert_eq!(json["locked_by"], "ana");

    let (status, json) = post_json(
        addr,
        &format!("/v1/error-groups/{group_id}/lock"),
        &[("x-operator", "ben")],
        json!({"note": "me too"}),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(json["error"]["code"], "conflict");

    let (status, _) = post_json(
        addr,
        &format!("/v1/error-groups/{group_id}/unlock"),
        &[("x-operator", "ben")],
        json!({}),
    )
    .await;
    assert_eq!(status, 200);

    let (status, _) = post_json(
        addr,
        &format!("/v1/error-groups/{group_id}/unlock"),
        &[("x-operator", "ben")],
        json!({}),
    )
    .await;
    assert_eq!(status, 409);
}

#[tokio::test]
async fn tenant_health_reflects_probe_and_maintenance() {
    let state = test_state();
    state
        .health
        .recompute_all(unix_millis())
        .await
        .expect("recompute health");
    let addr = spawn_server(state).await;

    let (status, json) = get(addr, "/v1/tenants/health").await;
    assert_eq!(status, 200);
    let tenants = json["tenants"].as_array().expect("tenants array");
    assert_eq!(tenants.len(), 3);
    let by_id: BTreeMap<&str, &Value> = tenants
        .iter()
        .map(|t| (t["tenant_id"].as_str().expect("tenant id"), t))
        .collect();
    assert_eq!(by_id["acme"]["status"], "HEALTHY");
    assert_eq!(by_id["globex"]["status"], "DOWN");
    assert_eq!(by_id["initech"]["status"], "MAINTENANCE");

    let (status, json) = get(addr, "/v1/tenants/health?search=acme").await;
    assert_eq!(status, 200);
    assert_eq!(json["tenants"].as_array().expect("tenants").len(), 1);

    let (status, json) = get(addr, "/v1/tenants/health?page_size=2").await;
    assert_eq!(status, 200);
    assert_eq!(json["tenants"].as_array().expect("tenants").len(), 2);
}

#[tokio::test]
async fn router_exposes_every_operational_route() {
    let addr = spawn_server(test_state()).await;

    for path in [
        "/v1/openapi.json",
        "/v1/error-groups",
        "/v1/replay-cases",
        "/v1/replay-runs",
        "/v1/actions/catalog",
        "/v1/actions/log",
        "/v1/incidents",
        "/v1/tenants/health",
        "/v1/tenants/acme/timeline",
    ] {
        let (status, _, _) = send_raw(addr, "GET", path, &[], None).await;
        assert_eq!(status, 200, "GET {path}");
    }

    let (status, _, _) = send_raw(addr, "GET", "/v1/nope", &[], None).await;
    assert_eq!(status, 404);

    // Unknown ids surface as 404 through the error envelope, not a route miss.
    let (status, json) = get(addr, "/v1/replay-runs/run-missing").await;
    assert_eq!(status, 404);
    assert_eq!(json["error"]["code"], "not_found");
}

#[tokio::test]
async fn invalid_query_parameters_are_rejected() {
    let addr = spawn_server(test_state()).await;

    let (status, json) = get(addr, "/v1/error-groups?portal=student").await;
    assert_eq!(status, 400);
    assert_eq!(json["error"]["code"], "invalid_argument");

    let (status, _) = get(addr, "/v1/incidents?status=BROKEN").await;
    assert_eq!(status, 400);

    let (status, _) = get(addr, "/v1/tenants/acme/timeline?from=9&to=3").await;
    assert_eq!(status, 400);
}
