#![forbid(unsafe_code)]

//! Wire contract of the operations center HTTP surface: request and
//! response DTOs, query-parameter parsing, and the error envelope every
//! endpoint returns on failure.

use serde_json::{json, Value};

pub mod dto;
pub mod errors;
pub mod params;

pub use errors::{map_error, ApiError, ApiErrorCode, ApiErrorMapping};

pub const CRATE_NAME: &str = "opscenter-api";
pub const API_VERSION: &str = "v1";

#[must_use]
pub fn openapi_v1_spec() -> Value {
    json!({
      "openapi": "3.0.3",
      "info": {
        "title": "opscenter API",
        "version": API_VERSION
      },
      "paths": {
        "/healthz": {"get": {"responses": {"200": {"description": "ok"}}}},
        "/readyz": {"get": {"responses": {"200": {"description": "ready"}, "503": {"description": "not ready"}}}},
        "/metrics": {"get": {"responses": {"200": {"description": "plaintext metrics"}}}},
        "/v1/version": {"get": {"responses": {"200": {"description": "build identity"}}}},
        "/v1/openapi.json": {"get": {"responses": {"200": {"description": "this document"}}}},
        "/v1/telemetry": {
          "post": {"responses": {"200": {"description": "batch ingest summary"}, "400": {"description": "malformed batch", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}}}}
        },
        "/v1/error-groups": {
          "get": {
            "parameters": [
              {"name": "tenant", "in": "query", "schema": {"type": "string"}},
              {"name": "portal", "in": "query", "schema": {"type": "string", "enum": ["admin", "teacher", "super_admin"]}},
              {"name": "status_codes", "in": "query", "schema": {"type": "string", "description": "comma-separated HTTP status codes"}},
              {"name": "since", "in": "query", "schema": {"type": "integer", "description": "unix millis lower bound on last_seen_at"}}
            ],
            "responses": {"200": {"description": "error group list"}}
          }
        },
        "/v1/error-groups/{id}/detail": {"get": {"responses": {"200": {"description": "group with active incident and recent replay steps"}, "404": {"description": "unknown group"}}}},
        "/v1/error-groups/{id}/lock": {"post": {"responses": {"200": {"description": "locked"}, "409": {"description": "already locked"}}}},
        "/v1/error-groups/{id}/unlock": {"post": {"responses": {"200": {"description": "unlocked"}}}},
        "/v1/replay-cases": {"get": {"responses": {"200": {"description": "replay catalog"}}}},
        "/v1/replay-runs": {
          "get": {"responses": {"200": {"description": "run list"}}},
          "post": {"responses": {"200": {"description": "run accepted"}, "409": {"description": "tenant already has a queued run"}}}
        },
        "/v1/replay-runs/{id}": {"get": {"responses": {"200": {"description": "run detail"}}}},
        "/v1/replay-runs/{id}/steps": {"get": {"responses": {"200": {"description": "steps recorded so far"}}}},
        "/v1/replay-runs/{id}/stop": {"post": {"responses": {"200": {"description": "stop requested"}}}},
        "/v1/replay-runs/{id}/cancel": {"post": {"responses": {"200": {"description": "canceled"}, "409": {"description": "not pending"}}}},
        "/v1/incidents": {"get": {"responses": {"200": {"description": "incident list"}}}},
        "/v1/incidents/{id}/acknowledge": {"post": {"responses": {"200": {"description": "acknowledged"}, "409": {"description": "not open"}}}},
        "/v1/incidents/{id}/resolve": {"post": {"responses": {"200": {"description": "resolved"}}}},
        "/v1/actions/catalog": {"get": {"responses": {"200": {"description": "action catalog"}}}},
        "/v1/actions/execute": {"post": {"responses": {"200": {"description": "executed, simulated, or queued for approval"}}}},
        "/v1/actions/{id}/approve": {"post": {"responses": {"200": {"description": "approved and executed"}, "409": {"description": "self approval or wrong state"}, "410": {"description": "approval window elapsed"}}}},
        "/v1/actions/{id}/reject": {"post": {"responses": {"200": {"description": "rejected"}}}},
        "/v1/actions/log": {"get": {"responses": {"200": {"description": "action audit trail"}}}},
        "/v1/tenants/health": {"get": {"responses": {"200": {"description": "per-tenant health"}}}},
        "/v1/tenants/{id}/timeline": {"get": {"responses": {"200": {"description": "merged tenant timeline"}}}}
      },
      "components": {
        "schemas": {
          "ApiError": {
            "type": "object",
            "required": ["code", "message", "details", "request_id"],
            "properties": {
              "code": {"type": "string"},
              "message": {"type": "string"},
              "details": {},
              "request_id": {"type": "string"}
            }
          }
        }
      }
    })
}
