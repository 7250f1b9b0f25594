// SPDX-License-Identifier: Apache-2.0

use opscenter_model::{
    ActionCatalogItem, ActionLog, ActionLogStatus, ErrorGroup, Incident, Portal, ReplayCase,
    ReplayPriority, ReplayRun, ReplayStep, TelemetryRecord, TenantHealth,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryBatchRequest {
    pub records: Vec<TelemetryRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryBatchResponse {
    pub accepted: u64,
    pub rejected: u64,
    #[serde(default)]
    pub rejections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockRequest {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorGroupListResponse {
    pub groups: Vec<ErrorGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorGroupDetailResponse {
    pub group: ErrorGroup,
    #[serde(default)]
    pub active_incident: Option<Incident>,
    pub recent_steps: Vec<ReplayStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncidentListResponse {
    pub incidents: Vec<Incident>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRunRequest {
    pub tenant_id: String,
    pub portal: Portal,
    pub cases: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_priority")]
    pub priority: ReplayPriority,
}

fn default_priority() -> ReplayPriority {
    ReplayPriority::Normal
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunListResponse {
    pub runs: Vec<ReplayRun>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunDetailResponse {
    pub run: ReplayRun,
    pub steps: Vec<ReplayStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayCatalogResponse {
    pub cases: Vec<ReplayCase>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionCatalogResponse {
    pub actions: Vec<ActionCatalogItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecuteActionRequest {
    pub tenant_id: String,
    pub action_key: String,
    #[serde(default)]
    pub target: BTreeMap<String, String>,
    pub reason: String,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecuteActionResponse {
    pub action_log_id: String,
    pub status: ActionLogStatus,
    pub requires_approval: bool,
    #[serde(default)]
    pub effect: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovalRequest {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionLogListResponse {
    pub actions: Vec<ActionLog>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantHealthListResponse {
    pub tenants: Vec<TenantHealth>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventKind {
    Incident,
    ReplayRun,
    Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimelineEvent {
    pub at_ms: u64,
    pub kind: TimelineEventKind,
    pub reference_id: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimelineResponse {
    pub tenant_id: String,
    pub events: Vec<TimelineEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionResponse {
    pub name: String,
    pub version: String,
}
