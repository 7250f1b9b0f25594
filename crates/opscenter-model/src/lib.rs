#![forbid(unsafe_code)]

mod action;
mod catalog;
mod error_group;
mod health;
mod incident;
mod replay;
mod telemetry;

pub use action::{ActionCatalogItem, ActionLog, ActionLogStatus, ActionRisk};
pub use catalog::{
    builtin_action_catalog, builtin_replay_catalog, parse_action_catalog, parse_replay_catalog,
};
pub use error_group::{DedupKey, ErrorGroup, WindowBucket, MAX_EXCERPT_BYTES};
pub use health::{TenantHealth, TenantStatus};
pub use incident::{Incident, IncidentScope, IncidentSeverity, IncidentStatus};
pub use replay::{
    ReplayCase, ReplayPriority, ReplayRun, ReplayRunStatus, ReplayStep, RunSummary, StepOutcome,
};
pub use telemetry::{Portal, TelemetryRecord};

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}
