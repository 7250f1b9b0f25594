use crate::telemetry::Portal;
use crate::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
#[non_exhaustive]
pub enum ReplayPriority {
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[non_exhaustive]
pub enum ReplayRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl ReplayRunStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[non_exhaustive]
pub enum StepOutcome {
    Pass,
    Fail,
    Skipped,
}

/// Canned diagnostic request; the catalog is immutable at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct ReplayCase {
    pub case_id: String,
    pub label: String,
    pub portal: Portal,
    pub tab: String,
    pub method: String,
    pub endpoint: String,
    #[serde(default)]
    pub param_schema: Value,
}

impl ReplayCase {
    /// Dry-run mode skips cases that would mutate tenant state.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        !matches!(self.method.as_str(), "GET" | "HEAD")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RunSummary {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl RunSummary {
    #[must_use]
    pub const fn total(self) -> u32 {
        self.passed + self.failed + self.skipped
    }

    pub fn record(&mut self, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Pass => self.passed += 1,
            StepOutcome::Fail => self.failed += 1,
            StepOutcome::Skipped => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct ReplayRun {
    pub id: String,
    pub tenant_id: String,
    pub portal: Portal,
    pub cases: Vec<String>,
    pub dry_run: bool,
    pub priority: ReplayPriority,
    pub status: ReplayRunStatus,
    pub summary: RunSummary,
    /// Operator asked the executor to stop after the current case.
    #[serde(default)]
    pub stop_requested: bool,
    pub created_at: u64,
    #[serde(default)]
    pub started_at: Option<u64>,
    #[serde(default)]
    pub finished_at: Option<u64>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl ReplayRun {
    #[must_use]
    pub fn pending(
        id: String,
        tenant_id: String,
        portal: Portal,
        cases: Vec<String>,
        dry_run: bool,
        priority: ReplayPriority,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            tenant_id,
            portal,
            cases,
            dry_run,
            priority,
            status: ReplayRunStatus::Pending,
            summary: RunSummary::default(),
            stop_requested: false,
            created_at,
            started_at: None,
            finished_at: None,
            failure_reason: None,
        }
    }

    pub fn validate_strict(&self) -> Result<(), ValidationError> {
        if self.cases.is_empty() {
            return Err(ValidationError("cases must not be empty".to_string()));
        }
        if self.tenant_id.trim().is_empty() {
            return Err(ValidationError("tenant_id must not be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct ReplayStep {
    pub id: String,
    pub run_id: String,
    pub case_id: String,
    pub case_label: String,
    pub endpoint: String,
    #[serde(default)]
    pub response_status: Option<u16>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    pub outcome: StepOutcome,
    #[serde(default)]
    pub detail: Option<String>,
    pub created_at: u64,
}

impl ReplayStep {
    #[must_use]
    pub fn new(
        id: String,
        run_id: String,
        case: &ReplayCase,
        outcome: StepOutcome,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            run_id,
            case_id: case.case_id.clone(),
            case_label: case.label.clone(),
            endpoint: case.endpoint.clone(),
            response_status: None,
            latency_ms: None,
            outcome,
            detail: None,
            created_at,
        }
    }
}
