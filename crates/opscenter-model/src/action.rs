// SPDX-License-Identifier: Apache-2.0

use crate::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
#[non_exhaustive]
pub enum ActionRisk {
    Low,
    Medium,
    High,
}

/// Two-phase action lifecycle modeled as a tagged state so terminal states
/// stay distinguishable in audit queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ActionLogStatus {
    Simulated,
    PendingApproval,
    Executed,
    Rejected,
    Expired,
    Failed,
}

impl ActionLogStatus {
    /// Once terminal an action log is append-only; nothing may rewrite it.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Simulated | Self::Executed | Self::Rejected | Self::Expired | Self::Failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct ActionCatalogItem {
    pub key: String,
    pub label: String,
    pub description: String,
    pub risk: ActionRisk,
    pub requires_approval: bool,
    pub required_target_keys: Vec<String>,
}

impl ActionCatalogItem {
    /// Missing target keys, in catalog order. Empty means the target is valid.
    #[must_use]
    pub fn missing_target_keys(&self, target: &BTreeMap<String, String>) -> Vec<String> {
        self.required_target_keys
            .iter()
            .filter(|k| !target.contains_key(*k))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct ActionLog {
    pub id: String,
    pub tenant_id: String,
    pub action_key: String,
    pub target: BTreeMap<String, String>,
    pub reason: String,
    pub dry_run: bool,
    pub status: ActionLogStatus,
    pub requested_by: String,
    /// Deciding operator for approve and reject alike.
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub approved_at: Option<u64>,
    #[serde(default)]
    pub decision_note: Option<String>,
    #[serde(default)]
    pub effect: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub created_at: u64,
}

impl ActionLog {
    #[must_use]
    pub fn new(
        id: String,
        tenant_id: String,
        action_key: String,
        target: BTreeMap<String, String>,
        reason: String,
        dry_run: bool,
        status: ActionLogStatus,
        requested_by: String,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            tenant_id,
            action_key,
            target,
            reason,
            dry_run,
            status,
            requested_by,
            approved_by: None,
            approved_at: None,
            decision_note: None,
            effect: None,
            failure_reason: None,
            created_at,
        }
    }

    pub fn validate_strict(&self) -> Result<(), ValidationError> {
        if self.reason.trim().is_empty() {
            return Err(ValidationError("reason must not be empty".to_string()));
        }
        if self.requested_by.trim().is_empty() {
            return Err(ValidationError(
                "requested_by must not be empty".to_string(),
            ));
        }
        if self.dry_run && self.status != ActionLogStatus::Simulated {
            return Err(ValidationError(
                "dry_run logs may only carry SIMULATED status".to_string(),
            ));
        }
        Ok(())
    }
}
