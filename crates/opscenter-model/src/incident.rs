// SPDX-License-Identifier: Apache-2.0

use crate::ValidationError;
use opscenter_core::{day_bucket, short_hash_hex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
#[non_exhaustive]
pub enum IncidentSeverity {
    P1,
    P2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[non_exhaustive]
pub enum IncidentScope {
    Tenant,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
#[non_exhaustive]
pub enum IncidentStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl IncidentStatus {
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Resolved)
    }
}

/// Operator-visible record that an error group crossed the alerting
/// threshold. Status transitions are monotonic forward only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct Incident {
    pub id: String,
    pub severity: IncidentSeverity,
    pub scope: IncidentScope,
    pub tenant_id: Option<String>,
    pub title: String,
    pub status: IncidentStatus,
    pub error_group_id: String,
    /// tenant | group | UTC day-bucket; the store enforces uniqueness, which
    /// keeps retried correlation passes at-most-once per signature per day.
    pub idempotency_key: String,
    pub started_at: u64,
    #[serde(default)]
    pub acknowledged_at: Option<u64>,
    #[serde(default)]
    pub acknowledged_by: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<u64>,
    #[serde(default)]
    pub resolved_by: Option<String>,
}

impl Incident {
    #[must_use]
    pub fn idempotency_key_for(tenant_id: &str, error_group_id: &str, at_ms: u64) -> String {
        format!("{tenant_id}|{error_group_id}|{}", day_bucket(at_ms))
    }

    #[must_use]
    pub fn open(
        severity: IncidentSeverity,
        tenant_id: String,
        title: String,
        error_group_id: String,
        started_at: u64,
    ) -> Self {
        let idempotency_key = Self::idempotency_key_for(&tenant_id, &error_group_id, started_at);
        Self {
            id: format!("inc-{}", short_hash_hex(idempotency_key.as_bytes(), 16)),
            severity,
            scope: IncidentScope::Tenant,
            tenant_id: Some(tenant_id),
            title,
            status: IncidentStatus::Open,
            error_group_id,
            idempotency_key,
            started_at,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
        }
    }

    pub fn acknowledge(&mut self, operator: &str, at_ms: u64) -> Result<(), ValidationError> {
        if self.status != IncidentStatus::Open {
            return Err(ValidationError(format!(
                "incident {} is {:?}; only OPEN incidents can be acknowledged",
                self.id, self.status
            )));
        }
        self.status = IncidentStatus::Acknowledged;
        self.acknowledged_at = Some(at_ms);
        self.acknowledged_by = Some(operator.to_string());
        Ok(())
    }

    pub fn resolve(&mut self, operator: &str, at_ms: u64) -> Result<(), ValidationError> {
        if self.status == IncidentStatus::Resolved {
            return Err(ValidationError(format!(
                "incident {} is already resolved",
                self.id
            )));
        }
        self.status = IncidentStatus::Resolved;
        self.resolved_at = Some(at_ms);
        self.resolved_by = Some(operator.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incident() -> Incident {
        Incident::open(
            IncidentSeverity::P1,
            "t1".to_string(),
            "500 on GET /courses".to_string(),
            "eg-abc".to_string(),
            1_000,
        )
    }

    #[test]
    fn transitions_are_monotonic() {
        let mut inc = incident();
        inc.acknowledge("op-a", 2_000).expect("ack");
        assert!(inc.acknowledge("op-a", 3_000).is_err());
        inc.resolve("op-b", 4_000).expect("resolve");
        assert!(inc.resolve("op-b", 5_000).is_err());
        assert!(inc.acknowledge("op-a", 6_000).is_err());
    }

    #[test]
    fn resolve_straight_from_open_is_allowed() {
        let mut inc = incident();
        inc.resolve("op-a", 2_000).expect("resolve");
        assert_eq!(inc.status, IncidentStatus::Resolved);
        assert!(inc.acknowledged_at.is_none());
    }

    #[test]
    fn same_day_signature_maps_to_same_id() {
        let a = Incident::open(
            IncidentSeverity::P2,
            "t1".to_string(),
            "a".to_string(),
            "eg-x".to_string(),
            1_000,
        );
        let b = Incident::open(
            IncidentSeverity::P2,
            "t1".to_string(),
            "b".to_string(),
            "eg-x".to_string(),
            2_000,
        );
        assert_eq!(a.id, b.id);
        assert_eq!(a.idempotency_key, b.idempotency_key);
    }
}
