// SPDX-License-Identifier: Apache-2.0

use crate::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operator-facing surface a request was issued from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum Portal {
    Admin,
    Teacher,
    SuperAdmin,
}

impl Portal {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::SuperAdmin => "super_admin",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "admin" => Ok(Self::Admin),
            "teacher" => Ok(Self::Teacher),
            "super_admin" => Ok(Self::SuperAdmin),
            other => Err(ValidationError(format!("unknown portal: {other}"))),
        }
    }
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One failed-request sample delivered by the telemetry feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct TelemetryRecord {
    pub tenant_id: String,
    pub portal: Portal,
    pub method: String,
    pub endpoint: String,
    pub tab_key: String,
    pub status_code: u16,
    pub request_id: String,
    #[serde(default)]
    pub response_excerpt: String,
    pub occurred_at: u64,
}

impl TelemetryRecord {
    pub fn validate_strict(&self) -> Result<(), ValidationError> {
        if self.tenant_id.trim().is_empty() {
            return Err(ValidationError("tenant_id must not be empty".to_string()));
        }
        if self.method.trim().is_empty() {
            return Err(ValidationError("method must not be empty".to_string()));
        }
        if self.method.chars().any(|c| c.is_ascii_lowercase()) {
            return Err(ValidationError(format!(
                "method must be uppercase: {}",
                self.method
            )));
        }
        if !self.endpoint.starts_with('/') {
            return Err(ValidationError(format!(
                "endpoint must start with '/': {}",
                self.endpoint
            )));
        }
        if self.status_code < 100 || self.status_code > 599 {
            return Err(ValidationError(format!(
                "status_code out of range: {}",
                self.status_code
            )));
        }
        if self.occurred_at == 0 {
            return Err(ValidationError("occurred_at must be set".to_string()));
        }
        Ok(())
    }
}
