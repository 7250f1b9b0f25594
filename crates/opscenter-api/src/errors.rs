// SPDX-License-Identifier: Apache-2.0

use opscenter_core::OpsError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorCode {
    InvalidArgument,
    Conflict,
    NotFound,
    TransientUpstream,
    Expired,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    pub details: Value,
    pub request_id: String,
}

impl ApiError {
    #[must_use]
    pub fn new(
        code: ApiErrorCode,
        message: impl Into<String>,
        details: Value,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            request_id: request_id.into(),
        }
    }

    #[must_use]
    pub fn from_ops(error: &OpsError, request_id: impl Into<String>) -> Self {
        let code = match error {
            OpsError::InvalidArgument(_) => ApiErrorCode::InvalidArgument,
            OpsError::Conflict(_) => ApiErrorCode::Conflict,
            OpsError::NotFound(_) => ApiErrorCode::NotFound,
            OpsError::TransientUpstream(_) => ApiErrorCode::TransientUpstream,
            OpsError::Expired(_) => ApiErrorCode::Expired,
            _ => ApiErrorCode::Internal,
        };
        Self::new(code, error.message(), Value::Null, request_id)
    }

    #[must_use]
    pub fn invalid_param(name: &str, value: &str) -> Self {
        Self::new(
            ApiErrorCode::InvalidArgument,
            format!("invalid query parameter: {name}"),
            json!({"field_errors":[{"parameter": name, "reason": "invalid", "value": value}]}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn missing_operator() -> Self {
        Self::new(
            ApiErrorCode::InvalidArgument,
            "missing x-operator header",
            json!({"header": "x-operator"}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiErrorMapping {
    pub status_code: u16,
}

#[must_use]
pub fn map_error(error: &ApiError) -> ApiErrorMapping {
    let status_code = match error.code {
        ApiErrorCode::InvalidArgument => 400,
        ApiErrorCode::Conflict => 409,
        ApiErrorCode::NotFound => 404,
        ApiErrorCode::TransientUpstream => 502,
        ApiErrorCode::Expired => 410,
        ApiErrorCode::Internal => 500,
    };
    ApiErrorMapping { status_code }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ops_errors_keep_code_and_message() {
        let err = ApiError::from_ops(&OpsError::conflict("group is locked"), "req-1");
        assert_eq!(err.code, ApiErrorCode::Conflict);
        assert_eq!(err.message, "group is locked");
        assert_eq!(map_error(&err).status_code, 409);
    }

    #[test]
    fn every_code_has_a_distinct_status() {
        let codes = [
            (ApiErrorCode::InvalidArgument, 400),
            (ApiErrorCode::Conflict, 409),
            (ApiErrorCode::NotFound, 404),
            (ApiErrorCode::TransientUpstream, 502),
            (ApiErrorCode::Expired, 410),
            (ApiErrorCode::Internal, 500),
        ];
        for (code, status) in codes {
            let err = ApiError::new(code, "x", Value::Null, "req-1");
            assert_eq!(map_error(&err).status_code, status);
        }
    }

    #[test]
    fn wire_code_is_snake_case() {
        let err = ApiError::from_ops(&OpsError::transient_upstream("timeout"), "req-1");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["code"], "transient_upstream");
    }
}
