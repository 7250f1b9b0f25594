// SPDX-License-Identifier: Apache-2.0

use crate::errors::ApiError;
use opscenter_model::{ActionLogStatus, IncidentStatus, Portal};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListErrorGroupsParams {
    pub tenant_id: Option<String>,
    pub portal: Option<Portal>,
    pub status_codes: Vec<u16>,
    pub since_ms: Option<u64>,
}

pub fn parse_list_error_groups_params(
    query: &BTreeMap<String, String>,
) -> Result<ListErrorGroupsParams, ApiError> {
    let portal = match query.get("portal") {
        Some(raw) => Some(Portal::parse(raw).map_err(|_| ApiError::invalid_param("portal", raw))?),
        None => None,
    };
    let mut status_codes = Vec::new();
    if let Some(raw) = query.get("status_codes") {
        for part in raw.split(',').filter(|p| !p.is_empty()) {
            let code: u16 = part
                .parse()
                .map_err(|_| ApiError::invalid_param("status_codes", raw))?;
            status_codes.push(code);
        }
    }
    let since_ms = match query.get("since") {
        Some(raw) => Some(
            raw.parse()
                .map_err(|_| ApiError::invalid_param("since", raw))?,
        ),
        None => None,
    };
    Ok(ListErrorGroupsParams {
        tenant_id: query.get("tenant").cloned(),
        portal,
        status_codes,
        since_ms,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListIncidentsParams {
    pub tenant_id: Option<String>,
    pub status: Option<IncidentStatus>,
    pub active_only: bool,
}

pub fn parse_list_incidents_params(
    query: &BTreeMap<String, String>,
) -> Result<ListIncidentsParams, ApiError> {
    let status = match query.get("status").map(String::as_str) {
        None => None,
        Some("OPEN") => Some(IncidentStatus::Open),
        Some("ACKNOWLEDGED") => Some(IncidentStatus::Acknowledged),
        Some("RESOLVED") => Some(IncidentStatus::Resolved),
        Some(other) => return Err(ApiError::invalid_param("status", other)),
    };
    let active_only = match query.get("active_only").map(String::as_str) {
        None => false,
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        Some(other) => return Err(ApiError::invalid_param("active_only", other)),
    };
    Ok(ListIncidentsParams {
        tenant_id: query.get("tenant").cloned(),
        status,
        active_only,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListActionLogsParams {
    pub tenant_id: Option<String>,
    pub status: Option<ActionLogStatus>,
}

pub fn parse_list_action_logs_params(
    query: &BTreeMap<String, String>,
) -> Result<ListActionLogsParams, ApiError> {
    let status = match query.get("status") {
        None => None,
        Some(raw) => Some(
            serde_json::from_value(serde_json::Value::String(raw.clone()))
                .map_err(|_| ApiError::invalid_param("status", raw))?,
        ),
    };
    Ok(ListActionLogsParams {
        tenant_id: query.get("tenant").cloned(),
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn error_group_params_parse_csv_codes() {
        let params =
            parse_list_error_groups_params(&query(&[("status_codes", "500,502"), ("portal", "admin")]))
                .unwrap();
        assert_eq!(params.status_codes, vec![500, 502]);
        assert_eq!(params.portal, Some(Portal::Admin));
    }

    #[test]
    fn bad_portal_is_rejected() {
        let err = parse_list_error_groups_params(&query(&[("portal", "student")])).unwrap_err();
        assert_eq!(err.message, "invalid query parameter: portal");
    }

    #[test]
    fn incident_status_uses_wire_spelling() {
        let params =
            parse_list_incidents_params(&query(&[("status", "ACKNOWLEDGED"), ("active_only", "1")]))
                .unwrap();
        assert_eq!(params.status, Some(IncidentStatus::Acknowledged));
        assert!(params.active_only);
    }

    #[test]
    fn action_status_round_trips_through_serde() {
        let params =
            parse_list_action_logs_params(&query(&[("status", "PENDING_APPROVAL")])).unwrap();
        assert_eq!(params.status, Some(ActionLogStatus::PendingApproval));
    }
}
