use crate::action::{ActionCatalogItem, ActionRisk};
use crate::replay::ReplayCase;
use crate::telemetry::Portal;
use crate::ValidationError;
use serde_json::json;

/// Built-in diagnostic catalog; deployments may override it with a JSON file
/// carrying the same shape.
#[must_use]
pub fn builtin_replay_catalog() -> Vec<ReplayCase> {
    let raw = [
        ("admin_courses_list", "List courses", Portal::Admin, "courses", "GET", "/api/admin/courses"),
        ("admin_course_publish", "Publish course draft", Portal::Admin, "courses", "POST", "/api/admin/courses/publish-check"),
        ("admin_reports_summary", "Reports summary", Portal::Admin, "reports", "GET", "/api/admin/reports/summary"),
        ("admin_users_page", "List admin users", Portal::Admin, "users", "GET", "/api/admin/users"),
        ("teacher_dashboard", "Teacher dashboard", Portal::Teacher, "dashboard", "GET", "/api/teacher/dashboard"),
        ("teacher_assignments_list", "List assignments", Portal::Teacher, "assignments", "GET", "/api/teacher/assignments"),
        ("teacher_gradebook_export", "Gradebook export probe", Portal::Teacher, "gradebook", "POST", "/api/teacher/gradebook/export"),
        ("super_tenant_overview", "Tenant overview", Portal::SuperAdmin, "tenants", "GET", "/api/super/tenants/overview"),
        ("super_billing_snapshot", "Billing snapshot", Portal::SuperAdmin, "billing", "GET", "/api/super/billing/snapshot"),
    ];
    raw.iter()
        .map(|(case_id, label, portal, tab, method, endpoint)| ReplayCase {
            case_id: (*case_id).to_string(),
            label: (*label).to_string(),
            portal: *portal,
            tab: (*tab).to_string(),
            method: (*method).to_string(),
            endpoint: (*endpoint).to_string(),
            param_schema: json!({}),
        })
        .collect()
}

#[must_use]
pub fn builtin_action_catalog() -> Vec<ActionCatalogItem> {
    vec![
        ActionCatalogItem {
            key: "clear_tenant_cache".to_string(),
            label: "Clear tenant cache".to_string(),
            description: "Drop cached dashboards and report aggregates for one tenant".to_string(),
            risk: ActionRisk::Low,
            requires_approval: false,
            required_target_keys: vec!["scope".to_string()],
        },
        ActionCatalogItem {
            key: "requeue_failed_jobs".to_string(),
            label: "Requeue failed jobs".to_string(),
            description: "Requeue dead-lettered background jobs for one tenant".to_string(),
            risk: ActionRisk::Medium,
            requires_approval: false,
            required_target_keys: vec!["queue".to_string()],
        },
        ActionCatalogItem {
            key: "rotate_tenant_api_key".to_string(),
            label: "Rotate tenant API key".to_string(),
            description: "Invalidate and reissue the tenant integration API key".to_string(),
            risk: ActionRisk::High,
            requires_approval: true,
            required_target_keys: vec!["key_id".to_string()],
        },
        ActionCatalogItem {
            key: "force_session_logout".to_string(),
            label: "Force session logout".to_string(),
            description: "Terminate every active operator and teacher session on the tenant"
                .to_string(),
            risk: ActionRisk::High,
            requires_approval: true,
            required_target_keys: vec!["portal".to_string()],
        },
    ]
}

pub fn parse_replay_catalog(raw: &str) -> Result<Vec<ReplayCase>, ValidationError> {
    let cases: Vec<ReplayCase> =
        serde_json::from_str(raw).map_err(|e| ValidationError(format!("replay catalog: {e}")))?;
    ensure_unique(cases.iter().map(|c| c.case_id.as_str()), "case_id")?;
    for case in &cases {
        if !case.endpoint.starts_with('/') {
            return Err(ValidationError(format!(
                "case {} endpoint must start with '/'",
                case.case_id
            )));
        }
    }
    Ok(cases)
}

pub fn parse_action_catalog(raw: &str) -> Result<Vec<ActionCatalogItem>, ValidationError> {
    let items: Vec<ActionCatalogItem> =
        serde_json::from_str(raw).map_err(|e| ValidationError(format!("action catalog: {e}")))?;
    ensure_unique(items.iter().map(|i| i.key.as_str()), "action key")?;
    for item in &items {
        if item.risk == ActionRisk::High && !item.requires_approval {
            return Err(ValidationError(format!(
                "high-risk action {} must require approval",
                item.key
            )));
        }
    }
    Ok(items)
}

fn ensure_unique<'a>(
    keys: impl Iterator<Item = &'a str>,
    what: &str,
) -> Result<(), ValidationError> {
    let mut seen = std::collections::BTreeSet::new();
    for key in keys {
        if !seen.insert(key) {
            return Err(ValidationError(format!("duplicate {what}: {key}")));
        }
    }
    Ok(())
}
