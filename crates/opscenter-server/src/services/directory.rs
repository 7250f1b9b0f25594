// SPDX-License-Identifier: Apache-2.0

//! Tenant directory: the authority on which tenants exist, where their
//! portal backends live, and whether they are in a maintenance window.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantInfo {
    pub id: String,
    pub base_url: String,
    pub maintenance: bool,
}

pub trait TenantDirectory: Send + Sync + 'static {
    fn tenants(&self) -> Vec<TenantInfo>;
    fn get(&self, tenant_id: &str) -> Option<TenantInfo>;
}

pub struct StaticTenantDirectory {
    entries: Vec<TenantInfo>,
}

impl StaticTenantDirectory {
    #[must_use]
    pub fn new(entries: Vec<TenantInfo>) -> Self {
        Self { entries }
    }

    /// Parses `OPSC_TENANTS` entries of the form `id=base_url`,
    /// comma-separated; `maintenance` ids come from a second csv list.
    #[must_use]
    pub fn from_env_specs(raw: &str, maintenance_csv: &str) -> Self {
        let maintenance: Vec<&str> = maintenance_csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let entries = raw
            .split(',')
            .filter_map(|item| {
                let (id, base_url) = item.split_once('=')?;
                let id = id.trim();
                let base_url = base_url.trim();
                if id.is_empty() || base_url.is_empty() {
                    return None;
                }
                Some(TenantInfo {
                    id: id.to_string(),
                    base_url: base_url.trim_end_matches('/').to_string(),
                    maintenance: maintenance.contains(&id),
                })
            })
            .collect();
        Self { entries }
    }
}

impl TenantDirectory for StaticTenantDirectory {
    fn tenants(&self) -> Vec<TenantInfo> {
        self.entries.clone()
    }

    fn get(&self, tenant_id: &str) -> Option<TenantInfo> {
        self.entries.iter().find(|t| t.id == tenant_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_specs_parse_and_trim() {
        let dir = StaticTenantDirectory::from_env_specs(
            "t1=https://t1.example.com/, t2=https://t2.example.com",
            "t2",
        );
        let t1 = dir.get("t1").unwrap();
        assert_eq!(t1.base_url, "https://t1.example.com");
        assert!(!t1.maintenance);
        assert!(dir.get("t2").unwrap().maintenance);
        assert!(dir.get("t3").is_none());
    }

    #[test]
    fn malformed_entries_are_dropped() {
        let dir = StaticTenantDirectory::from_env_specs("t1, =x, t2=https://t2.example.com", "");
        assert_eq!(dir.tenants().len(), 1);
    }
}
