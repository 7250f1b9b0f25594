// SPDX-License-Identifier: Apache-2.0

use crate::telemetry::{Portal, TelemetryRecord};
use opscenter_core::{short_hash_hex, MINUTE_MS};
use serde::{Deserialize, Serialize};

/// Longest retained response excerpt; only the latest sample is kept.
pub const MAX_EXCERPT_BYTES: usize = 2048;

/// Identity of a deduplicated failure signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct DedupKey {
    pub tenant_id: String,
    pub portal: Portal,
    pub tab_key: String,
    pub method: String,
    pub endpoint: String,
    pub status_code: u16,
}

impl DedupKey {
    #[must_use]
    pub fn from_record(record: &TelemetryRecord) -> Self {
        Self {
            tenant_id: record.tenant_id.clone(),
            portal: record.portal,
            tab_key: record.tab_key.clone(),
            method: record.method.clone(),
            endpoint: record.endpoint.clone(),
            status_code: record.status_code,
        }
    }

    #[must_use]
    pub fn canonical_string(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.tenant_id, self.portal, self.tab_key, self.method, self.endpoint, self.status_code
        )
    }

    /// Group id is derived from the canonical key, so every process that sees
    /// the same signature computes the same identity.
    #[must_use]
    pub fn group_id(&self) -> String {
        format!("eg-{}", short_hash_hex(self.canonical_string().as_bytes(), 16))
    }
}

/// Minute-granularity occurrence counter used for window queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowBucket {
    pub minute: u64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct ErrorGroup {
    pub id: String,
    pub key: DedupKey,
    pub total_count: u64,
    pub first_seen_at: u64,
    pub last_seen_at: u64,
    pub last_request_id: String,
    pub sample_response_excerpt: String,
    pub is_locked: bool,
    #[serde(default)]
    pub locked_by: Option<String>,
    #[serde(default)]
    pub lock_note: Option<String>,
    /// Sliding occurrence counters, pruned to 24h on every write.
    #[serde(default)]
    pub window_buckets: Vec<WindowBucket>,
    /// Optimistic concurrency token; bumped by the store on every update.
    pub version: u64,
}

impl ErrorGroup {
    #[must_use]
    pub fn open(key: DedupKey, record: &TelemetryRecord) -> Self {
        let mut group = Self {
            id: key.group_id(),
            key,
            total_count: 0,
            first_seen_at: record.occurred_at,
            last_seen_at: record.occurred_at,
            last_request_id: String::new(),
            sample_response_excerpt: String::new(),
            is_locked: false,
            locked_by: None,
            lock_note: None,
            window_buckets: Vec::new(),
            version: 1,
        };
        group.record_occurrence(record);
        group
    }

    /// Folds one more occurrence into the group. `total_count` only ever
    /// grows; the sample fields always reflect the latest record.
    pub fn record_occurrence(&mut self, record: &TelemetryRecord) {
        self.total_count += 1;
        self.last_seen_at = self.last_seen_at.max(record.occurred_at);
        self.last_request_id = record.request_id.clone();
        self.sample_response_excerpt = bounded_excerpt(&record.response_excerpt);
        let minute = record.occurred_at / MINUTE_MS;
        match self.window_buckets.iter_mut().find(|b| b.minute == minute) {
            Some(bucket) => bucket.count += 1,
            None => self.window_buckets.push(WindowBucket { minute, count: 1 }),
        }
        self.prune_buckets(record.occurred_at.saturating_sub(opscenter_core::DAY_MS));
    }

    pub fn prune_buckets(&mut self, horizon_ms: u64) {
        let horizon_minute = horizon_ms / MINUTE_MS;
        self.window_buckets.retain(|b| b.minute >= horizon_minute);
        self.window_buckets.sort_by_key(|b| b.minute);
    }

    /// Occurrences recorded at or after `since_ms`.
    #[must_use]
    pub fn count_since(&self, since_ms: u64) -> u64 {
        let since_minute = since_ms / MINUTE_MS;
        self.window_buckets
            .iter()
            .filter(|b| b.minute >= since_minute)
            .map(|b| b.count)
            .sum()
    }
}

fn bounded_excerpt(raw: &str) -> String {
    if raw.len() <= MAX_EXCERPT_BYTES {
        return raw.to_string();
    }
    let mut end = MAX_EXCERPT_BYTES;
    while end > 0 && !raw.is_char_boundary(end) {
        end -= 1;
    }
    raw[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: u16, at: u64) -> TelemetryRecord {
        TelemetryRecord {
            tenant_id: "t1".to_string(),
            portal: Portal::Admin,
            method: "GET".to_string(),
            endpoint: "/courses".to_string(),
            tab_key: "courses".to_string(),
            status_code: status,
            request_id: format!("req-{at}"),
            response_excerpt: "boom".to_string(),
            occurred_at: at,
        }
    }

    #[test]
    fn group_id_is_stable_for_identical_keys() {
        let a = DedupKey::from_record(&record(500, 1_000));
        let b = DedupKey::from_record(&record(500, 9_999_000));
        assert_eq!(a.group_id(), b.group_id());
    }

    #[test]
    fn group_id_differs_per_status_code() {
        let a = DedupKey::from_record(&record(500, 1_000));
        let b = DedupKey::from_record(&record(429, 1_000));
        assert_ne!(a.group_id(), b.group_id());
    }

    #[test]
    fn occurrences_accumulate_and_keep_latest_sample() {
        let first = record(500, MINUTE_MS);
        let mut group = ErrorGroup::open(DedupKey::from_record(&first), &first);
        for i in 1..5u64 {
            group.record_occurrence(&record(500, MINUTE_MS + i * 1_000));
        }
        assert_eq!(group.total_count, 5);
        assert_eq!(group.last_request_id, format!("req-{}", MINUTE_MS + 4_000));
        assert_eq!(group.count_since(0), 5);
    }

    #[test]
    fn excerpt_is_bounded() {
        let mut r = record(500, MINUTE_MS);
        r.response_excerpt = "x".repeat(MAX_EXCERPT_BYTES * 2);
        let group = ErrorGroup::open(DedupKey::from_record(&r), &r);
        assert_eq!(group.sample_response_excerpt.len(), MAX_EXCERPT_BYTES);
    }

    #[test]
    fn window_count_excludes_old_buckets() {
        let first = record(500, MINUTE_MS);
        let mut group = ErrorGroup::open(DedupKey::from_record(&first), &first);
        group.record_occurrence(&record(500, 30 * MINUTE_MS));
        assert_eq!(group.count_since(20 * MINUTE_MS), 1);
        assert_eq!(group.count_since(0), 2);
    }
}
