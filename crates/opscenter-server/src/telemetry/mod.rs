// SPDX-License-Identifier: Apache-2.0

//! Plaintext metrics in Prometheus exposition format, accumulated in
//! process. Request counters and latency vectors live behind async mutexes;
//! cheap counters are atomics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

const METRIC_SUBSYSTEM: &str = "opscenter";
const METRIC_VERSION: &str = env!("CARGO_PKG_VERSION");

pub(crate) fn percentile_ns(values: &[u64], pct: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut v = values.to_vec();
    v.sort_unstable();
    let idx = ((v.len() as f64 - 1.0) * pct).round() as usize;
    v[idx]
}

#[derive(Default)]
pub struct RequestMetrics {
    counts: Mutex<HashMap<(String, u16), u64>>,
    latency_ns: Mutex<HashMap<String, Vec<u64>>>,
    pub telemetry_ingested_total: AtomicU64,
    pub telemetry_ignored_total: AtomicU64,
    pub incidents_opened_total: AtomicU64,
    pub incidents_auto_resolved_total: AtomicU64,
    pub actions_expired_total: AtomicU64,
}

impl RequestMetrics {
    pub(crate) async fn observe_request(&self, route: &str, status: u16, latency: Duration) {
        let mut counts = self.counts.lock().await;
        *counts.entry((route.to_string(), status)).or_insert(0) += 1;
        drop(counts);
        let mut latency_map = self.latency_ns.lock().await;
        latency_map
            .entry(route.to_string())
            .or_insert_with(Vec::new)
            .push(latency.as_nanos() as u64);
    }

    pub(crate) async fn render(&self) -> String {
        let mut body = String::new();
        for (name, value) in [
            ("telemetry_ingested_total", &self.telemetry_ingested_total),
            ("telemetry_ignored_total", &self.telemetry_ignored_total),
            ("incidents_opened_total", &self.incidents_opened_total),
            (
                "incidents_auto_resolved_total",
                &self.incidents_auto_resolved_total,
            ),
            ("actions_expired_total", &self.actions_expired_total),
        ] {
            body.push_str(&format!(
                "opsc_{name}{{subsystem=\"{METRIC_SUBSYSTEM}\",version=\"{METRIC_VERSION}\"}} {}\n",
                value.load(Ordering::Relaxed)
            ));
        }

        let mut counts: Vec<((String, u16), u64)> =
            self.counts.lock().await.clone().into_iter().collect();
        counts.sort();
        for ((route, status), count) in counts {
            body.push_str(&format!(
                "opsc_http_requests_total{{subsystem=\"{METRIC_SUBSYSTEM}\",version=\"{METRIC_VERSION}\",route=\"{route}\",status=\"{status}\"}} {count}\n",
            ));
        }

        let mut latency: Vec<(String, Vec<u64>)> =
            self.latency_ns.lock().await.clone().into_iter().collect();
        latency.sort();
        for (route, vals) in latency {
            for (label, pct) in [("p50", 0.50), ("p95", 0.95), ("p99", 0.99)] {
                body.push_str(&format!(
                    "opsc_http_request_latency_{label}_seconds{{subsystem=\"{METRIC_SUBSYSTEM}\",version=\"{METRIC_VERSION}\",route=\"{route}\"}} {:.6}\n",
                    percentile_ns(&vals, pct) as f64 / 1_000_000_000.0
                ));
            }
        }
        body
    }
}
