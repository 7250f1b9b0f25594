use crate::time::unix_millis;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic per-process id source for runs, steps, and action logs.
///
/// Deterministic identities (error groups, incidents) are derived from
/// canonical-key hashes instead; see `short_hash_hex`.
pub struct IdGen {
    prefix: &'static str,
    seed: AtomicU64,
}

impl IdGen {
    #[must_use]
    pub const fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            seed: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn next(&self) -> String {
        let n = self.seed.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:011x}{:04x}", self.prefix, unix_millis(), n & 0xffff)
    }
}
