use serde::Serialize;
use sha2::{Digest, Sha256};

#[must_use]
pub fn stable_hash_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Truncated stable hash for entity identifiers derived from canonical keys.
#[must_use]
pub fn short_hash_hex(bytes: &[u8], len: usize) -> String {
    let full = stable_hash_hex(bytes);
    full[..len.min(full.len())].to_string()
}

pub fn stable_json_hash_hex<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(stable_hash_hex(&bytes))
}
