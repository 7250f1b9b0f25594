#![forbid(unsafe_code)]

mod canonical;
mod error;
mod ids;
mod time;

pub use canonical::{short_hash_hex, stable_hash_hex, stable_json_hash_hex};
pub use error::OpsError;
pub use ids::IdGen;
pub use time::{day_bucket, unix_millis, DAY_MS, MINUTE_MS};
