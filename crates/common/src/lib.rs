//! fe_common
//!
//! Small shared utilities used by every crate in the workspace:
//! - canonical JSON + SHA-256 hashing (audit file hash chain)
//! - tax identifier (NIT) normalization
//! - America/Bogota wall clock
//! - request correlation id scope

pub mod clock;
pub mod correlation;
pub mod nit;

pub use clock::{bogota_offset, Clock, FixedClock, SystemClock};
pub use correlation::{correlation_id_or_fallback, current_correlation_id, with_correlation_id};
pub use nit::normalize_nit;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanonError {
    #[error("canonical json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Compact JSON with object keys sorted at every depth. Hashes are computed
/// over these bytes, never over pretty-printed output.
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonError> {
    let ordered = sorted_keys(serde_json::to_value(value)?);
    Ok(serde_json::to_vec(&ordered)?)
}

/// `sha256:<hex>` over [`canonical_json_bytes`].
pub fn sha256_canonical_json<T: Serialize>(value: &T) -> Result<String, CanonError> {
    Ok(sha256_bytes(&canonical_json_bytes(value)?))
}

/// `sha256:<hex>` over raw bytes.
pub fn sha256_bytes(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

fn sorted_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let ordered: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sorted_keys(v))).collect();
            Value::Object(ordered.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted_keys).collect()),
        scalar => scalar,
    }
}
