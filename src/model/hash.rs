//! Content hashing for operation identifiers.
//!
//! An operation id is the SHA256 of its serialized content. Two replicas that
//! hold the same operation therefore agree on its id without coordination.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Compute a SHA256 hash of a serializable value.
///
/// The value is first serialized to JSON, then hashed.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized to JSON.
pub fn content_hash<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
