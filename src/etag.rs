//! Content fingerprints for conditional fetches

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// SHA-256 of the value's JSON encoding, hex encoded.
///
/// Equal values always produce equal fingerprints. Values JSON cannot
/// encode (non-string map keys, failing `Serialize` impls) are an error.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// True when a client's `If-None-Match` header names this fingerprint.
pub fn matches(if_none_match: &str, fingerprint: &str) -> bool {
    if_none_match.split(',').map(str::trim).any(|tag| {
        let tag = tag.strip_prefix("W/").unwrap_or(tag);
        tag == "*" || tag.trim_matches('"') == fingerprint
    })
}
