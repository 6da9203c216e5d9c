//! Upload request signing
//!
//! Signed uploads carry a `signature` computed over the upload parameters:
//! non-empty parameters sorted by name, serialized as `k=v` pairs joined with
//! `&`, with the API secret appended, hashed with SHA-256 and hex encoded.
//! `file`, `api_key`, `cloud_name`, `resource_type` and the signature fields
//! themselves are never part of the signed string.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Algorithm name sent alongside the signature
pub const SIGNATURE_ALGORITHM: &str = "sha256";

const UNSIGNED_PARAMS: [&str; 6] = [
    "file",
    "api_key",
    "cloud_name",
    "resource_type",
    "signature",
    "signature_algorithm",
];

/// Build the string that gets hashed
pub fn string_to_sign(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(k, v)| !v.is_empty() && !UNSIGNED_PARAMS.contains(&k.as_str()))
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Sign upload parameters with the API secret
pub fn sign(params: &BTreeMap<String, String>, api_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(string_to_sign(params).as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}
