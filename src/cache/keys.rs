//! Response cache keys.
//!
//! A key is `<prefix>:<path>:<digest>` where the digest is the first eight hex
//! characters of the SHA-256 of the canonical query document. Canonical means
//! keys sorted, repeated keys collected into an array in arrival order, and
//! single values kept as strings, so parameter order never changes the key.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use url::form_urlencoded;

const DIGEST_HEX_LEN: usize = 8;

/// Derive the cache key for a request.
///
/// `scope` identifies the caller; responses for different callers never share a key.
pub fn derive_key(prefix: &str, path: &str, query: Option<&str>, scope: Option<&str>) -> String {
    let params = canonical_query(query.unwrap_or(""));
    let document = match scope {
        Some(scope) => {
            let mut doc = Map::new();
            doc.insert("params".to_string(), params);
            doc.insert("scope".to_string(), Value::String(scope.to_string()));
            Value::Object(doc)
        }
        None => params,
    };

    format!(
        "{prefix}:{}:{}",
        normalize_path(path),
        short_digest(&document.to_string())
    )
}

/// Query string as a sorted JSON object.
pub fn canonical_query(query: &str) -> Value {
    // serde_json's default map is ordered by key.
    let mut params = Map::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        let value = Value::String(value.into_owned());
        match params.get_mut(key.as_ref()) {
            None => {
                params.insert(key.into_owned(), value);
            }
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    Value::Object(params)
}

fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

fn short_digest(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(DIGEST_HEX_LEN);
    encoded
}
