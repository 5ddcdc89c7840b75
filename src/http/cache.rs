//! HTTP cache headers

use data_encoding::HEXLOWER;
use sha2::{Digest, Sha256};

/// One year, for fingerprinted files
pub const STATIC_MAX_AGE: u32 = 31_536_000;

/// Strong ETag derived from the content
pub fn generate_etag(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    format!("\"{}\"", &HEXLOWER.encode(&digest)[..32])
}

/// Whether an `If-None-Match` header matches `etag`
///
/// Weak validators compare equal to their strong counterpart; `*` matches
/// anything.
pub fn etag_matches(if_none_match: Option<&str>, etag: &str) -> bool {
    let Some(header) = if_none_match else {
        return false;
    };
    let etag = etag.trim_start_matches("W/");
    header
        .split(',')
        .map(|candidate| candidate.trim())
        .any(|candidate| candidate == "*" || candidate.trim_start_matches("W/") == etag)
}

/// Build Cache-Control header for static files
pub fn cache_control_static(max_age: u32, immutable: bool) -> String {
    if immutable {
        format!("public, max-age={}, immutable", max_age)
    } else {
        format!("public, max-age={}", max_age)
    }
}

/// Build Cache-Control header for pages depending on the visitor
pub fn cache_control_private(max_age: u32) -> String {
    format!("private, max-age={}", max_age)
}

pub fn cache_control_no_cache() -> String {
    "no-cache, no-store, must-revalidate".to_string()
}
