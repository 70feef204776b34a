//! Entity tags for buffered bodies.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

const ETAG_HASH_LEN: usize = 27;

/// Strong ETag: the first 27 base64 characters of the body's SHA-256, quoted.
pub fn generate_etag(body: &[u8]) -> String {
    let encoded = STANDARD.encode(Sha256::digest(body));
    format!("\"{}\"", &encoded[..ETAG_HASH_LEN])
}

/// Whether an `If-None-Match` value matches `etag`.
///
/// Handles `*`, comma-separated lists and weak validators.
pub fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    if_none_match.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etag_shape() {
        let etag = generate_etag(b"hello");
        assert_eq!(etag.len(), ETAG_HASH_LEN + 2);
        assert!(etag.starts_with('"') && etag.ends_with('"'));
        assert_eq!(etag, generate_etag(b"hello"));
        assert_ne!(etag, generate_etag(b"hello!"));
    }

    #[test]
    fn test_etag_matches() {
        let etag = generate_etag(b"x");
        assert!(etag_matches(&etag, &etag));
        assert!(etag_matches(&format!("\"a\", W/{}", etag), &etag));
        assert!(etag_matches("*", &etag));
        assert!(!etag_matches("\"other\"", &etag));
    }
}
