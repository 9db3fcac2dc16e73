//! Deterministic request fingerprinting.

use std::sync::Arc;

use http::request::Parts;

/// A pluggable fingerprint function: `key_of(request) -> String`.
///
/// The default (see [`default_cache_key`]) hashes only the request URI.
/// Implementations may extend this — for example, to fold in `Vary`-selected
/// request headers, which this crate does not interpret on its own — by
/// supplying a custom [`CacheKey`] via
/// [`crate::CacheMiddlewareOptions::cache_key`]. Extending the default this
/// way is a documented escape hatch, not something this crate does itself.
pub type CacheKey = Arc<dyn Fn(&Parts) -> String + Send + Sync>;

/// The default cache key: a lowercase hex BLAKE3 digest of the full request
/// URI. Pure and total — every syntactically valid request produces a
/// fingerprint, and two requests with the same URI always produce the same
/// one.
#[must_use]
pub fn default_cache_key(parts: &Parts) -> String {
    hex::encode(blake3::hash(parts.uri.to_string().as_bytes()).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Request};

    fn parts_for(uri: &str) -> Parts {
        Request::builder().method(Method::GET).uri(uri).body(()).unwrap().into_parts().0
    }

    #[test]
    fn same_uri_yields_same_key() {
        let a = default_cache_key(&parts_for("https://api.example/x"));
        let b = default_cache_key(&parts_for("https://api.example/x"));
        assert_eq!(a, b);
    }

    #[test]
    fn different_uri_yields_different_key() {
        let a = default_cache_key(&parts_for("https://api.example/x"));
        let b = default_cache_key(&parts_for("https://api.example/y"));
        assert_ne!(a, b);
    }

    #[test]
    fn key_is_lowercase_hex() {
        let k = default_cache_key(&parts_for("https://api.example/x"));
        assert!(k.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
