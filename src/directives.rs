//! Parsing of `Cache-Control` directives into a small, fixed structure,
//! parsed once up front rather than probed ad hoc at decision time. Shared
//! between the request side and the response side.

use http::HeaderMap;

fn raw_directives(headers: &HeaderMap) -> Vec<(String, Option<String>)> {
    let mut out = Vec::new();
    for value in headers.get_all(http::header::CACHE_CONTROL) {
        let Ok(s) = value.to_str() else { continue };
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let mut kv = part.splitn(2, '=');
            let k = kv.next().unwrap_or_default().trim();
            if k.is_empty() {
                continue;
            }
            let v = kv
                .next()
                .map(|v| v.trim().trim_matches('"').to_string());
            out.push((k.to_ascii_lowercase(), v));
        }
    }
    out
}

fn parse_seconds(v: &Option<String>) -> Option<u64> {
    let raw = v.as_deref()?;
    match raw.parse() {
        Ok(seconds) => Some(seconds),
        Err(_) => {
            log::trace!("ignoring malformed cache-control integer argument: {raw:?}");
            None
        }
    }
}

/// Request-side `Cache-Control` directives this middleware understands.
/// Unknown or unparseable directives are silently ignored rather than
/// treated as errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestDirectives {
    /// `only-if-cached` is present.
    pub only_if_cached: bool,
    /// `max-stale` is present (with or without an argument).
    pub accept_stale: bool,
    /// The integer argument of `max-stale`, if one was given.
    pub max_stale_seconds: Option<u64>,
    /// The integer argument of `min-fresh`, if present.
    pub min_fresh_seconds: Option<u64>,
    /// `no-cache` is present (forces validation, never a fresh hit).
    pub no_cache: bool,
    /// `no-store` is present.
    pub no_store: bool,
}

impl RequestDirectives {
    /// Parses the `Cache-Control` header(s) of a request. Always succeeds;
    /// a request with no `Cache-Control` header yields the all-`false`/`None`
    /// default.
    #[must_use]
    pub fn parse(headers: &HeaderMap) -> Self {
        let mut directives = RequestDirectives::default();
        for (name, value) in raw_directives(headers) {
            match name.as_str() {
                "only-if-cached" => directives.only_if_cached = true,
                "no-cache" => directives.no_cache = true,
                "no-store" => directives.no_store = true,
                "max-stale" => {
                    directives.accept_stale = true;
                    directives.max_stale_seconds = parse_seconds(&value);
                }
                "min-fresh" => {
                    directives.min_fresh_seconds = parse_seconds(&value)
                }
                _ => {}
            }
        }
        directives
    }
}

/// Response-side `Cache-Control` directives this middleware understands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseDirectives {
    /// The integer argument of `max-age`, if present.
    pub max_age_seconds: Option<u64>,
    /// `no-cache` is present (entry may be stored but must always revalidate).
    pub no_cache: bool,
    /// `no-store` is present (entry must never be persisted).
    pub no_store: bool,
    /// `private` is present.
    pub private: bool,
    /// `must-revalidate` or `proxy-revalidate` is present.
    pub must_revalidate: bool,
    /// The integer argument of `stale-while-revalidate`, if present.
    pub stale_while_revalidate_seconds: Option<u64>,
    /// The integer argument of `stale-if-error`, if present.
    pub stale_if_error_seconds: Option<u64>,
}

impl ResponseDirectives {
    /// Parses the `Cache-Control` header(s) of a response.
    #[must_use]
    pub fn parse(headers: &HeaderMap) -> Self {
        let mut directives = ResponseDirectives::default();
        for (name, value) in raw_directives(headers) {
            match name.as_str() {
                "no-cache" => directives.no_cache = true,
                "no-store" => directives.no_store = true,
                "private" => directives.private = true,
                "must-revalidate" | "proxy-revalidate" => {
                    directives.must_revalidate = true
                }
                "max-age" => {
                    directives.max_age_seconds = parse_seconds(&value)
                }
                "stale-while-revalidate" => {
                    directives.stale_while_revalidate_seconds =
                        parse_seconds(&value)
                }
                "stale-if-error" => {
                    directives.stale_if_error_seconds = parse_seconds(&value)
                }
                _ => {}
            }
        }
        directives
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(http::header::CACHE_CONTROL, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn parses_request_directives() {
        let d = RequestDirectives::parse(&headers_with(
            "max-stale=30, min-fresh=10, only-if-cached",
        ));
        assert!(d.accept_stale);
        assert_eq!(d.max_stale_seconds, Some(30));
        assert_eq!(d.min_fresh_seconds, Some(10));
        assert!(d.only_if_cached);
        assert!(!d.no_cache);
    }

    #[test]
    fn max_stale_without_argument_is_unbounded() {
        let d = RequestDirectives::parse(&headers_with("max-stale"));
        assert!(d.accept_stale);
        assert_eq!(d.max_stale_seconds, None);
    }

    #[test]
    fn missing_cache_control_yields_defaults() {
        let d = RequestDirectives::parse(&HeaderMap::new());
        assert_eq!(d, RequestDirectives::default());
    }

    #[test]
    fn parses_response_directives() {
        let d = ResponseDirectives::parse(&headers_with(
            "max-age=60, stale-while-revalidate=30, stale-if-error=3600, must-revalidate",
        ));
        assert_eq!(d.max_age_seconds, Some(60));
        assert_eq!(d.stale_while_revalidate_seconds, Some(30));
        assert_eq!(d.stale_if_error_seconds, Some(3600));
        assert!(d.must_revalidate);
    }

    #[test]
    fn unknown_directives_are_ignored_not_fatal() {
        let d = ResponseDirectives::parse(&headers_with(
            "max-age=60, some-made-up-directive=weird\"quote",
        ));
        assert_eq!(d.max_age_seconds, Some(60));
    }

    #[test]
    fn malformed_max_age_is_ignored() {
        let d = ResponseDirectives::parse(&headers_with("max-age=notanumber"));
        assert_eq!(d.max_age_seconds, None);
    }
}
