//! Stored response wrapper plus freshness metadata derived from origin
//! headers.

use std::time::{Duration, SystemTime};

use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::directives::ResponseDirectives;
use crate::response::{CachedResponse, Response, SerializableHeaders};

fn http_date(value: Option<&str>) -> Option<SystemTime> {
    httpdate::parse_http_date(value?).ok()
}

/// `freshness_lifetime`: `max-age` if present, else `Expires − Date`,
/// else `0`. `max_ttl`, if set, caps the result.
fn freshness_lifetime_seconds(
    headers: &SerializableHeaders,
    directives: &ResponseDirectives,
    max_ttl: Option<Duration>,
) -> u64 {
    let seconds = directives.max_age_seconds.unwrap_or_else(|| {
        let expires = http_date(headers.get("expires"));
        let date = http_date(headers.get("date"));
        match (expires, date) {
            (Some(expires), Some(date)) => {
                expires.duration_since(date).map(|d| d.as_secs()).unwrap_or(0)
            }
            _ => 0,
        }
    });
    match max_ttl {
        Some(cap) => seconds.min(cap.as_secs()),
        None => seconds,
    }
}

/// A stored `(response, metadata)` pair keyed by request fingerprint.
/// Mutated only via [`CacheEntry::revalidated`], which refreshes timestamps
/// and merges new headers into `original_response` while preserving the
/// stored body, after a successful 304 revalidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The response as received from origin: status, headers, body bytes.
    pub original_response: CachedResponse,
    /// When the request that produced this entry (or its last successful
    /// revalidation) was sent.
    pub request_time: SystemTime,
    /// When the response (or 304) was received. Invariant (a): `response_time
    /// >= request_time`.
    pub response_time: SystemTime,
    /// Seconds of freshness from `max-age`/`Expires − Date`, possibly capped.
    pub freshness_lifetime: u64,
    /// `stale-while-revalidate` window, seconds, if the origin sent one.
    pub stale_while_revalidate_seconds: Option<u64>,
    /// `stale-if-error` window, seconds, if the origin sent one.
    pub stale_if_error_seconds: Option<u64>,
    /// `must-revalidate` or `proxy-revalidate` was present on the origin
    /// response.
    pub must_revalidate: bool,
    /// `no-cache` was present on the origin response (storable, but must
    /// always be revalidated before serving fresh).
    pub no_cache: bool,
}

impl CacheEntry {
    /// Builds a new entry from a freshly-received origin response.
    /// `max_ttl` is the optional configured freshness cap.
    #[must_use]
    pub fn new(
        request_time: SystemTime,
        response_time: SystemTime,
        response: CachedResponse,
        max_ttl: Option<Duration>,
    ) -> Self {
        let directives = ResponseDirectives::parse(&response.headers.to_header_map());
        let freshness_lifetime =
            freshness_lifetime_seconds(&response.headers, &directives, max_ttl);
        CacheEntry {
            original_response: response,
            request_time,
            response_time,
            freshness_lifetime,
            stale_while_revalidate_seconds: directives
                .stale_while_revalidate_seconds,
            stale_if_error_seconds: directives.stale_if_error_seconds,
            must_revalidate: directives.must_revalidate,
            no_cache: directives.no_cache,
        }
    }

    /// `age(now) = max(0, now − response_time) + max(0, response_time −
    /// request_time)`, an approximation of RFC 7234's corrected age.
    #[must_use]
    pub fn age(&self, now: SystemTime) -> u64 {
        let resident = now
            .duration_since(self.response_time)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let transit = self
            .response_time
            .duration_since(self.request_time)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        resident + transit
    }

    /// `stale_age(now) = age(now) − freshness_lifetime` (negative when
    /// fresh).
    #[must_use]
    pub fn stale_age(&self, now: SystemTime) -> i64 {
        self.age(now) as i64 - self.freshness_lifetime as i64
    }

    /// `is_fresh(now) ⇔ freshness_lifetime > age(now)`.
    #[must_use]
    pub fn is_fresh(&self, now: SystemTime) -> bool {
        self.freshness_lifetime > self.age(now)
    }

    /// The entry's `ETag`, if the origin sent one.
    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.original_response.headers.get("etag")
    }

    /// The entry's `Last-Modified`, if the origin sent one.
    #[must_use]
    pub fn last_modified(&self) -> Option<&str> {
        self.original_response.headers.get("last-modified")
    }

    /// `has_validators ⇔ ETag ∨ Last-Modified present`.
    #[must_use]
    pub fn has_validators(&self) -> bool {
        self.etag().is_some() || self.last_modified().is_some()
    }

    /// `stale_while_revalidate(now) ⇔ stale_age(now) ≤
    /// stale_while_revalidate_seconds`.
    #[must_use]
    pub fn stale_while_revalidate(&self, now: SystemTime) -> bool {
        match self.stale_while_revalidate_seconds {
            Some(window) => self.stale_age(now) <= window as i64,
            None => false,
        }
    }

    /// `serve_stale_if_error(now) ⇔ stale_if_error_seconds is set ∧
    /// stale_age(now) ≤ stale_if_error_seconds`.
    #[must_use]
    pub fn serve_stale_if_error(&self, now: SystemTime) -> bool {
        match self.stale_if_error_seconds {
            Some(window) => self.stale_age(now) <= window as i64,
            None => false,
        }
    }

    /// A response whose body stream position is reset to offset zero.
    #[must_use]
    pub fn response(&self) -> Response {
        self.original_response.to_response()
    }

    /// Produces the updated entry after a successful 304 revalidation:
    /// timestamps are refreshed, and headers present in `new_headers`
    /// overwrite the stored ones while the stored body is preserved
    /// untouched. `debug_header`, if given, is
    /// never copied over (it is response-local annotation, not stored
    /// origin state).
    #[must_use]
    pub fn revalidated(
        mut self,
        request_time: SystemTime,
        response_time: SystemTime,
        new_headers: &HeaderMap,
        max_ttl: Option<Duration>,
        debug_header: Option<&http::HeaderName>,
    ) -> Self {
        for (name, value) in new_headers {
            if let Some(debug_header) = debug_header {
                if name == debug_header {
                    continue;
                }
            }
            if let Ok(value) = value.to_str() {
                self.original_response.headers.set(name.as_str(), value);
            }
        }
        let directives =
            ResponseDirectives::parse(&self.original_response.headers.to_header_map());
        self.request_time = request_time;
        self.response_time = response_time;
        self.freshness_lifetime = freshness_lifetime_seconds(
            &self.original_response.headers,
            &directives,
            max_ttl,
        );
        self.stale_while_revalidate_seconds =
            directives.stale_while_revalidate_seconds;
        self.stale_if_error_seconds = directives.stale_if_error_seconds;
        self.must_revalidate = directives.must_revalidate;
        self.no_cache = directives.no_cache;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::SerializableHeaders;
    use http::StatusCode;
    use std::time::Duration;

    fn entry_with_max_age(age_secs: u64, response_age_ago: Duration) -> CacheEntry {
        let now = SystemTime::now();
        let response_time = now - response_age_ago;
        let mut headers = SerializableHeaders::default();
        headers.set("cache-control", &format!("max-age={age_secs}"));
        CacheEntry::new(
            response_time,
            response_time,
            CachedResponse {
                status: StatusCode::OK,
                headers,
                body: bytes::Bytes::from_static(b"hi"),
            },
            None,
        )
    }

    #[test]
    fn fresh_within_max_age() {
        let entry = entry_with_max_age(60, Duration::from_secs(10));
        assert!(entry.is_fresh(SystemTime::now()));
        assert!(entry.stale_age(SystemTime::now()) < 0);
    }

    #[test]
    fn stale_past_max_age() {
        let entry = entry_with_max_age(60, Duration::from_secs(120));
        assert!(!entry.is_fresh(SystemTime::now()));
        assert!(entry.stale_age(SystemTime::now()) >= 59);
    }

    #[test]
    fn freshness_monotonicity() {
        let entry = entry_with_max_age(60, Duration::from_secs(10));
        let earlier = entry.response_time;
        let later = earlier + Duration::from_secs(5);
        if entry.is_fresh(later) {
            assert!(entry.is_fresh(earlier));
        }
    }

    #[test]
    fn max_ttl_caps_freshness_lifetime() {
        let now = SystemTime::now();
        let mut headers = SerializableHeaders::default();
        headers.set("cache-control", "max-age=31536000");
        let entry = CacheEntry::new(
            now,
            now,
            CachedResponse {
                status: StatusCode::OK,
                headers,
                body: bytes::Bytes::new(),
            },
            Some(Duration::from_secs(300)),
        );
        assert_eq!(entry.freshness_lifetime, 300);
    }

    #[test]
    fn has_validators_checks_etag_and_last_modified() {
        let now = SystemTime::now();
        let mut headers = SerializableHeaders::default();
        headers.set("etag", "\"v1\"");
        let entry = CacheEntry::new(
            now,
            now,
            CachedResponse { status: StatusCode::OK, headers, body: bytes::Bytes::new() },
            None,
        );
        assert!(entry.has_validators());
    }

    #[test]
    fn revalidated_preserves_body_and_refreshes_timestamps() {
        let now = SystemTime::now();
        let mut headers = SerializableHeaders::default();
        headers.set("cache-control", "max-age=60");
        headers.set("etag", "\"v1\"");
        let entry = CacheEntry::new(
            now - Duration::from_secs(120),
            now - Duration::from_secs(120),
            CachedResponse {
                status: StatusCode::OK,
                headers,
                body: bytes::Bytes::from_static(b"old"),
            },
            None,
        );
        let mut new_headers = HeaderMap::new();
        new_headers.insert("x-served-by", "cache2".parse().unwrap());
        let revalidated = entry.revalidated(now, now, &new_headers, None, None);
        assert_eq!(&revalidated.original_response.body[..], b"old");
        assert!(revalidated.is_fresh(now));
        assert_eq!(
            revalidated.original_response.headers.get("x-served-by"),
            Some("cache2")
        );
    }
}
