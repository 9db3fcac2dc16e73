//! The response side of the request/response abstraction, including
//! rewindable-body handling: bodies must be materialized to a rewindable
//! buffer before caching.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use http_body_util::{combinators::BoxBody, BodyExt};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// A boxed, type-erased streaming body — whatever a [`crate::NextHandler`]
/// hands back that isn't already fully buffered.
pub type DynBody = BoxBody<Bytes, crate::error::BoxError>;

/// A response body that is either an already-rewindable in-memory buffer,
/// or a one-shot stream that must be materialized to bytes and reconstructed
/// as a seekable buffer before it can be cached.
pub enum ResponseBody {
    /// Fully buffered. Cheap to clone; reading it never consumes the
    /// original, so an entry can supply its body repeatedly.
    Bytes(Bytes),
    /// A single-read stream, e.g. passed straight through from an upstream
    /// transport. Must be materialized via [`ResponseBody::materialize`]
    /// before it can be stored.
    Stream(DynBody),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Bytes(b) => {
                f.debug_tuple("Bytes").field(&b.len()).finish()
            }
            ResponseBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl ResponseBody {
    /// True if this body can be read more than once without re-fetching it.
    #[must_use]
    pub fn is_seekable(&self) -> bool {
        matches!(self, ResponseBody::Bytes(_))
    }

    /// Collects a streaming body into memory. A cheap no-op for an
    /// already-buffered body.
    pub async fn materialize(self) -> Result<Bytes> {
        match self {
            ResponseBody::Bytes(b) => Ok(b),
            ResponseBody::Stream(body) => {
                let collected = body
                    .collect()
                    .await
                    .map_err(|e| CacheError::General(anyhow::anyhow!(e)))?;
                Ok(collected.to_bytes())
            }
        }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        ResponseBody::Bytes(bytes)
    }
}

/// A response flowing between the next handler, the middleware, and the
/// caller. Unlike [`CachedResponse`], its body may not yet be seekable.
#[derive(Debug)]
pub struct Response {
    /// The response status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The response body.
    pub body: ResponseBody,
}

impl Response {
    /// Builds a response with an in-memory body.
    #[must_use]
    pub fn buffered(
        status: StatusCode,
        headers: HeaderMap,
        body: impl Into<Bytes>,
    ) -> Self {
        Response { status, headers, body: ResponseBody::Bytes(body.into()) }
    }

    /// Materializes the body (if needed) and returns the fully-buffered
    /// form used for storage.
    pub async fn into_cached(self) -> Result<CachedResponse> {
        let body = self.body.materialize().await?;
        Ok(CachedResponse { status: self.status, headers: SerializableHeaders::from(&self.headers), body })
    }

    /// Sets a single-valued header, replacing any existing value.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }
}

/// Multi-valued headers in a form that can be serialized by a storage
/// backend (`http::HeaderMap` itself has no `serde` impl).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SerializableHeaders(pub Vec<(String, String)>);

impl From<&HeaderMap> for SerializableHeaders {
    fn from(headers: &HeaderMap) -> Self {
        SerializableHeaders(
            headers
                .iter()
                .map(|(k, v)| {
                    (k.as_str().to_string(), v.to_str().unwrap_or("").to_string())
                })
                .collect(),
        )
    }
}

impl SerializableHeaders {
    /// Reconstructs an `http::HeaderMap`, skipping any pair that no longer
    /// forms a valid header (should not happen for headers that originated
    /// from a real `HeaderMap`).
    #[must_use]
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in &self.0 {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::from_str(value),
            ) {
                map.append(name, value);
            }
        }
        map
    }

    /// The first value for a header, if present (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes every value for a header.
    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Inserts a header, replacing any existing values for that name.
    pub fn set(&mut self, name: &str, value: &str) {
        self.remove(name);
        self.0.push((name.to_string(), value.to_string()));
    }
}

/// A response as stored in a [`crate::CacheStore`] entry: always fully
/// buffered and seekable/rewindable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedResponse {
    /// The response status code, stored as `u16` for serializability.
    #[serde(with = "status_code_as_u16")]
    pub status: StatusCode,
    /// The response headers.
    pub headers: SerializableHeaders,
    /// The full response body.
    pub body: Bytes,
}

impl CachedResponse {
    /// Returns a live [`Response`] over this entry's data. Every call
    /// returns an independent, freshly-rewound body (invariant (b)):
    /// cloning a `Bytes` is O(1) and shares the underlying allocation, but
    /// each returned `Response` reads from offset zero.
    #[must_use]
    pub fn to_response(&self) -> Response {
        Response {
            status: self.status,
            headers: self.headers.to_header_map(),
            body: ResponseBody::Bytes(self.body.clone()),
        }
    }
}

mod status_code_as_u16 {
    use http::StatusCode;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        status: &StatusCode,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u16(status.as_u16())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<StatusCode, D::Error> {
        let code = u16::deserialize(deserializer)?;
        StatusCode::from_u16(code).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializable_headers_round_trip() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::ETAG, HeaderValue::from_static("\"v1\""));
        let s = SerializableHeaders::from(&headers);
        let back = s.to_header_map();
        assert_eq!(back.get(http::header::ETAG).unwrap(), "\"v1\"");
    }

    #[tokio::test]
    async fn bytes_body_materializes_without_consuming_intent() {
        let body = ResponseBody::Bytes(Bytes::from_static(b"hello"));
        assert!(body.is_seekable());
        let bytes = body.materialize().await.unwrap();
        assert_eq!(&bytes[..], b"hello");
    }

    #[test]
    fn cached_response_to_response_is_independently_rewound() {
        let cached = CachedResponse {
            status: StatusCode::OK,
            headers: SerializableHeaders::default(),
            body: Bytes::from_static(b"old"),
        };
        let first = cached.to_response();
        let second = cached.to_response();
        match (first.body, second.body) {
            (ResponseBody::Bytes(a), ResponseBody::Bytes(b)) => {
                assert_eq!(a, b);
                assert_eq!(&a[..], b"old");
            }
            _ => panic!("expected buffered bodies"),
        }
    }
}
