//! The request side of the request/response abstraction.

use bytes::Bytes;
use http::{request::Parts, HeaderMap, HeaderValue, Method, Uri};

use crate::error::Result;

/// The reserved internal header used to tag requests generated by
/// background revalidation, so they are not themselves cached-through on
/// re-entry. Stripped from every request before it reaches the next
/// handler.
pub const REVALIDATION_MARKER: &str = "x-cache-revalidation";

/// A request passed through the middleware: method, URI, and multi-valued
/// headers, plus a body for methods that carry one.
#[derive(Debug, Clone)]
pub struct Request {
    /// The request method.
    pub method: Method,
    /// The request URI.
    pub uri: Uri,
    /// The request headers.
    pub headers: HeaderMap,
    /// The request body, if any. Always already in memory — unlike
    /// responses, request bodies here are never required to stream.
    pub body: Bytes,
}

impl Request {
    /// Builds a request with an empty body.
    #[must_use]
    pub fn new(method: Method, uri: Uri) -> Self {
        Request { method, uri, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// Returns `http::request::Parts` for this request, the representation
    /// [`crate::CacheKey`] and the directive parsers operate on.
    pub fn parts(&self) -> Result<Parts> {
        let mut builder = http::Request::builder()
            .method(self.method.clone())
            .uri(self.uri.clone());
        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers.clone();
        }
        Ok(builder.body(())?.into_parts().0)
    }

    /// True if this request carries the reserved revalidation marker.
    #[must_use]
    pub fn is_revalidation(&self) -> bool {
        self.headers.contains_key(REVALIDATION_MARKER)
    }

    /// Strips the reserved revalidation marker, as required before the
    /// request reaches the next handler.
    pub fn strip_revalidation_marker(&mut self) {
        self.headers.remove(REVALIDATION_MARKER);
    }

    /// Tags this request with the reserved revalidation marker.
    pub fn mark_as_revalidation(&mut self) {
        self.headers
            .insert(REVALIDATION_MARKER, HeaderValue::from_static("1"));
    }

    /// Adds or replaces a header.
    pub fn set_header(&mut self, name: http::HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }
}
