#![forbid(unsafe_code, future_incompatible)]
#![deny(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    nonstandard_style,
    unused_qualifications,
    unused_import_braces,
    unused_extern_crates,
    trivial_casts,
    trivial_numeric_casts
)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! A pragmatic subset of RFC 7234 HTTP caching semantics for client-side API
//! acceleration.
//!
//! This crate is the decision engine and storage contract for a cache that
//! interposes itself between a caller and an upstream HTTP server: it decides
//! whether a previously stored response may be served directly, served stale
//! while a revalidation runs in the background, validated conditionally
//! against the origin, or must be fetched fresh, and it updates the store
//! based on the outcome.
//!
//! The transport itself (actually executing a request against a server),
//! any storage backend beyond the bundled in-memory one, and wiring into a
//! specific HTTP client are left to integrators — this crate defines the
//! [`NextHandler`] and [`CacheStore`] contracts they implement.
//!
//! ## Basic usage
//!
//! ```rust
//! use http_cache_core::{
//!     CacheMiddleware, CacheMiddlewareOptions, InMemoryCacheStore,
//!     NextHandler, Request, Response, Result,
//! };
//! use async_trait::async_trait;
//! use http::StatusCode;
//!
//! struct Origin;
//!
//! #[async_trait]
//! impl NextHandler for Origin {
//!     async fn call(&self, _request: Request) -> Result<Response> {
//!         Ok(Response::buffered(StatusCode::OK, Default::default(), "hello"))
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let middleware = CacheMiddleware::new(
//!     InMemoryCacheStore::new(),
//!     Origin,
//!     CacheMiddlewareOptions::default(),
//! )?;
//!
//! let request = Request::new(http::Method::GET, "https://api.example/x".parse()?);
//! let _response = middleware.handle(request).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Cache modes via options
//!
//! [`CacheMiddlewareOptions`] recognizes `cache_enabled`, `cache_http_methods`,
//! `cache_debug`/`cache_debug_header`, `cache_key`, and `max_ttl`. Setting
//! `cache_enabled` to `false` makes the middleware a pure pass-through; the
//! other options are documented on [`CacheMiddlewareOptions`] itself.
//!
//! ## Debug header
//!
//! When `cache_debug` is enabled, every response carries exactly one header
//! (named by `cache_debug_header`) with value `HIT`, `MISS`, or `STALE`
//! recording the decision that produced it. See [`CacheStatus`].
//!
//! ## Shutdown
//!
//! Background revalidations spawned during stale-while-revalidate hits
//! outlive the foreground call that triggered them. Call
//! [`CacheMiddleware::shutdown`] before dropping the middleware to await (or
//! let run to completion) any still-pending revalidations, so their store
//! writes complete deterministically rather than being abandoned mid-flight.

mod directives;
mod entry;
mod error;
mod key;
mod middleware;
mod request;
mod response;
mod store;

pub use directives::{RequestDirectives, ResponseDirectives};
pub use entry::CacheEntry;
pub use error::{BoxError, CacheError, Result};
pub use key::{default_cache_key, CacheKey};
pub use middleware::{
    CacheMiddleware, CacheMiddlewareOptions, CacheStatus, NextHandler,
};
pub use request::{Request, REVALIDATION_MARKER};
pub use response::{
    CachedResponse, DynBody, Response, ResponseBody, SerializableHeaders,
};
pub use store::{CacheStore, InMemoryCacheStore};
