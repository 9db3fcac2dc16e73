//! `CacheMiddleware`, the decision engine: parses request-side cache
//! directives, queries the store, dispatches to the next handler or
//! synthesizes a response, merges 304s, schedules background revalidation,
//! and serves stale-on-error.

use std::{
    collections::HashSet,
    fmt,
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use http::{
    header::{IF_MODIFIED_SINCE, IF_NONE_MATCH},
    HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
};
use std::sync::Mutex;

use tokio::task::JoinHandle;

use crate::{
    directives::RequestDirectives,
    entry::CacheEntry,
    error::{CacheError, Result},
    key::{default_cache_key, CacheKey},
    request::Request,
    response::Response,
    store::CacheStore,
};

/// rfc7231 6.1, as implemented by
/// [`http-cache-semantics`](https://github.com/kornelski/rusty-http-cache-semantics):
/// status codes a response may be cached under without any explicit
/// freshness information.
const STATUS_CODE_CACHEABLE_BY_DEFAULT: &[u16] =
    &[200, 203, 204, 206, 300, 301, 308, 404, 405, 410, 414, 501];

fn is_cacheable_status(status: StatusCode) -> bool {
    STATUS_CODE_CACHEABLE_BY_DEFAULT.contains(&status.as_u16())
}

/// Observability tag recording the decision outcome: a fresh or
/// accept-stale hit, a miss, or a stale entry served in lieu of the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// A fresh or accept-stale entry was served directly, or a 304 merge
    /// produced a fresh response.
    Hit,
    /// No usable entry; the response came straight from the next handler.
    Miss,
    /// A stale entry was served (stale-while-revalidate or stale-on-error).
    Stale,
}

impl CacheStatus {
    fn header_value(self) -> HeaderValue {
        match self {
            CacheStatus::Hit => HeaderValue::from_static("HIT"),
            CacheStatus::Miss => HeaderValue::from_static("MISS"),
            CacheStatus::Stale => HeaderValue::from_static("STALE"),
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStatus::Hit => f.write_str("HIT"),
            CacheStatus::Miss => f.write_str("MISS"),
            CacheStatus::Stale => f.write_str("STALE"),
        }
    }
}

/// The next-handler contract: executes a request against the
/// transport/origin and returns its response, or fails with a transport
/// error. The transport itself, request/response construction, and any
/// connection management are external collaborators this crate does not
/// own.
#[async_trait]
pub trait NextHandler: Send + Sync {
    /// Executes `request` and returns the origin's response.
    async fn call(&self, request: Request) -> Result<Response>;
}

/// Configuration recognized by [`CacheMiddleware`].
#[derive(Clone)]
pub struct CacheMiddlewareOptions {
    /// When `false`, bypass: every request is delegated to the next handler
    /// unchanged and the store is never touched.
    pub cache_enabled: bool,
    /// A request is eligible iff its (upper-cased) method is in this set.
    /// Default `{GET}`.
    pub cache_http_methods: HashSet<Method>,
    /// When `true`, every outgoing response is annotated with
    /// [`CacheMiddlewareOptions::cache_debug_header`].
    pub cache_debug: bool,
    /// The header name used for debug annotation.
    pub cache_debug_header: HeaderName,
    /// The fingerprint function. Defaults to
    /// [`crate::key::default_cache_key`]; overriding it is the documented
    /// escape hatch for folding `Vary`-selected headers into the key.
    pub cache_key: CacheKey,
    /// An optional ceiling on `freshness_lifetime` applied when an entry is
    /// created or revalidated, so a misbehaving origin's `max-age` can't pin
    /// an entry in the store forever.
    pub max_ttl: Option<Duration>,
}

impl fmt::Debug for CacheMiddlewareOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheMiddlewareOptions")
            .field("cache_enabled", &self.cache_enabled)
            .field("cache_http_methods", &self.cache_http_methods)
            .field("cache_debug", &self.cache_debug)
            .field("cache_debug_header", &self.cache_debug_header)
            .field("cache_key", &"<fn>")
            .field("max_ttl", &self.max_ttl)
            .finish()
    }
}

impl Default for CacheMiddlewareOptions {
    fn default() -> Self {
        let mut cache_http_methods = HashSet::new();
        cache_http_methods.insert(Method::GET);
        CacheMiddlewareOptions {
            cache_enabled: true,
            cache_http_methods,
            cache_debug: false,
            cache_debug_header: HeaderName::from_static("x-cache-status"),
            cache_key: Arc::new(default_cache_key),
            max_ttl: None,
        }
    }
}

fn synthetic_gateway_timeout() -> Response {
    Response::buffered(StatusCode::GATEWAY_TIMEOUT, HeaderMap::new(), bytes::Bytes::new())
}

fn conditional_request(request: &Request, entry: &CacheEntry) -> Request {
    let mut conditional = request.clone();
    if let Some(etag) = entry.etag() {
        if let Ok(value) = HeaderValue::from_str(etag) {
            conditional.set_header(IF_NONE_MATCH, value);
        }
    }
    if let Some(last_modified) = entry.last_modified() {
        if let Ok(value) = HeaderValue::from_str(last_modified) {
            conditional.set_header(IF_MODIFIED_SINCE, value);
        }
    }
    conditional
}

/// The decision engine. Wraps a [`NextHandler`] and a [`CacheStore`];
/// `S` and `N` are generic rather than trait objects so a concrete
/// integration (reqwest, surf, tower, ...) pays no dynamic-dispatch cost
/// for its own transport and storage types.
pub struct CacheMiddleware<S, N> {
    store: Arc<S>,
    next: Arc<N>,
    options: CacheMiddlewareOptions,
    waiting: Mutex<Vec<JoinHandle<()>>>,
}

impl<S, N> fmt::Debug for CacheMiddleware<S, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheMiddleware").field("options", &self.options).finish_non_exhaustive()
    }
}

impl<S, N> CacheMiddleware<S, N>
where
    S: CacheStore + 'static,
    N: NextHandler + 'static,
{
    /// Builds a middleware around `store` and `next`. Fails at construction
    /// time if `options` is unusable — specifically, an empty
    /// `cache_http_methods` set would make every request permanently
    /// ineligible, which is never the caller's intent.
    pub fn new(
        store: S,
        next: N,
        options: CacheMiddlewareOptions,
    ) -> Result<Self> {
        if options.cache_http_methods.is_empty() {
            return Err(CacheError::Configuration(
                "cache_http_methods must not be empty".to_string(),
            ));
        }
        Ok(CacheMiddleware {
            store: Arc::new(store),
            next: Arc::new(next),
            options,
            waiting: Mutex::new(Vec::new()),
        })
    }

    fn tag(&self, response: &mut Response, status: CacheStatus) {
        if self.options.cache_debug {
            response
                .set_header(self.options.cache_debug_header.clone(), status.header_value());
        }
    }

    /// The decision algorithm: bypass, method eligibility, revalidation-marker
    /// stripping, directive parsing, store lookup, and dispatch to the next
    /// handler or a synthetic response.
    pub async fn handle(&self, mut request: Request) -> Result<Response> {
        if !self.options.cache_enabled {
            return self.next.call(request).await;
        }

        if !self.options.cache_http_methods.contains(&request.method) {
            let mut response = self.next.call(request).await?;
            self.tag(&mut response, CacheStatus::Miss);
            return Ok(response);
        }

        if request.is_revalidation() {
            request.strip_revalidation_marker();
            return self.next.call(request).await;
        }

        let directives = RequestDirectives::parse(&request.headers);
        let parts = request.parts()?;
        let key = (self.options.cache_key)(&parts);
        let now = SystemTime::now();
        let entry = self.store.fetch(&key).await;

        if let Some(entry) = &entry {
            let min_fresh_satisfied = directives
                .min_fresh_seconds
                .map(|min_fresh| entry.stale_age(now) + min_fresh as i64 <= 0)
                .unwrap_or(true);
            if entry.is_fresh(now) && min_fresh_satisfied {
                log::debug!("cache hit (fresh) for {key}");
                let mut response = entry.response();
                self.tag(&mut response, CacheStatus::Hit);
                return Ok(response);
            }

            let max_stale_satisfied = directives
                .max_stale_seconds
                .map(|max_stale| entry.stale_age(now) <= max_stale as i64)
                .unwrap_or(true);
            if directives.accept_stale && max_stale_satisfied {
                log::debug!("cache hit (accept-stale) for {key}");
                let mut response = entry.response();
                self.tag(&mut response, CacheStatus::Hit);
                return Ok(response);
            }

            if entry.has_validators()
                && !directives.only_if_cached
                && entry.stale_while_revalidate(now)
            {
                log::debug!("stale-while-revalidate for {key}");
                let conditional = conditional_request(&request, entry);
                self.spawn_revalidation(key.clone(), conditional, entry.clone());
                let mut response = entry.response();
                self.tag(&mut response, CacheStatus::Stale);
                return Ok(response);
            }

            if entry.has_validators() && !directives.only_if_cached {
                request = conditional_request(&request, entry);
            }
        }

        if entry.is_none() && directives.only_if_cached {
            log::debug!("only-if-cached miss for {key}");
            return Ok(synthetic_gateway_timeout());
        }

        match self.next.call(request).await {
            Ok(response) => self.on_fulfilled(key, entry, response, now).await,
            Err(err) => self.on_rejected(entry, err),
        }
    }

    async fn on_fulfilled(
        &self,
        key: String,
        entry: Option<CacheEntry>,
        mut response: Response,
        request_time: SystemTime,
    ) -> Result<Response> {
        let response_time = SystemTime::now();

        if response.status.as_u16() >= 500 {
            if let Some(entry) = &entry {
                if entry.serve_stale_if_error(response_time) {
                    log::debug!("stale-on-error ({}) for {key}", response.status);
                    let mut stale = entry.response();
                    self.tag(&mut stale, CacheStatus::Stale);
                    return Ok(stale);
                }
            }
            log::debug!("cache miss (upstream {}) for {key}", response.status);
            self.tag(&mut response, CacheStatus::Miss);
            return Ok(response);
        }

        if response.status == StatusCode::NOT_MODIFIED {
            if let Some(entry) = entry {
                log::debug!("304 merge for {key}");
                let debug_header = self.options.cache_debug.then_some(&self.options.cache_debug_header);
                let merged = entry.revalidated(
                    request_time,
                    response_time,
                    &response.headers,
                    self.options.max_ttl,
                    debug_header,
                );
                self.store.update(&key, merged.clone()).await;
                let mut merged_response = merged.response();
                self.tag(&mut merged_response, CacheStatus::Hit);
                return Ok(merged_response);
            }
            // A 304 with no stored entry has nothing to merge against;
            // pass it through untagged rather than invent a body.
            return Ok(response);
        }

        log::debug!("cache miss for {key}");
        self.tag(&mut response, CacheStatus::Miss);

        let no_store = crate::directives::ResponseDirectives::parse(&response.headers).no_store;
        let cacheable = !no_store && is_cacheable_status(response.status);
        if cacheable {
            let status = response.status;
            let debug_header_name = self.options.cache_debug_header.clone();
            let mut headers = response.headers.clone();
            let body = response.body.materialize().await?;
            if self.options.cache_debug {
                headers.remove(&debug_header_name);
            }
            let cached = crate::response::CachedResponse {
                status,
                headers: crate::response::SerializableHeaders::from(&headers),
                body: body.clone(),
            };
            let new_entry =
                CacheEntry::new(request_time, response_time, cached, self.options.max_ttl);
            self.store.cache(&key, new_entry).await;
            response.body = crate::response::ResponseBody::Bytes(body);
        } else {
            response.body = crate::response::ResponseBody::Bytes(response.body.materialize().await?);
        }

        Ok(response)
    }

    fn on_rejected(&self, entry: Option<CacheEntry>, err: CacheError) -> Result<Response> {
        let now = SystemTime::now();
        if let Some(entry) = entry {
            if entry.serve_stale_if_error(now) {
                log::debug!("stale-on-error (transport failure)");
                let mut response = entry.response();
                self.tag(&mut response, CacheStatus::Stale);
                return Ok(response);
            }
        }
        Err(err)
    }

    /// Schedules a background revalidation. The caller's response has
    /// already been returned by the time this runs; failures are swallowed
    /// from the caller's perspective but logged for operators.
    fn spawn_revalidation(&self, key: String, mut request: Request, entry: CacheEntry) {
        request.mark_as_revalidation();
        let store = Arc::clone(&self.store);
        let next = Arc::clone(&self.next);
        let max_ttl = self.options.max_ttl;
        let handle = tokio::spawn(async move {
            let request_time = SystemTime::now();
            // Background traffic still goes through the next handler
            // directly, never back through `handle`: the marker strip in
            // `handle` only guards against *foreground* re-entry into the
            // decision; here we already know this is revalidation traffic.
            let mut request = request;
            request.strip_revalidation_marker();
            match next.call(request).await {
                Ok(response) if response.status == StatusCode::NOT_MODIFIED => {
                    let response_time = SystemTime::now();
                    let merged = entry.revalidated(
                        request_time,
                        response_time,
                        &response.headers,
                        max_ttl,
                        None,
                    );
                    store.update(&key, merged).await;
                }
                Ok(response) => {
                    let response_time = SystemTime::now();
                    match response.body.materialize().await {
                        Ok(body) => {
                            let cached = crate::response::CachedResponse {
                                status: response.status,
                                headers: crate::response::SerializableHeaders::from(
                                    &response.headers,
                                ),
                                body,
                            };
                            let new_entry = CacheEntry::new(
                                request_time,
                                response_time,
                                cached,
                                max_ttl,
                            );
                            store.update(&key, new_entry).await;
                        }
                        Err(e) => {
                            log::warn!(
                                "background revalidation for {key} failed to materialize body: {e}"
                            );
                        }
                    }
                }
                Err(e) => {
                    log::warn!("background revalidation for {key} failed: {e}");
                }
            }
        });
        self.waiting
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(handle);
    }

    /// Drains all outstanding background revalidations, awaiting each to
    /// completion. An explicit method rather than a process-exit hook, so
    /// an integrator controls exactly when pending revalidations are
    /// flushed.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = self
            .waiting
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}
