use miette::Diagnostic;
use thiserror::Error;

/// A `Result` typedef to use with the [`CacheError`] type
pub type Result<T> = std::result::Result<T, CacheError>;

/// A boxed, type-erased error. Used at the one seam where this crate must
/// carry a caller-supplied transport error it can't otherwise name.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A generic "error" for the cache middleware
#[derive(Error, Diagnostic, Debug)]
pub enum CacheError {
    /// The next handler failed to produce a response. Carries whatever
    /// error the transport returned; inspected by the fulfilment/rejection
    /// continuations to decide stale-on-error eligibility.
    #[error("next handler failed: {0}")]
    #[diagnostic(code(http_cache::transport))]
    Transport(#[source] BoxError),

    /// The middleware could not be constructed, e.g. a required option was
    /// missing. Fatal, and only ever returned from construction.
    #[error("cache middleware misconfigured: {0}")]
    #[diagnostic(code(http_cache::configuration))]
    Configuration(String),

    /// A general error used as a catch all for other errors via anyhow
    #[error(transparent)]
    #[diagnostic(code(http_cache::general))]
    General(#[from] anyhow::Error),
    /// Error from http
    #[error(transparent)]
    #[diagnostic(code(http_cache::http))]
    Http(#[from] http::Error),
    /// There was an error parsing the HTTP status code
    #[error(transparent)]
    #[diagnostic(code(http_cache::invalid_status_code))]
    InvalidStatusCode(#[from] http::status::InvalidStatusCode),
    /// There was an error converting the header to a string
    #[error(transparent)]
    #[diagnostic(code(http_cache::header_to_str))]
    HeaderToStr(#[from] http::header::ToStrError),
    /// There was an error parsing the HTTP method
    #[error(transparent)]
    #[diagnostic(code(http_cache::invalid_method))]
    InvalidMethod(#[from] http::method::InvalidMethod),
    /// There was an error parsing the URI
    #[error(transparent)]
    #[diagnostic(code(http_cache::invalid_uri))]
    InvalidUri(#[from] http::uri::InvalidUri),
    /// There was an error parsing an HTTP header value
    #[error(transparent)]
    #[diagnostic(code(http_cache::invalid_header_value))]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    /// There was an error parsing an HTTP header name
    #[error(transparent)]
    #[diagnostic(code(http_cache::invalid_header_name))]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
}

impl CacheError {
    /// Wraps an arbitrary transport error, the way a [`crate::NextHandler`]
    /// implementation reports a failed call.
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CacheError::Transport(Box::new(err))
    }
}
