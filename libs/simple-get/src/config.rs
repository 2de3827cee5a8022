use std::time::Duration;

/// Default User-Agent string for HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!("simple-get/", env!("CARGO_PKG_VERSION"));

/// Default hop limit for redirect chains
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// `Accept-Encoding` value advertised when decompression is enabled
pub const ACCEPT_ENCODING_VALUE: &str = "gzip, deflate";

/// Redirect handling configuration
///
/// The defaults follow every server-issued redirect, across schemes, up to
/// [`DEFAULT_MAX_REDIRECTS`] hops, preserving method, headers and body.
///
/// # Example
///
/// ```rust,ignore
/// use simple_get::RedirectConfig;
///
/// // Do not forward credentials to a different origin
/// let config = RedirectConfig::hardened();
///
/// // Hand 3xx responses back to the caller
/// let config = RedirectConfig::disabled();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectConfig {
    /// Maximum number of redirects to follow (default: 10)
    ///
    /// A redirect arriving after this many hops fails the request with
    /// `HttpError::TooManyRedirects`. With `0` the first redirect fails.
    pub max_redirects: usize,

    /// Follow redirects at all (default: true)
    ///
    /// When `false`, 3xx responses are returned to the caller as-is.
    pub follow: bool,

    /// Strip sensitive headers on cross-origin redirects (default: false)
    ///
    /// When enabled, a hop to a different origin removes:
    /// - `Authorization` header
    /// - `Cookie` header
    /// - `Proxy-Authorization` header
    pub strip_sensitive_headers: bool,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
            follow: true,
            strip_sensitive_headers: false,
        }
    }
}

impl RedirectConfig {
    /// Create a configuration that disables redirect following
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            follow: false,
            ..Default::default()
        }
    }

    /// Follow redirects but drop credentials when the origin changes
    #[must_use]
    pub fn hardened() -> Self {
        Self {
            strip_sensitive_headers: true,
            ..Default::default()
        }
    }
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Overall HTTP client configuration
///
/// Every field is a client-wide default; per-request values set on
/// [`RequestOptions`](crate::RequestOptions) take precedence.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-attempt timeout (default: 30 seconds)
    ///
    /// Bounds the wait for response headers of each hop. `None` disables it.
    pub request_timeout: Option<Duration>,

    /// Maximum body size in bytes for buffered reads (default: 10 MB)
    ///
    /// Applies to `bytes()`, `text()`, `json()` and `concat`, measured on
    /// decoded bytes.
    pub max_body_size: usize,

    /// User-Agent header value (default: "simple-get/<version>")
    pub user_agent: String,

    /// Redirect policy configuration
    pub redirect: RedirectConfig,

    /// Decode gzip/deflate response bodies (default: true)
    ///
    /// When enabled, `Accept-Encoding: gzip, deflate` is sent unless the
    /// caller supplied an `Accept-Encoding` header.
    pub decompress: bool,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            max_body_size: 10 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            redirect: RedirectConfig::default(),
            decompress: true,
            tls_roots: TlsRootConfig::default(),
        }
    }
}

impl HttpClientConfig {
    /// Create a minimal configuration
    ///
    /// - 10 second timeout
    /// - 1 MB body limit
    /// - No redirect following
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(10)),
            max_body_size: 1024 * 1024,
            redirect: RedirectConfig::disabled(),
            ..Default::default()
        }
    }
}
