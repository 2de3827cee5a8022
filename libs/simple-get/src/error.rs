use std::time::Duration;
use thiserror::Error;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
///
/// # Example
///
/// ```ignore
/// match &err {
///     HttpError::InvalidUri { kind, .. } => match kind {
///         InvalidUriKind::Missing => println!("No URL given"),
///         InvalidUriKind::ParseError => println!("Malformed URL syntax"),
///         InvalidUriKind::MissingAuthority => println!("URL needs a host"),
///         InvalidUriKind::MissingScheme => println!("URL needs http:// or https://"),
///         _ => println!("Other URI error"),
///     },
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// No URL was supplied
    Missing,
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (relative URL without a base)
    MissingScheme,
}

/// Coarse error classes a caller can branch on.
///
/// Every [`HttpError`] maps to exactly one kind via [`HttpError::kind`].
/// Errors of kind [`ErrorKind::Decode`] and [`ErrorKind::BodyTooLarge`] are
/// only produced while the response body is consumed; all other kinds are
/// reported before a response is handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Request input could not be turned into a request
    InvalidInput,
    /// URL scheme is neither `http` nor `https`
    UnsupportedScheme,
    /// Connection, DNS, TLS or timeout failure during dispatch
    Transport,
    /// Redirect chain exceeded the configured hop limit
    TooManyRedirects,
    /// Response body could not be decoded
    Decode,
    /// Buffered response body exceeded the configured size limit
    BodyTooLarge,
}

/// HTTP client error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Invalid URL (missing or failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only; do not match on its contents
    /// as the format is unstable and may change between releases.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// URL scheme has no transport
    #[error("URL scheme '{scheme}' not supported: only http and https are")]
    UnsupportedScheme {
        /// The URL scheme that was rejected
        scheme: String,
    },

    /// Single request attempt timed out before response headers arrived
    #[error("Request attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// TLS setup error
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Redirect chain longer than the configured limit
    #[error("Too many redirects: limit of {max_redirects} reached at {url}")]
    TooManyRedirects {
        /// The configured hop limit
        max_redirects: usize,
        /// URL of the response whose redirect was refused
        url: String,
    },

    /// `Location` header could not be turned into a URL
    #[error("Invalid redirect location '{location}': {reason}")]
    InvalidRedirect {
        /// Raw `Location` value (lossy if not UTF-8)
        location: String,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Compressed response body is malformed
    #[error("Failed to decode response body: {0}")]
    Decode(#[source] std::io::Error),

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// JSON serialization or parsing error
    #[error("JSON processing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Form URL encoding error
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),
}

impl HttpError {
    /// Error class of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            HttpError::RequestBuild(_)
            | HttpError::InvalidHeaderName(_)
            | HttpError::InvalidHeaderValue(_)
            | HttpError::InvalidUri { .. }
            | HttpError::InvalidRedirect { .. }
            | HttpError::FormEncode(_) => ErrorKind::InvalidInput,
            HttpError::UnsupportedScheme { .. } => ErrorKind::UnsupportedScheme,
            HttpError::Timeout(_) | HttpError::Transport(_) | HttpError::Tls(_) => {
                ErrorKind::Transport
            }
            HttpError::TooManyRedirects { .. } => ErrorKind::TooManyRedirects,
            HttpError::Decode(_) | HttpError::Json(_) => ErrorKind::Decode,
            HttpError::BodyTooLarge { .. } => ErrorKind::BodyTooLarge,
        }
    }

    /// Returns true if the attempt timed out
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, HttpError::Timeout(_))
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;
    use std::fmt;

    #[derive(Debug)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl Error for TestError {}

    #[test]
    fn test_transport_error_preserves_source() {
        let err = HttpError::Transport(Box::new(TestError("connection refused")));

        let source = err.source().expect("Transport error should have a source");
        let downcast = source
            .downcast_ref::<TestError>()
            .expect("Should be able to downcast to TestError");
        assert_eq!(downcast.0, "connection refused");
    }

    #[test]
    fn test_decode_error_preserves_source() {
        let inner = std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid gzip header");
        let err = HttpError::Decode(inner);

        let source = err.source().expect("Decode error should have a source");
        assert_eq!(source.to_string(), "invalid gzip header");
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_kind_mapping() {
        let invalid = HttpError::InvalidUri {
            url: String::new(),
            kind: InvalidUriKind::Missing,
            reason: "no URL given".to_owned(),
        };
        assert_eq!(invalid.kind(), ErrorKind::InvalidInput);

        let scheme = HttpError::UnsupportedScheme {
            scheme: "ftp".to_owned(),
        };
        assert_eq!(scheme.kind(), ErrorKind::UnsupportedScheme);

        let timeout = HttpError::Timeout(Duration::from_secs(1));
        assert_eq!(timeout.kind(), ErrorKind::Transport);
        assert!(timeout.is_timeout());

        let redirects = HttpError::TooManyRedirects {
            max_redirects: 10,
            url: "http://localhost/11".to_owned(),
        };
        assert_eq!(redirects.kind(), ErrorKind::TooManyRedirects);
        assert!(!redirects.is_timeout());

        let too_large = HttpError::BodyTooLarge {
            limit: 1,
            actual: 2,
        };
        assert_eq!(too_large.kind(), ErrorKind::BodyTooLarge);
    }

    #[test]
    fn test_error_chain_traversal() {
        let err = HttpError::Transport(Box::new(TestError("root cause")));

        let mut count = 0;
        let mut current: Option<&(dyn Error + 'static)> = Some(&err);
        while let Some(e) = current {
            count += 1;
            current = e.source();
        }

        assert_eq!(
            count, 2,
            "Should have 2 errors in chain: HttpError and TestError"
        );
    }
}
