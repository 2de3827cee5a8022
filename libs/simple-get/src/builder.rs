use crate::client::HttpClient;
use crate::config::{HttpClientConfig, RedirectConfig, TlsRootConfig};
use crate::error::HttpError;
use crate::transport::{TransportSelector, TransportService};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Builder for constructing an [`HttpClient`].
///
/// # Example
///
/// ```rust,ignore
/// use simple_get::HttpClient;
/// use std::time::Duration;
///
/// let client = HttpClient::builder()
///     .timeout(Duration::from_secs(5))
///     .max_redirects(3)
///     .user_agent("my-app/1.0")
///     .build()?;
/// ```
#[must_use]
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    http_transport: Option<TransportService>,
    https_transport: Option<TransportService>,
}

impl HttpClientBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a builder with a specific configuration
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self {
            config,
            http_transport: None,
            https_transport: None,
        }
    }

    /// Set the per-attempt timeout
    ///
    /// Each redirect hop gets its own timeout for receiving response headers.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Wait for response headers indefinitely
    pub fn no_timeout(mut self) -> Self {
        self.config.request_timeout = None;
        self
    }

    /// Set the user agent string
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the maximum response body size for buffered reads
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Set the maximum number of redirects to follow
    ///
    /// With `0` the first redirect fails with `HttpError::TooManyRedirects`;
    /// use [`no_redirects`](Self::no_redirects) to receive 3xx responses instead.
    /// Default: 10
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.redirect.max_redirects = max_redirects;
        self
    }

    /// Disable redirect following
    ///
    /// 3xx responses are returned to the caller without following `Location`.
    pub fn no_redirects(mut self) -> Self {
        self.config.redirect = RedirectConfig::disabled();
        self
    }

    /// Set the redirect policy configuration
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let client = HttpClient::builder()
    ///     .redirect(RedirectConfig::hardened()) // drop credentials on cross-origin hops
    ///     .build()?;
    /// ```
    pub fn redirect(mut self, config: RedirectConfig) -> Self {
        self.config.redirect = config;
        self
    }

    /// Enable or disable gzip/deflate response decoding
    pub fn decompress(mut self, enabled: bool) -> Self {
        self.config.decompress = enabled;
        self
    }

    /// Set the TLS root certificate strategy for the default `https` transport
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Replace the transport used for `http` URLs
    ///
    /// The default-headers layer (User-Agent) still wraps the service.
    pub fn http_transport(mut self, service: TransportService) -> Self {
        self.http_transport = Some(service);
        self
    }

    /// Replace the transport used for `https` URLs
    ///
    /// A custom transport is responsible for its own TLS.
    pub fn https_transport(mut self, service: TransportService) -> Self {
        self.https_transport = Some(service);
        self
    }

    /// Build the HTTP client
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails or the user agent is not
    /// a valid header value
    pub fn build(self) -> Result<HttpClient, HttpError> {
        let selector = TransportSelector::from_config(
            &self.config,
            self.http_transport,
            self.https_transport,
        )?;

        tracing::debug!(
            timeout = ?self.config.request_timeout,
            max_redirects = self.config.redirect.max_redirects,
            follow_redirects = self.config.redirect.follow,
            decompress = self.config.decompress,
            "http client built"
        );

        Ok(HttpClient {
            selector,
            config: Arc::new(self.config),
        })
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HttpClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClientBuilder")
            .field("config", &self.config)
            .field("custom_http_transport", &self.http_transport.is_some())
            .field("custom_https_transport", &self.https_transport.is_some())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::DEFAULT_USER_AGENT;

    #[test]
    fn test_builder_defaults() {
        let builder = HttpClientBuilder::new();
        assert_eq!(builder.config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(builder.config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(builder.config.redirect, RedirectConfig::default());
        assert!(builder.config.decompress);
        assert!(builder.http_transport.is_none());
        assert!(builder.https_transport.is_none());
    }

    #[test]
    fn test_builder_with_config() {
        let builder = HttpClientBuilder::with_config(HttpClientConfig::minimal());
        assert_eq!(builder.config.request_timeout, Some(Duration::from_secs(10)));
        assert!(!builder.config.redirect.follow);
    }

    #[test]
    fn test_builder_timeout() {
        let builder = HttpClientBuilder::new().timeout(Duration::from_secs(60));
        assert_eq!(builder.config.request_timeout, Some(Duration::from_secs(60)));

        let builder = builder.no_timeout();
        assert_eq!(builder.config.request_timeout, None);
    }

    #[test]
    fn test_builder_user_agent() {
        let builder = HttpClientBuilder::new().user_agent("custom/1.0");
        assert_eq!(builder.config.user_agent, "custom/1.0");
    }

    #[test]
    fn test_builder_max_body_size() {
        let builder = HttpClientBuilder::new().max_body_size(1024);
        assert_eq!(builder.config.max_body_size, 1024);
    }

    #[test]
    fn test_builder_redirects() {
        let builder = HttpClientBuilder::new().max_redirects(3);
        assert_eq!(builder.config.redirect.max_redirects, 3);
        assert!(builder.config.redirect.follow);

        let builder = HttpClientBuilder::new().no_redirects();
        assert!(!builder.config.redirect.follow);

        let builder = HttpClientBuilder::new().redirect(RedirectConfig::hardened());
        assert!(builder.config.redirect.strip_sensitive_headers);
    }

    #[test]
    fn test_builder_decompress_and_tls() {
        let builder = HttpClientBuilder::new()
            .decompress(false)
            .tls_roots(TlsRootConfig::Native);
        assert!(!builder.config.decompress);
        assert_eq!(builder.config.tls_roots, TlsRootConfig::Native);
    }

    #[tokio::test]
    async fn test_builder_build() {
        let client = HttpClientBuilder::new().build();
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_builder_build_invalid_user_agent() {
        let result = HttpClientBuilder::new().user_agent("bad\nagent").build();
        assert!(matches!(result, Err(HttpError::InvalidHeaderValue(_))));
    }
}
