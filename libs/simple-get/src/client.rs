use crate::builder::HttpClientBuilder;
use crate::config::HttpClientConfig;
use crate::decompress::decode_response;
use crate::error::HttpError;
use crate::redirect::{self, RedirectPolicy};
use crate::request::{RequestDescriptor, RequestOptions};
use crate::response::{ConcatResponse, HttpResponse};
use crate::transport::TransportSelector;
use http::Method;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

/// HTTP client that follows redirects and decodes compressed bodies
///
/// Every call runs the same pipeline: the caller's options are normalized
/// into a request descriptor, the transport for the URL's scheme is selected,
/// redirects are followed (re-selecting the transport on each hop), and the
/// terminal response body is wrapped in a gzip/deflate decoder when needed.
///
/// # Thread Safety
///
/// `HttpClient` is `Clone + Send + Sync`. Cloning is cheap; clones share the
/// transports and configuration. No connection is reused between calls.
///
/// # Example
///
/// ```ignore
/// let client = HttpClient::new()?;
///
/// let resp = client.get("http://example.com/moved").await?;
/// println!("{} after {} redirects", resp.url(), resp.redirects());
/// let text = resp.text().await?;
/// ```
#[derive(Clone, Debug)]
pub struct HttpClient {
    pub(crate) selector: TransportSelector,
    pub(crate) config: Arc<HttpClientConfig>,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    /// Create a builder for configuring the HTTP client
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Client-wide defaults
    #[must_use]
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Issue one logical request and resolve it to its terminal response.
    ///
    /// `input` is a bare URL (`&str`, `String`, [`url::Url`]) or a
    /// [`RequestOptions`]. Resolves once the terminal response's headers are
    /// known; the body has not been read yet.
    ///
    /// # Errors
    ///
    /// - [`HttpError::InvalidUri`], [`HttpError::InvalidHeaderName`],
    ///   [`HttpError::InvalidHeaderValue`] for bad input
    /// - [`HttpError::UnsupportedScheme`] for anything but `http`/`https`
    /// - [`HttpError::Transport`], [`HttpError::Timeout`], [`HttpError::Tls`]
    ///   when a hop fails
    /// - [`HttpError::TooManyRedirects`], [`HttpError::InvalidRedirect`]
    ///   when the redirect chain cannot be completed
    ///
    /// Malformed compressed data is reported later, by the body stream.
    pub async fn request(
        &self,
        input: impl Into<RequestOptions>,
    ) -> Result<HttpResponse, HttpError> {
        let descriptor = RequestDescriptor::build(input.into(), &self.config)?;
        let decompress = descriptor.decompress;
        let policy = RedirectPolicy {
            strip_sensitive_headers: self.config.redirect.strip_sensitive_headers,
        };

        let terminal = redirect::follow(&self.selector, descriptor, policy).await?;

        let (response, content_encoding) = if decompress {
            decode_response(terminal.response)
        } else {
            (terminal.response, None)
        };

        Ok(HttpResponse::new(
            response,
            terminal.url,
            terminal.redirects,
            content_encoding,
            self.config.max_body_size,
        ))
    }

    /// Run [`request`](Self::request) on a spawned task and hand the result to `callback`.
    ///
    /// The callback runs exactly once, with either the response or the error.
    /// Must be called from within a tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// client.request_with_callback("http://example.com", |result| match result {
    ///     Ok(resp) => println!("status {}", resp.status()),
    ///     Err(e) => eprintln!("request failed: {e}"),
    /// });
    /// ```
    pub fn request_with_callback<F>(
        &self,
        input: impl Into<RequestOptions>,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Result<HttpResponse, HttpError>) + Send + 'static,
    {
        let client = self.clone();
        let options = input.into();
        tokio::spawn(async move {
            let result = client.request(options).await;
            callback(result);
        })
    }

    /// Issue the request and read the decoded body into memory.
    ///
    /// # Errors
    /// Same as [`request`](Self::request), plus the body errors of
    /// [`HttpResponse::bytes`].
    pub async fn concat(
        &self,
        input: impl Into<RequestOptions>,
    ) -> Result<ConcatResponse, HttpError> {
        self.request(input).await?.concat().await
    }

    /// Send a GET request
    ///
    /// # Errors
    /// Same as [`request`](Self::request).
    pub async fn get(&self, input: impl Into<RequestOptions>) -> Result<HttpResponse, HttpError> {
        self.request(input.into().method(Method::GET)).await
    }

    /// Send a HEAD request
    ///
    /// # Errors
    /// Same as [`request`](Self::request).
    pub async fn head(&self, input: impl Into<RequestOptions>) -> Result<HttpResponse, HttpError> {
        self.request(input.into().method(Method::HEAD)).await
    }

    /// Send a POST request
    ///
    /// # Example
    ///
    /// ```ignore
    /// let options = RequestOptions::new("https://api.example.com/users")
    ///     .json(&NewUser { name: "Alice" })?;
    /// let resp = client.post(options).await?;
    /// ```
    ///
    /// # Errors
    /// Same as [`request`](Self::request).
    pub async fn post(&self, input: impl Into<RequestOptions>) -> Result<HttpResponse, HttpError> {
        self.request(input.into().method(Method::POST)).await
    }

    /// Send a PUT request
    ///
    /// # Errors
    /// Same as [`request`](Self::request).
    pub async fn put(&self, input: impl Into<RequestOptions>) -> Result<HttpResponse, HttpError> {
        self.request(input.into().method(Method::PUT)).await
    }

    /// Send a PATCH request
    ///
    /// # Errors
    /// Same as [`request`](Self::request).
    pub async fn patch(&self, input: impl Into<RequestOptions>) -> Result<HttpResponse, HttpError> {
        self.request(input.into().method(Method::PATCH)).await
    }

    /// Send a DELETE request
    ///
    /// # Errors
    /// Same as [`request`](Self::request).
    pub async fn delete(
        &self,
        input: impl Into<RequestOptions>,
    ) -> Result<HttpResponse, HttpError> {
        self.request(input.into().method(Method::DELETE)).await
    }
}

static DEFAULT_CLIENT: OnceLock<HttpClient> = OnceLock::new();

/// Process-wide client with default configuration, built on first use.
///
/// # Errors
/// Returns an error if TLS initialization fails. A failed build is retried
/// on the next call.
pub fn default_client() -> Result<&'static HttpClient, HttpError> {
    if let Some(client) = DEFAULT_CLIENT.get() {
        return Ok(client);
    }
    let client = HttpClient::new()?;
    Ok(DEFAULT_CLIENT.get_or_init(|| client))
}

/// [`HttpClient::request`] on the [`default_client`].
///
/// # Errors
/// Same as [`HttpClient::request`].
pub async fn request(input: impl Into<RequestOptions>) -> Result<HttpResponse, HttpError> {
    default_client()?.request(input).await
}

/// [`HttpClient::get`] on the [`default_client`].
///
/// # Errors
/// Same as [`HttpClient::request`].
pub async fn get(input: impl Into<RequestOptions>) -> Result<HttpResponse, HttpError> {
    default_client()?.get(input).await
}

/// [`HttpClient::concat`] on the [`default_client`].
///
/// # Errors
/// Same as [`HttpClient::concat`].
pub async fn concat(input: impl Into<RequestOptions>) -> Result<ConcatResponse, HttpError> {
    default_client()?.concat(input).await
}

/// [`HttpClient::request_with_callback`] on the [`default_client`].
///
/// If the default client cannot be built, the callback receives that error.
pub fn request_with_callback<F>(input: impl Into<RequestOptions>, callback: F) -> JoinHandle<()>
where
    F: FnOnce(Result<HttpResponse, HttpError>) + Send + 'static,
{
    match default_client() {
        Ok(client) => client.request_with_callback(input, callback),
        Err(e) => tokio::spawn(async move {
            callback(Err(e));
        }),
    }
}
