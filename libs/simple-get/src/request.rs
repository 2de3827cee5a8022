use crate::config::{ACCEPT_ENCODING_VALUE, HttpClientConfig};
use crate::error::{HttpError, InvalidUriKind};
use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, Request};
use http_body_util::Full;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Body type for request options
#[derive(Clone, Debug)]
enum BodyKind {
    /// Empty body
    Empty,
    /// Raw bytes body
    Bytes(Bytes),
    /// JSON-serialized body (stored as bytes after serialization)
    Json(Bytes),
    /// Form URL-encoded body (stored as bytes after serialization)
    Form(Bytes),
}

/// Caller input for a single logical request.
///
/// Either build it fluently from a URL or convert a bare URL string with
/// `.into()`. Nothing is validated here; validation happens when the client
/// turns the options into a [`RequestDescriptor`], so every input problem is
/// reported through the same result channel as transport failures.
///
/// # Example
///
/// ```ignore
/// use simple_get::RequestOptions;
/// use std::time::Duration;
///
/// let options = RequestOptions::new("https://example.com/upload")
///     .method(http::Method::PUT)
///     .header("x-request-id", "abc123")
///     .body("payload")
///     .timeout(Duration::from_secs(5))
///     .max_redirects(3);
///
/// let resp = client.request(options).await?;
/// ```
#[derive(Clone, Debug)]
#[must_use]
pub struct RequestOptions {
    url: String,
    method: Method,
    headers: Vec<(String, String)>,
    body: BodyKind,
    timeout: Option<Duration>,
    max_redirects: Option<usize>,
    follow_redirects: Option<bool>,
    decompress: Option<bool>,
}

impl RequestOptions {
    /// Create options for a `GET` of `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: Vec::new(),
            body: BodyKind::Empty,
            timeout: None,
            max_redirects: None,
            follow_redirects: None,
            decompress: None,
        }
    }

    /// The URL as supplied by the caller
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Set the request method (default: `GET`)
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Add a single header
    ///
    /// Names are case-insensitive; values are sent verbatim. Adding the same
    /// name twice sends both values.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add multiple headers
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the request body as raw bytes
    ///
    /// The body is kept in memory so it can be replayed on every redirect hop.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = BodyKind::Bytes(body.into());
        self
    }

    /// Set request body as JSON
    ///
    /// Serializes the value using `serde_json`. `Content-Type` and `Accept`
    /// default to `application/json` unless provided as headers.
    ///
    /// # Errors
    ///
    /// Returns `Err(HttpError::Json)` if serialization fails.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, HttpError> {
        let json_bytes = serde_json::to_vec(body)?;
        self.body = BodyKind::Json(Bytes::from(json_bytes));
        Ok(self)
    }

    /// Set request body as form URL-encoded
    ///
    /// `Content-Type` defaults to `application/x-www-form-urlencoded` unless
    /// provided as a header.
    ///
    /// # Errors
    ///
    /// Returns `Err(HttpError::FormEncode)` if encoding fails.
    pub fn form(mut self, fields: &[(&str, &str)]) -> Result<Self, HttpError> {
        let form_string = serde_urlencoded::to_string(fields)?;
        self.body = BodyKind::Form(Bytes::from(form_string));
        Ok(self)
    }

    /// Bound each attempt (each redirect hop) by `timeout`
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the redirect hop limit
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = Some(max_redirects);
        self
    }

    /// Follow redirects (`true`) or return 3xx responses unchanged (`false`)
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = Some(follow);
        self
    }

    /// Decode gzip/deflate bodies (`true`) or hand them out raw (`false`)
    pub fn decompress(mut self, decompress: bool) -> Self {
        self.decompress = Some(decompress);
        self
    }
}

impl From<&str> for RequestOptions {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for RequestOptions {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

impl From<&String> for RequestOptions {
    fn from(url: &String) -> Self {
        Self::new(url.as_str())
    }
}

impl From<Url> for RequestOptions {
    fn from(url: Url) -> Self {
        Self::new(String::from(url))
    }
}

/// Canonical, validated form of a request.
///
/// Only the redirect controller mutates a descriptor, and only to point it at
/// the next hop.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) timeout: Option<Duration>,
    pub(crate) max_redirects: usize,
    pub(crate) follow_redirects: bool,
    pub(crate) decompress: bool,
}

impl RequestDescriptor {
    /// Normalize caller options against client defaults.
    ///
    /// Performs no I/O.
    ///
    /// # Errors
    ///
    /// - [`HttpError::InvalidUri`] if the URL is missing or cannot be parsed
    /// - [`HttpError::InvalidHeaderName`] / [`HttpError::InvalidHeaderValue`]
    ///   for malformed headers
    pub fn build(options: RequestOptions, defaults: &HttpClientConfig) -> Result<Self, HttpError> {
        let url = parse_url(&options.url)?;

        let mut headers = HeaderMap::with_capacity(options.headers.len() + 2);
        for (name, value) in options.headers {
            let name = HeaderName::try_from(name)?;
            let value = HeaderValue::try_from(value)?;
            headers.append(name, value);
        }

        let decompress = options.decompress.unwrap_or(defaults.decompress);
        if decompress && !headers.contains_key(header::ACCEPT_ENCODING) {
            headers.insert(
                header::ACCEPT_ENCODING,
                HeaderValue::from_static(ACCEPT_ENCODING_VALUE),
            );
        }

        let body = match options.body {
            BodyKind::Empty => Bytes::new(),
            BodyKind::Bytes(b) => b,
            BodyKind::Json(b) => {
                set_default(&mut headers, header::CONTENT_TYPE, "application/json");
                set_default(&mut headers, header::ACCEPT, "application/json");
                b
            }
            BodyKind::Form(b) => {
                set_default(
                    &mut headers,
                    header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                );
                b
            }
        };

        Ok(Self {
            method: options.method,
            url,
            headers,
            body,
            timeout: options.timeout.or(defaults.request_timeout),
            max_redirects: options
                .max_redirects
                .unwrap_or(defaults.redirect.max_redirects),
            follow_redirects: options
                .follow_redirects
                .unwrap_or(defaults.redirect.follow),
            decompress,
        })
    }

    /// Request method
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Current target URL
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Headers sent on every hop
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request body (empty if none)
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Per-attempt timeout
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Redirect hop limit
    #[must_use]
    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// Build the wire request for the current hop.
    pub(crate) fn to_request(&self) -> Result<Request<Full<Bytes>>, HttpError> {
        let uri: http::Uri =
            self.url
                .as_str()
                .parse()
                .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
                    url: self.url.to_string(),
                    kind: InvalidUriKind::ParseError,
                    reason: e.to_string(),
                })?;

        let mut request = Request::builder()
            .method(self.method.clone())
            .uri(uri)
            .body(Full::new(self.body.clone()))?;
        *request.headers_mut() = self.headers.clone();
        Ok(request)
    }
}

fn set_default(headers: &mut HeaderMap, name: HeaderName, value: &'static str) {
    if !headers.contains_key(&name) {
        headers.insert(name, HeaderValue::from_static(value));
    }
}

/// Parse and normalize a caller-supplied URL.
///
/// The scheme is not checked here; the transport selector owns that decision.
fn parse_url(raw: &str) -> Result<Url, HttpError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(HttpError::InvalidUri {
            url: raw.to_owned(),
            kind: InvalidUriKind::Missing,
            reason: "no URL given".to_owned(),
        });
    }

    let mut url = Url::parse(trimmed).map_err(|e| {
        let kind = match e {
            url::ParseError::RelativeUrlWithoutBase => InvalidUriKind::MissingScheme,
            url::ParseError::EmptyHost => InvalidUriKind::MissingAuthority,
            _ => InvalidUriKind::ParseError,
        };
        HttpError::InvalidUri {
            url: raw.to_owned(),
            kind,
            reason: e.to_string(),
        }
    })?;

    // Fragments are client-side only
    url.set_fragment(None);
    Ok(url)
}
