use crate::decompress::ContentEncoding;
use crate::error::HttpError;
use bytes::Bytes;
use futures::Stream;
use http::{HeaderMap, StatusCode, Version};
use http_body::Frame;
use http_body_util::{BodyDataStream, BodyExt};
use pin_project_lite::pin_project;
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::task::{Context, Poll};
use url::Url;

/// Type alias for the boxed response body.
///
/// This type holds either the raw transport body or a decoding wrapper
/// around it. Errors are already classified: transport failures surface as
/// [`HttpError::Transport`], malformed compressed data as [`HttpError::Decode`].
pub type ResponseBody = http_body_util::combinators::BoxBody<Bytes, HttpError>;

pin_project! {
    /// Body wrapper that enforces size limits during streaming.
    ///
    /// Created by [`HttpResponse::into_limited_body()`]. Tracks bytes read
    /// and returns [`HttpError::BodyTooLarge`] if the limit is exceeded.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use http_body_util::BodyExt;
    ///
    /// let response = client.get("https://example.com/large-file").await?;
    /// let mut body = response.into_limited_body();
    ///
    /// while let Some(frame) = body.frame().await {
    ///     let frame = frame?; // Returns BodyTooLarge if limit exceeded
    ///     if let Some(chunk) = frame.data_ref() {
    ///         process_chunk(chunk);
    ///     }
    /// }
    /// ```
    pub struct LimitedBody {
        #[pin]
        inner: ResponseBody,
        limit: usize,
        read: usize,
    }
}

impl LimitedBody {
    /// Creates a new `LimitedBody` wrapping the given body with the specified limit.
    #[must_use]
    pub fn new(inner: ResponseBody, limit: usize) -> Self {
        Self {
            inner,
            limit,
            read: 0,
        }
    }

    /// Returns the number of bytes read so far.
    #[must_use]
    pub fn bytes_read(&self) -> usize {
        self.read
    }

    /// Returns the configured size limit.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl http_body::Body for LimitedBody {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    *this.read += data.len();
                    if *this.read > *this.limit {
                        return Poll::Ready(Some(Err(HttpError::BodyTooLarge {
                            limit: *this.limit,
                            actual: *this.read,
                        })));
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            other => other,
        }
    }
}

/// Response handed to the caller once the redirect chain has ended.
///
/// Status, headers and version are captured when the terminal response
/// arrives, so they read the same before, during and after body consumption,
/// and the same whether or not the body is being decompressed.
///
/// Body-reading helpers (`bytes`, `text`, `json`) enforce the client's
/// `max_body_size` on decoded bytes. [`into_body`](Self::into_body) and
/// [`into_stream`](Self::into_stream) do not.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    url: Url,
    redirects: usize,
    content_encoding: Option<ContentEncoding>,
    body: ResponseBody,
    max_body_size: usize,
}

impl HttpResponse {
    pub(crate) fn new(
        response: http::Response<ResponseBody>,
        url: Url,
        redirects: usize,
        content_encoding: Option<ContentEncoding>,
        max_body_size: usize,
    ) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            url,
            redirects,
            content_encoding,
            body,
            max_body_size,
        }
    }

    /// Get the response status code
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the response headers, exactly as the server sent them
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get the HTTP version of the response
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// URL of the terminal response (after all redirects)
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Number of redirect hops followed to reach this response
    #[must_use]
    pub fn redirects(&self) -> usize {
        self.redirects
    }

    /// Coding being removed from the body, if the body is compressed
    #[must_use]
    pub fn content_encoding(&self) -> Option<ContentEncoding> {
        self.content_encoding
    }

    /// Returns the configured max body size for buffered reads.
    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Returns the decoded response body for incremental processing.
    ///
    /// Does **not** enforce `max_body_size`; see
    /// [`into_limited_body()`](Self::into_limited_body).
    ///
    /// # Example
    ///
    /// ```ignore
    /// use http_body_util::BodyExt;
    ///
    /// let mut body = response.into_body();
    /// while let Some(frame) = body.frame().await {
    ///     let frame = frame?; // HttpError::Decode if the compressed data is corrupt
    ///     if let Some(chunk) = frame.data_ref() {
    ///         process_chunk(chunk);
    ///     }
    /// }
    /// ```
    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Returns the decoded body as a size-limited stream.
    #[must_use]
    pub fn into_limited_body(self) -> LimitedBody {
        LimitedBody::new(self.body, self.max_body_size)
    }

    /// Returns the decoded body as a stream of byte chunks.
    ///
    /// Does **not** enforce `max_body_size`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use futures::TryStreamExt;
    ///
    /// let mut stream = response.into_stream();
    /// while let Some(chunk) = stream.try_next().await? {
    ///     file.write_all(&chunk).await?;
    /// }
    /// ```
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, HttpError>> + Send + Unpin {
        BodyDataStream::new(self.body)
    }

    /// Read the decoded body as bytes
    ///
    /// Enforces `max_body_size`.
    ///
    /// # Errors
    /// Returns `HttpError::BodyTooLarge` if body exceeds limit.
    /// Returns `HttpError::Decode` if the compressed body is malformed.
    /// Returns `HttpError::Transport` if the connection fails mid-body.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        read_body_limited(self.body, self.max_body_size).await
    }

    /// Read the decoded body as text (UTF-8, lossy)
    ///
    /// Invalid UTF-8 sequences are replaced with the Unicode replacement character.
    ///
    /// # Errors
    /// Same as [`bytes()`](Self::bytes).
    pub async fn text(self) -> Result<String, HttpError> {
        let body_bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&body_bytes).into_owned())
    }

    /// Parse the decoded body as JSON
    ///
    /// # Errors
    /// Same as [`bytes()`](Self::bytes), plus `HttpError::Json` if parsing fails.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        let body_bytes = self.bytes().await?;
        let value = serde_json::from_slice(&body_bytes)?;
        Ok(value)
    }

    /// Buffer the body and keep the response metadata next to it.
    ///
    /// # Errors
    /// Same as [`bytes()`](Self::bytes).
    pub async fn concat(self) -> Result<ConcatResponse, HttpError> {
        let body = read_body_limited(self.body, self.max_body_size).await?;
        Ok(ConcatResponse {
            status: self.status,
            version: self.version,
            headers: self.headers,
            url: self.url,
            redirects: self.redirects,
            body,
        })
    }
}

/// A response whose decoded body has been read into memory.
#[derive(Debug, Clone)]
pub struct ConcatResponse {
    /// Response status code
    pub status: StatusCode,
    /// HTTP version of the response
    pub version: Version,
    /// Response headers as sent by the server
    pub headers: HeaderMap,
    /// URL of the terminal response
    pub url: Url,
    /// Number of redirect hops followed
    pub redirects: usize,
    /// Decoded body
    pub body: Bytes,
}

impl ConcatResponse {
    /// Body as text (UTF-8, lossy)
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse body as JSON
    ///
    /// # Errors
    /// Returns `HttpError::Json` if parsing fails.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Collect `body` into memory, failing once more than `limit` bytes arrive.
async fn read_body_limited(body: ResponseBody, limit: usize) -> Result<Bytes, HttpError> {
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(HttpError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}
