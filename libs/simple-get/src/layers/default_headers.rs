use crate::error::HttpError;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Request, Response};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that fills in headers the request does not already carry
///
/// A header set by the caller always wins; the layer never appends a second
/// value next to it.
#[derive(Clone, Debug, Default)]
pub struct DefaultHeadersLayer {
    headers: HeaderMap,
}

impl DefaultHeadersLayer {
    /// Create a layer with no default headers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a default header
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Add a default `User-Agent`
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderValue` if the user agent string is not valid
    pub fn user_agent(self, user_agent: impl AsRef<str>) -> Result<Self, HttpError> {
        let value = HeaderValue::from_str(user_agent.as_ref())?;
        Ok(self.header(http::header::USER_AGENT, value))
    }
}

impl<S> Layer<S> for DefaultHeadersLayer {
    type Service = DefaultHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DefaultHeadersService {
            inner,
            headers: self.headers.clone(),
        }
    }
}

/// Service that fills in default headers before calling the inner service
#[derive(Clone, Debug)]
pub struct DefaultHeadersService<S> {
    inner: S,
    headers: HeaderMap,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for DefaultHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let headers = req.headers_mut();
        for (name, value) in &self.headers {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        self.inner.call(req)
    }
}
