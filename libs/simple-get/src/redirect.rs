//! Redirect-following state machine.
//!
//! One call drives a request through as many hops as the server asks for:
//! select the transport for the current scheme, send, look at the response
//! headers, and either stop or rewrite the descriptor's URL and go again.
//! Hops are strictly sequential and a redirect response body is never read.

use crate::error::HttpError;
use crate::request::RequestDescriptor;
use crate::response::ResponseBody;
use crate::transport::TransportSelector;
use http::header::{self, HeaderMap, HeaderValue};
use http::Response;
use std::future::Future;
use std::time::Duration;
use url::Url;

/// Headers removed on a cross-origin hop when sensitive-header stripping is on
const SENSITIVE_HEADERS: [header::HeaderName; 3] = [
    header::AUTHORIZATION,
    header::COOKIE,
    header::PROXY_AUTHORIZATION,
];

/// Terminal response of a redirect chain, still undecoded.
#[derive(Debug)]
pub struct Terminal {
    pub response: Response<ResponseBody>,
    pub url: Url,
    pub redirects: usize,
}

/// Policy applied while walking a chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedirectPolicy {
    pub strip_sensitive_headers: bool,
}

/// Run `descriptor` to its terminal response.
///
/// # Errors
///
/// - [`HttpError::UnsupportedScheme`] if a hop lands on a scheme with no transport
/// - [`HttpError::Timeout`] / [`HttpError::Transport`] if a hop fails to produce headers
/// - [`HttpError::TooManyRedirects`] if the server asks for one hop more than allowed
/// - [`HttpError::InvalidRedirect`] if a `Location` value cannot be resolved
pub async fn follow(
    selector: &TransportSelector,
    mut descriptor: RequestDescriptor,
    policy: RedirectPolicy,
) -> Result<Terminal, HttpError> {
    let mut hops = 0usize;

    loop {
        let transport = selector.select(descriptor.url.scheme())?;
        let request = descriptor.to_request()?;

        tracing::debug!(
            method = %descriptor.method,
            url = %descriptor.url,
            hop = hops,
            "dispatching request"
        );
        let response = dispatch(transport.send(request), descriptor.timeout).await?;

        let location = response
            .headers()
            .get(header::LOCATION)
            .filter(|_| descriptor.follow_redirects && response.status().is_redirection())
            .cloned();
        let Some(location) = location else {
            return Ok(Terminal {
                response,
                url: descriptor.url,
                redirects: hops,
            });
        };

        if hops >= descriptor.max_redirects {
            tracing::debug!(
                url = %descriptor.url,
                max_redirects = descriptor.max_redirects,
                "redirect limit reached"
            );
            return Err(HttpError::TooManyRedirects {
                max_redirects: descriptor.max_redirects,
                url: descriptor.url.to_string(),
            });
        }

        let status = response.status();
        // The body of a redirect is never read
        drop(response);

        let next = resolve_location(&descriptor.url, &location)?;
        tracing::debug!(
            from = %descriptor.url,
            to = %next,
            status = status.as_u16(),
            "following redirect"
        );

        if !is_same_origin(&descriptor.url, &next) {
            strip_for_new_origin(&mut descriptor.headers, policy);
        }
        descriptor.url = next;
        hops += 1;
    }
}

/// Await one hop's response headers, bounded by the per-attempt timeout.
async fn dispatch<F>(
    send: F,
    timeout: Option<Duration>,
) -> Result<Response<ResponseBody>, HttpError>
where
    F: Future<Output = Result<Response<ResponseBody>, HttpError>>,
{
    match timeout {
        Some(duration) => tokio::time::timeout(duration, send)
            .await
            .map_err(|_| HttpError::Timeout(duration))?,
        None => send.await,
    }
}

/// Resolve a `Location` value against the URL that produced it.
fn resolve_location(current: &Url, location: &HeaderValue) -> Result<Url, HttpError> {
    let raw = location.to_str().map_err(|_| HttpError::InvalidRedirect {
        location: String::from_utf8_lossy(location.as_bytes()).into_owned(),
        reason: "location is not valid UTF-8".to_owned(),
    })?;

    let mut next = current
        .join(raw)
        .map_err(|e| HttpError::InvalidRedirect {
            location: raw.to_owned(),
            reason: e.to_string(),
        })?;
    next.set_fragment(None);
    Ok(next)
}

/// Origins match on scheme, host and port, with default ports filled in.
fn is_same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

fn strip_for_new_origin(headers: &mut HeaderMap, policy: RedirectPolicy) {
    // The new origin is addressed by its own authority
    headers.remove(header::HOST);
    if policy.strip_sensitive_headers {
        for name in &SENSITIVE_HEADERS {
            headers.remove(name);
        }
    }
}
