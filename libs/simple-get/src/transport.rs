//! Per-scheme transports and the selector that picks between them.
//!
//! A transport is any tower service that turns a `Request<Full<Bytes>>` into a
//! `Response<ResponseBody>` once response headers are available. The default
//! transports are hyper-util clients over plain TCP (`http`) and rustls
//! (`https`); custom services can be supplied through
//! [`HttpClientBuilder`](crate::HttpClientBuilder).

use crate::config::{HttpClientConfig, TlsRootConfig};
use crate::error::HttpError;
use crate::layers::DefaultHeadersLayer;
use crate::response::ResponseBody;
use crate::tls;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::fmt;
use tower::util::BoxCloneSyncService;
use tower::{Layer, ServiceExt};

/// Type-erased transport service.
pub type TransportService =
    BoxCloneSyncService<Request<Full<Bytes>>, Response<ResponseBody>, HttpError>;

/// URL schemes with a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plain TCP
    Http,
    /// TLS
    Https,
}

impl Scheme {
    /// Look up a scheme by its URL spelling (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::UnsupportedScheme`] for anything but `http`/`https`.
    pub fn parse(scheme: &str) -> Result<Self, HttpError> {
        if scheme.eq_ignore_ascii_case("http") {
            Ok(Self::Http)
        } else if scheme.eq_ignore_ascii_case("https") {
            Ok(Self::Https)
        } else {
            Err(HttpError::UnsupportedScheme {
                scheme: scheme.to_owned(),
            })
        }
    }

    /// Scheme name as used in URLs
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Port used when the URL names none
    #[must_use]
    pub fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transport bound to the scheme it was selected for.
#[derive(Clone)]
pub struct Transport {
    scheme: Scheme,
    service: TransportService,
}

impl Transport {
    /// Scheme this transport serves
    #[must_use]
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Dispatch one request and wait for its response headers.
    ///
    /// # Errors
    ///
    /// Whatever the underlying service reports, typically
    /// [`HttpError::Transport`].
    pub async fn send(
        self,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<ResponseBody>, HttpError> {
        self.service.oneshot(request).await
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

/// Maps a URL scheme to its transport.
///
/// Selection is a pure lookup; the redirect controller repeats it on every
/// hop because a redirect may switch schemes.
#[derive(Clone)]
pub struct TransportSelector {
    http: TransportService,
    https: TransportService,
}

impl TransportSelector {
    /// Create a selector from one service per scheme
    #[must_use]
    pub fn new(http: TransportService, https: TransportService) -> Self {
        Self { http, https }
    }

    /// Build the default hyper-based transports for `config`.
    ///
    /// `http` and `https`, when given, replace the corresponding default.
    /// The default-headers layer wraps both, default or custom.
    ///
    /// # Errors
    ///
    /// Returns an error if TLS initialization fails or the user agent is not
    /// a valid header value.
    pub fn from_config(
        config: &HttpClientConfig,
        http: Option<TransportService>,
        https: Option<TransportService>,
    ) -> Result<Self, HttpError> {
        let defaults_layer = DefaultHeadersLayer::new().user_agent(&config.user_agent)?;

        let http = match http {
            Some(service) => service,
            None => hyper_transport(build_http_connector()),
        };
        let https = match https {
            Some(service) => service,
            None => hyper_transport(build_https_connector(config.tls_roots)?),
        };

        Ok(Self {
            http: BoxCloneSyncService::new(defaults_layer.layer(http)),
            https: BoxCloneSyncService::new(defaults_layer.layer(https)),
        })
    }

    /// Select the transport for `scheme`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::UnsupportedScheme`] for anything but `http`/`https`.
    pub fn select(&self, scheme: &str) -> Result<Transport, HttpError> {
        let scheme = Scheme::parse(scheme)?;
        let service = match scheme {
            Scheme::Http => self.http.clone(),
            Scheme::Https => self.https.clone(),
        };
        Ok(Transport { scheme, service })
    }
}

impl fmt::Debug for TransportSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSelector").finish_non_exhaustive()
    }
}

/// Wrap a hyper-util client as a transport service.
///
/// Idle connections are not kept: every request opens its own connection.
fn hyper_transport<C>(connector: C) -> TransportService
where
    C: hyper_util::client::legacy::connect::Connect + Clone + Send + Sync + 'static,
{
    let client = Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(0)
        .build::<_, Full<Bytes>>(connector);

    let service = client
        .map_response(map_incoming_response)
        .map_err(HttpError::from);
    BoxCloneSyncService::new(service)
}

/// Box hyper's streaming body with transport-classified errors.
fn map_incoming_response(response: Response<hyper::body::Incoming>) -> Response<ResponseBody> {
    response.map(|body| body.map_err(HttpError::from).boxed())
}

fn build_http_connector() -> HttpConnector {
    let mut connector = HttpConnector::new();
    connector.enforce_http(true);
    connector
}

/// Build the HTTPS connector with the specified TLS root configuration.
///
/// For `TlsRootConfig::Native`, uses cached native root certificates to avoid
/// repeated OS certificate store lookups on each `build()` call.
///
/// # Errors
///
/// Returns `HttpError::Tls` if `TlsRootConfig::Native` is requested but no
/// valid root certificates are available from the OS certificate store.
fn build_https_connector(
    tls_roots: TlsRootConfig,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let builder = match tls_roots {
        TlsRootConfig::WebPki => {
            let provider = tls::get_crypto_provider();
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_provider_and_webpki_roots(provider)
                .map_err(|e| HttpError::Tls(Box::new(e)))?
        }
        TlsRootConfig::Native => {
            let client_config =
                tls::native_roots_client_config().map_err(|e| HttpError::Tls(e.into()))?;
            hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(client_config)
        }
    };

    let mut http = HttpConnector::new();
    // The TLS connector validates the scheme itself
    http.enforce_http(false);

    Ok(builder.https_only().enable_http1().wrap_connector(http))
}
