#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Single-request HTTP(S) client core
//!
//! Issues one logical request and resolves the protocol-level indirection a
//! raw transport leaves to the caller:
//! - **Redirect chains**, including hops between `http` and `https`, bounded
//!   by a hop limit (10 by default)
//! - **Content-encoding**: `gzip` and `deflate` bodies are decoded on the fly,
//!   while status and headers stay exactly as the server sent them
//!
//! Connections are not pooled and nothing is retried; HTTP/1.1 only.
//!
//! # Errors
//!
//! Failures before the terminal response (bad input, unsupported scheme,
//! transport failure, redirect limit) are returned by the request call.
//! Malformed compressed data is reported by the body stream, since the
//! response has already been handed over by then.
//!
//! # Example
//!
//! ```ignore
//! use simple_get::{HttpClient, RequestOptions};
//! use std::time::Duration;
//!
//! let client = HttpClient::builder()
//!     .timeout(Duration::from_secs(10))
//!     .max_redirects(5)
//!     .build()?;
//!
//! let resp = client
//!     .get(RequestOptions::new("http://example.com/old").header("accept", "text/html"))
//!     .await?;
//! assert_eq!(resp.url().as_str(), "https://example.com/new");
//! let html = resp.text().await?;
//!
//! // Process-wide default client
//! let body = simple_get::concat("https://example.com/data.json").await?.body;
//!
//! // Completion callback, invoked exactly once
//! simple_get::request_with_callback("https://example.com", |result| {
//!     if let Err(e) = result {
//!         eprintln!("request failed: {e}");
//!     }
//! });
//! ```

mod builder;
mod client;
mod config;
mod decompress;
mod error;
mod layers;
mod redirect;
mod request;
mod response;
mod tls;
mod transport;

pub use builder::HttpClientBuilder;
pub use client::{HttpClient, concat, default_client, get, request, request_with_callback};
pub use config::{
    ACCEPT_ENCODING_VALUE, DEFAULT_MAX_REDIRECTS, DEFAULT_USER_AGENT, HttpClientConfig,
    RedirectConfig, TlsRootConfig,
};
pub use decompress::{ContentEncoding, DecodedBody, decode_response};
pub use error::{ErrorKind, HttpError, InvalidUriKind};
pub use layers::{DefaultHeadersLayer, DefaultHeadersService};
pub use request::{RequestDescriptor, RequestOptions};
pub use response::{ConcatResponse, HttpResponse, LimitedBody, ResponseBody};
pub use transport::{Scheme, Transport, TransportSelector, TransportService};
