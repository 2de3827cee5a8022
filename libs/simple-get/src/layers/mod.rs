//! Tower layers wrapped around every transport
//!
//! - [`DefaultHeadersLayer`] - Adds headers (such as `User-Agent`) the caller did not set

mod default_headers;

pub use default_headers::{DefaultHeadersLayer, DefaultHeadersService};
