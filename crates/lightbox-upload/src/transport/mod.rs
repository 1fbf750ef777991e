//! Transport adapters.

mod http;

pub use http::HttpPutTransport;
