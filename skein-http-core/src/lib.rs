//! The skein HTTP protocol engine.
//!
//! This crate implements the wire protocols of the stack:
//!
//! * [`proto::h1`]: the HTTP/1.0 / 1.1 request and response codec,
//!   start-line and header parsing, chunked and length-delimited bodies.
//! * [`h2`]: HTTP/2 proper: typed frames, HPACK header compression, the
//!   per-stream state machine, flow control and the h2c cleartext upgrade.
//! * [`client`] / [`server`]: the high-level exchange surfaces that pick a
//!   protocol version (ALPN or h2c) and drive the matching codec over a
//!   [`skein_net::Conn`].
//!
//! The codecs themselves are buffer-in / buffer-out and runtime-agnostic;
//! only the connection drivers perform I/O, and every I/O suspension point
//! takes a [`skein_net::Cancel`].

pub mod client;
mod error;
pub mod h2;
mod headers;
pub mod proto;
pub mod server;

pub use self::error::{Error, HttpErrorKind};
pub use self::headers::OrderedHeaders;

pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version};

/// The HTTP version requested for an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpVersion {
    /// Negotiate: prefer HTTP/2, fall back to HTTP/1.1.
    #[default]
    Auto,
    Http1,
    Http2,
}
