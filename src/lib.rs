//! skein: a client/server HTTP protocol stack.
//!
//! skein implements the HTTP family of protocols (HTTP/1.0, HTTP/1.1,
//! HTTP/2 including the h2c cleartext upgrade, and WebSocket) on top of a
//! shared TCP/TLS transport. The engine is split over three crates, all
//! re-exported here:
//!
//! * [`net`]: the transport facade (TCP, TLS, endpoint identity for
//!   connection reuse) and the cancellation framework threaded through every
//!   blocking operation.
//! * [`http`]: the protocol engine proper (the HTTP/1 codec, HPACK, HTTP/2
//!   framing and the per-stream state machines, version negotiation) and the
//!   high-level [`http::client::Client`] / [`http::server`] surfaces.
//! * [`ws`]: the WebSocket frame codec and handshake.
//!
//! # A client request
//!
//! ```no_run
//! use skein::http::client::{Client, RequestContext};
//! use skein::net::Cancel;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = Client::new();
//! let mut ctx = RequestContext::get("http://example.com/")?;
//! client.request(&mut ctx, &Cancel::new()).await?;
//! assert_eq!(ctx.status(), Some(200));
//! # Ok(())
//! # }
//! ```

#[doc(inline)]
pub use skein_http_core as http;
#[doc(inline)]
pub use skein_net as net;
#[doc(inline)]
pub use skein_ws as ws;
