//! Transport facade and cancellation framework.
//!
//! This crate provides the two lowest layers of the skein stack:
//!
//! * [`cancel`]: composable cancellation values ([`Cancel`]) threaded
//!   through every blocking operation of the stack. A handle combines an
//!   optional deadline, an optional externally-settable interrupt flag and a
//!   parent handle; the reason for a cancellation is inspectable after the
//!   fact.
//! * [`conn`]: a uniform connection type ([`Conn`]) over plain TCP and
//!   rustls-backed TLS, carrying the endpoint identity used for keep-alive
//!   reuse decisions, plus [`open`]/[`Listener`] to establish connections.
//!
//! The protocol engines in `skein-http-core` and `skein-ws` are written
//! against [`Conn`]'s `AsyncRead`/`AsyncWrite` implementations and take a
//! [`Cancel`] at every suspension point.

pub mod cancel;
pub mod conn;
pub mod endpoint;
mod error;
pub mod listen;
pub mod tls;

pub use self::cancel::{Cancel, CancelReason, Cancelled, Interrupter};
pub use self::conn::{Conn, ConnStat, Reopen, TransportKind, open};
pub use self::endpoint::{Endpoint, IpFamily};
pub use self::error::Error;
pub use self::listen::Listener;
pub use self::tls::TlsParams;
