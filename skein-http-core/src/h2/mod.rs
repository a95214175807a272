//! HTTP/2.
//!
//! The layers, bottom up:
//!
//! * [`frame`]: typed frames with `load`/`encode` per RFC 7540 §6.
//! * [`hpack`]: RFC 7541 header compression.
//! * [`codec`]: framing over a byte stream (length checks, CONTINUATION
//!   coalescing, HPACK application).
//! * [`proto`]: the connection and per-stream state machines, flow
//!   control, SETTINGS synchronization, GOAWAY bookkeeping.
//! * [`h2c`]: the HTTP/1.1 Upgrade dance to cleartext HTTP/2.

macro_rules! proto_err {
    (conn: $($msg:tt)+) => {
        ::tracing::debug!("connection error PROTOCOL_ERROR -- {};", format_args!($($msg)+))
    };
    (stream: $($msg:tt)+) => {
        ::tracing::debug!("stream error PROTOCOL_ERROR -- {};", format_args!($($msg)+))
    };
}

pub mod codec;
pub mod frame;
pub mod h2c;
pub mod hpack;
pub mod proto;

#[cfg(test)]
mod tests;

pub use self::proto::Error;

/// The 24-byte marker that starts every HTTP/2 connection, client side.
pub const PREFACE: &[u8; 24] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";
