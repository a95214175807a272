//! WebSocket (RFC 6455) for skein.
//!
//! The frame codec and the protocol machine live in [`protocol`]; they are
//! synchronous and buffer-driven, so they run over any `Read + Write`
//! transport (and are trivially unit-testable against byte fixtures). The
//! async face for hijacked HTTP/1 connections is [`AsyncWebSocket`];
//! the opening handshake helpers live in [`handshake`].

pub mod handshake;
pub mod protocol;
mod stream;

pub use self::protocol::message::{CloseFrame, Message};
pub use self::protocol::{Role, WebSocket, WebSocketConfig};
pub use self::stream::AsyncWebSocket;
