//! The HTTP/2 connection and stream engine.

mod connection;
mod error;
mod go_away;
mod ping_pong;
mod settings;
pub(crate) mod streams;

pub use self::connection::{Connection, Event, SendData};
#[cfg(test)]
pub(crate) use self::connection::Step;
pub use self::error::{Error, Initiator};
pub(crate) use self::go_away::GoAway;
pub(crate) use self::ping_pong::PingPong;
pub(crate) use self::settings::Settings;

pub type WindowSize = u32;

/// Flow-control windows may not exceed 2^31 - 1.
pub const MAX_WINDOW_SIZE: WindowSize = (1 << 31) - 1;

/// Which side of the connection this endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    Client,
    Server,
}

impl Peer {
    /// Whether `id` was initiated by the remote peer.
    pub(crate) fn is_remote_initiated(self, id: crate::h2::frame::StreamId) -> bool {
        match self {
            Self::Client => id.is_server_initiated(),
            Self::Server => id.is_client_initiated(),
        }
    }

    /// The first stream id this endpoint allocates.
    pub(crate) fn first_stream_id(self) -> crate::h2::frame::StreamId {
        match self {
            Self::Client => 1.into(),
            Self::Server => 2.into(),
        }
    }
}
