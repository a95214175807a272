use std::fmt;

use crate::h2::frame::StreamIdOverflow;

/// Errors caused by the local user of the engine, as opposed to protocol
/// errors observed on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserError {
    /// The stream is no longer accepting frames.
    InactiveStreamId,

    /// The stream is not currently expecting a frame of this type.
    UnexpectedFrameType,

    /// The payload size exceeds what the peer allows.
    PayloadTooBig,

    /// The stream ID space is exhausted; a new connection is needed.
    OverflowedStreamId,

    /// Illegal headers, such as connection-specific headers.
    MalformedHeaders,

    /// A SETTINGS update was attempted while the previous one is
    /// unacknowledged.
    SendSettingsWhilePending,

    /// A PING was attempted while the previous one awaits its pong.
    SendPingWhilePending,

    /// The peer disabled server push.
    PeerDisabledServerPush,

    /// No new streams may be opened after GOAWAY.
    GoingAway,
}

impl fmt::Display for UserError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Self::InactiveStreamId => "inactive stream",
            Self::UnexpectedFrameType => "unexpected frame type",
            Self::PayloadTooBig => "payload too big",
            Self::OverflowedStreamId => "stream ID overflowed",
            Self::MalformedHeaders => "malformed headers",
            Self::SendSettingsWhilePending => "sending SETTINGS before received previous ACK",
            Self::SendPingWhilePending => "send_ping before received previous pong",
            Self::PeerDisabledServerPush => "sending PUSH_PROMISE to peer who disabled server push",
            Self::GoingAway => "connection is going away",
        })
    }
}

impl std::error::Error for UserError {}

impl From<StreamIdOverflow> for UserError {
    fn from(_: StreamIdOverflow) -> Self {
        Self::OverflowedStreamId
    }
}
