use std::fmt;
use std::io;

use bytes::Bytes;

use crate::h2::codec::UserError;
use crate::h2::frame::{Reason, StreamId};

/// Either an HTTP/2 reason at stream or connection scope, an I/O error, or
/// a local user error.
#[derive(Clone, Debug)]
pub enum Error {
    /// One stream aborts with RST_STREAM; the connection lives.
    Reset(StreamId, Reason, Initiator),
    /// The whole connection fails with GOAWAY.
    GoAway(Bytes, Reason, Initiator),
    /// The transport failed underneath the engine.
    Io(io::ErrorKind, Option<String>),
    /// The local caller misused the engine.
    User(UserError),
}

/// Who initiated the error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Initiator {
    User,
    Library,
    Remote,
}

impl Error {
    pub(crate) fn is_local(&self) -> bool {
        match self {
            Self::Reset(_, _, initiator) | Self::GoAway(_, _, initiator) => initiator.is_local(),
            Self::Io(..) | Self::User(_) => true,
        }
    }

    /// The reason code, when one applies.
    #[must_use]
    pub fn reason(&self) -> Option<Reason> {
        match self {
            Self::Reset(_, reason, _) | Self::GoAway(_, reason, _) => Some(*reason),
            Self::Io(..) | Self::User(_) => None,
        }
    }

    /// True for stream-scoped errors that leave the connection usable.
    #[must_use]
    pub fn is_stream_error(&self) -> bool {
        matches!(self, Self::Reset(..))
    }

    pub(crate) fn library_reset(stream_id: StreamId, reason: Reason) -> Self {
        Self::Reset(stream_id, reason, Initiator::Library)
    }

    pub(crate) fn library_go_away(reason: Reason) -> Self {
        Self::GoAway(Bytes::new(), reason, Initiator::Library)
    }

    pub(crate) fn remote_reset(stream_id: StreamId, reason: Reason) -> Self {
        Self::Reset(stream_id, reason, Initiator::Remote)
    }

    pub(crate) fn remote_go_away(debug_data: Bytes, reason: Reason) -> Self {
        Self::GoAway(debug_data, reason, Initiator::Remote)
    }
}

impl Initiator {
    fn is_local(self) -> bool {
        match self {
            Self::User | Self::Library => true,
            Self::Remote => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reset(_, reason, _) | Self::GoAway(_, reason, _) => reason.fmt(fmt),
            Self::Io(_, Some(inner)) => inner.fmt(fmt),
            Self::Io(kind, None) => io::Error::from(*kind).fmt(fmt),
            Self::User(err) => err.fmt(fmt),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(src: io::Error) -> Self {
        Self::Io(src.kind(), src.get_ref().map(|inner| inner.to_string()))
    }
}

impl From<UserError> for Error {
    fn from(src: UserError) -> Self {
        Self::User(src)
    }
}
