use std::fmt;

use skein_net::Cancelled;

use crate::proto::h1::Parse;

/// The errors of one HTTP exchange, grouped by level.
///
/// Transport failures keep their [`skein_net::Error`]; HTTP/1 failures
/// carry the parse taxonomy; HTTP/2 failures carry the stream/connection
/// error with its RFC 7540 reason code.
#[derive(Debug)]
pub struct Error {
    kind: Kind,
}

#[derive(Debug)]
pub(crate) enum Kind {
    /// HTTP/1 message could not be parsed or encoded.
    Parse(Parse),
    /// The body ended before its framing said it would.
    IncompleteBody,
    /// The operation is not legal in the exchange's current phase.
    InvalidPhase,
    /// An unexpected status code (e.g. a non-101 reply to an upgrade).
    UnexpectedStatus,
    /// TLS completed without an acceptable ALPN protocol.
    AlpnFailed,
    /// HTTP/2 stream or connection error.
    Http2(crate::h2::Error),
    /// Failure below the HTTP layer.
    Transport(skein_net::Error),
}

/// The coarse HTTP error taxonomy kept on the request context, so the
/// exchange stays inspectable after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    InvalidRequestFormat,
    ReadBody,
    InvalidHeader,
    InvalidPhase,
    InvalidStatus,
}

impl Error {
    pub(crate) fn new(kind: Kind) -> Self {
        Self { kind }
    }

    pub(crate) fn new_parse(parse: Parse) -> Self {
        Self::new(Kind::Parse(parse))
    }

    pub(crate) fn new_incomplete_body() -> Self {
        Self::new(Kind::IncompleteBody)
    }

    pub(crate) fn new_invalid_phase() -> Self {
        Self::new(Kind::InvalidPhase)
    }

    pub(crate) fn new_unexpected_status() -> Self {
        Self::new(Kind::UnexpectedStatus)
    }

    pub(crate) fn new_alpn_failed() -> Self {
        Self::new(Kind::AlpnFailed)
    }

    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self.kind, Kind::Transport(_))
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(&self.kind, Kind::Transport(e) if e.is_cancelled())
    }

    #[must_use]
    pub fn is_parse(&self) -> bool {
        matches!(self.kind, Kind::Parse(_))
    }

    #[must_use]
    pub fn is_alpn_failure(&self) -> bool {
        matches!(self.kind, Kind::AlpnFailed)
    }

    /// The HTTP/2 reason code, when this is an HTTP/2 protocol error.
    #[must_use]
    pub fn h2_reason(&self) -> Option<crate::h2::frame::Reason> {
        match &self.kind {
            Kind::Http2(e) => e.reason(),
            _ => None,
        }
    }

    /// Classifies the error into the context-level taxonomy, `None` for
    /// transport-level failures (reported separately).
    #[must_use]
    pub fn http_kind(&self) -> Option<HttpErrorKind> {
        match &self.kind {
            Kind::Parse(Parse::Header) => Some(HttpErrorKind::InvalidHeader),
            Kind::Parse(Parse::Status) => Some(HttpErrorKind::InvalidStatus),
            Kind::Parse(Parse::Chunk) => Some(HttpErrorKind::ReadBody),
            Kind::Parse(_) => Some(HttpErrorKind::InvalidRequestFormat),
            Kind::IncompleteBody => Some(HttpErrorKind::ReadBody),
            Kind::InvalidPhase => Some(HttpErrorKind::InvalidPhase),
            Kind::UnexpectedStatus | Kind::AlpnFailed => Some(HttpErrorKind::InvalidStatus),
            Kind::Http2(_) | Kind::Transport(_) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Parse(p) => write!(f, "invalid message: {p}"),
            Kind::IncompleteBody => f.write_str("body ended before the message framing said so"),
            Kind::InvalidPhase => f.write_str("operation invalid in the current exchange phase"),
            Kind::UnexpectedStatus => f.write_str("unexpected status code"),
            Kind::AlpnFailed => f.write_str("tls handshake negotiated no acceptable protocol"),
            Kind::Http2(e) => e.fmt(f),
            Kind::Transport(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            Kind::Http2(e) => Some(e),
            Kind::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Parse> for Error {
    fn from(p: Parse) -> Self {
        Self::new_parse(p)
    }
}

impl From<crate::h2::Error> for Error {
    fn from(e: crate::h2::Error) -> Self {
        Self::new(Kind::Http2(e))
    }
}

impl From<skein_net::Error> for Error {
    fn from(e: skein_net::Error) -> Self {
        Self::new(Kind::Transport(e))
    }
}

impl From<Cancelled> for Error {
    fn from(c: Cancelled) -> Self {
        Self::new(Kind::Transport(skein_net::Error::Cancelled(c)))
    }
}
