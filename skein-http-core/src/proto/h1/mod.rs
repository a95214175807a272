//! The HTTP/1 codec.
//!
//! [`role::Client`] and [`role::Server`] implement the two sides of the
//! transaction: parsing what comes in and encoding what goes out. Bodies
//! are framed by [`decode::Decoder`] and [`encode::Encoder`]; both are
//! buffer-in / buffer-out so the connection driver owns all I/O.

pub(crate) mod decode;
pub(crate) mod encode;
pub(crate) mod role;

use std::fmt;

use http::Method;

use crate::proto::{BodyLength, DecodedLength, MessageHead};

pub(crate) use self::decode::{Decoded, Decoder};
pub(crate) use self::encode::Encoder;

pub(crate) const DEFAULT_MAX_HEADERS: usize = 100;

/// One side of an HTTP/1 transaction.
pub(crate) trait Http1Transaction {
    type Incoming: Default;
    type Outgoing: Default;

    fn parse(buf: &mut bytes::BytesMut, ctx: ParseContext<'_>) -> ParseResult<Self::Incoming>;
    fn encode(msg: Encode<'_, Self::Outgoing>, dst: &mut Vec<u8>) -> Result<Encoder, Parse>;
}

pub(crate) type ParseResult<T> = Result<Option<ParsedMessage<T>>, Parse>;

#[derive(Debug)]
pub(crate) struct ParsedMessage<T> {
    pub(crate) head: MessageHead<T>,
    pub(crate) decode: DecodedLength,
    pub(crate) keep_alive: bool,
    pub(crate) wants_upgrade: bool,
}

pub(crate) struct ParseContext<'a> {
    /// Method of the request this message answers (client side only);
    /// HEAD and CONNECT change response body framing.
    pub(crate) req_method: Option<&'a Method>,
    /// Promote a version-less start line to HTTP/0.9 instead of erroring.
    pub(crate) allow_http09: bool,
}

/// Passed to [`Http1Transaction::encode`].
pub(crate) struct Encode<'a, S> {
    pub(crate) head: &'a MessageHead<S>,
    pub(crate) body: Option<BodyLength>,
    pub(crate) keep_alive: bool,
    /// Request target already rendered per the default-path policy
    /// (client side only).
    pub(crate) target: Option<&'a str>,
    /// Emit caller-supplied header names lowercased instead of as
    /// supplied.
    pub(crate) lowercase_headers: bool,
    /// Emit the codec's own header lines (`host:`, `content-length:`,
    /// ...) in lowercase.
    pub(crate) small_header_case: bool,
    /// Error out on a rejected header instead of skipping it.
    pub(crate) invalid_header_is_error: bool,
}

/// Why an HTTP/1 message could not be parsed or encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parse {
    Method,
    Uri,
    Version,
    Header,
    Status,
    Chunk,
    TooLarge,
    Internal,
}

impl fmt::Display for Parse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Method => "invalid method",
            Self::Uri => "invalid request target",
            Self::Version => "invalid HTTP version",
            Self::Header => "invalid header",
            Self::Status => "invalid status line",
            Self::Chunk => "invalid chunked encoding",
            Self::TooLarge => "message head too large",
            Self::Internal => "internal parser failure",
        })
    }
}

impl std::error::Error for Parse {}

impl From<httparse::Error> for Parse {
    fn from(err: httparse::Error) -> Self {
        match err {
            httparse::Error::HeaderName
            | httparse::Error::HeaderValue
            | httparse::Error::NewLine
            | httparse::Error::Token => Self::Header,
            httparse::Error::Status => Self::Status,
            httparse::Error::TooManyHeaders => Self::TooLarge,
            httparse::Error::Version => Self::Version,
        }
    }
}
