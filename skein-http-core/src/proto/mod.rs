//! Protocol-internal message types shared by the codecs.

pub mod h1;

use http::{Method, Uri, Version};

use crate::headers::OrderedHeaders;
use crate::proto::h1::Parse;

/// An incoming or outgoing message head.
#[derive(Debug, Default)]
pub(crate) struct MessageHead<S> {
    pub(crate) version: Version,
    /// Request line or status code.
    pub(crate) subject: S,
    pub(crate) headers: OrderedHeaders,
}

/// The subject line of a request.
#[derive(Debug)]
pub(crate) struct RequestLine(pub(crate) Method, pub(crate) Uri);

impl Default for RequestLine {
    fn default() -> Self {
        Self(Method::GET, Uri::default())
    }
}

/// The length of an outgoing body, as told by the caller.
#[derive(Debug, Clone, Copy)]
pub(crate) enum BodyLength {
    Known(u64),
    /// Close-delimited or chunked, decided by the role.
    Unknown,
}

/// The decoded length of an incoming body.
///
/// Sentinel values at the top of the `u64` range mark the non-exact modes,
/// so the common sized case stays a plain integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DecodedLength(u64);

impl DecodedLength {
    pub(crate) const CLOSE_DELIMITED: Self = Self(u64::MAX);
    pub(crate) const CHUNKED: Self = Self(u64::MAX - 1);
    pub(crate) const ZERO: Self = Self(0);

    /// Largest representable exact length.
    const MAX_LEN: u64 = u64::MAX - 2;

    pub(crate) fn checked_new(len: u64) -> Result<Self, Parse> {
        if len <= Self::MAX_LEN {
            Ok(Self(len))
        } else {
            Err(Parse::Header)
        }
    }

    pub(crate) fn is_exact(self) -> bool {
        self != Self::CHUNKED && self != Self::CLOSE_DELIMITED
    }

    /// The exact length; callers must have checked [`Self::is_exact`].
    pub(crate) fn into_len(self) -> u64 {
        debug_assert!(self.is_exact());
        self.0
    }
}
