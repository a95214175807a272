use std::fmt;
use std::io::Cursor;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::{Method, StatusCode, header};
use tracing::trace;

use super::{Error, Head, Kind, StreamDependency, StreamId, util};
use crate::h2::hpack::{self, BytesStr};
use crate::headers::{OrderedHeaders, OriginalName};

/// Encode target for header frames: the write buffer capped at the peer's
/// max frame size, so an oversized block spills into CONTINUATIONs.
pub(crate) type EncodeBuf<'a> = bytes::buf::Limit<&'a mut BytesMut>;

const END_STREAM: u8 = 0x1;
const END_HEADERS: u8 = 0x4;
const PADDED: u8 = 0x8;
const PRIORITY: u8 = 0x20;
const ALL: u8 = END_STREAM | END_HEADERS | PADDED | PRIORITY;

/// A HEADERS frame: a request, response or trailer block on one stream.
#[derive(Eq, PartialEq)]
pub struct Headers {
    stream_id: StreamId,

    /// Dependency advice carried by the PRIORITY flag, parse side only.
    stream_dep: Option<StreamDependency>,

    header_block: HeaderBlock,

    flags: HeadersFlag,
}

#[derive(Copy, Clone, Eq, PartialEq)]
pub struct HeadersFlag(u8);

/// A PUSH_PROMISE frame: reserves `promised_id` with a request header block.
#[derive(Eq, PartialEq)]
pub struct PushPromise {
    stream_id: StreamId,
    promised_id: StreamId,
    header_block: HeaderBlock,
    flags: PushPromiseFlag,
}

#[derive(Copy, Clone, Eq, PartialEq)]
pub struct PushPromiseFlag(u8);

/// The remainder of a header block that did not fit one frame.
#[derive(Debug)]
pub struct Continuation {
    stream_id: StreamId,
    header_block: EncodingHeaderBlock,
}

/// The pseudo-headers of a block. Emitted before any regular field.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct Pseudo {
    // Request
    pub method: Option<Method>,
    pub scheme: Option<BytesStr>,
    pub authority: Option<BytesStr>,
    pub path: Option<BytesStr>,

    // Response
    pub status: Option<StatusCode>,
}

#[derive(Debug)]
struct HeaderBlock {
    /// Decoded regular fields, insertion ordered.
    fields: OrderedHeaders,

    /// Set when decoding blew past the max header list size.
    is_over_size: bool,

    pseudo: Pseudo,
}

#[derive(Debug)]
struct EncodingHeaderBlock {
    hpack: Bytes,
}

// ===== impl Headers =====

impl Headers {
    pub fn new(stream_id: StreamId, pseudo: Pseudo, fields: OrderedHeaders) -> Self {
        Self {
            stream_id,
            stream_dep: None,
            header_block: HeaderBlock {
                fields,
                is_over_size: false,
                pseudo,
            },
            flags: HeadersFlag::default(),
        }
    }

    /// A trailer block: no pseudo headers, END_STREAM implied.
    #[must_use]
    pub fn trailers(stream_id: StreamId, fields: OrderedHeaders) -> Self {
        let mut flags = HeadersFlag::default();
        flags.set_end_stream();

        Self {
            stream_id,
            stream_dep: None,
            header_block: HeaderBlock {
                fields,
                is_over_size: false,
                pseudo: Pseudo::default(),
            },
            flags,
        }
    }

    /// Loads the frame head and strips padding/priority, leaving the still
    /// HPACK-encoded fragment in the returned buffer. Decoding happens in
    /// [`Headers::load_hpack`] once END_HEADERS is reached.
    pub fn load(head: Head, mut src: BytesMut) -> Result<(Self, BytesMut), Error> {
        let flags = HeadersFlag(head.flag());
        let mut pad = 0;

        trace!("loading headers; flags={flags:?}");

        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        if flags.is_padded() {
            if src.is_empty() {
                return Err(Error::MalformedMessage);
            }
            pad = src[0] as usize;
            src.advance(1);
        }

        let stream_dep = if flags.is_priority() {
            if src.len() < 5 {
                return Err(Error::MalformedMessage);
            }
            let stream_dep = StreamDependency::load(&src[..5])?;

            if stream_dep.dependency_id == head.stream_id() {
                return Err(Error::InvalidDependencyId);
            }

            src.advance(5);
            Some(stream_dep)
        } else {
            None
        };

        if pad > 0 {
            if pad >= src.len() + 1 {
                return Err(Error::TooMuchPadding);
            }
            let len = src.len() - pad;
            src.truncate(len);
        }

        let headers = Self {
            stream_id: head.stream_id(),
            stream_dep,
            header_block: HeaderBlock {
                fields: OrderedHeaders::new(),
                is_over_size: false,
                pseudo: Pseudo::default(),
            },
            flags,
        };

        Ok((headers, src))
    }

    pub fn load_hpack(
        &mut self,
        src: &mut BytesMut,
        max_header_list_size: usize,
        decoder: &mut hpack::Decoder,
    ) -> Result<(), Error> {
        self.header_block.load(src, max_header_list_size, decoder)
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_end_headers(&self) -> bool {
        self.flags.is_end_headers()
    }

    pub fn set_end_headers(&mut self) {
        self.flags.set_end_headers();
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags.is_end_stream()
    }

    pub fn set_end_stream(&mut self) {
        self.flags.set_end_stream();
    }

    pub fn is_over_size(&self) -> bool {
        self.header_block.is_over_size
    }

    /// Whether this block carries a 1xx status.
    pub fn is_informational(&self) -> bool {
        self.header_block.pseudo.is_informational()
    }

    pub fn pseudo(&self) -> &Pseudo {
        &self.header_block.pseudo
    }

    pub fn fields(&self) -> &OrderedHeaders {
        &self.header_block.fields
    }

    pub fn into_parts(self) -> (Pseudo, OrderedHeaders) {
        (self.header_block.pseudo, self.header_block.fields)
    }

    pub(crate) fn encode(
        self,
        encoder: &mut hpack::Encoder,
        dst: &mut EncodeBuf<'_>,
    ) -> Option<Continuation> {
        // The flag is set up front and cleared on the wire when the block
        // spills over into CONTINUATION frames.
        debug_assert!(self.flags.is_end_headers());

        let head = self.head();
        self.header_block
            .into_encoding(encoder)
            .encode(head, dst, |_| {})
    }

    fn head(&self) -> Head {
        Head::new(Kind::Headers, self.flags.into(), self.stream_id)
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("Headers");
        builder
            .field("stream_id", &self.stream_id)
            .field("flags", &self.flags);

        if let Some(ref dep) = self.stream_dep {
            builder.field("stream_dep", dep);
        }

        // `fields` and `pseudo` purposefully not included
        builder.finish()
    }
}

// ===== impl PushPromise =====

impl PushPromise {
    pub fn new(
        stream_id: StreamId,
        promised_id: StreamId,
        pseudo: Pseudo,
        fields: OrderedHeaders,
    ) -> Self {
        Self {
            stream_id,
            promised_id,
            header_block: HeaderBlock {
                fields,
                is_over_size: false,
                pseudo,
            },
            flags: PushPromiseFlag::default(),
        }
    }

    pub fn load(head: Head, mut src: BytesMut) -> Result<(Self, BytesMut), Error> {
        let flags = PushPromiseFlag(head.flag());
        let mut pad = 0;

        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        if flags.is_padded() {
            if src.is_empty() {
                return Err(Error::MalformedMessage);
            }
            pad = src[0] as usize;
            src.advance(1);
        }

        if src.len() < 4 {
            return Err(Error::MalformedMessage);
        }
        let (promised_id, _) = StreamId::parse(&src[..4]);
        src.advance(4);

        if pad > 0 {
            if pad >= src.len() + 1 {
                return Err(Error::TooMuchPadding);
            }
            let len = src.len() - pad;
            src.truncate(len);
        }

        let frame = Self {
            stream_id: head.stream_id(),
            promised_id,
            header_block: HeaderBlock {
                fields: OrderedHeaders::new(),
                is_over_size: false,
                pseudo: Pseudo::default(),
            },
            flags,
        };
        Ok((frame, src))
    }

    pub fn load_hpack(
        &mut self,
        src: &mut BytesMut,
        max_header_list_size: usize,
        decoder: &mut hpack::Decoder,
    ) -> Result<(), Error> {
        self.header_block.load(src, max_header_list_size, decoder)
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn promised_id(&self) -> StreamId {
        self.promised_id
    }

    pub fn is_end_headers(&self) -> bool {
        self.flags.is_end_headers()
    }

    pub fn set_end_headers(&mut self) {
        self.flags.set_end_headers();
    }

    pub fn is_over_size(&self) -> bool {
        self.header_block.is_over_size
    }

    pub fn into_parts(self) -> (Pseudo, OrderedHeaders) {
        (self.header_block.pseudo, self.header_block.fields)
    }

    pub(crate) fn encode(
        self,
        encoder: &mut hpack::Encoder,
        dst: &mut EncodeBuf<'_>,
    ) -> Option<Continuation> {
        debug_assert!(self.flags.is_end_headers());

        let head = self.head();
        let promised_id = self.promised_id;

        self.header_block
            .into_encoding(encoder)
            .encode(head, dst, |dst| {
                dst.put_u32(promised_id.into());
            })
    }

    fn head(&self) -> Head {
        Head::new(Kind::PushPromise, self.flags.into(), self.stream_id)
    }
}

impl fmt::Debug for PushPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushPromise")
            .field("stream_id", &self.stream_id)
            .field("promised_id", &self.promised_id)
            .field("flags", &self.flags)
            .finish()
    }
}

// ===== impl Continuation =====

impl Continuation {
    fn head(&self) -> Head {
        Head::new(Kind::Continuation, END_HEADERS, self.stream_id)
    }

    pub(crate) fn encode(self, dst: &mut EncodeBuf<'_>) -> Option<Self> {
        let head = self.head();
        self.header_block.encode(head, dst, |_| {})
    }
}

// ===== impl Pseudo =====

impl Pseudo {
    pub fn request(method: Method, scheme: &str, authority: &str, path: &str) -> Self {
        let path = if path.is_empty() {
            if method == Method::OPTIONS { "*" } else { "/" }
        } else {
            path
        };

        Self {
            method: Some(method),
            scheme: Some(BytesStr::from(scheme)),
            authority: Some(BytesStr::from(authority)),
            path: Some(BytesStr::from(path)),
            status: None,
        }
    }

    #[must_use]
    pub fn response(status: StatusCode) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Whether it has status 1xx.
    pub fn is_informational(&self) -> bool {
        self.status.is_some_and(|status| status.is_informational())
    }
}

// ===== impl EncodingHeaderBlock =====

impl EncodingHeaderBlock {
    fn encode<F>(mut self, head: Head, dst: &mut EncodeBuf<'_>, f: F) -> Option<Continuation>
    where
        F: FnOnce(&mut EncodeBuf<'_>),
    {
        let head_pos = dst.get_ref().len();

        // The frame length is unknown until the block is laid down, so the
        // head goes in with length zero and is patched afterwards.
        head.encode(0, dst);

        let payload_pos = dst.get_ref().len();

        f(dst);

        let continuation = if self.hpack.len() > dst.remaining_mut() {
            dst.put((&mut self.hpack).take(dst.remaining_mut()));

            Some(Continuation {
                stream_id: head.stream_id(),
                header_block: self,
            })
        } else {
            dst.put_slice(&self.hpack);
            None
        };

        let payload_len = (dst.get_ref().len() - payload_pos) as u64;
        let payload_len_be = payload_len.to_be_bytes();
        debug_assert!(payload_len_be[0..5].iter().all(|b| *b == 0));
        (dst.get_mut()[head_pos..head_pos + 3]).copy_from_slice(&payload_len_be[5..]);

        if continuation.is_some() {
            // The block continues, so END_HEADERS comes off this frame.
            debug_assert!(dst.get_ref()[head_pos + 4] & END_HEADERS == END_HEADERS);
            dst.get_mut()[head_pos + 4] -= END_HEADERS;
        }

        continuation
    }
}

// ===== impl HeaderBlock =====

impl HeaderBlock {
    fn load(
        &mut self,
        src: &mut BytesMut,
        max_header_list_size: usize,
        decoder: &mut hpack::Decoder,
    ) -> Result<(), Error> {
        let mut reg = !self.fields.is_empty();
        let mut malformed = false;
        let mut headers_size = self.calculate_header_list_size();

        macro_rules! set_pseudo {
            ($field:ident, $val:expr, $len:expr) => {{
                if reg {
                    trace!("load_hpack; header malformed -- pseudo not at head of block");
                    malformed = true;
                } else if self.pseudo.$field.is_some() {
                    trace!("load_hpack; header malformed -- repeated pseudo");
                    malformed = true;
                } else {
                    headers_size += decoded_header_size(stringify!($field).len() + 1, $len);
                    if headers_size < max_header_list_size {
                        self.pseudo.$field = Some($val);
                    } else if !self.is_over_size {
                        trace!("load_hpack; header list size over max");
                        self.is_over_size = true;
                    }
                }
            }};
        }

        let mut cursor = Cursor::new(src);

        // A malformed block is a stream-level problem, but the hpack state
        // is connection level: decoding must run to completion either way
        // to keep the dynamic table in sync for other streams.
        let res = decoder.decode(&mut cursor, |header| match header {
            hpack::Header::Field { name, value } => {
                // Connection-level fields have no place in HTTP/2.
                if name == header::CONNECTION
                    || name == header::TRANSFER_ENCODING
                    || name == header::UPGRADE
                    || name == "keep-alive"
                    || name == "proxy-connection"
                {
                    trace!("load_hpack; connection level header");
                    malformed = true;
                } else if name == header::TE && value != "trailers" {
                    trace!("load_hpack; TE header not set to trailers");
                    malformed = true;
                } else {
                    reg = true;
                    headers_size += decoded_header_size(name.as_str().len(), value.len());
                    if headers_size < max_header_list_size {
                        self.fields
                            .append_original(OriginalName::from(name), value);
                    } else if !self.is_over_size {
                        trace!("load_hpack; header list size over max");
                        self.is_over_size = true;
                    }
                }
            }
            hpack::Header::Authority(v) => {
                let len = v.len();
                set_pseudo!(authority, v, len);
            }
            hpack::Header::Method(v) => {
                let len = v.as_str().len();
                set_pseudo!(method, v, len);
            }
            hpack::Header::Scheme(v) => {
                let len = v.len();
                set_pseudo!(scheme, v, len);
            }
            hpack::Header::Path(v) => {
                let len = v.len();
                set_pseudo!(path, v, len);
            }
            hpack::Header::Status(v) => {
                set_pseudo!(status, v, 3);
            }
        });

        if let Err(e) = res {
            trace!("hpack decoding error; err={e:?}");
            return Err(Error::Hpack(e));
        }

        if malformed {
            trace!("malformed message");
            return Err(Error::MalformedMessage);
        }

        Ok(())
    }

    fn into_encoding(self, encoder: &mut hpack::Encoder) -> EncodingHeaderBlock {
        let mut hpack = BytesMut::new();
        let headers = HeaderIter {
            pseudo: Some(self.pseudo),
            fields: self
                .fields
                .iter()
                .map(|(name, value)| (name.name().clone(), value.clone()))
                .collect::<Vec<_>>()
                .into_iter(),
        };

        encoder.encode(headers, &mut hpack);

        EncodingHeaderBlock {
            hpack: hpack.freeze(),
        }
    }

    /// The uncompressed size of the block: name + value + 32 per field
    /// ([RFC 7540 §6.5.2]).
    ///
    /// [RFC 7540 §6.5.2]: http://httpwg.org/specs/rfc7540.html#SETTINGS_MAX_HEADER_LIST_SIZE
    fn calculate_header_list_size(&self) -> usize {
        macro_rules! pseudo_size {
            ($name:ident, $len:expr) => {
                self.pseudo
                    .$name
                    .as_ref()
                    .map(|_| decoded_header_size(stringify!($name).len() + 1, $len))
                    .unwrap_or(0)
            };
        }

        let method_len = self.pseudo.method.as_ref().map_or(0, |m| m.as_str().len());
        let scheme_len = self.pseudo.scheme.as_ref().map_or(0, BytesStr::len);
        let authority_len = self.pseudo.authority.as_ref().map_or(0, BytesStr::len);
        let path_len = self.pseudo.path.as_ref().map_or(0, BytesStr::len);

        pseudo_size!(method, method_len)
            + pseudo_size!(scheme, scheme_len)
            + pseudo_size!(authority, authority_len)
            + pseudo_size!(path, path_len)
            + pseudo_size!(status, 3)
            + self
                .fields
                .iter()
                .map(|(name, value)| decoded_header_size(name.name().as_str().len(), value.len()))
                .sum::<usize>()
    }
}

impl PartialEq for HeaderBlock {
    fn eq(&self, other: &Self) -> bool {
        self.is_over_size == other.is_over_size
            && self.pseudo == other.pseudo
            && self
                .fields
                .iter()
                .map(|(n, v)| (n.name().clone(), v.clone()))
                .eq(other.fields.iter().map(|(n, v)| (n.name().clone(), v.clone())))
    }
}

impl Eq for HeaderBlock {}

fn decoded_header_size(name: usize, value: usize) -> usize {
    name + value + 32
}

/// Yields the pseudo headers, in their required leading position, then the
/// regular fields in insertion order.
struct HeaderIter {
    pseudo: Option<Pseudo>,
    fields: std::vec::IntoIter<(http::HeaderName, http::HeaderValue)>,
}

impl Iterator for HeaderIter {
    type Item = hpack::Header;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(ref mut pseudo) = self.pseudo {
            if let Some(method) = pseudo.method.take() {
                return Some(hpack::Header::Method(method));
            }
            if let Some(scheme) = pseudo.scheme.take() {
                return Some(hpack::Header::Scheme(scheme));
            }
            if let Some(authority) = pseudo.authority.take() {
                return Some(hpack::Header::Authority(authority));
            }
            if let Some(path) = pseudo.path.take() {
                return Some(hpack::Header::Path(path));
            }
            if let Some(status) = pseudo.status.take() {
                return Some(hpack::Header::Status(status));
            }
        }

        self.pseudo = None;

        self.fields
            .next()
            .map(|(name, value)| hpack::Header::Field { name, value })
    }
}

// ===== impl HeadersFlag =====

impl HeadersFlag {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn load(bits: u8) -> Self {
        Self(bits & ALL)
    }

    pub fn is_end_stream(self) -> bool {
        self.0 & END_STREAM == END_STREAM
    }

    pub fn set_end_stream(&mut self) {
        self.0 |= END_STREAM;
    }

    pub fn is_end_headers(self) -> bool {
        self.0 & END_HEADERS == END_HEADERS
    }

    pub fn set_end_headers(&mut self) {
        self.0 |= END_HEADERS;
    }

    pub fn is_padded(self) -> bool {
        self.0 & PADDED == PADDED
    }

    pub fn is_priority(self) -> bool {
        self.0 & PRIORITY == PRIORITY
    }
}

impl Default for HeadersFlag {
    /// An `END_HEADERS` flag set; continuation splitting clears it on the
    /// wire when needed.
    fn default() -> Self {
        Self(END_HEADERS)
    }
}

impl From<HeadersFlag> for u8 {
    fn from(src: HeadersFlag) -> Self {
        src.0
    }
}

impl fmt::Debug for HeadersFlag {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        util::debug_flags(fmt, self.0)
            .flag_if(self.is_end_headers(), "END_HEADERS")
            .flag_if(self.is_end_stream(), "END_STREAM")
            .flag_if(self.is_padded(), "PADDED")
            .flag_if(self.is_priority(), "PRIORITY")
            .finish()
    }
}

// ===== impl PushPromiseFlag =====

impl PushPromiseFlag {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn load(bits: u8) -> Self {
        Self(bits & ALL)
    }

    pub fn is_end_headers(self) -> bool {
        self.0 & END_HEADERS == END_HEADERS
    }

    pub fn set_end_headers(&mut self) {
        self.0 |= END_HEADERS;
    }

    pub fn is_padded(self) -> bool {
        self.0 & PADDED == PADDED
    }
}

impl Default for PushPromiseFlag {
    fn default() -> Self {
        Self(END_HEADERS)
    }
}

impl From<PushPromiseFlag> for u8 {
    fn from(src: PushPromiseFlag) -> Self {
        src.0
    }
}

impl fmt::Debug for PushPromiseFlag {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        util::debug_flags(fmt, self.0)
            .flag_if(self.is_end_headers(), "END_HEADERS")
            .flag_if(self.is_padded(), "PADDED")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_without_path_gets_asterisk() {
        let pseudo = Pseudo::request(Method::OPTIONS, "http", "example.com", "");
        assert_eq!(pseudo.path.as_deref(), Some("*"));
    }

    #[test]
    fn empty_path_defaults_to_root() {
        let pseudo = Pseudo::request(Method::GET, "https", "example.com", "");
        assert_eq!(pseudo.path.as_deref(), Some("/"));
    }
}
