use std::fmt;
use std::io::Cursor;

use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

use super::huffman;
use super::table::{self, Table};
use super::Header;

/// Decodes a header block, maintaining the inbound dynamic table.
#[derive(Debug)]
pub struct Decoder {
    /// Upper bound the peer may move the table size to (our announced
    /// SETTINGS_HEADER_TABLE_SIZE).
    allowed_max: usize,
    table: Table,
}

/// Decoding failures. All of them elevate to COMPRESSION_ERROR at the
/// connection level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderError {
    InvalidRepresentation,
    InvalidIntegerPrefix,
    InvalidTableIndex,
    InvalidHuffmanCode,
    InvalidUtf8,
    InvalidStatusCode,
    InvalidPseudoheader,
    InvalidHeaderName,
    InvalidHeaderValue,
    InvalidMaxDynamicSize,
    IntegerOverflow,
    NeedMore(NeedMore),
}

/// The input ended inside an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeedMore {
    UnexpectedEndOfStream,
    IntegerUnderflow,
    StringUnderflow,
}

enum Representation {
    /// `1xxxxxxx`: fully indexed header field.
    Indexed,
    /// `01xxxxxx`: literal, added to the dynamic table.
    LiteralWithIndexing,
    /// `0000xxxx`: literal, not added to the table.
    LiteralWithoutIndexing,
    /// `0001xxxx`: literal that intermediaries must never index.
    LiteralNeverIndexed,
    /// `001xxxxx`: dynamic table size update.
    SizeUpdate,
}

impl Decoder {
    pub fn new(max_size: usize) -> Self {
        Self {
            allowed_max: max_size,
            table: Table::new(max_size),
        }
    }

    /// Updates the announced SETTINGS_HEADER_TABLE_SIZE bound.
    pub fn queue_size_update(&mut self, size: usize) {
        self.allowed_max = size;
        if self.table.max_size() > size {
            self.table.set_max_size(size);
        }
    }

    #[cfg(test)]
    pub(crate) fn table_size(&self) -> usize {
        self.table.size()
    }

    /// Decodes a complete header block, invoking `f` per header in block
    /// order.
    pub fn decode<F>(
        &mut self,
        src: &mut Cursor<&mut BytesMut>,
        mut f: F,
    ) -> Result<(), DecoderError>
    where
        F: FnMut(Header),
    {
        while src.has_remaining() {
            let first = peek_u8(src)?;
            match Representation::load(first)? {
                Representation::Indexed => {
                    let index = decode_int(src, 7)?;
                    if index == 0 {
                        return Err(DecoderError::InvalidTableIndex);
                    }
                    trace!("decode: indexed; index={index}");
                    f(self.get(index)?);
                }
                Representation::LiteralWithIndexing => {
                    trace!("decode: literal with indexing");
                    let entry = self.decode_literal(src, 6, false)?;
                    self.table.insert(entry.clone());
                    f(entry);
                }
                Representation::LiteralWithoutIndexing => {
                    trace!("decode: literal without indexing");
                    let entry = self.decode_literal(src, 4, false)?;
                    f(entry);
                }
                Representation::LiteralNeverIndexed => {
                    trace!("decode: literal never indexed");
                    let entry = self.decode_literal(src, 4, true)?;
                    f(entry);
                }
                Representation::SizeUpdate => {
                    let new_size = decode_int(src, 5)?;
                    if new_size > self.allowed_max {
                        return Err(DecoderError::InvalidMaxDynamicSize);
                    }
                    trace!("decode: size update; size={new_size}");
                    self.table.set_max_size(new_size);
                }
            }
        }
        Ok(())
    }

    fn decode_literal(
        &mut self,
        src: &mut Cursor<&mut BytesMut>,
        prefix: u8,
        sensitive: bool,
    ) -> Result<Header, DecoderError> {
        let name_index = decode_int(src, prefix)?;

        let entry = if name_index == 0 {
            let name = decode_string(src)?;
            let value = decode_string(src)?;
            Header::try_from_parts(&name, value, sensitive)?
        } else {
            let indexed = self.get(name_index)?;
            let value = decode_string(src)?;
            let mut entry = indexed.name().into_entry(value)?;
            if sensitive {
                if let Header::Field { value, .. } = &mut entry {
                    value.set_sensitive(true);
                }
            }
            entry
        };
        Ok(entry)
    }

    /// Resolves a 1-based index over the concatenated static + dynamic
    /// address space.
    fn get(&self, index: usize) -> Result<Header, DecoderError> {
        if index <= table::STATIC_TABLE_LEN {
            table::get_static(index)
        } else {
            self.table.get(index - table::STATIC_TABLE_LEN - 1).cloned()
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(crate::h2::frame::DEFAULT_SETTINGS_HEADER_TABLE_SIZE)
    }
}

impl Representation {
    fn load(byte: u8) -> Result<Self, DecoderError> {
        const INDEXED: u8 = 0b1000_0000;
        const LITERAL_WITH_INDEXING: u8 = 0b0100_0000;
        const SIZE_UPDATE_MASK: u8 = 0b1110_0000;
        const SIZE_UPDATE: u8 = 0b0010_0000;
        const LITERAL_MASK: u8 = 0b1111_0000;
        const LITERAL_NEVER_INDEXED: u8 = 0b0001_0000;

        if byte & INDEXED == INDEXED {
            Ok(Self::Indexed)
        } else if byte & LITERAL_WITH_INDEXING == LITERAL_WITH_INDEXING {
            Ok(Self::LiteralWithIndexing)
        } else if byte & SIZE_UPDATE_MASK == SIZE_UPDATE {
            Ok(Self::SizeUpdate)
        } else if byte & LITERAL_MASK == LITERAL_NEVER_INDEXED {
            Ok(Self::LiteralNeverIndexed)
        } else if byte & LITERAL_MASK == 0 {
            Ok(Self::LiteralWithoutIndexing)
        } else {
            Err(DecoderError::InvalidRepresentation)
        }
    }
}

fn peek_u8(buf: &Cursor<&mut BytesMut>) -> Result<u8, DecoderError> {
    buf.chunk()
        .first()
        .copied()
        .ok_or(DecoderError::NeedMore(NeedMore::UnexpectedEndOfStream))
}

/// Decodes a prefix integer ([RFC 7541 §5.1]): the low `prefix` bits of
/// the first byte, then base-128 continuation bytes, low bits first.
///
/// [RFC 7541 §5.1]: https://httpwg.org/specs/rfc7541.html#integer.representation
pub(super) fn decode_int<B: Buf>(buf: &mut B, prefix: u8) -> Result<usize, DecoderError> {
    debug_assert!((1..=8).contains(&prefix));

    // One continuation byte adds 7 bits; cap at the pointer width.
    const MAX_SHIFT: u32 = usize::BITS - 8;

    if !buf.has_remaining() {
        return Err(DecoderError::NeedMore(NeedMore::IntegerUnderflow));
    }

    let mask: usize = (1 << prefix) - 1;
    let mut ret = buf.get_u8() as usize & mask;
    if ret < mask {
        return Ok(ret);
    }

    let mut shift: u32 = 0;
    loop {
        if !buf.has_remaining() {
            return Err(DecoderError::NeedMore(NeedMore::IntegerUnderflow));
        }
        let byte = buf.get_u8();
        ret = (usize::from(byte & 0x7f) << shift)
            .checked_add(ret)
            .ok_or(DecoderError::IntegerOverflow)?;
        if byte & 0x80 == 0 {
            return Ok(ret);
        }
        shift += 7;
        if shift > MAX_SHIFT {
            return Err(DecoderError::IntegerOverflow);
        }
    }
}

/// Decodes a string literal: 7-bit prefix length with the high bit of the
/// first byte flagging Huffman coding.
fn decode_string(src: &mut Cursor<&mut BytesMut>) -> Result<Bytes, DecoderError> {
    const HUFF_FLAG: u8 = 0b1000_0000;

    let huff = peek_u8(src)? & HUFF_FLAG == HUFF_FLAG;
    let len = decode_int(src, 7)?;

    if len > src.remaining() {
        return Err(DecoderError::NeedMore(NeedMore::StringUnderflow));
    }

    let pos = src.position() as usize;
    let raw = &src.get_ref()[pos..pos + len];
    let decoded = if huff {
        let mut buf = BytesMut::with_capacity(len * 2);
        huffman::decode(raw, &mut buf)?;
        buf.freeze()
    } else {
        Bytes::copy_from_slice(raw)
    };
    src.advance(len);
    Ok(decoded)
}

impl fmt::Display for DecoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::InvalidRepresentation => "invalid representation prefix",
            Self::InvalidIntegerPrefix => "invalid integer prefix",
            Self::InvalidTableIndex => "index not present in the table",
            Self::InvalidHuffmanCode => "invalid huffman coding",
            Self::InvalidUtf8 => "string literal is not valid utf-8",
            Self::InvalidStatusCode => "invalid status code",
            Self::InvalidPseudoheader => "invalid pseudo-header",
            Self::InvalidHeaderName => "invalid header name",
            Self::InvalidHeaderValue => "invalid header value",
            Self::InvalidMaxDynamicSize => "size update beyond the announced bound",
            Self::IntegerOverflow => "integer exceeds the pointer width",
            Self::NeedMore(_) => "truncated header block",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for DecoderError {}
