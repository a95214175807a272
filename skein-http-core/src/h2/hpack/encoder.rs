use bytes::{BufMut, BytesMut};
use tracing::trace;

use super::huffman;
use super::table::{self, Table};
use super::Header;

/// Encodes header blocks, maintaining the outbound dynamic table.
#[derive(Debug)]
pub struct Encoder {
    table: Table,
    /// A pending table resize to announce at the head of the next block.
    /// Shrinking then growing within one interval must announce both
    /// (the minimum first), per RFC 7541 §4.2.
    size_update: Option<SizeUpdate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SizeUpdate {
    One(usize),
    Two(usize, usize), // min, max
}

impl Encoder {
    pub fn new(max_size: usize) -> Self {
        Self {
            table: Table::new(max_size),
            size_update: None,
        }
    }

    /// Queues a maximum-size change (from the peer's
    /// SETTINGS_HEADER_TABLE_SIZE); applied and announced with the next
    /// block.
    pub fn update_max_size(&mut self, val: usize) {
        match self.size_update {
            Some(SizeUpdate::One(old)) if val != old => {
                self.size_update = Some(if val > old {
                    SizeUpdate::Two(old, val)
                } else {
                    SizeUpdate::One(val)
                });
            }
            Some(SizeUpdate::Two(min, _)) => {
                self.size_update = Some(if val < min {
                    SizeUpdate::One(val)
                } else {
                    SizeUpdate::Two(min, val)
                });
            }
            None if val != self.table.max_size() => {
                self.size_update = Some(SizeUpdate::One(val));
            }
            _ => {}
        }
    }

    /// Encodes a whole header list into `dst`.
    pub fn encode<I>(&mut self, headers: I, dst: &mut BytesMut)
    where
        I: IntoIterator<Item = Header>,
    {
        if let Some(update) = self.size_update.take() {
            match update {
                SizeUpdate::One(val) => {
                    self.table.set_max_size(val);
                    encode_size_update(val, dst);
                }
                SizeUpdate::Two(min, max) => {
                    self.table.set_max_size(min);
                    self.table.set_max_size(max);
                    encode_size_update(min, dst);
                    encode_size_update(max, dst);
                }
            }
        }

        for header in headers {
            self.encode_header(&header, dst);
        }
    }

    fn encode_header(&mut self, header: &Header, dst: &mut BytesMut) {
        // Exact-match lookup first: static table, then dynamic.
        if let Some(index) = table::static_full_index(header) {
            trace!("encode: static indexed {index}");
            encode_int(index, 7, 0x80, dst);
            return;
        }
        if !header.is_sensitive() {
            if let Some(pos) = self.table.full_index(header) {
                let index = table::STATIC_TABLE_LEN + 1 + pos;
                trace!("encode: dynamic indexed {index}");
                encode_int(index, 7, 0x80, dst);
                return;
            }
        }

        let name_index = table::static_name_index(header).or_else(|| {
            self.table
                .name_index(header)
                .map(|pos| table::STATIC_TABLE_LEN + 1 + pos)
        });

        if header.is_sensitive() {
            // Never-indexed literal: `0001xxxx`, 4-bit name prefix.
            encode_literal(name_index, header, 4, 0x10, dst);
            return;
        }

        if header.skip_value_index() {
            // Without indexing: `0000xxxx`.
            encode_literal(name_index, header, 4, 0x00, dst);
            return;
        }

        // Literal with incremental indexing: `01xxxxxx`; the pair enters
        // the dynamic table.
        encode_literal(name_index, header, 6, 0x40, dst);
        self.table.insert(header.clone());
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(crate::h2::frame::DEFAULT_SETTINGS_HEADER_TABLE_SIZE)
    }
}

fn encode_literal(
    name_index: Option<usize>,
    header: &Header,
    prefix: u8,
    flags: u8,
    dst: &mut BytesMut,
) {
    match name_index {
        Some(index) => encode_int(index, prefix, flags, dst),
        None => {
            encode_int(0, prefix, flags, dst);
            encode_string(header.name().as_slice(), dst);
        }
    }
    encode_string(header.value_slice(), dst);
}

fn encode_size_update(val: usize, dst: &mut BytesMut) {
    encode_int(val, 5, 0b0010_0000, dst);
}

/// Encodes a string literal, choosing Huffman only when strictly shorter.
fn encode_string(val: &[u8], dst: &mut BytesMut) {
    let huff_len = huffman::encoded_len(val);
    if huff_len < val.len() {
        encode_int(huff_len, 7, 0x80, dst);
        huffman::encode(val, dst);
    } else {
        encode_int(val.len(), 7, 0x00, dst);
        dst.put_slice(val);
    }
}

/// Encodes a prefix integer ([RFC 7541 §5.1]): value in the low `prefix`
/// bits when it fits, else all-ones plus base-128 continuation bytes.
///
/// [RFC 7541 §5.1]: https://httpwg.org/specs/rfc7541.html#integer.representation
pub(super) fn encode_int(mut value: usize, prefix: u8, flags: u8, dst: &mut BytesMut) {
    debug_assert!((1..=8).contains(&prefix));
    let mask: usize = (1 << prefix) - 1;

    if value < mask {
        dst.put_u8(flags | value as u8);
        return;
    }

    dst.put_u8(flags | mask as u8);
    value -= mask;
    while value >= 128 {
        dst.put_u8(0x80 | (value & 0x7f) as u8);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}
