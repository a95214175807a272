//! Huffman coding for HPACK string literals.
//!
//! Encoding walks the fixed table directly. Decoding walks a binary tree
//! materialized from the same table at first use: the table is the single
//! source of truth for both directions.

mod table;

use std::sync::OnceLock;

use bytes::{BufMut, BytesMut};

use self::table::ENCODE_TABLE;
use super::DecoderError;

const EOS: usize = 256;

#[derive(Default)]
struct Node {
    children: [Option<Box<Node>>; 2],
    symbol: Option<u16>,
}

fn tree() -> &'static Node {
    static TREE: OnceLock<Node> = OnceLock::new();
    TREE.get_or_init(|| {
        let mut root = Node::default();
        for (symbol, &(nbits, code)) in ENCODE_TABLE.iter().enumerate() {
            let mut node = &mut root;
            for i in (0..nbits).rev() {
                let bit = ((code >> i) & 1) as usize;
                node = node.children[bit].get_or_insert_with(Box::default);
            }
            debug_assert!(node.symbol.is_none(), "duplicate code");
            node.symbol = Some(symbol as u16);
        }
        root
    })
}

/// The encoded length of `src` in bytes (with padding).
pub(crate) fn encoded_len(src: &[u8]) -> usize {
    let bits: usize = src.iter().map(|&b| ENCODE_TABLE[b as usize].0 as usize).sum();
    bits.div_ceil(8)
}

/// Appends the Huffman encoding of `src`, padding the final byte with ones.
pub(crate) fn encode(src: &[u8], dst: &mut BytesMut) {
    let mut bits: u64 = 0;
    let mut bits_left: u32 = 40;

    for &b in src {
        let (nbits, code) = ENCODE_TABLE[b as usize];
        bits |= u64::from(code) << (bits_left - u32::from(nbits));
        bits_left -= u32::from(nbits);

        while bits_left <= 32 {
            dst.put_u8((bits >> 32) as u8);
            bits <<= 8;
            bits_left += 8;
        }
    }

    if bits_left != 40 {
        // EOS-prefix padding to the byte boundary.
        bits |= (1 << bits_left) - 1;
        dst.put_u8((bits >> 32) as u8);
    }
}

/// Decodes a Huffman-coded string.
///
/// Ending mid-code is only legal as padding: at most 7 pending bits, all
/// ones. A decoded EOS symbol is a protocol error.
pub(crate) fn decode(src: &[u8], buf: &mut BytesMut) -> Result<(), DecoderError> {
    let root = tree();
    let mut node = root;
    let mut pending_bits = 0u8;
    let mut pending_all_ones = true;

    for &byte in src {
        for i in (0..8).rev() {
            let bit = ((byte >> i) & 1) as usize;
            node = match node.children[bit].as_deref() {
                Some(next) => next,
                None => return Err(DecoderError::InvalidHuffmanCode),
            };
            pending_bits += 1;
            pending_all_ones &= bit == 1;
            if let Some(symbol) = node.symbol {
                if symbol as usize == EOS {
                    return Err(DecoderError::InvalidHuffmanCode);
                }
                buf.put_u8(symbol as u8);
                node = root;
                pending_bits = 0;
                pending_all_ones = true;
            }
        }
    }

    if pending_bits > 7 || !pending_all_ones {
        return Err(DecoderError::InvalidHuffmanCode);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_vec(src: &[u8]) -> Result<Vec<u8>, DecoderError> {
        let mut buf = BytesMut::new();
        decode(src, &mut buf)?;
        Ok(buf.to_vec())
    }

    fn encode_vec(src: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode(src, &mut buf);
        buf.to_vec()
    }

    #[test]
    fn encode_single_byte() {
        // Examples straight from RFC 7541 Appendix C.
        assert_eq!(&[0x3f], &*encode_vec(b"o"));
        assert_eq!(&[0x07], &*encode_vec(b"0"));
        assert_eq!(&[0xff, 0xcf], &*encode_vec(b"&"));
    }

    #[test]
    fn encode_www_example_com() {
        let expected = [
            0xf1, 0xe3, 0xc2, 0xe5, 0xf2, 0x3a, 0x6b, 0xa0, 0xab, 0x90, 0xf4, 0xff,
        ];
        assert_eq!(&expected[..], &*encode_vec(b"www.example.com"));
    }

    #[test]
    fn decode_inverts_encode() {
        for input in [
            &b"no-cache"[..],
            b"custom-key",
            b"custom-value",
            b"www.example.com",
            b"\x00\x01\xff binary\xfe",
        ] {
            assert_eq!(decode_vec(&encode_vec(input)).unwrap(), input);
        }
    }

    #[test]
    fn rejects_bad_padding() {
        // '0' is 00000; three trailing one-bits are valid padding...
        assert_eq!(decode_vec(&[0x07]).unwrap(), b"0");
        // ...three zero bits are not.
        assert!(decode_vec(&[0x00]).is_err());
        // Eight bits of padding exceed the 7-bit maximum.
        assert!(decode_vec(&[0xff]).is_err());
    }

    #[test]
    fn rejects_eos() {
        // EOS is 30 bits of ones; four 0xff bytes decode through EOS.
        assert!(decode_vec(&[0xff, 0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn quickcheck_roundtrip() {
        fn prop(data: Vec<u8>) -> bool {
            decode_vec(&encode_vec(&data)).unwrap() == data
        }
        quickcheck::quickcheck(prop as fn(Vec<u8>) -> bool);
    }
}
