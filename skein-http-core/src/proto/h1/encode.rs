//! Outgoing body framing.

use tracing::trace;

/// Frames outgoing body bytes to match the headers the role emitted.
#[derive(Debug, Clone)]
pub(crate) struct Encoder {
    kind: Kind,
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    /// Exactly this many bytes may still be written.
    Length(u64),
    Chunked,
    /// Write through; the connection close delimits the body.
    CloseDelimited,
}

impl Encoder {
    pub(crate) fn length(len: u64) -> Self {
        Self {
            kind: Kind::Length(len),
        }
    }

    pub(crate) fn chunked() -> Self {
        Self { kind: Kind::Chunked }
    }

    pub(crate) fn close_delimited() -> Self {
        Self {
            kind: Kind::CloseDelimited,
        }
    }

    /// True when the body needs no terminator and no more bytes.
    pub(crate) fn is_eof(&self) -> bool {
        matches!(self.kind, Kind::Length(0))
    }

    /// Frames `data` into `dst`. Sized bodies clamp at the declared
    /// length; chunked bodies get a size line per call.
    pub(crate) fn encode(&mut self, data: &[u8], dst: &mut Vec<u8>) {
        if data.is_empty() {
            return;
        }
        match &mut self.kind {
            Kind::Length(remaining) => {
                let take = (*remaining).min(data.len() as u64) as usize;
                if take < data.len() {
                    trace!("sized body over-written, clamping at declared length");
                }
                dst.extend_from_slice(&data[..take]);
                *remaining -= take as u64;
            }
            Kind::Chunked => {
                let mut scratch = [0u8; 16];
                dst.extend_from_slice(format_hex(data.len(), &mut scratch));
                dst.extend_from_slice(b"\r\n");
                dst.extend_from_slice(data);
                dst.extend_from_slice(b"\r\n");
            }
            Kind::CloseDelimited => dst.extend_from_slice(data),
        }
    }

    /// Terminates the body: the zero chunk for chunked mode, nothing
    /// otherwise.
    pub(crate) fn finish(&mut self, dst: &mut Vec<u8>) {
        if matches!(self.kind, Kind::Chunked) {
            dst.extend_from_slice(b"0\r\n\r\n");
        }
    }
}

fn format_hex(mut n: usize, scratch: &mut [u8; 16]) -> &[u8] {
    if n == 0 {
        scratch[15] = b'0';
        return &scratch[15..];
    }
    let mut i = scratch.len();
    while n > 0 {
        i -= 1;
        scratch[i] = b"0123456789abcdef"[n & 0xf];
        n >>= 4;
    }
    &scratch[i..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::DecodedLength;
    use crate::proto::h1::decode::{Decoded, Decoder};
    use bytes::BytesMut;

    #[test]
    fn chunked_encode_decode_roundtrip() {
        // Property 8: any chunking of the body decodes back to the body.
        let body = b"the quick brown fox jumps over the lazy dog";
        for chunk_size in [1usize, 2, 3, 5, 7, 11, 43] {
            let mut enc = Encoder::chunked();
            let mut wire = Vec::new();
            for chunk in body.chunks(chunk_size) {
                enc.encode(chunk, &mut wire);
            }
            enc.finish(&mut wire);

            let mut dec = Decoder::new(DecodedLength::CHUNKED);
            let mut src = BytesMut::from(&wire[..]);
            let mut out = Vec::new();
            loop {
                match dec.decode(&mut src).unwrap() {
                    Decoded::Data(d) => out.extend_from_slice(&d),
                    Decoded::Complete => break,
                    Decoded::NeedMore => panic!("incomplete wire form"),
                }
            }
            assert_eq!(out, body, "chunk_size={chunk_size}");
        }
    }

    #[test]
    fn sized_body_clamps() {
        let mut enc = Encoder::length(4);
        let mut out = Vec::new();
        enc.encode(b"toolong", &mut out);
        assert_eq!(out, b"tool");
        assert!(enc.is_eof());
    }

    #[test]
    fn hex_sizes() {
        let mut enc = Encoder::chunked();
        let mut out = Vec::new();
        enc.encode(&[b'x'; 255], &mut out);
        assert!(out.starts_with(b"ff\r\n"));
    }
}
