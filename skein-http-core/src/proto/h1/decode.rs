//! Incoming body framing.
//!
//! The decoder is buffer-in / buffer-out: the connection driver feeds it
//! the read buffer and it hands back decoded body bytes, asks for more
//! input, or reports completion. Partial frames stay in the buffer.

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::proto::DecodedLength;
use crate::proto::h1::Parse;

/// Result of one [`Decoder::decode`] step.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Decoded {
    /// Some body bytes were produced.
    Data(Bytes),
    /// The buffer holds no complete piece; read more input.
    NeedMore,
    /// The body is complete; unconsumed buffer bytes belong to the next
    /// message.
    Complete,
}

#[derive(Debug, Clone)]
pub(crate) struct Decoder {
    kind: Kind,
}

#[derive(Debug, Clone)]
enum Kind {
    /// Exactly this many bytes remain.
    Length(u64),
    Chunked {
        state: ChunkedState,
        chunk_len: u64,
    },
    /// Everything until EOF is the body.
    Eof,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Optional CRLF before the size line (lenient leftovers of the
    /// previous chunk).
    Start,
    Size,
    SizeLws,
    Extension,
    SizeLf,
    Body,
    BodyCr,
    BodyLf,
    Trailer,
    TrailerLf,
    EndLf,
}

impl Decoder {
    pub(crate) fn new(len: DecodedLength) -> Self {
        let kind = match len {
            DecodedLength::CHUNKED => Kind::Chunked {
                state: ChunkedState::Start,
                chunk_len: 0,
            },
            DecodedLength::CLOSE_DELIMITED => Kind::Eof,
            DecodedLength::ZERO => Kind::Done,
            exact => Kind::Length(exact.into_len()),
        };
        Self { kind }
    }

    /// True once the body finished cleanly.
    pub(crate) fn is_complete(&self) -> bool {
        matches!(self.kind, Kind::Done)
    }

    pub(crate) fn decode(&mut self, src: &mut BytesMut) -> Result<Decoded, Parse> {
        match &mut self.kind {
            Kind::Done => Ok(Decoded::Complete),
            Kind::Length(remaining) => {
                if *remaining == 0 {
                    self.kind = Kind::Done;
                    return Ok(Decoded::Complete);
                }
                if src.is_empty() {
                    return Ok(Decoded::NeedMore);
                }
                let take = (*remaining).min(src.len() as u64) as usize;
                *remaining -= take as u64;
                let data = src.split_to(take).freeze();
                if *remaining == 0 {
                    self.kind = Kind::Done;
                }
                Ok(Decoded::Data(data))
            }
            Kind::Eof => {
                if src.is_empty() {
                    Ok(Decoded::NeedMore)
                } else {
                    Ok(Decoded::Data(src.split().freeze()))
                }
            }
            Kind::Chunked { state, chunk_len } => {
                loop {
                    if *state == ChunkedState::Body {
                        if src.is_empty() {
                            return Ok(Decoded::NeedMore);
                        }
                        let take = (*chunk_len).min(src.len() as u64) as usize;
                        *chunk_len -= take as u64;
                        if *chunk_len == 0 {
                            *state = ChunkedState::BodyCr;
                        }
                        trace!("chunked: {take} body bytes");
                        return Ok(Decoded::Data(src.split_to(take).freeze()));
                    }
                    let Some((next, consumed)) = step_chunked(*state, chunk_len, src)? else {
                        return Ok(Decoded::NeedMore);
                    };
                    let _ = src.split_to(consumed);
                    *state = next;
                    if *state == ChunkedState::EndLf {
                        self.kind = Kind::Done;
                        return Ok(Decoded::Complete);
                    }
                }
            }
        }
    }

    /// Signals end of input. Close-delimited bodies complete; anything
    /// still expecting bytes is a truncated body.
    pub(crate) fn end_of_input(&mut self) -> Result<(), Parse> {
        match self.kind {
            Kind::Eof | Kind::Done => {
                self.kind = Kind::Done;
                Ok(())
            }
            Kind::Length(0) => {
                self.kind = Kind::Done;
                Ok(())
            }
            _ => Err(Parse::Chunk),
        }
    }
}

/// Advances one control state of the chunked framing, consuming bytes from
/// the front of `src`. Returns `None` when more input is needed.
fn step_chunked(
    state: ChunkedState,
    chunk_len: &mut u64,
    src: &[u8],
) -> Result<Option<(ChunkedState, usize)>, Parse> {
    let Some(&byte) = src.first() else {
        return Ok(None);
    };
    let next = match state {
        ChunkedState::Start => match byte {
            b'\r' | b'\n' => Some((ChunkedState::Start, 1)),
            _ => Some((ChunkedState::Size, 0)),
        },
        ChunkedState::Size => {
            let digit = match byte {
                b'0'..=b'9' => byte - b'0',
                b'a'..=b'f' => byte - b'a' + 10,
                b'A'..=b'F' => byte - b'A' + 10,
                b';' | b' ' | b'\t' | b'\r' => return step_after_size(state, *chunk_len, src),
                _ => return Err(Parse::Chunk),
            };
            *chunk_len = chunk_len
                .checked_mul(16)
                .and_then(|v| v.checked_add(u64::from(digit)))
                .ok_or(Parse::Chunk)?;
            Some((ChunkedState::Size, 1))
        }
        ChunkedState::SizeLws | ChunkedState::Extension | ChunkedState::SizeLf => {
            return step_after_size(state, *chunk_len, src);
        }
        ChunkedState::BodyCr => match byte {
            b'\r' => Some((ChunkedState::BodyLf, 1)),
            _ => return Err(Parse::Chunk),
        },
        ChunkedState::BodyLf => match byte {
            b'\n' => {
                *chunk_len = 0;
                Some((ChunkedState::Size, 1))
            }
            _ => return Err(Parse::Chunk),
        },
        ChunkedState::Trailer => match memchr::memchr(b'\n', src) {
            // Skip one trailer line wholesale.
            Some(i) => Some((ChunkedState::TrailerLf, i + 1)),
            None => None,
        },
        ChunkedState::TrailerLf => match byte {
            b'\r' => match src.get(1) {
                Some(b'\n') => Some((ChunkedState::EndLf, 2)),
                Some(_) => Some((ChunkedState::Trailer, 0)),
                None => None,
            },
            b'\n' => Some((ChunkedState::EndLf, 1)),
            _ => Some((ChunkedState::Trailer, 0)),
        },
        ChunkedState::Body | ChunkedState::EndLf => {
            debug_assert!(false, "handled by caller");
            None
        }
    };
    Ok(next)
}

/// Handles the size-line tail: optional LWS, optional extension, CRLF. On
/// the terminating LF, a zero size moves to the trailer section and a
/// non-zero size starts the chunk body.
fn step_after_size(
    state: ChunkedState,
    chunk_len: u64,
    src: &[u8],
) -> Result<Option<(ChunkedState, usize)>, Parse> {
    let Some(&byte) = src.first() else {
        return Ok(None);
    };
    let next = match (state, byte) {
        (ChunkedState::Size | ChunkedState::SizeLws, b' ' | b'\t') => (ChunkedState::SizeLws, 1),
        (ChunkedState::Size | ChunkedState::SizeLws, b';') => (ChunkedState::Extension, 1),
        (ChunkedState::Size | ChunkedState::SizeLws | ChunkedState::Extension, b'\r') => {
            (ChunkedState::SizeLf, 1)
        }
        // Extensions are scanned past, not interpreted.
        (ChunkedState::Extension, _) => (ChunkedState::Extension, 1),
        (ChunkedState::SizeLf, b'\n') => {
            if chunk_len == 0 {
                (ChunkedState::TrailerLf, 1)
            } else {
                (ChunkedState::Body, 1)
            }
        }
        _ => return Err(Parse::Chunk),
    };
    Ok(Some(next))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut Decoder, input: &[u8]) -> (Vec<u8>, bool) {
        let mut src = BytesMut::from(input);
        let mut out = Vec::new();
        let mut complete = false;
        loop {
            match decoder.decode(&mut src).unwrap() {
                Decoded::Data(d) => out.extend_from_slice(&d),
                Decoded::NeedMore => break,
                Decoded::Complete => {
                    complete = true;
                    break;
                }
            }
        }
        (out, complete)
    }

    #[test]
    fn length_delimited() {
        let mut decoder = Decoder::new(DecodedLength::checked_new(5).unwrap());
        let (out, complete) = decode_all(&mut decoder, b"helloEXTRA");
        assert_eq!(out, b"hello");
        assert!(complete || decoder.is_complete());
    }

    #[test]
    fn chunked_roundtrip_simple() {
        let mut decoder = Decoder::new(DecodedLength::CHUNKED);
        let (out, complete) = decode_all(&mut decoder, b"4\r\nwiki\r\n5\r\npedia\r\n0\r\n\r\n");
        assert_eq!(out, b"wikipedia");
        assert!(complete);
    }

    #[test]
    fn chunked_with_extension_and_lws() {
        let mut decoder = Decoder::new(DecodedLength::CHUNKED);
        let (out, complete) = decode_all(&mut decoder, b"4 ;name=value\r\nwiki\r\n0\r\n\r\n");
        assert_eq!(out, b"wiki");
        assert!(complete);
    }

    #[test]
    fn chunked_with_trailers() {
        let mut decoder = Decoder::new(DecodedLength::CHUNKED);
        let (out, complete) =
            decode_all(&mut decoder, b"3\r\nabc\r\n0\r\nExpires: never\r\nX: y\r\n\r\n");
        assert_eq!(out, b"abc");
        assert!(complete);
    }

    #[test]
    fn chunked_across_partial_reads() {
        let mut decoder = Decoder::new(DecodedLength::CHUNKED);
        let full = b"6\r\nfoobar\r\n0\r\n\r\n";
        let mut out = Vec::new();
        let mut complete = false;
        let mut src = BytesMut::new();
        for &b in full.iter() {
            src.extend_from_slice(&[b]);
            loop {
                match decoder.decode(&mut src).unwrap() {
                    Decoded::Data(d) => out.extend_from_slice(&d),
                    Decoded::NeedMore => break,
                    Decoded::Complete => {
                        complete = true;
                        break;
                    }
                }
            }
        }
        assert_eq!(out, b"foobar");
        assert!(complete);
    }

    #[test]
    fn chunked_invalid_size_errors() {
        let mut decoder = Decoder::new(DecodedLength::CHUNKED);
        let mut src = BytesMut::from(&b"zz\r\n"[..]);
        assert!(decoder.decode(&mut src).is_err());
    }

    #[test]
    fn eof_delimited_completes_on_end_of_input() {
        let mut decoder = Decoder::new(DecodedLength::CLOSE_DELIMITED);
        let (out, _) = decode_all(&mut decoder, b"tail");
        assert_eq!(out, b"tail");
        decoder.end_of_input().unwrap();
        assert!(decoder.is_complete());
    }

    #[test]
    fn truncated_sized_body_is_an_error() {
        let mut decoder = Decoder::new(DecodedLength::checked_new(10).unwrap());
        let (out, _) = decode_all(&mut decoder, b"only");
        assert_eq!(out, b"only");
        assert!(decoder.end_of_input().is_err());
    }

    #[test]
    fn leading_crlf_is_skipped() {
        let mut decoder = Decoder::new(DecodedLength::CHUNKED);
        let (out, complete) = decode_all(&mut decoder, b"\r\n2\r\nok\r\n0\r\n\r\n");
        assert_eq!(out, b"ok");
        assert!(complete);
    }
}
