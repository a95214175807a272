use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::trace;

use super::UserError;
use crate::h2::frame::{self, DEFAULT_MAX_FRAME_SIZE, Frame, MAX_MAX_FRAME_SIZE};
use crate::h2::hpack;

/// Encodes frames into a write buffer, splitting header blocks over
/// CONTINUATION frames at the max-frame-size boundary.
#[derive(Debug)]
pub(crate) struct FramedWrite<T> {
    inner: T,

    buf: BytesMut,

    // hpack encoder state
    hpack: hpack::Encoder,

    max_frame_size: u32,
}

impl<T> FramedWrite<T> {
    pub(crate) fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(4096),
            hpack: hpack::Encoder::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub(crate) fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub(crate) fn max_frame_size(&self) -> usize {
        self.max_frame_size as usize
    }

    /// Applies the peer's SETTINGS_MAX_FRAME_SIZE.
    pub(crate) fn set_max_frame_size(&mut self, val: usize) {
        debug_assert!((DEFAULT_MAX_FRAME_SIZE as usize..=MAX_MAX_FRAME_SIZE as usize).contains(&val));
        self.max_frame_size = val as u32;
    }

    /// Applies the peer's SETTINGS_HEADER_TABLE_SIZE to the outbound
    /// table; announced in the next emitted block.
    pub(crate) fn set_header_table_size(&mut self, val: usize) {
        self.hpack.update_max_size(val);
    }

    /// Encodes `frame` into the write buffer.
    pub(crate) fn buffer(&mut self, frame: Frame) -> Result<(), UserError> {
        let max_frame_size = self.max_frame_size as usize;

        match frame {
            Frame::Data(data) => {
                if data.payload().len() > max_frame_size {
                    return Err(UserError::PayloadTooBig);
                }
                data.encode(&mut self.buf);
            }
            Frame::Headers(headers) => {
                let mut limited = (&mut self.buf).limit(frame::HEADER_LEN + max_frame_size);
                let mut continuation = headers.encode(&mut self.hpack, &mut limited);
                while let Some(cont) = continuation {
                    let mut limited =
                        (&mut self.buf).limit(frame::HEADER_LEN + max_frame_size);
                    continuation = cont.encode(&mut limited);
                }
            }
            Frame::PushPromise(push) => {
                let mut limited = (&mut self.buf).limit(frame::HEADER_LEN + max_frame_size);
                let mut continuation = push.encode(&mut self.hpack, &mut limited);
                while let Some(cont) = continuation {
                    let mut limited =
                        (&mut self.buf).limit(frame::HEADER_LEN + max_frame_size);
                    continuation = cont.encode(&mut limited);
                }
            }
            Frame::Settings(settings) => settings.encode(&mut self.buf),
            Frame::Ping(ping) => ping.encode(&mut self.buf),
            Frame::GoAway(go_away) => go_away.encode(&mut self.buf),
            Frame::WindowUpdate(window_update) => window_update.encode(&mut self.buf),
            Frame::Reset(reset) => reset.encode(&mut self.buf),
            Frame::Priority(priority) => priority.encode(&mut self.buf),
        }

        Ok(())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl<T> FramedWrite<T>
where
    T: AsyncWrite + Unpin,
{
    /// Writes out everything buffered.
    pub(crate) async fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        trace!("flushing {}B", self.buf.len());
        self.inner.write_all(&self.buf).await?;
        self.inner.flush().await?;
        self.buf.clear();
        Ok(())
    }
}

// FramedRead wraps FramedWrite, so reads pass through.
impl<T: AsyncRead + Unpin> AsyncRead for FramedWrite<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h2::frame::{Headers, Pseudo, StreamId};
    use crate::headers::OrderedHeaders;
    use http::Method;

    #[test]
    fn oversized_header_block_splits_into_continuations() {
        let mut framed = FramedWrite::new(());

        let mut fields = OrderedHeaders::new();
        // ~64 KiB of uncompressable header data, well past one frame.
        for i in 0..64 {
            let value: String = (0..1024)
                .map(|j| char::from(b'a' + ((i + j) % 17) as u8))
                .collect();
            fields.append(format!("x-blob-{i:02}"), value).unwrap();
        }
        let headers = Headers::new(
            StreamId::from(1),
            Pseudo::request(Method::GET, "https", "example.com", "/"),
            fields,
        );
        framed.buffer(headers.into()).unwrap();

        // Walk the buffered frames: HEADERS, then CONTINUATIONs, with
        // END_HEADERS only on the last.
        let buf = framed.buf.freeze();
        let mut offset = 0;
        let mut kinds = Vec::new();
        let mut end_headers_flags = Vec::new();
        while offset < buf.len() {
            let head = frame::Head::parse(&buf[offset..]);
            let len = u32::from_be_bytes([0, buf[offset], buf[offset + 1], buf[offset + 2]]);
            assert!(len as usize <= DEFAULT_MAX_FRAME_SIZE as usize);
            kinds.push(head.kind());
            end_headers_flags.push(head.flag() & 0x4 == 0x4);
            offset += frame::HEADER_LEN + len as usize;
        }
        assert_eq!(offset, buf.len());
        assert!(kinds.len() > 1, "expected a continuation split");
        assert_eq!(kinds[0], frame::Kind::Headers);
        assert!(kinds[1..].iter().all(|k| *k == frame::Kind::Continuation));
        let (last, rest) = end_headers_flags.split_last().unwrap();
        assert!(*last);
        assert!(rest.iter().all(|f| !f));
    }
}
