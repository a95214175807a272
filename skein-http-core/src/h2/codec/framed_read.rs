use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::h2::frame::{
    self, DEFAULT_MAX_FRAME_SIZE, DEFAULT_SETTINGS_HEADER_TABLE_SIZE, Frame, Kind, MAX_MAX_FRAME_SIZE,
    Reason, StreamId,
};
use crate::h2::hpack;
use crate::h2::proto::Error;

// 16 MB of decoded header octets, the golang http2 "sane default"; our
// announced MAX_HEADER_LIST_SIZE is unlimited until configured.
const DEFAULT_MAX_HEADER_LIST_SIZE: usize = 16 << 20;

/// Decodes whole frames off the transport, coalescing header blocks.
#[derive(Debug)]
pub(crate) struct FramedRead<T> {
    inner: T,

    buf: BytesMut,

    // hpack decoder state
    hpack: hpack::Decoder,

    max_frame_size: u32,

    max_header_list_size: usize,

    partial: Option<Partial>,
}

/// A header block mid-continuation.
#[derive(Debug)]
struct Partial {
    /// The frame whose block is being accumulated.
    frame: Continuable,

    /// The block fragments so far, still HPACK encoded.
    buf: BytesMut,
}

#[derive(Debug)]
enum Continuable {
    Headers(frame::Headers),
    PushPromise(frame::PushPromise),
}

impl<T> FramedRead<T> {
    pub(crate) fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(4096),
            hpack: hpack::Decoder::new(DEFAULT_SETTINGS_HEADER_TABLE_SIZE),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_header_list_size: DEFAULT_MAX_HEADER_LIST_SIZE,
            partial: None,
        }
    }

    pub(crate) fn get_ref(&self) -> &T {
        &self.inner
    }

    pub(crate) fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Seeds the read buffer with bytes that arrived before the codec took
    /// over the transport (the tail of an upgrade response).
    pub(crate) fn seed(&mut self, bytes: BytesMut) {
        debug_assert!(self.buf.is_empty());
        self.buf = bytes;
    }

    /// Updates the max frame size we accept.
    ///
    /// Must be within the SETTINGS_MAX_FRAME_SIZE bounds.
    pub(crate) fn set_max_frame_size(&mut self, val: usize) {
        debug_assert!((DEFAULT_MAX_FRAME_SIZE as usize..=MAX_MAX_FRAME_SIZE as usize).contains(&val));
        self.max_frame_size = val as u32;
    }

    pub(crate) fn set_max_header_list_size(&mut self, val: usize) {
        self.max_header_list_size = val;
    }

    pub(crate) fn set_header_table_size(&mut self, val: usize) {
        self.hpack.queue_size_update(val);
    }

    /// Splits one raw frame off the buffer, `None` until enough bytes are
    /// in. Enforces the frame-size bound before buffering a payload.
    fn bytes_for_next_frame(&mut self) -> Result<Option<BytesMut>, Error> {
        if self.buf.len() < frame::HEADER_LEN {
            return Ok(None);
        }

        let payload_len =
            u32::from_be_bytes([0, self.buf[0], self.buf[1], self.buf[2]]) as usize;
        if payload_len > self.max_frame_size as usize {
            debug!("frame length {payload_len} over SETTINGS_MAX_FRAME_SIZE");
            return Err(Error::library_go_away(Reason::FRAME_SIZE_ERROR));
        }

        let total = frame::HEADER_LEN + payload_len;
        if self.buf.len() < total {
            self.buf.reserve(total - self.buf.len());
            return Ok(None);
        }

        Ok(Some(self.buf.split_to(total)))
    }

    /// Decodes one raw frame. `None` means "nothing to surface yet": an
    /// unknown frame type, or a header block waiting for CONTINUATION.
    fn decode_frame(&mut self, mut bytes: BytesMut) -> Result<Option<Frame>, Error> {
        let head = frame::Head::parse(&bytes);

        // Header-block continuity: between a HEADERS/PUSH_PROMISE without
        // END_HEADERS and its final CONTINUATION nothing else may appear.
        if self.partial.is_some() && head.kind() != Kind::Continuation {
            proto_err!(conn: "expected CONTINUATION, got {:?}", head.kind());
            return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
        }

        let kind = head.kind();
        trace!("decoding frame; kind={kind:?}");

        let frame: Frame = match kind {
            Kind::Settings => frame::Settings::load(head, &bytes[frame::HEADER_LEN..])
                .map_err(|e| {
                    proto_err!(conn: "failed to load SETTINGS frame; err={:?}", e);
                    Error::library_go_away(Reason::PROTOCOL_ERROR)
                })?
                .into(),
            Kind::Ping => frame::Ping::load(head, &bytes[frame::HEADER_LEN..])
                .map_err(|e| {
                    proto_err!(conn: "failed to load PING frame; err={:?}", e);
                    Error::library_go_away(Reason::PROTOCOL_ERROR)
                })?
                .into(),
            Kind::WindowUpdate => frame::WindowUpdate::load(head, &bytes[frame::HEADER_LEN..])
                .map_err(|e| {
                    proto_err!(conn: "failed to load WINDOW_UPDATE frame; err={:?}", e);
                    Error::library_go_away(Reason::PROTOCOL_ERROR)
                })?
                .into(),
            Kind::Data => {
                let _ = bytes.split_to(frame::HEADER_LEN);
                frame::Data::load(head, bytes.freeze())
                    .map_err(|e| {
                        proto_err!(conn: "failed to load DATA frame; err={:?}", e);
                        Error::library_go_away(Reason::PROTOCOL_ERROR)
                    })?
                    .into()
            }
            Kind::Reset => frame::Reset::load(head, &bytes[frame::HEADER_LEN..])
                .map_err(|e| {
                    proto_err!(conn: "failed to load RST_STREAM frame; err={:?}", e);
                    Error::library_go_away(Reason::PROTOCOL_ERROR)
                })?
                .into(),
            Kind::GoAway => frame::GoAway::load(&bytes[frame::HEADER_LEN..])
                .map_err(|e| {
                    proto_err!(conn: "failed to load GOAWAY frame; err={:?}", e);
                    Error::library_go_away(Reason::PROTOCOL_ERROR)
                })?
                .into(),
            Kind::Priority => {
                if head.stream_id() == 0 {
                    proto_err!(conn: "PRIORITY on stream 0");
                    return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
                }
                match frame::Priority::load(head, &bytes[frame::HEADER_LEN..]) {
                    Ok(frame) => frame.into(),
                    Err(frame::Error::InvalidDependencyId) => {
                        // A stream cannot depend on itself: a stream error,
                        // not a connection error.
                        proto_err!(stream: "PRIORITY invalid dependency ID");
                        return Err(Error::library_reset(
                            head.stream_id(),
                            Reason::PROTOCOL_ERROR,
                        ));
                    }
                    Err(e) => {
                        proto_err!(conn: "failed to load PRIORITY frame; err={:?}", e);
                        return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
                    }
                }
            }
            Kind::Headers => {
                let _ = bytes.split_to(frame::HEADER_LEN);
                let (frame, fragment) = match frame::Headers::load(head, bytes) {
                    Ok(res) => res,
                    Err(frame::Error::InvalidDependencyId) => {
                        proto_err!(stream: "invalid HEADERS dependency ID");
                        return Err(Error::library_reset(
                            head.stream_id(),
                            Reason::PROTOCOL_ERROR,
                        ));
                    }
                    Err(e) => {
                        proto_err!(conn: "failed to load HEADERS frame; err={:?}", e);
                        return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
                    }
                };
                return self.begin_header_block(Continuable::Headers(frame), fragment);
            }
            Kind::PushPromise => {
                let _ = bytes.split_to(frame::HEADER_LEN);
                let (frame, fragment) = frame::PushPromise::load(head, bytes).map_err(|e| {
                    proto_err!(conn: "failed to load PUSH_PROMISE frame; err={:?}", e);
                    Error::library_go_away(Reason::PROTOCOL_ERROR)
                })?;
                return self.begin_header_block(Continuable::PushPromise(frame), fragment);
            }
            Kind::Continuation => {
                let end_headers = (head.flag() & 0x4) == 0x4;

                let Some(mut partial) = self.partial.take() else {
                    proto_err!(conn: "unexpected CONTINUATION frame");
                    return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
                };

                // Every CONTINUATION must stay on the block's stream.
                if partial.frame.stream_id() != head.stream_id() {
                    proto_err!(conn: "CONTINUATION frame stream ID does not match");
                    return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
                }

                partial.buf.extend_from_slice(&bytes[frame::HEADER_LEN..]);
                if partial.buf.len() > self.max_header_list_size.saturating_mul(2) {
                    proto_err!(conn: "header block too large");
                    return Err(Error::library_go_away(Reason::COMPRESSION_ERROR));
                }

                if !end_headers {
                    self.partial = Some(partial);
                    return Ok(None);
                }

                return self.finish_header_block(partial.frame, partial.buf).map(Some);
            }
            Kind::Unknown => {
                // Unknown frame types must be ignored.
                trace!("ignoring unknown frame");
                return Ok(None);
            }
        };

        Ok(Some(frame))
    }

    fn begin_header_block(
        &mut self,
        frame: Continuable,
        fragment: BytesMut,
    ) -> Result<Option<Frame>, Error> {
        if frame.is_end_headers() {
            return self.finish_header_block(frame, fragment).map(Some);
        }
        self.partial = Some(Partial {
            frame,
            buf: fragment,
        });
        Ok(None)
    }

    /// Runs HPACK over the complete block and surfaces the frame.
    fn finish_header_block(
        &mut self,
        mut frame: Continuable,
        mut fragment: BytesMut,
    ) -> Result<Frame, Error> {
        let stream_id = frame.stream_id();
        match frame.load_hpack(&mut fragment, self.max_header_list_size, &mut self.hpack) {
            Ok(()) => Ok(frame.into_frame()),
            Err(frame::Error::MalformedMessage) => {
                proto_err!(stream: "malformed header block; stream={stream_id:?}");
                Err(Error::library_reset(stream_id, Reason::PROTOCOL_ERROR))
            }
            Err(e) => {
                proto_err!(conn: "failed HPACK decoding; err={:?}", e);
                Err(Error::library_go_away(Reason::COMPRESSION_ERROR))
            }
        }
    }
}

impl<T> FramedRead<T>
where
    T: AsyncRead + Unpin,
{
    /// Reads the next whole frame. `Ok(None)` is a clean EOF at a frame
    /// boundary; EOF inside a frame or header block is an I/O error.
    pub(crate) async fn read_frame(&mut self) -> Result<Option<Frame>, Error> {
        loop {
            while let Some(raw) = self.bytes_for_next_frame()? {
                if let Some(frame) = self.decode_frame(raw)? {
                    trace!("received; frame={frame:?}");
                    return Ok(Some(frame));
                }
            }

            let n = self
                .inner
                .read_buf(&mut self.buf)
                .await
                .map_err(Error::from)?;
            if n == 0 {
                if self.buf.is_empty() && self.partial.is_none() {
                    return Ok(None);
                }
                return Err(Error::from(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-frame",
                )));
            }
        }
    }
}

// ===== impl Continuable =====

impl Continuable {
    fn stream_id(&self) -> StreamId {
        match self {
            Self::Headers(h) => h.stream_id(),
            Self::PushPromise(p) => p.stream_id(),
        }
    }

    fn is_end_headers(&self) -> bool {
        match self {
            Self::Headers(h) => h.is_end_headers(),
            Self::PushPromise(p) => p.is_end_headers(),
        }
    }

    fn load_hpack(
        &mut self,
        src: &mut BytesMut,
        max_header_list_size: usize,
        decoder: &mut hpack::Decoder,
    ) -> Result<(), frame::Error> {
        match self {
            Self::Headers(h) => h.load_hpack(src, max_header_list_size, decoder),
            Self::PushPromise(p) => p.load_hpack(src, max_header_list_size, decoder),
        }
    }

    fn into_frame(self) -> Frame {
        match self {
            Self::Headers(mut headers) => {
                headers.set_end_headers();
                headers.into()
            }
            Self::PushPromise(mut push) => {
                push.set_end_headers();
                push.into()
            }
        }
    }
}
