//! Frame-level I/O: reading frames off a byte stream and buffering frames
//! onto one.

mod error;
mod framed_read;
mod framed_write;

pub use self::error::UserError;
pub(crate) use self::framed_read::FramedRead;
pub(crate) use self::framed_write::FramedWrite;

use std::io;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::h2::frame::Frame;
use crate::h2::proto::Error;

/// Read and write halves glued onto one transport, the read side wrapping
/// the write side so a single value owns the stream.
#[derive(Debug)]
pub(crate) struct Codec<T> {
    inner: FramedRead<FramedWrite<T>>,
}

impl<T> Codec<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(io: T) -> Self {
        let framed_write = FramedWrite::new(io);
        Self {
            inner: FramedRead::new(framed_write),
        }
    }

    /// Like [`Codec::new`], with bytes already read off the transport.
    pub(crate) fn with_buffered(io: T, buffered: bytes::BytesMut) -> Self {
        let mut codec = Self::new(io);
        codec.inner.seed(buffered);
        codec
    }

    /// Reads the next whole frame, `None` on clean EOF.
    pub(crate) async fn read_frame(&mut self) -> Result<Option<Frame>, Error> {
        self.inner.read_frame().await
    }

    /// Appends a frame to the write buffer.
    pub(crate) fn buffer(&mut self, frame: Frame) -> Result<(), UserError> {
        self.framed_write().buffer(frame)
    }

    /// Flushes all buffered frames to the transport.
    pub(crate) async fn flush(&mut self) -> io::Result<()> {
        self.framed_write().flush().await
    }

    pub(crate) fn max_send_frame_size(&self) -> usize {
        self.inner.get_ref().max_frame_size()
    }

    /// Applies the peer's SETTINGS_MAX_FRAME_SIZE to the send path.
    pub(crate) fn set_max_send_frame_size(&mut self, val: usize) {
        self.framed_write().set_max_frame_size(val);
    }

    /// Applies our acknowledged SETTINGS_MAX_FRAME_SIZE to the recv path.
    pub(crate) fn set_max_recv_frame_size(&mut self, val: usize) {
        self.inner.set_max_frame_size(val);
    }

    pub(crate) fn set_max_recv_header_list_size(&mut self, val: usize) {
        self.inner.set_max_header_list_size(val);
    }

    /// Applies our acknowledged SETTINGS_HEADER_TABLE_SIZE to the inbound
    /// HPACK table.
    pub(crate) fn set_recv_header_table_size(&mut self, val: usize) {
        self.inner.set_header_table_size(val);
    }

    /// Applies the peer's SETTINGS_HEADER_TABLE_SIZE to the outbound HPACK
    /// table.
    pub(crate) fn set_send_header_table_size(&mut self, val: usize) {
        self.framed_write().set_header_table_size(val);
    }

    fn framed_write(&mut self) -> &mut FramedWrite<T> {
        self.inner.get_mut()
    }
}
