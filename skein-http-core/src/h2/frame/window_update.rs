use bytes::BufMut;
use tracing::trace;

use super::{Error, Head, Kind, StreamId, unpack_u32};

const SIZE_INCREMENT_MASK: u32 = 1 << 31;

/// A WINDOW_UPDATE frame: flow-control credit for a stream or, on stream
/// zero, for the whole connection.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct WindowUpdate {
    stream_id: StreamId,
    size_increment: u32,
}

impl WindowUpdate {
    pub fn new(stream_id: StreamId, size_increment: u32) -> Self {
        Self {
            stream_id,
            size_increment,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn size_increment(&self) -> u32 {
        self.size_increment
    }

    /// Builds a `WindowUpdate` frame from a raw frame.
    pub(crate) fn load(head: Head, payload: &[u8]) -> Result<Self, Error> {
        debug_assert_eq!(head.kind(), Kind::WindowUpdate);
        if payload.len() != 4 {
            return Err(Error::BadFrameSize);
        }

        // The reserved high bit is ignored.
        let size_increment = unpack_u32(payload, 0) & !SIZE_INCREMENT_MASK;
        if size_increment == 0 {
            return Err(Error::InvalidWindowUpdateValue);
        }

        Ok(Self {
            stream_id: head.stream_id(),
            size_increment,
        })
    }

    pub(crate) fn encode<B: BufMut>(&self, dst: &mut B) {
        trace!("encoding WINDOW_UPDATE; id={:?}", self.stream_id);
        let head = Head::new(Kind::WindowUpdate, 0, self.stream_id);
        head.encode(4, dst);
        dst.put_u32(self.size_increment);
    }
}
