use bytes::BufMut;

use super::{Error, Head, Kind, StreamId, unpack_u32};

const EXCLUSIVE_MASK: u32 = 1 << 31;

/// A PRIORITY frame: dependency and weight advice for one stream.
#[derive(Debug, Eq, PartialEq)]
pub struct Priority {
    stream_id: StreamId,
    dependency: StreamDependency,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct StreamDependency {
    /// The stream that the stream depends on.
    pub dependency_id: StreamId,

    /// The weight for the stream, 0..=255.
    pub weight: u8,

    /// True if the stream dependency is exclusive.
    pub is_exclusive: bool,
}

impl Priority {
    pub fn new(stream_id: StreamId, dependency: StreamDependency) -> Self {
        Self {
            stream_id,
            dependency,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn dependency(&self) -> &StreamDependency {
        &self.dependency
    }

    pub(crate) fn load(head: Head, payload: &[u8]) -> Result<Self, Error> {
        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }
        if payload.len() != 5 {
            return Err(Error::BadFrameSize);
        }

        let dependency = StreamDependency::load(payload)?;
        if dependency.dependency_id == head.stream_id() {
            // A stream cannot depend on itself.
            return Err(Error::InvalidDependencyId);
        }

        Ok(Self {
            stream_id: head.stream_id(),
            dependency,
        })
    }

    pub(crate) fn encode<B: BufMut>(&self, dst: &mut B) {
        let head = Head::new(Kind::Priority, 0, self.stream_id);
        head.encode(5, dst);
        self.dependency.encode(dst);
    }
}

// ===== impl StreamDependency =====

impl StreamDependency {
    pub fn new(dependency_id: StreamId, weight: u8, is_exclusive: bool) -> Self {
        Self {
            dependency_id,
            weight,
            is_exclusive,
        }
    }

    pub(crate) fn load(src: &[u8]) -> Result<Self, Error> {
        if src.len() != 5 {
            return Err(Error::InvalidPayloadLength);
        }

        // The exclusive flag shares the top bit of the dependency id word.
        let packed = unpack_u32(src, 0);
        let is_exclusive = packed & EXCLUSIVE_MASK == EXCLUSIVE_MASK;
        let dependency_id = StreamId::from(packed & !EXCLUSIVE_MASK);

        Ok(Self {
            dependency_id,
            weight: src[4],
            is_exclusive,
        })
    }

    pub(crate) fn encode<B: BufMut>(&self, dst: &mut B) {
        let mut packed = u32::from(self.dependency_id);
        if self.is_exclusive {
            packed |= EXCLUSIVE_MASK;
        }
        dst.put_u32(packed);
        dst.put_u8(self.weight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn roundtrip_with_exclusive_bit() {
        let dep = StreamDependency::new(5.into(), 200, true);
        let frame = Priority::new(7.into(), dep);
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);

        let head = Head::parse(&buf[..9]);
        let parsed = Priority::load(head, &buf[9..]).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn self_dependency_is_rejected() {
        let dep = StreamDependency::new(7.into(), 1, false);
        let frame = Priority::new(7.into(), dep);
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);

        let head = Head::parse(&buf[..9]);
        assert_eq!(
            Priority::load(head, &buf[9..]).unwrap_err(),
            Error::InvalidDependencyId
        );
    }
}
