use std::fmt;

use bytes::{BufMut, Bytes};

use super::{Error, Head, Kind, StreamId, util};

/// A DATA frame: a chunk of one stream's body.
#[derive(Eq, PartialEq)]
pub struct Data {
    stream_id: StreamId,
    data: Bytes,
    flags: DataFlags,
    pad_len: Option<u8>,
}

#[derive(Copy, Clone, Default, Eq, PartialEq)]
struct DataFlags(u8);

const END_STREAM: u8 = 0x1;
const PADDED: u8 = 0x8;
const ALL: u8 = END_STREAM | PADDED;

impl Data {
    /// Creates a new DATA frame.
    pub fn new(stream_id: StreamId, payload: Bytes) -> Self {
        debug_assert!(!stream_id.is_zero());

        Self {
            stream_id,
            data: payload,
            flags: DataFlags::default(),
            pad_len: None,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags.is_end_stream()
    }

    pub fn set_end_stream(&mut self, val: bool) {
        if val {
            self.flags.set_end_stream();
        } else {
            self.flags.unset_end_stream();
        }
    }

    /// The frame payload without padding.
    pub fn payload(&self) -> &Bytes {
        &self.data
    }

    pub fn into_payload(self) -> Bytes {
        self.data
    }

    pub(crate) fn load(head: Head, mut payload: Bytes) -> Result<Self, Error> {
        let flags = DataFlags::load(head.flag());

        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        let pad_len = if flags.is_padded() {
            let len = util::strip_padding(&mut payload)?;
            Some(len)
        } else {
            None
        };

        Ok(Self {
            stream_id: head.stream_id(),
            data: payload,
            flags,
            pad_len,
        })
    }

    pub(crate) fn head(&self) -> Head {
        Head::new(Kind::Data, self.flags.into(), self.stream_id)
    }

    pub(crate) fn encode<T: BufMut>(&self, dst: &mut T) {
        let len = self.data.len() + self.pad_len.map_or(0, |p| p as usize + 1);
        self.head().encode(len, dst);
        if let Some(pad) = self.pad_len {
            dst.put_u8(pad);
        }
        dst.put_slice(&self.data);
        if let Some(pad) = self.pad_len {
            dst.put_bytes(0, pad as usize);
        }
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = fmt.debug_struct("Data");
        f.field("stream_id", &self.stream_id);
        if !self.flags.is_empty() {
            f.field("flags", &self.flags);
        }
        if let Some(ref pad_len) = self.pad_len {
            f.field("pad_len", pad_len);
        }
        // `data` purposefully excluded
        f.finish()
    }
}

// ===== impl DataFlags =====

impl DataFlags {
    fn load(bits: u8) -> Self {
        Self(bits & ALL)
    }

    fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn is_end_stream(self) -> bool {
        self.0 & END_STREAM == END_STREAM
    }

    fn set_end_stream(&mut self) {
        self.0 |= END_STREAM;
    }

    fn unset_end_stream(&mut self) {
        self.0 &= !END_STREAM;
    }

    fn is_padded(self) -> bool {
        self.0 & PADDED == PADDED
    }
}

impl From<DataFlags> for u8 {
    fn from(src: DataFlags) -> Self {
        src.0
    }
}

impl fmt::Debug for DataFlags {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        util::debug_flags(fmt, self.0)
            .flag_if(self.is_end_stream(), "END_STREAM")
            .flag_if(self.is_padded(), "PADDED")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn padding_is_stripped() {
        // pad_len = 2, payload = "hi", padding = 2 zero bytes
        let payload = Bytes::from_static(&[2, b'h', b'i', 0, 0]);
        let head = Head::new(Kind::Data, PADDED, 1.into());
        let data = Data::load(head, payload).unwrap();
        assert_eq!(data.payload().as_ref(), b"hi");
    }

    #[test]
    fn padding_covering_payload_is_rejected() {
        // pad_len = 4 but only 4 bytes follow the pad byte minus one
        let payload = Bytes::from_static(&[4, b'h', b'i', 0, 0]);
        let head = Head::new(Kind::Data, PADDED, 1.into());
        assert_eq!(Data::load(head, payload).unwrap_err(), Error::TooMuchPadding);
    }

    #[test]
    fn max_allowed_padding_accepted() {
        // pad_len = payload length - 1: every byte after the length prefix
        // is padding, zero data bytes remain.
        let payload = Bytes::from_static(&[4, 0, 0, 0, 0]);
        let head = Head::new(Kind::Data, PADDED, 1.into());
        let data = Data::load(head, payload).unwrap();
        assert!(data.payload().is_empty());
    }

    #[test]
    fn encode_roundtrip() {
        let mut data = Data::new(3.into(), Bytes::from_static(b"payload"));
        data.set_end_stream(true);
        let mut buf = BytesMut::new();
        data.encode(&mut buf);

        let head = Head::parse(&buf[..9]);
        assert_eq!(head.kind(), Kind::Data);
        assert_eq!(head.stream_id(), StreamId::from(3));
        let parsed = Data::load(head, Bytes::copy_from_slice(&buf[9..])).unwrap();
        assert!(parsed.is_end_stream());
        assert_eq!(parsed.payload().as_ref(), b"payload");
    }
}
