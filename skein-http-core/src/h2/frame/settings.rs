use std::fmt;

use bytes::BufMut;
use tracing::{debug, trace};

use super::{Error, FrameSize, Head, Kind, StreamId, unpack_u32};

/// The default value of SETTINGS_HEADER_TABLE_SIZE.
pub const DEFAULT_SETTINGS_HEADER_TABLE_SIZE: usize = 4_096;

/// The default value of SETTINGS_INITIAL_WINDOW_SIZE.
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65_535;

/// The default value of SETTINGS_MAX_FRAME_SIZE.
pub const DEFAULT_MAX_FRAME_SIZE: FrameSize = 16_384;

/// INITIAL_WINDOW_SIZE upper bound.
pub const MAX_INITIAL_WINDOW_SIZE: usize = (1 << 31) - 1;

/// MAX_FRAME_SIZE upper bound.
pub const MAX_MAX_FRAME_SIZE: FrameSize = (1 << 24) - 1;

const ACK: u8 = 0x1;

/// A SETTINGS frame: configuration parameters for the whole connection.
///
/// Unset fields are simply not transmitted; the peer keeps its defaults.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Settings {
    flags: SettingsFlags,
    header_table_size: Option<u32>,
    enable_push: Option<u32>,
    max_concurrent_streams: Option<u32>,
    initial_window_size: Option<u32>,
    max_frame_size: Option<u32>,
    max_header_list_size: Option<u32>,
}

#[derive(Copy, Clone, Default, Eq, PartialEq)]
struct SettingsFlags(u8);

#[derive(Debug)]
enum Setting {
    HeaderTableSize(u32),
    EnablePush(u32),
    MaxConcurrentStreams(u32),
    InitialWindowSize(u32),
    MaxFrameSize(u32),
    MaxHeaderListSize(u32),
}

// ===== impl Settings =====

impl Settings {
    #[must_use]
    pub fn ack() -> Self {
        Self {
            flags: SettingsFlags(ACK),
            ..Self::default()
        }
    }

    pub fn is_ack(&self) -> bool {
        self.flags.is_ack()
    }

    pub fn initial_window_size(&self) -> Option<u32> {
        self.initial_window_size
    }

    pub fn set_initial_window_size(&mut self, size: Option<u32>) {
        self.initial_window_size = size;
    }

    pub fn max_frame_size(&self) -> Option<u32> {
        self.max_frame_size
    }

    pub fn set_max_frame_size(&mut self, size: Option<u32>) {
        if let Some(val) = size {
            debug_assert!((DEFAULT_MAX_FRAME_SIZE..=MAX_MAX_FRAME_SIZE).contains(&val));
        }
        self.max_frame_size = size;
    }

    pub fn header_table_size(&self) -> Option<u32> {
        self.header_table_size
    }

    pub fn set_header_table_size(&mut self, size: Option<u32>) {
        self.header_table_size = size;
    }

    pub fn max_concurrent_streams(&self) -> Option<u32> {
        self.max_concurrent_streams
    }

    pub fn set_max_concurrent_streams(&mut self, max: Option<u32>) {
        self.max_concurrent_streams = max;
    }

    pub fn max_header_list_size(&self) -> Option<u32> {
        self.max_header_list_size
    }

    pub fn set_max_header_list_size(&mut self, size: Option<u32>) {
        self.max_header_list_size = size;
    }

    pub fn is_push_enabled(&self) -> Option<bool> {
        self.enable_push.map(|val| val != 0)
    }

    pub fn set_enable_push(&mut self, enable: bool) {
        self.enable_push = Some(u32::from(enable));
    }

    pub(crate) fn load(head: Head, payload: &[u8]) -> Result<Self, Error> {
        debug_assert_eq!(head.kind(), Kind::Settings);

        if !head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        let flags = SettingsFlags::load(head.flag());

        if flags.is_ack() {
            // An ACK carries no payload.
            if !payload.is_empty() {
                debug!("invalid settings ACK payload length: {}", payload.len());
                return Err(Error::InvalidPayloadAckSettings);
            }
            return Ok(Self::ack());
        }

        // Each setting is an id/value pair, 6 bytes.
        if payload.len() % 6 != 0 {
            debug!("invalid settings payload length: {}", payload.len());
            return Err(Error::InvalidPayloadLength);
        }

        let mut settings = Self::default();
        for raw in payload.chunks(6) {
            match Setting::load(raw) {
                Some(Setting::HeaderTableSize(val)) => {
                    settings.header_table_size = Some(val);
                }
                Some(Setting::EnablePush(val)) => match val {
                    0 | 1 => settings.enable_push = Some(val),
                    _ => return Err(Error::InvalidSettingValue),
                },
                Some(Setting::MaxConcurrentStreams(val)) => {
                    settings.max_concurrent_streams = Some(val);
                }
                Some(Setting::InitialWindowSize(val)) => {
                    if val as usize > MAX_INITIAL_WINDOW_SIZE {
                        return Err(Error::InvalidSettingValue);
                    }
                    settings.initial_window_size = Some(val);
                }
                Some(Setting::MaxFrameSize(val)) => {
                    if !(DEFAULT_MAX_FRAME_SIZE..=MAX_MAX_FRAME_SIZE).contains(&val) {
                        return Err(Error::InvalidSettingValue);
                    }
                    settings.max_frame_size = Some(val);
                }
                Some(Setting::MaxHeaderListSize(val)) => {
                    settings.max_header_list_size = Some(val);
                }
                // Unknown identifiers must be ignored.
                None => trace!("ignoring unknown setting: {raw:?}"),
            }
        }

        Ok(settings)
    }

    fn payload_len(&self) -> usize {
        let mut len = 0;
        self.for_each(|_| len += 6);
        len
    }

    pub(crate) fn encode<B: BufMut>(&self, dst: &mut B) {
        let head = Head::new(Kind::Settings, self.flags.into(), StreamId::zero());
        let payload_len = self.payload_len();

        trace!("encoding SETTINGS; len={payload_len}");
        head.encode(payload_len, dst);
        self.for_each(|setting| setting.encode(dst));
    }

    /// The serialized payload without the frame header, as the h2c
    /// `HTTP2-Settings` header wants it.
    #[must_use]
    pub fn payload_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload_len());
        self.for_each(|setting| setting.encode(&mut out));
        out
    }

    fn for_each<F: FnMut(Setting)>(&self, mut f: F) {
        if let Some(v) = self.header_table_size {
            f(Setting::HeaderTableSize(v));
        }
        if let Some(v) = self.enable_push {
            f(Setting::EnablePush(v));
        }
        if let Some(v) = self.max_concurrent_streams {
            f(Setting::MaxConcurrentStreams(v));
        }
        if let Some(v) = self.initial_window_size {
            f(Setting::InitialWindowSize(v));
        }
        if let Some(v) = self.max_frame_size {
            f(Setting::MaxFrameSize(v));
        }
        if let Some(v) = self.max_header_list_size {
            f(Setting::MaxHeaderListSize(v));
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("Settings");
        builder.field("flags", &self.flags);
        builder
            .field("header_table_size", &self.header_table_size)
            .field("initial_window_size", &self.initial_window_size)
            .field("max_frame_size", &self.max_frame_size)
            .finish()
    }
}

// ===== impl Setting =====

impl Setting {
    /// `None` for identifiers this implementation does not know.
    fn load(raw: &[u8]) -> Option<Self> {
        debug_assert_eq!(raw.len(), 6);
        let id = u16::from_be_bytes([raw[0], raw[1]]);
        let val = unpack_u32(raw, 2);

        match id {
            1 => Some(Self::HeaderTableSize(val)),
            2 => Some(Self::EnablePush(val)),
            3 => Some(Self::MaxConcurrentStreams(val)),
            4 => Some(Self::InitialWindowSize(val)),
            5 => Some(Self::MaxFrameSize(val)),
            6 => Some(Self::MaxHeaderListSize(val)),
            _ => None,
        }
    }

    fn encode<B: BufMut>(&self, dst: &mut B) {
        let (id, val): (u16, u32) = match *self {
            Self::HeaderTableSize(v) => (1, v),
            Self::EnablePush(v) => (2, v),
            Self::MaxConcurrentStreams(v) => (3, v),
            Self::InitialWindowSize(v) => (4, v),
            Self::MaxFrameSize(v) => (5, v),
            Self::MaxHeaderListSize(v) => (6, v),
        };
        dst.put_u16(id);
        dst.put_u32(val);
    }
}

// ===== impl SettingsFlags =====

impl SettingsFlags {
    fn load(bits: u8) -> Self {
        Self(bits & ACK)
    }

    fn is_ack(self) -> bool {
        self.0 & ACK == ACK
    }
}

impl From<SettingsFlags> for u8 {
    fn from(src: SettingsFlags) -> Self {
        src.0
    }
}

impl fmt::Debug for SettingsFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        super::util::debug_flags(f, self.0)
            .flag_if(self.is_ack(), "ACK")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn default_settings_encode_to_empty_payload() {
        let settings = Settings::default();
        let mut buf = BytesMut::new();
        settings.encode(&mut buf);
        // type=4, flags=0, stream=0, zero-length payload
        assert_eq!(buf.as_ref(), &[0, 0, 0, 4, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn roundtrip() {
        let mut settings = Settings::default();
        settings.set_initial_window_size(Some(10));
        settings.set_max_frame_size(Some(16_385));
        settings.set_header_table_size(Some(2_048));

        let mut buf = BytesMut::new();
        settings.encode(&mut buf);
        let head = Head::parse(&buf[..9]);
        let parsed = Settings::load(head, &buf[9..]).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn ack_with_payload_is_rejected() {
        let head = Head::new(Kind::Settings, ACK, StreamId::zero());
        assert_eq!(
            Settings::load(head, &[0, 0, 0, 0, 0, 0]).unwrap_err(),
            Error::InvalidPayloadAckSettings
        );
    }

    #[test]
    fn invalid_max_frame_size_is_rejected() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&5u16.to_be_bytes());
        payload.extend_from_slice(&(DEFAULT_MAX_FRAME_SIZE - 1).to_be_bytes());
        let head = Head::new(Kind::Settings, 0, StreamId::zero());
        assert_eq!(
            Settings::load(head, &payload).unwrap_err(),
            Error::InvalidSettingValue
        );
    }

    #[test]
    fn unknown_settings_are_ignored() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0x99u16.to_be_bytes());
        payload.extend_from_slice(&7u32.to_be_bytes());
        let head = Head::new(Kind::Settings, 0, StreamId::zero());
        let parsed = Settings::load(head, &payload).unwrap();
        assert_eq!(parsed, Settings::default());
    }
}
