//! Cleartext HTTP/2 via the HTTP/1.1 Upgrade mechanism (RFC 7540 §3.2).
//!
//! The client sends a normal HTTP/1.1 request carrying `Upgrade: h2c` and
//! an `HTTP2-Settings` header whose value is the base64url (unpadded)
//! serialization of a SETTINGS payload. On a 101 reply both sides switch:
//! the client emits the connection preface and the upgraded request
//! becomes stream 1.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http::StatusCode;

use crate::error::Error;
use crate::h2::frame::{self, Head, Kind, StreamId};
use crate::headers::{self, OrderedHeaders};

/// The token used in the `Upgrade` header.
pub const PROTOCOL: &str = "h2c";

/// The serialized-SETTINGS header.
pub const SETTINGS_HEADER: &str = "HTTP2-Settings";

/// Renders the `HTTP2-Settings` value: the SETTINGS frame payload without
/// its 9-byte frame header, base64url without padding.
#[must_use]
pub fn settings_header_value(settings: &frame::Settings) -> String {
    URL_SAFE_NO_PAD.encode(settings.payload_bytes())
}

/// The three headers the upgrade request carries.
pub fn apply_upgrade_headers(
    headers: &mut OrderedHeaders,
    settings: &frame::Settings,
) -> Result<(), Error> {
    headers
        .append("Connection", "Upgrade, HTTP2-Settings")
        .map_err(Error::new_parse)?;
    headers.append("Upgrade", PROTOCOL).map_err(Error::new_parse)?;
    headers
        .append(SETTINGS_HEADER, settings_header_value(settings))
        .map_err(Error::new_parse)?;
    Ok(())
}

/// Checks the server's reply to the upgrade attempt: 101 with matching
/// `Connection` and `Upgrade` headers. Anything else fails the upgrade.
pub fn validate_upgrade_response(
    status: StatusCode,
    response_headers: &OrderedHeaders,
) -> Result<(), Error> {
    if status != StatusCode::SWITCHING_PROTOCOLS {
        return Err(Error::new_unexpected_status());
    }
    let connection_ok = response_headers
        .get("connection")
        .is_some_and(headers::connection_upgrade);
    let upgrade_ok = response_headers
        .get("upgrade")
        .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(PROTOCOL.as_bytes()));
    if !connection_ok || !upgrade_ok {
        return Err(Error::new_parse(crate::proto::h1::Parse::Header));
    }
    Ok(())
}

/// Server side: whether the parsed HTTP/1 request asks for the h2c
/// upgrade; returns the client's initial settings when it does.
#[must_use]
pub fn upgrade_settings(request_headers: &OrderedHeaders) -> Option<frame::Settings> {
    let upgrade = request_headers.get("upgrade")?;
    if !upgrade.as_bytes().eq_ignore_ascii_case(PROTOCOL.as_bytes()) {
        return None;
    }
    if !request_headers
        .get("connection")
        .is_some_and(headers::connection_upgrade)
    {
        return None;
    }
    let raw = request_headers.get(SETTINGS_HEADER)?;
    parse_settings_header(raw.as_bytes()).ok()
}

/// Decodes an `HTTP2-Settings` value back into a SETTINGS frame.
pub fn parse_settings_header(value: &[u8]) -> Result<frame::Settings, frame::Error> {
    let payload = URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|_| frame::Error::InvalidPayloadLength)?;
    let head = Head::new(Kind::Settings, 0, StreamId::zero());
    frame::Settings::load(head, &payload)
}

/// The stream the upgraded request continues on.
#[must_use]
pub fn upgraded_stream_id() -> StreamId {
    StreamId::from(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_header_roundtrip() {
        let mut settings = frame::Settings::default();
        settings.set_initial_window_size(Some(1_048_576));
        settings.set_enable_push(false);

        let value = settings_header_value(&settings);
        // base64url alphabet, no padding
        assert!(!value.contains('='));
        let parsed = parse_settings_header(value.as_bytes()).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn upgrade_request_headers_are_complete() {
        let mut headers = OrderedHeaders::new();
        apply_upgrade_headers(&mut headers, &frame::Settings::default()).unwrap();
        assert_eq!(
            headers.get("connection").unwrap(),
            "Upgrade, HTTP2-Settings"
        );
        assert_eq!(headers.get("upgrade").unwrap(), "h2c");
        assert!(headers.get("http2-settings").is_some());
        assert_eq!(upgrade_settings(&headers), Some(frame::Settings::default()));
    }

    #[test]
    fn non_101_fails_the_upgrade() {
        let mut headers = OrderedHeaders::new();
        headers.append("Connection", "Upgrade").unwrap();
        headers.append("Upgrade", "h2c").unwrap();
        assert!(validate_upgrade_response(StatusCode::OK, &headers).is_err());
        assert!(validate_upgrade_response(StatusCode::SWITCHING_PROTOCOLS, &headers).is_ok());
    }

    #[test]
    fn mismatched_upgrade_headers_fail() {
        let mut headers = OrderedHeaders::new();
        headers.append("Connection", "Upgrade").unwrap();
        headers.append("Upgrade", "websocket").unwrap();
        assert!(
            validate_upgrade_response(StatusCode::SWITCHING_PROTOCOLS, &headers).is_err()
        );
    }
}
