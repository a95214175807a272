//! The RFC 6455 opening handshake.
//!
//! The HTTP side of the handshake rides on skein's HTTP/1 codec; this
//! module supplies the key derivation and the header validation for both
//! roles. After the 101 the connection is hijacked out of the HTTP/1
//! codec and handed to the frame layer.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use http::Method;
use sha1::{Digest, Sha1};

use skein_http_core::OrderedHeaders;

/// The fixed GUID every accept key is derived with.
pub const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Why a handshake was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// The request method must be GET.
    InvalidMethod,
    /// `Upgrade: websocket` missing or wrong.
    MissingUpgrade,
    /// `Connection: Upgrade` missing or wrong.
    MissingConnection,
    /// `Sec-WebSocket-Key` missing.
    MissingKey,
    /// The reply's status was not 101.
    InvalidStatus,
    /// The reply's `Sec-WebSocket-Accept` did not match.
    InvalidAccept,
    /// A handshake header failed validation.
    InvalidHeader,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidMethod => "websocket handshake requires GET",
            Self::MissingUpgrade => "missing or mismatched Upgrade header",
            Self::MissingConnection => "missing or mismatched Connection header",
            Self::MissingKey => "missing Sec-WebSocket-Key header",
            Self::InvalidStatus => "handshake reply was not 101",
            Self::InvalidAccept => "Sec-WebSocket-Accept mismatch",
            Self::InvalidHeader => "invalid handshake header",
        })
    }
}

impl std::error::Error for HandshakeError {}

/// `base64(SHA1(key ∥ GUID))`, the server's proof of protocol awareness.
#[must_use]
pub fn derive_accept_key(key: &[u8]) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key);
    sha1.update(GUID.as_bytes());
    STANDARD.encode(sha1.finalize())
}

/// A fresh random `Sec-WebSocket-Key` value.
#[must_use]
pub fn generate_key() -> String {
    let nonce: [u8; 16] = rand::random();
    STANDARD.encode(nonce)
}

fn header_token_match(headers: &OrderedHeaders, name: &str, token: &str) -> bool {
    headers.get(name).is_some_and(|value| {
        value.to_str().is_ok_and(|s| {
            s.split(',')
                .any(|part| part.trim().eq_ignore_ascii_case(token))
        })
    })
}

/// Server side: checks the upgrade request and returns the accept key to
/// answer with.
pub fn validate_request(
    method: &Method,
    headers: &OrderedHeaders,
) -> Result<String, HandshakeError> {
    if method != Method::GET {
        return Err(HandshakeError::InvalidMethod);
    }
    if !header_token_match(headers, "upgrade", "websocket") {
        return Err(HandshakeError::MissingUpgrade);
    }
    if !header_token_match(headers, "connection", "upgrade") {
        return Err(HandshakeError::MissingConnection);
    }
    let key = headers
        .get("sec-websocket-key")
        .ok_or(HandshakeError::MissingKey)?;
    Ok(derive_accept_key(key.as_bytes()))
}

/// The headers for the server's 101 reply.
pub fn accept_headers(accept_key: &str) -> Result<OrderedHeaders, HandshakeError> {
    let mut headers = OrderedHeaders::new();
    for (name, value) in [
        ("Upgrade", "websocket"),
        ("Connection", "Upgrade"),
        ("Sec-WebSocket-Accept", accept_key),
    ] {
        headers
            .append(name, value)
            .map_err(|_| HandshakeError::InvalidHeader)?;
    }
    Ok(headers)
}

/// The headers a client adds to its upgrade request.
pub fn client_request_headers(key: &str) -> Result<OrderedHeaders, HandshakeError> {
    let mut headers = OrderedHeaders::new();
    for (name, value) in [
        ("Upgrade", "websocket"),
        ("Connection", "Upgrade"),
        ("Sec-WebSocket-Key", key),
        ("Sec-WebSocket-Version", "13"),
    ] {
        headers
            .append(name, value)
            .map_err(|_| HandshakeError::InvalidHeader)?;
    }
    Ok(headers)
}

/// Client side: checks the server's 101 reply against the sent key.
pub fn validate_response(
    status: u16,
    headers: &OrderedHeaders,
    sent_key: &str,
) -> Result<(), HandshakeError> {
    if status != 101 {
        return Err(HandshakeError::InvalidStatus);
    }
    if !header_token_match(headers, "upgrade", "websocket") {
        return Err(HandshakeError::MissingUpgrade);
    }
    if !header_token_match(headers, "connection", "upgrade") {
        return Err(HandshakeError::MissingConnection);
    }
    let accept = headers
        .get("sec-websocket-accept")
        .ok_or(HandshakeError::InvalidAccept)?;
    if accept.as_bytes() != derive_accept_key(sent_key.as_bytes()).as_bytes() {
        return Err(HandshakeError::InvalidAccept);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc_example_accept_key() {
        // The key/accept pair from RFC 6455 §1.3.
        assert_eq!(
            derive_accept_key(b"dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn server_validation_requires_all_headers() {
        let mut headers = OrderedHeaders::new();
        headers.append("Upgrade", "websocket").unwrap();
        headers.append("Connection", "keep-alive, Upgrade").unwrap();
        headers
            .append("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
            .unwrap();

        let accept = validate_request(&Method::GET, &headers).unwrap();
        assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");

        assert_eq!(
            validate_request(&Method::POST, &headers),
            Err(HandshakeError::InvalidMethod)
        );

        let mut without_key = OrderedHeaders::new();
        without_key.append("Upgrade", "websocket").unwrap();
        without_key.append("Connection", "Upgrade").unwrap();
        assert_eq!(
            validate_request(&Method::GET, &without_key),
            Err(HandshakeError::MissingKey)
        );
    }

    #[test]
    fn response_roundtrip() {
        let key = generate_key();
        let headers = accept_headers(&derive_accept_key(key.as_bytes())).unwrap();
        validate_response(101, &headers, &key).unwrap();
        assert_eq!(
            validate_response(200, &headers, &key),
            Err(HandshakeError::InvalidStatus)
        );
        assert_eq!(
            validate_response(101, &headers, "some-other-key"),
            Err(HandshakeError::InvalidAccept)
        );
    }
}
