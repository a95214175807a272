use std::io::Cursor;

use crate::protocol::error::ProtocolError;
use crate::protocol::{Message, Role, WebSocket, WebSocketConfig};

#[test]
fn receive_messages() {
    // ping, pong, fragmented text ("Hello, " + "World!"), binary.
    let incoming = Cursor::new(vec![
        0x89, 0x02, 0x01, 0x02, 0x8a, 0x01, 0x03, 0x01, 0x07, 0x48, 0x65, 0x6c, 0x6c, 0x6f, 0x2c,
        0x20, 0x80, 0x06, 0x57, 0x6f, 0x72, 0x6c, 0x64, 0x21, 0x82, 0x03, 0x01, 0x02, 0x03,
    ]);
    let mut socket = WebSocket::from_raw_socket(super::write::WriteMoc::new(incoming), Role::Client, None);
    assert_eq!(socket.read().unwrap(), Message::Ping(vec![1, 2]));
    assert_eq!(socket.read().unwrap(), Message::Pong(vec![3]));
    assert_eq!(socket.read().unwrap(), Message::Text("Hello, World!".into()));
    assert_eq!(socket.read().unwrap(), Message::Binary(vec![0x01, 0x02, 0x03]));
}

#[test]
fn ping_is_answered_inline() {
    let incoming = Cursor::new(vec![0x89, 0x02, 0xaa, 0xbb]);
    let mut socket =
        WebSocket::from_raw_socket(super::write::WriteMoc::new(incoming), Role::Client, None);
    assert_eq!(socket.read().unwrap(), Message::Ping(vec![0xaa, 0xbb]));
    // One pong frame went out: masked (client), 2 header + 4 key + 2 payload.
    assert_eq!(socket.get_ref().written_bytes, 8);
    assert_eq!(socket.get_ref().write_count, 1);
}

#[test]
fn size_limiting_text_fragmented() {
    let incoming = Cursor::new(vec![
        0x01, 0x07, 0x48, 0x65, 0x6c, 0x6c, 0x6f, 0x2c, 0x20, 0x80, 0x06, 0x57, 0x6f, 0x72, 0x6c,
        0x64, 0x21,
    ]);
    let limit = WebSocketConfig {
        max_message_size: Some(10),
        ..WebSocketConfig::default()
    };
    let mut socket =
        WebSocket::from_raw_socket(super::write::WriteMoc::new(incoming), Role::Client, Some(limit));

    assert!(matches!(
        socket.read(),
        Err(ProtocolError::MessageTooLong {
            size: 13,
            max_size: 10
        })
    ));
}

#[test]
fn size_limiting_binary() {
    let incoming = Cursor::new(vec![0x82, 0x03, 0x01, 0x02, 0x03]);
    let limit = WebSocketConfig {
        max_message_size: Some(2),
        ..WebSocketConfig::default()
    };
    let mut socket =
        WebSocket::from_raw_socket(super::write::WriteMoc::new(incoming), Role::Client, Some(limit));

    assert!(matches!(
        socket.read(),
        Err(ProtocolError::MessageTooLong {
            size: 3,
            max_size: 2
        })
    ));
}

#[test]
fn server_rejects_unmasked_frames() {
    let incoming = Cursor::new(vec![0x81, 0x02, 0x48, 0x69]);
    let mut socket =
        WebSocket::from_raw_socket(super::write::WriteMoc::new(incoming), Role::Server, None);
    assert!(matches!(
        socket.read(),
        Err(ProtocolError::UnmaskedClientFrame)
    ));
}

#[test]
fn server_accepts_masked_frames() {
    // "Hi" under mask 01 02 03 04.
    let incoming = Cursor::new(vec![
        0x81,
        0x82,
        0x01,
        0x02,
        0x03,
        0x04,
        b'H' ^ 0x01,
        b'i' ^ 0x02,
    ]);
    let mut socket =
        WebSocket::from_raw_socket(super::write::WriteMoc::new(incoming), Role::Server, None);
    assert_eq!(socket.read().unwrap(), Message::Text("Hi".into()));
}

#[test]
fn close_is_replied_and_surfaced() {
    // close with code 1001.
    let incoming = Cursor::new(vec![0x88, 0x02, 0x03, 0xe9]);
    let mut socket =
        WebSocket::from_raw_socket(super::write::WriteMoc::new(incoming), Role::Client, None);
    match socket.read().unwrap() {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 1001),
        other => panic!("unexpected message: {other:?}"),
    }
    // The close reply went out.
    assert!(socket.get_ref().write_count >= 1);
}

#[test]
fn interleaved_control_frames_between_fragments() {
    let incoming = Cursor::new(vec![
        0x01, 0x02, b'a', b'b', // text, FIN=0
        0x89, 0x01, 0x07, // ping inline
        0x80, 0x02, b'c', b'd', // continuation, FIN=1
    ]);
    let mut socket =
        WebSocket::from_raw_socket(super::write::WriteMoc::new(incoming), Role::Client, None);
    assert_eq!(socket.read().unwrap(), Message::Ping(vec![0x07]));
    assert_eq!(socket.read().unwrap(), Message::Text("abcd".into()));
}

#[test]
fn invalid_utf8_text_is_rejected() {
    let incoming = Cursor::new(vec![0x81, 0x02, 0xff, 0xfe]);
    let mut socket =
        WebSocket::from_raw_socket(super::write::WriteMoc::new(incoming), Role::Client, None);
    assert!(matches!(socket.read(), Err(ProtocolError::InvalidUtf8)));
}
