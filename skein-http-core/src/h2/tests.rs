//! Connection-level scenario tests, driving the engine against a scripted
//! peer over an in-memory duplex.

use bytes::{Bytes, BytesMut};
use http::Method;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

use super::PREFACE;
use super::frame::{self, Frame, Head, Kind, Pseudo, Reason, StreamId};
use super::proto::{Connection, Error, Event, SendData, Step};
use crate::headers::OrderedHeaders;

/// Reads one raw frame (head + payload) off the scripted peer.
async fn read_raw_frame(io: &mut DuplexStream) -> (Head, Bytes) {
    let mut head_buf = [0u8; 9];
    io.read_exact(&mut head_buf).await.unwrap();
    let head = Head::parse(&head_buf);
    let len = u32::from_be_bytes([0, head_buf[0], head_buf[1], head_buf[2]]) as usize;
    let mut payload = vec![0u8; len];
    io.read_exact(&mut payload).await.unwrap();
    (head, payload.into())
}

async fn read_preface(io: &mut DuplexStream) {
    let mut preface = [0u8; 24];
    io.read_exact(&mut preface).await.unwrap();
    assert_eq!(&preface, PREFACE);
}

fn encode_frame(frame: Frame) -> Vec<u8> {
    let mut buf = BytesMut::new();
    match frame {
        Frame::Settings(f) => f.encode(&mut buf),
        Frame::Ping(f) => f.encode(&mut buf),
        Frame::WindowUpdate(f) => f.encode(&mut buf),
        Frame::GoAway(f) => f.encode(&mut buf),
        Frame::Reset(f) => f.encode(&mut buf),
        Frame::Priority(f) => f.encode(&mut buf),
        _ => panic!("scripted peer only sends simple frames"),
    }
    buf.to_vec()
}

fn request_pseudo() -> Pseudo {
    Pseudo::request(Method::GET, "https", "h2.example", "/")
}

#[tokio::test]
async fn client_handshake_emits_preface_then_settings() {
    let (client_io, mut peer) = duplex(64 * 1024);
    let _conn = Connection::client_handshake(client_io, frame::Settings::default())
        .await
        .unwrap();

    // Expected first bytes: the 24-byte preface, then an empty SETTINGS
    // frame `00 00 00 04 00 00 00 00 00`.
    read_preface(&mut peer).await;
    let mut settings = [0u8; 9];
    peer.read_exact(&mut settings).await.unwrap();
    assert_eq!(settings, [0, 0, 0, 4, 0, 0, 0, 0, 0]);
}

#[tokio::test]
async fn request_headers_follow_the_preface() {
    let (client_io, mut peer) = duplex(64 * 1024);
    let mut conn = Connection::client_handshake(client_io, frame::Settings::default())
        .await
        .unwrap();

    let id = conn
        .send_request(request_pseudo(), OrderedHeaders::new(), true)
        .await
        .unwrap();
    assert_eq!(id, StreamId::from(1));

    read_preface(&mut peer).await;
    let (settings_head, _) = read_raw_frame(&mut peer).await;
    assert_eq!(settings_head.kind(), Kind::Settings);

    let (head, _) = read_raw_frame(&mut peer).await;
    assert_eq!(head.kind(), Kind::Headers);
    assert_eq!(head.stream_id(), StreamId::from(1));
    // END_STREAM | END_HEADERS
    assert_eq!(head.flag() & 0x5, 0x5);
}

#[tokio::test]
async fn settings_are_acked_then_applied() {
    let (client_io, mut peer) = duplex(64 * 1024);
    let mut conn = Connection::client_handshake(client_io, frame::Settings::default())
        .await
        .unwrap();
    read_preface(&mut peer).await;
    let _ = read_raw_frame(&mut peer).await;

    let mut remote = frame::Settings::default();
    remote.set_initial_window_size(Some(10));
    peer.write_all(&encode_frame(remote.into())).await.unwrap();

    // The engine applies the remote mirror and acks without surfacing.
    assert!(matches!(conn.step().await.unwrap(), Step::Progress));
    let (ack_head, payload) = read_raw_frame(&mut peer).await;
    assert_eq!(ack_head.kind(), Kind::Settings);
    assert_eq!(ack_head.flag() & 0x1, 0x1);
    assert!(payload.is_empty());
}

#[tokio::test]
async fn flow_control_suspends_and_resumes() {
    let (client_io, mut peer) = duplex(64 * 1024);
    let mut conn = Connection::client_handshake(client_io, frame::Settings::default())
        .await
        .unwrap();
    read_preface(&mut peer).await;
    let _ = read_raw_frame(&mut peer).await;

    // Peer advertises INITIAL_WINDOW_SIZE = 10.
    let mut remote = frame::Settings::default();
    remote.set_initial_window_size(Some(10));
    peer.write_all(&encode_frame(remote.into())).await.unwrap();
    assert!(matches!(conn.step().await.unwrap(), Step::Progress));
    let _ack = read_raw_frame(&mut peer).await;

    let id = conn
        .send_request(request_pseudo(), OrderedHeaders::new(), false)
        .await
        .unwrap();
    let (headers_head, _) = read_raw_frame(&mut peer).await;
    assert_eq!(headers_head.kind(), Kind::Headers);

    // 15 bytes against a 10-byte window: 10 go out, the send suspends.
    let sent = conn
        .send_data(id, Bytes::from_static(b"0123456789ABCDE"), true)
        .await
        .unwrap();
    assert_eq!(sent, SendData::NeedWindowUpdate);
    assert!(conn.has_pending_data(id));

    let (data_head, payload) = read_raw_frame(&mut peer).await;
    assert_eq!(data_head.kind(), Kind::Data);
    assert_eq!(payload.as_ref(), b"0123456789");
    assert_eq!(data_head.flag() & 0x1, 0, "END_STREAM must wait");

    // Credit for the stream and the connection releases the tail.
    peer.write_all(&encode_frame(
        frame::WindowUpdate::new(StreamId::zero(), 5).into(),
    ))
    .await
    .unwrap();
    peer.write_all(&encode_frame(frame::WindowUpdate::new(id, 5).into()))
        .await
        .unwrap();

    let mut done = false;
    for _ in 0..2 {
        match conn.step().await.unwrap() {
            Step::Event(Event::DataSent { stream_id }) => {
                assert_eq!(stream_id, id);
                done = true;
                break;
            }
            Step::Progress => {}
            other => panic!("unexpected step: {other:?}"),
        }
    }
    assert!(done);
    assert!(!conn.has_pending_data(id));

    let (tail_head, tail) = read_raw_frame(&mut peer).await;
    assert_eq!(tail_head.kind(), Kind::Data);
    assert_eq!(tail.as_ref(), b"ABCDE");
    assert_eq!(tail_head.flag() & 0x1, 0x1);
}

#[tokio::test]
async fn ping_is_ponged() {
    let (client_io, mut peer) = duplex(64 * 1024);
    let mut conn = Connection::client_handshake(client_io, frame::Settings::default())
        .await
        .unwrap();
    read_preface(&mut peer).await;
    let _ = read_raw_frame(&mut peer).await;

    peer.write_all(&encode_frame(frame::Ping::new(*b"12345678").into()))
        .await
        .unwrap();
    assert!(matches!(conn.step().await.unwrap(), Step::Progress));

    let (pong_head, payload) = read_raw_frame(&mut peer).await;
    assert_eq!(pong_head.kind(), Kind::Ping);
    assert_eq!(pong_head.flag() & 0x1, 0x1);
    assert_eq!(payload.as_ref(), b"12345678");
}

#[tokio::test]
async fn interleaved_frame_during_header_block_is_fatal() {
    let (client_io, mut peer) = duplex(64 * 1024);
    let mut conn = Connection::client_handshake(client_io, frame::Settings::default())
        .await
        .unwrap();
    let _ = conn
        .send_request(request_pseudo(), OrderedHeaders::new(), true)
        .await
        .unwrap();
    read_preface(&mut peer).await;
    let _ = read_raw_frame(&mut peer).await;
    let _ = read_raw_frame(&mut peer).await;

    // HEADERS without END_HEADERS on stream 1, then a PING: the header
    // block may not be interrupted.
    let mut headers = BytesMut::new();
    Head::new(Kind::Headers, 0, StreamId::from(1)).encode(0, &mut headers);
    peer.write_all(&headers).await.unwrap();
    peer.write_all(&encode_frame(frame::Ping::new([0; 8]).into()))
        .await
        .unwrap();

    match conn.next_event().await {
        Err(Error::GoAway(_, reason, _)) => assert_eq!(reason, Reason::PROTOCOL_ERROR),
        other => panic!("expected connection error, got {other:?}"),
    }
    // The GOAWAY went out before the failure surfaced.
    let (goaway_head, payload) = read_raw_frame(&mut peer).await;
    assert_eq!(goaway_head.kind(), Kind::GoAway);
    assert_eq!(u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]), 1);
}

#[tokio::test]
async fn oversized_frame_is_a_frame_size_error() {
    let (client_io, mut peer) = duplex(256 * 1024);
    let mut conn = Connection::client_handshake(client_io, frame::Settings::default())
        .await
        .unwrap();
    read_preface(&mut peer).await;
    let _ = read_raw_frame(&mut peer).await;

    // A length of exactly MAX_FRAME_SIZE parses; one greater is fatal.
    let mut frame_buf = BytesMut::new();
    Head::new(Kind::Unknown, 0, StreamId::zero())
        .encode(frame::DEFAULT_MAX_FRAME_SIZE as usize, &mut frame_buf);
    frame_buf.resize(9 + frame::DEFAULT_MAX_FRAME_SIZE as usize, 0);
    peer.write_all(&frame_buf).await.unwrap();
    // Unknown frame types are skipped without surfacing.
    peer.write_all(&encode_frame(frame::Ping::new([1; 8]).into()))
        .await
        .unwrap();
    assert!(matches!(conn.step().await.unwrap(), Step::Progress));

    let mut frame_buf = BytesMut::new();
    Head::new(Kind::Unknown, 0, StreamId::zero())
        .encode(frame::DEFAULT_MAX_FRAME_SIZE as usize + 1, &mut frame_buf);
    frame_buf.resize(9 + frame::DEFAULT_MAX_FRAME_SIZE as usize + 1, 0);
    peer.write_all(&frame_buf).await.unwrap();

    match conn.next_event().await {
        Err(err) => assert_eq!(err.reason(), Some(Reason::FRAME_SIZE_ERROR)),
        other => panic!("expected frame size error, got {other:?}"),
    }
}

#[tokio::test]
async fn go_away_refuses_new_streams() {
    let (client_io, mut peer) = duplex(64 * 1024);
    let mut conn = Connection::client_handshake(client_io, frame::Settings::default())
        .await
        .unwrap();
    read_preface(&mut peer).await;
    let _ = read_raw_frame(&mut peer).await;

    peer.write_all(&encode_frame(
        frame::GoAway::new(StreamId::zero(), Reason::NO_ERROR).into(),
    ))
    .await
    .unwrap();

    match conn.next_event().await.unwrap() {
        Some(Event::GoAway { reason, .. }) => assert_eq!(reason, Reason::NO_ERROR),
        other => panic!("expected GoAway event, got {other:?}"),
    }
    assert!(conn.is_going_away());
    assert!(
        conn.send_request(request_pseudo(), OrderedHeaders::new(), true)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn stream_level_error_resets_only_the_stream() {
    let (client_io, mut peer) = duplex(64 * 1024);
    let mut conn = Connection::client_handshake(client_io, frame::Settings::default())
        .await
        .unwrap();
    let id = conn
        .send_request(request_pseudo(), OrderedHeaders::new(), true)
        .await
        .unwrap();
    read_preface(&mut peer).await;
    let _ = read_raw_frame(&mut peer).await;
    let _ = read_raw_frame(&mut peer).await;

    // PRIORITY with a self-dependency: stream error, not connection error.
    let mut bad = BytesMut::new();
    Head::new(Kind::Priority, 0, id).encode(5, &mut bad);
    bad.extend_from_slice(&u32::from(id).to_be_bytes());
    bad.extend_from_slice(&[16]);
    peer.write_all(&bad).await.unwrap();
    // Something the connection survives to process afterwards.
    peer.write_all(&encode_frame(frame::Ping::new([2; 8]).into()))
        .await
        .unwrap();

    match conn.next_event().await.unwrap() {
        Some(Event::Reset { stream_id, reason }) => {
            assert_eq!(stream_id, id);
            assert_eq!(reason, Reason::PROTOCOL_ERROR);
        }
        other => panic!("expected Reset event, got {other:?}"),
    }

    let (rst_head, _) = read_raw_frame(&mut peer).await;
    assert_eq!(rst_head.kind(), Kind::Reset);
    // The connection is still processing frames.
    assert!(matches!(conn.step().await.unwrap(), Step::Progress));
    let (pong_head, _) = read_raw_frame(&mut peer).await;
    assert_eq!(pong_head.kind(), Kind::Ping);
}

#[tokio::test]
async fn h2c_server_side_accepts_upgraded_stream_one() {
    let (server_io, mut peer) = duplex(64 * 1024);

    let peer_task = tokio::spawn(async move {
        // The "client": preface, then SETTINGS, then read the response.
        peer.write_all(PREFACE).await.unwrap();
        peer.write_all(&encode_frame(frame::Settings::default().into()))
            .await
            .unwrap();

        let mut kinds = Vec::new();
        // SETTINGS, the ACK of ours, then the response HEADERS.
        for _ in 0..3 {
            let (head, _) = read_raw_frame(&mut peer).await;
            kinds.push(head.kind());
            if head.kind() == Kind::Headers {
                assert_eq!(head.stream_id(), StreamId::from(1));
            }
        }
        kinds
    });

    let mut conn =
        Connection::server_upgrade(server_io, frame::Settings::default(), BytesMut::new())
            .await
            .unwrap();

    // The upgraded request is stream 1, half-closed (remote): the server
    // responds on it directly.
    assert!(matches!(conn.step().await.unwrap(), Step::Progress));
    conn.send_response(
        StreamId::from(1),
        Pseudo::response(http::StatusCode::OK),
        OrderedHeaders::new(),
        true,
    )
    .await
    .unwrap();

    let kinds = peer_task.await.unwrap();
    assert!(kinds.contains(&Kind::Settings));
    assert!(kinds.contains(&Kind::Headers));
}
