use std::io::{self, Read, Write};

use crate::protocol::{Message, Role, WebSocket, WebSocketConfig};

/// A write-counting stream: reads pass through, writes are tallied.
pub(super) struct WriteMoc<Stream> {
    stream: Stream,
    pub(super) written_bytes: usize,
    pub(super) write_count: usize,
    pub(super) flush_count: usize,
}

impl<Stream> WriteMoc<Stream> {
    pub(super) fn new(stream: Stream) -> Self {
        Self {
            stream,
            written_bytes: 0,
            write_count: 0,
            flush_count: 0,
        }
    }
}

impl<Stream: Read> Read for WriteMoc<Stream> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl<Stream> Write for WriteMoc<Stream> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len();
        self.written_bytes += n;
        self.write_count += 1;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_count += 1;
        Ok(())
    }
}

#[test]
fn server_write_flush_behaviour() {
    const SEND_ME_LEN: usize = 10;
    const BATCH_ME_LEN: usize = 11;
    const WRITE_BUFFER_SIZE: usize = 600;

    let mut ws = WebSocket::from_raw_socket(
        WriteMoc::new(io::Cursor::new(Vec::<u8>::default())),
        Role::Server,
        Some(WebSocketConfig::default().write_buffer_size(WRITE_BUFFER_SIZE)),
    );

    assert_eq!(ws.get_ref().written_bytes, 0);
    assert_eq!(ws.get_ref().write_count, 0);
    assert_eq!(ws.get_ref().flush_count, 0);

    // `send` writes & flushes immediately.
    ws.send(Message::Text("Send me!".into())).unwrap();
    assert_eq!(ws.get_ref().written_bytes, SEND_ME_LEN);
    assert_eq!(ws.get_ref().write_count, 1);
    assert_eq!(ws.get_ref().flush_count, 1);

    // A batch of buffered writes.
    for msg in (0..100).map(|_| Message::Text("Batch me!".into())) {
        ws.write(msg).unwrap();
    }
    // After 55 writes the out buffer exceeds write_buffer_size=600 and a
    // single underlying write happens (no flush).
    assert_eq!(ws.get_ref().written_bytes, 55 * BATCH_ME_LEN + SEND_ME_LEN);
    assert_eq!(ws.get_ref().write_count, 2);
    assert_eq!(ws.get_ref().flush_count, 1);

    // Flushing writes the remainder and flushes the stream.
    ws.flush().unwrap();
    assert_eq!(ws.get_ref().written_bytes, 100 * BATCH_ME_LEN + SEND_ME_LEN);
    assert_eq!(ws.get_ref().write_count, 3);
    assert_eq!(ws.get_ref().flush_count, 2);
}

#[test]
fn client_frames_are_masked() {
    let mut ws = WebSocket::from_raw_socket(
        WriteMoc::new(io::Cursor::new(Vec::<u8>::default())),
        Role::Client,
        None,
    );
    ws.send(Message::Text("Hi".into())).unwrap();
    // 2 header bytes + 4 mask key + 2 payload.
    assert_eq!(ws.get_ref().written_bytes, 8);
}

#[test]
fn send_after_close_is_rejected() {
    let mut ws = WebSocket::from_raw_socket(
        WriteMoc::new(io::Cursor::new(Vec::<u8>::default())),
        Role::Server,
        None,
    );
    ws.close(None).unwrap();
    assert!(ws.send(Message::Text("late".into())).is_err());
}
