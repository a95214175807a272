//! The async face of the protocol machine, for hijacked connections.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use skein_net::Cancel;

use crate::protocol::error::ProtocolError;
use crate::protocol::frame::Frame;
use crate::protocol::{Machine, Message, Role, WebSocketConfig};

/// A WebSocket over an async stream: typically a
/// [`skein_net::Conn`] hijacked out of the HTTP/1 codec after the 101,
/// together with whatever bytes were already buffered.
#[derive(Debug)]
pub struct AsyncWebSocket<S> {
    io: S,
    machine: Machine,
    read_buf: BytesMut,
}

impl<S> AsyncWebSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a stream that completed the opening handshake. `buffered`
    /// carries bytes read past the 101 response.
    pub fn from_upgraded(
        io: S,
        role: Role,
        config: Option<WebSocketConfig>,
        buffered: BytesMut,
    ) -> Self {
        Self {
            io,
            machine: Machine::new(role, config.unwrap_or_default()),
            read_buf: buffered,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.io
    }

    pub fn into_inner(self) -> S {
        self.io
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.machine.is_closed()
    }

    /// Reads the next message; control frames are handled inline.
    pub async fn read(&mut self, cancel: &Cancel) -> Result<Message, ProtocolError> {
        loop {
            if let Some(frame) = Frame::parse(&mut self.read_buf)? {
                trace!("frame received: {:?}", frame.header);
                let (reply, message) = self.machine.handle(frame)?;
                if let Some(reply) = reply {
                    self.write_raw(&reply, cancel).await?;
                }
                if let Some(message) = message {
                    return Ok(message);
                }
                continue;
            }

            let n = cancel
                .run(self.io.read_buf(&mut self.read_buf))
                .await
                .map_err(|c| ProtocolError::Io(std::io::Error::other(c)))??;
            if n == 0 {
                return Err(if self.machine.close_received() {
                    ProtocolError::Io(std::io::ErrorKind::UnexpectedEof.into())
                } else {
                    ProtocolError::ResetWithoutClosingHandshake
                });
            }
        }
    }

    /// Writes one message and flushes.
    pub async fn send(&mut self, message: Message, cancel: &Cancel) -> Result<(), ProtocolError> {
        let mut wire = Vec::new();
        self.machine.encode_message(message, &mut wire)?;
        self.write_raw(&wire, cancel).await
    }

    /// Starts the close handshake (status 1000 unless given), then waits
    /// for the peer's close.
    pub async fn close(
        &mut self,
        close_frame: Option<crate::protocol::CloseFrame>,
        cancel: &Cancel,
    ) -> Result<(), ProtocolError> {
        if !self.machine.close_sent() {
            self.send(Message::Close(close_frame), cancel).await?;
        }
        while !self.machine.close_received() {
            match self.read(cancel).await {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => return Err(e),
            }
        }
        let _ = cancel.run(self.io.shutdown()).await;
        Ok(())
    }

    async fn write_raw(&mut self, bytes: &[u8], cancel: &Cancel) -> Result<(), ProtocolError> {
        cancel
            .run(async {
                self.io.write_all(bytes).await?;
                self.io.flush().await
            })
            .await
            .map_err(|c| ProtocolError::Io(std::io::Error::other(c)))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn echo_between_client_and_server() {
        let (client_io, server_io) = duplex(4096);
        let cancel = Cancel::new();

        let mut client =
            AsyncWebSocket::from_upgraded(client_io, Role::Client, None, BytesMut::new());
        let mut server =
            AsyncWebSocket::from_upgraded(server_io, Role::Server, None, BytesMut::new());

        client
            .send(Message::Text("round and round".into()), &cancel)
            .await
            .unwrap();
        let got = server.read(&cancel).await.unwrap();
        assert_eq!(got, Message::Text("round and round".into()));

        server
            .send(Message::Binary(vec![1, 2, 3]), &cancel)
            .await
            .unwrap();
        let got = client.read(&cancel).await.unwrap();
        assert_eq!(got, Message::Binary(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn ping_gets_ponged_automatically() {
        let (client_io, server_io) = duplex(4096);
        let cancel = Cancel::new();

        let mut client =
            AsyncWebSocket::from_upgraded(client_io, Role::Client, None, BytesMut::new());
        let mut server =
            AsyncWebSocket::from_upgraded(server_io, Role::Server, None, BytesMut::new());

        client
            .send(Message::Ping(b"live?".to_vec()), &cancel)
            .await
            .unwrap();
        // The server surfaces the ping and replies on its own.
        assert_eq!(
            server.read(&cancel).await.unwrap(),
            Message::Ping(b"live?".to_vec())
        );
        assert_eq!(
            client.read(&cancel).await.unwrap(),
            Message::Pong(b"live?".to_vec())
        );
    }

    #[tokio::test]
    async fn close_handshake() {
        let (client_io, server_io) = duplex(4096);
        let cancel = Cancel::new();

        let mut client =
            AsyncWebSocket::from_upgraded(client_io, Role::Client, None, BytesMut::new());
        let mut server =
            AsyncWebSocket::from_upgraded(server_io, Role::Server, None, BytesMut::new());

        let close_task = tokio::spawn(async move {
            let cancel = Cancel::new();
            client.close(None, &cancel).await.unwrap();
            client
        });

        // Server observes the close, the machine answers it inline.
        match server.read(&cancel).await.unwrap() {
            Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 1000),
            other => panic!("unexpected message: {other:?}"),
        }
        let client = close_task.await.unwrap();
        assert!(client.is_closed());
    }
}
