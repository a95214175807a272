//! The WebSocket protocol machine.
//!
//! [`WebSocket`] is synchronous over `Read + Write`; the shared
//! [`Machine`] does all frame handling, so the async face in
//! [`crate::AsyncWebSocket`] reuses the exact same logic.

pub mod error;
pub mod frame;
pub mod message;

#[cfg(test)]
mod tests;

use std::io::{Read, Write};

use bytes::BytesMut;
use tracing::trace;

use self::error::ProtocolError;
use self::frame::coding::{CloseCode, OpCode};
use self::frame::{Frame, mask::generate_mask};

pub use self::message::{CloseFrame, Message};

/// Which side of the connection this endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Masks every outgoing frame; rejects masked incoming frames.
    Client,
    /// Never masks; rejects unmasked incoming frames.
    Server,
}

/// Tunables for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebSocketConfig {
    /// Bound on an assembled message (fragments included); `None` is
    /// unlimited.
    pub max_message_size: Option<usize>,
    /// [`WebSocket::write`] buffers frames until this many bytes are
    /// pending, then performs one underlying write.
    pub write_buffer_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: Some(64 << 20),
            write_buffer_size: 128 * 1024,
        }
    }
}

impl WebSocketConfig {
    #[must_use]
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    #[must_use]
    pub fn max_message_size(mut self, size: Option<usize>) -> Self {
        self.max_message_size = size;
        self
    }
}

/// The transport-independent protocol state: masking rules,
/// fragmentation, control-frame replies and the close handshake.
#[derive(Debug)]
pub(crate) struct Machine {
    role: Role,
    config: WebSocketConfig,
    /// An in-progress fragmented message: its kind and bytes so far.
    fragments: Option<(OpCode, Vec<u8>)>,
    close_sent: bool,
    close_received: bool,
}

impl Machine {
    pub(crate) fn new(role: Role, config: WebSocketConfig) -> Self {
        Self {
            role,
            config,
            fragments: None,
            close_sent: false,
            close_received: false,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.close_sent && self.close_received
    }

    pub(crate) fn close_sent(&self) -> bool {
        self.close_sent
    }

    pub(crate) fn close_received(&self) -> bool {
        self.close_received
    }

    /// Handles one whole frame. Returns bytes to write back (auto-pong or
    /// the close reply) and the message to surface, if any.
    pub(crate) fn handle(
        &mut self,
        frame: Frame,
    ) -> Result<(Option<Vec<u8>>, Option<Message>), ProtocolError> {
        match (self.role, frame.header.mask) {
            (Role::Server, None) => return Err(ProtocolError::UnmaskedClientFrame),
            (Role::Client, Some(_)) => return Err(ProtocolError::MaskedServerFrame),
            _ => {}
        }

        match frame.header.opcode {
            OpCode::Ping => {
                // Auto-pong with the same payload; the ping still
                // surfaces so the application sees liveness traffic.
                let mut reply = Vec::new();
                self.encode_frame(Frame::pong(frame.payload.clone()), &mut reply);
                Ok((Some(reply), Some(Message::Ping(frame.payload))))
            }
            OpCode::Pong => Ok((None, Some(Message::Pong(frame.payload)))),
            OpCode::Close => {
                self.close_received = true;
                let (code, reason) = frame.close_parts();
                let reply = if self.close_sent {
                    None
                } else {
                    self.close_sent = true;
                    let mut reply = Vec::new();
                    self.encode_frame(
                        Frame::close(Some(code.unwrap_or(CloseCode::NORMAL)), ""),
                        &mut reply,
                    );
                    Some(reply)
                };
                let close_frame = code.map(|code| CloseFrame { code, reason });
                Ok((reply, Some(Message::Close(close_frame))))
            }
            OpCode::Text | OpCode::Binary => {
                if self.fragments.is_some() {
                    return Err(ProtocolError::ExpectedFragment);
                }
                if frame.header.is_final {
                    self.check_size(frame.payload.len())?;
                    Ok((None, Some(self.assemble(frame.header.opcode, frame.payload)?)))
                } else {
                    self.check_size(frame.payload.len())?;
                    self.fragments = Some((frame.header.opcode, frame.payload));
                    Ok((None, None))
                }
            }
            OpCode::Continue => {
                let Some((opcode, mut data)) = self.fragments.take() else {
                    return Err(ProtocolError::UnexpectedContinueFrame);
                };
                self.check_size(data.len() + frame.payload.len())?;
                data.extend_from_slice(&frame.payload);
                if frame.header.is_final {
                    Ok((None, Some(self.assemble(opcode, data)?)))
                } else {
                    self.fragments = Some((opcode, data));
                    Ok((None, None))
                }
            }
        }
    }

    fn check_size(&self, size: usize) -> Result<(), ProtocolError> {
        if let Some(max_size) = self.config.max_message_size {
            if size > max_size {
                return Err(ProtocolError::MessageTooLong { size, max_size });
            }
        }
        Ok(())
    }

    fn assemble(&self, opcode: OpCode, data: Vec<u8>) -> Result<Message, ProtocolError> {
        match opcode {
            OpCode::Text => String::from_utf8(data)
                .map(Message::Text)
                .map_err(|_| ProtocolError::InvalidUtf8),
            _ => Ok(Message::Binary(data)),
        }
    }

    /// Encodes an outgoing message into its wire frame.
    pub(crate) fn encode_message(
        &mut self,
        message: Message,
        dst: &mut Vec<u8>,
    ) -> Result<(), ProtocolError> {
        if self.close_sent {
            return Err(ProtocolError::SendAfterClosing);
        }
        let frame = match message {
            Message::Text(text) => Frame::data(OpCode::Text, text.into_bytes(), true),
            Message::Binary(data) => Frame::data(OpCode::Binary, data, true),
            Message::Ping(data) => Frame::ping(data),
            Message::Pong(data) => Frame::pong(data),
            Message::Close(close_frame) => {
                self.close_sent = true;
                match close_frame {
                    Some(frame) => Frame::close(Some(frame.code), &frame.reason),
                    None => Frame::close(Some(CloseCode::NORMAL), ""),
                }
            }
        };
        self.encode_frame(frame, dst);
        Ok(())
    }

    /// Lays a frame down, masking it when this side is the client. Every
    /// client frame gets a fresh random key.
    fn encode_frame(&self, mut frame: Frame, dst: &mut Vec<u8>) {
        frame.header.mask = match self.role {
            Role::Client => Some(generate_mask()),
            Role::Server => None,
        };
        frame.encode(dst);
    }
}

/// A synchronous WebSocket over any `Read + Write` stream.
#[derive(Debug)]
pub struct WebSocket<Stream> {
    socket: Stream,
    machine: Machine,
    read_buf: BytesMut,
    out_buf: Vec<u8>,
}

impl<Stream> WebSocket<Stream> {
    /// Wraps a stream that already completed the opening handshake.
    pub fn from_raw_socket(socket: Stream, role: Role, config: Option<WebSocketConfig>) -> Self {
        Self {
            socket,
            machine: Machine::new(role, config.unwrap_or_default()),
            read_buf: BytesMut::new(),
            out_buf: Vec::new(),
        }
    }

    pub fn get_ref(&self) -> &Stream {
        &self.socket
    }

    pub fn get_mut(&mut self) -> &mut Stream {
        &mut self.socket
    }

    pub fn into_inner(self) -> Stream {
        self.socket
    }

    /// True once both close frames have passed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.machine.is_closed()
    }
}

impl<Stream: Read + Write> WebSocket<Stream> {
    /// Reads the next message, assembling fragments and answering control
    /// frames inline.
    pub fn read(&mut self) -> Result<Message, ProtocolError> {
        loop {
            if let Some(frame) = Frame::parse(&mut self.read_buf)? {
                trace!("frame received: {:?}", frame.header);
                let (reply, message) = self.machine.handle(frame)?;
                if let Some(reply) = reply {
                    self.socket.write_all(&reply)?;
                    self.socket.flush()?;
                }
                if let Some(message) = message {
                    return Ok(message);
                }
                continue;
            }

            let mut chunk = [0u8; 4096];
            let n = self.socket.read(&mut chunk)?;
            if n == 0 {
                return Err(if self.machine.close_received() {
                    ProtocolError::Io(std::io::ErrorKind::UnexpectedEof.into())
                } else {
                    ProtocolError::ResetWithoutClosingHandshake
                });
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Writes and flushes one message.
    pub fn send(&mut self, message: Message) -> Result<(), ProtocolError> {
        self.machine.encode_message(message, &mut self.out_buf)?;
        self.write_out()?;
        self.socket.flush()?;
        Ok(())
    }

    /// Buffers a message, writing to the socket only when the buffer
    /// grows past the configured size. Call [`WebSocket::flush`] to force
    /// everything out.
    pub fn write(&mut self, message: Message) -> Result<(), ProtocolError> {
        self.machine.encode_message(message, &mut self.out_buf)?;
        if self.out_buf.len() > self.machine.config.write_buffer_size {
            self.write_out()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ProtocolError> {
        self.write_out()?;
        self.socket.flush()?;
        Ok(())
    }

    /// Starts (or completes) the close handshake.
    pub fn close(&mut self, close_frame: Option<CloseFrame>) -> Result<(), ProtocolError> {
        if !self.machine.close_sent {
            self.send(Message::Close(close_frame))?;
        }
        Ok(())
    }

    fn write_out(&mut self) -> Result<(), ProtocolError> {
        if !self.out_buf.is_empty() {
            self.socket.write_all(&self.out_buf)?;
            self.out_buf.clear();
        }
        Ok(())
    }
}
