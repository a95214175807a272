use crate::h2::codec::UserError;
use crate::h2::frame::{self, Reason, StreamId};
use crate::h2::proto::{self, Error, Initiator};

use tracing::trace;

/// The state of one HTTP/2 stream.
///
/// ```not_rust
///                              +--------+
///                      send PP |        | recv PP
///                     ,--------|  idle  |--------.
///                    /         |        |         \
///                   v          +--------+          v
///            +----------+          |           +----------+
///            |          |          | send H /  |          |
///     ,------| reserved |          | recv H    | reserved |------.
///     |      | (local)  |          |           | (remote) |      |
///     |      +----------+          v           +----------+      |
///     |          |             +--------+             |          |
///     |          |     recv ES |        | send ES     |          |
///     |   send H |     ,-------|  open  |-------.     | recv H   |
///     |          |    /        |        |        \    |          |
///     |          v   v         +--------+         v   v          |
///     |      +----------+          |           +----------+      |
///     |      |   half   |          |           |   half   |      |
///     |      |  closed  |          | send R /  |  closed  |      |
///     |      | (remote) |          | recv R    | (local)  |      |
///     |      +----------+          |           +----------+      |
///     |           |                |                 |           |
///     |           | send ES /      |       recv ES / |           |
///     |           | send R /       v        send R / |           |
///     |           | recv R     +--------+   recv R   |           |
///     | send R /  `----------->|        |<-----------'  send R / |
///     | recv R                 | closed |               recv R   |
///     `----------------------->|        |<----------------------'
///                              +--------+
/// ```
#[derive(Debug, Clone, Default)]
pub(crate) struct State {
    inner: Inner,
}

#[derive(Debug, Clone, Default)]
enum Inner {
    #[default]
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open {
        local: Side,
        remote: Side,
    },
    HalfClosedLocal(Side),
    HalfClosedRemote(Side),
    Closed(Cause),
}

#[derive(Debug, Copy, Clone, Default)]
enum Side {
    #[default]
    AwaitingHeaders,
    Streaming,
}

#[derive(Debug, Clone)]
enum Cause {
    EndStream,
    Error(Error),
}

impl State {
    /// Opens the send-half of the stream.
    pub(crate) fn send_open(&mut self, eos: bool) -> Result<(), UserError> {
        let local = Side::Streaming;

        self.inner = match self.inner {
            Inner::Idle => {
                if eos {
                    Inner::HalfClosedLocal(Side::AwaitingHeaders)
                } else {
                    Inner::Open {
                        local,
                        remote: Side::AwaitingHeaders,
                    }
                }
            }
            Inner::Open {
                local: Side::AwaitingHeaders,
                remote,
            } => {
                if eos {
                    Inner::HalfClosedLocal(remote)
                } else {
                    Inner::Open { local, remote }
                }
            }
            Inner::HalfClosedRemote(Side::AwaitingHeaders) | Inner::ReservedLocal => {
                if eos {
                    Inner::Closed(Cause::EndStream)
                } else {
                    Inner::HalfClosedRemote(local)
                }
            }
            _ => return Err(UserError::UnexpectedFrameType),
        };

        Ok(())
    }

    /// Opens the receive-half when a HEADERS frame arrives. Returns true
    /// when this is the stream's first block.
    pub(crate) fn recv_open(&mut self, frame: &frame::Headers) -> Result<bool, Error> {
        let mut initial = false;
        let eos = frame.is_end_stream();

        self.inner = match self.inner {
            Inner::Idle => {
                initial = true;
                if eos {
                    Inner::HalfClosedRemote(Side::AwaitingHeaders)
                } else {
                    Inner::Open {
                        local: Side::AwaitingHeaders,
                        remote: if frame.is_informational() {
                            trace!("skipping 1xx response headers");
                            Side::AwaitingHeaders
                        } else {
                            Side::Streaming
                        },
                    }
                }
            }
            Inner::ReservedRemote => {
                initial = true;
                if eos {
                    Inner::Closed(Cause::EndStream)
                } else if frame.is_informational() {
                    trace!("skipping 1xx response headers");
                    Inner::ReservedRemote
                } else {
                    Inner::HalfClosedLocal(Side::Streaming)
                }
            }
            Inner::Open {
                local,
                remote: Side::AwaitingHeaders,
            } => {
                if eos {
                    Inner::HalfClosedRemote(local)
                } else {
                    Inner::Open {
                        local,
                        remote: if frame.is_informational() {
                            trace!("skipping 1xx response headers");
                            Side::AwaitingHeaders
                        } else {
                            Side::Streaming
                        },
                    }
                }
            }
            Inner::HalfClosedLocal(Side::AwaitingHeaders) => {
                if eos {
                    Inner::Closed(Cause::EndStream)
                } else if frame.is_informational() {
                    Inner::HalfClosedLocal(Side::AwaitingHeaders)
                } else {
                    Inner::HalfClosedLocal(Side::Streaming)
                }
            }
            ref state => {
                proto_err!(conn: "recv_open: in unexpected state {:?}", state);
                return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
            }
        };

        Ok(initial)
    }

    /// Trailers: a second header block on the receive half must carry
    /// END_STREAM.
    pub(crate) fn recv_trailers(&mut self, frame: &frame::Headers) -> Result<(), Error> {
        if !frame.is_end_stream() {
            proto_err!(conn: "trailers without END_STREAM");
            return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
        }
        self.recv_close()
    }

    /// Transition from Idle to ReservedLocal (sending PUSH_PROMISE).
    pub(crate) fn reserve_local(&mut self) -> Result<(), UserError> {
        match self.inner {
            Inner::Idle => {
                self.inner = Inner::ReservedLocal;
                Ok(())
            }
            _ => Err(UserError::UnexpectedFrameType),
        }
    }

    /// Transition from Idle directly to ReservedRemote (PUSH_PROMISE).
    pub(crate) fn reserve_remote(&mut self) -> Result<(), Error> {
        match self.inner {
            Inner::Idle => {
                self.inner = Inner::ReservedRemote;
                Ok(())
            }
            ref state => {
                proto_err!(conn: "reserve_remote: in unexpected state {:?}", state);
                Err(Error::library_go_away(Reason::PROTOCOL_ERROR))
            }
        }
    }

    /// The remote will send no more data (END_STREAM observed).
    pub(crate) fn recv_close(&mut self) -> Result<(), Error> {
        match self.inner {
            Inner::Open { local, .. } => {
                trace!("recv_close: Open => HalfClosedRemote({local:?})");
                self.inner = Inner::HalfClosedRemote(local);
                Ok(())
            }
            Inner::HalfClosedLocal(..) => {
                trace!("recv_close: HalfClosedLocal => Closed");
                self.inner = Inner::Closed(Cause::EndStream);
                Ok(())
            }
            ref state => {
                proto_err!(conn: "recv_close: in unexpected state {:?}", state);
                Err(Error::library_go_away(Reason::PROTOCOL_ERROR))
            }
        }
    }

    /// The remote explicitly sent RST_STREAM.
    pub(crate) fn recv_reset(&mut self, frame: &frame::Reset) {
        match self.inner {
            Inner::Closed(..) => {}
            ref state => {
                trace!("recv_reset; frame={frame:?}; state={state:?}");
                self.inner = Inner::Closed(Cause::Error(Error::remote_reset(
                    frame.stream_id(),
                    frame.reason(),
                )));
            }
        }
    }

    /// A connection-level error closes every stream.
    pub(crate) fn handle_error(&mut self, err: &proto::Error) {
        match self.inner {
            Inner::Closed(..) => {}
            _ => {
                trace!("handle_error; err={err:?}");
                self.inner = Inner::Closed(Cause::Error(err.clone()));
            }
        }
    }

    /// The local side will send no more data.
    pub(crate) fn send_close(&mut self) -> Result<(), UserError> {
        match self.inner {
            Inner::Open { remote, .. } => {
                trace!("send_close: Open => HalfClosedLocal({remote:?})");
                self.inner = Inner::HalfClosedLocal(remote);
                Ok(())
            }
            Inner::HalfClosedRemote(..) => {
                trace!("send_close: HalfClosedRemote => Closed");
                self.inner = Inner::Closed(Cause::EndStream);
                Ok(())
            }
            _ => Err(UserError::UnexpectedFrameType),
        }
    }

    /// Closes the stream from a locally-raised reset.
    pub(crate) fn set_reset(&mut self, stream_id: StreamId, reason: Reason, initiator: Initiator) {
        self.inner = Inner::Closed(Cause::Error(Error::Reset(stream_id, reason, initiator)));
    }

    pub(crate) fn is_send_streaming(&self) -> bool {
        matches!(
            self.inner,
            Inner::Open {
                local: Side::Streaming,
                ..
            } | Inner::HalfClosedRemote(Side::Streaming)
        )
    }

    /// True when the stream can accept a first header block.
    pub(crate) fn is_recv_headers(&self) -> bool {
        matches!(
            self.inner,
            Inner::Idle
                | Inner::Open {
                    remote: Side::AwaitingHeaders,
                    ..
                }
                | Inner::HalfClosedLocal(Side::AwaitingHeaders)
                | Inner::ReservedRemote
        )
    }

    pub(crate) fn is_recv_streaming(&self) -> bool {
        matches!(
            self.inner,
            Inner::Open {
                remote: Side::Streaming,
                ..
            } | Inner::HalfClosedLocal(Side::Streaming)
        )
    }

    pub(crate) fn is_recv_end_stream(&self) -> bool {
        matches!(
            self.inner,
            Inner::Closed(Cause::EndStream) | Inner::HalfClosedRemote(..)
        )
    }

    pub(crate) fn is_closed(&self) -> bool {
        matches!(self.inner, Inner::Closed(_))
    }

    pub(crate) fn ensure_recv_open(&self) -> Result<bool, proto::Error> {
        match self.inner {
            Inner::Closed(Cause::Error(ref e)) => Err(e.clone()),
            Inner::Closed(Cause::EndStream)
            | Inner::HalfClosedRemote(..)
            | Inner::ReservedLocal => Ok(false),
            _ => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h2::frame::{Head, Headers, Kind};
    use bytes::BytesMut;

    fn headers_frame(end_stream: bool) -> frame::Headers {
        let flag = if end_stream { 0x4 | 0x1 } else { 0x4 };
        let head = Head::new(Kind::Headers, flag, 1.into());
        let (frame, _) = Headers::load(head, BytesMut::new()).unwrap();
        frame
    }

    #[test]
    fn idle_to_open_to_closed_via_end_stream() {
        let mut state = State::default();
        state.send_open(false).unwrap();
        assert!(state.is_send_streaming());

        assert!(state.recv_open(&headers_frame(false)).unwrap());
        assert!(state.is_recv_streaming());

        state.recv_close().unwrap();
        assert!(state.is_recv_end_stream());

        state.send_close().unwrap();
        assert!(state.is_closed());
    }

    #[test]
    fn idle_send_eos_goes_half_closed_local() {
        let mut state = State::default();
        state.send_open(true).unwrap();
        assert!(!state.is_send_streaming());
        // Receiving END_STREAM now fully closes.
        assert!(state.recv_open(&headers_frame(true)).unwrap());
        assert!(state.is_closed());
    }

    #[test]
    fn data_before_headers_is_illegal() {
        let state = State::default();
        assert!(!state.is_recv_streaming());
    }

    #[test]
    fn recv_open_twice_is_a_connection_error() {
        let mut state = State::default();
        state.recv_open(&headers_frame(false)).unwrap();
        // A second non-trailer block on a streaming half is handled by
        // recv_trailers; recv_open in this state is a protocol error.
        assert!(state.recv_open(&headers_frame(false)).is_err());
    }

    #[test]
    fn reset_closes_from_any_state() {
        let mut state = State::default();
        state.send_open(false).unwrap();
        state.recv_reset(&frame::Reset::new(1.into(), Reason::CANCEL));
        assert!(state.is_closed());
    }

    #[test]
    fn reserved_remote_to_half_closed_local() {
        let mut state = State::default();
        state.reserve_remote().unwrap();
        assert!(state.is_recv_headers());
        state.recv_open(&headers_frame(false)).unwrap();
        assert!(state.is_recv_streaming());
    }
}
