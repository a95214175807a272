//! Stream bookkeeping: the store, flow-control accounting, id allocation
//! and the per-frame receive checks.

mod flow_control;
mod state;
mod store;

pub(crate) use self::flow_control::FlowControl;
pub(crate) use self::state::State;

use bytes::Bytes;
use tracing::trace;

use self::store::Store;
use crate::h2::codec::UserError;
use crate::h2::frame::{self, DEFAULT_INITIAL_WINDOW_SIZE, Reason, StreamId};
use crate::h2::proto::{Error, Peer, WindowSize};

/// One stream's record.
#[derive(Debug)]
pub(crate) struct Stream {
    pub(crate) id: StreamId,
    pub(crate) state: State,
    /// Our right to send to the peer.
    pub(crate) send_flow: FlowControl,
    /// The peer's right to send to us.
    pub(crate) recv_flow: FlowControl,
    /// Resumption cursor of a send blocked on flow control.
    pub(crate) pending_send: Option<PendingSend>,
}

/// A partially-sent body waiting for WINDOW_UPDATE.
#[derive(Debug)]
pub(crate) struct PendingSend {
    pub(crate) data: Bytes,
    pub(crate) end_stream: bool,
}

/// What a received HEADERS frame turned out to be.
pub(crate) enum RecvHeaders {
    Initial,
    Trailers,
}

#[derive(Debug)]
pub(crate) struct Streams {
    store: Store,
    peer: Peer,

    /// Highest locally-initiated id allocated so far (zero before any).
    max_local_id: StreamId,
    /// Highest remote-initiated id observed so far (zero before any).
    max_remote_id: StreamId,

    /// The peer's INITIAL_WINDOW_SIZE for new streams.
    send_init_window: WindowSize,
    /// Our announced INITIAL_WINDOW_SIZE.
    recv_init_window: WindowSize,

    send_conn_flow: FlowControl,
    recv_conn_flow: FlowControl,

    /// Whether the peer accepts PUSH_PROMISE (SETTINGS_ENABLE_PUSH).
    push_enabled: bool,
}

impl Streams {
    pub(crate) fn new(peer: Peer) -> Self {
        Self {
            store: Store::new(),
            peer,
            max_local_id: StreamId::zero(),
            max_remote_id: StreamId::zero(),
            send_init_window: DEFAULT_INITIAL_WINDOW_SIZE,
            recv_init_window: DEFAULT_INITIAL_WINDOW_SIZE,
            send_conn_flow: FlowControl::new(DEFAULT_INITIAL_WINDOW_SIZE),
            recv_conn_flow: FlowControl::new(DEFAULT_INITIAL_WINDOW_SIZE),
            push_enabled: true,
        }
    }

    fn new_stream(&self, id: StreamId) -> Stream {
        Stream {
            id,
            state: State::default(),
            send_flow: FlowControl::new(self.send_init_window),
            recv_flow: FlowControl::new(self.recv_init_window),
            pending_send: None,
        }
    }

    /// Highest remote-initiated stream id, for GOAWAY's last-stream-id.
    pub(crate) fn last_remote_id(&self) -> StreamId {
        self.max_remote_id
    }

    pub(crate) fn len(&self) -> usize {
        self.store.len()
    }

    // ===== send half =====

    /// Allocates the next locally-initiated stream id and opens the
    /// stream. IDs strictly increase; exhaustion refuses the open.
    pub(crate) fn open_local(&mut self, eos: bool) -> Result<StreamId, UserError> {
        let id = if self.max_local_id.is_zero() {
            self.peer.first_stream_id()
        } else {
            self.max_local_id.next_id()?
        };

        let mut stream = self.new_stream(id);
        stream.state.send_open(eos)?;
        self.store.insert(stream);
        self.max_local_id = id;
        trace!("opened local stream {id:?}");
        Ok(id)
    }

    /// Registers a stream created outside the normal HEADERS path (the
    /// h2c upgrade request becomes stream 1).
    pub(crate) fn register_local(&mut self, id: StreamId, eos: bool) -> Result<(), UserError> {
        let mut stream = self.new_stream(id);
        stream.state.send_open(eos)?;
        self.store.insert(stream);
        self.max_local_id = id;
        Ok(())
    }

    /// Reserves the next even stream id for a push (server side).
    pub(crate) fn reserve_local(&mut self) -> Result<StreamId, UserError> {
        if !self.push_enabled {
            return Err(UserError::PeerDisabledServerPush);
        }
        let id = if self.max_local_id.is_zero() {
            self.peer.first_stream_id()
        } else {
            self.max_local_id.next_id()?
        };
        let mut stream = self.new_stream(id);
        stream.state.reserve_local()?;
        self.store.insert(stream);
        self.max_local_id = id;
        trace!("reserved local stream {id:?}");
        Ok(id)
    }

    /// Server half of the h2c upgrade: the request arrived over HTTP/1, so
    /// stream 1 starts with its receive half already closed.
    pub(crate) fn register_remote_upgraded(&mut self, id: StreamId) -> Result<(), Error> {
        let mut stream = self.new_stream(id);
        let synthetic = synthetic_headers(id, true);
        stream.state.recv_open(&synthetic)?;
        self.store.insert(stream);
        self.max_remote_id = id;
        Ok(())
    }

    /// Opens the send half of a remote-initiated stream (server sending a
    /// response).
    pub(crate) fn send_open(&mut self, id: StreamId, eos: bool) -> Result<(), UserError> {
        let stream = self
            .store
            .get_mut(id)
            .ok_or(UserError::InactiveStreamId)?;
        stream.state.send_open(eos)
    }

    /// Closes the send half (trailers or an empty END_STREAM).
    pub(crate) fn send_close(&mut self, id: StreamId) -> Result<(), UserError> {
        let stream = self
            .store
            .get_mut(id)
            .ok_or(UserError::InactiveStreamId)?;
        stream.state.send_close()
    }

    /// Marks the stream reset by the local side.
    pub(crate) fn send_reset(&mut self, id: StreamId, reason: Reason) {
        if let Some(stream) = self.store.get_mut(id) {
            stream
                .state
                .set_reset(id, reason, crate::h2::proto::Initiator::Library);
            stream.pending_send = None;
        }
    }

    /// Stores the body (or body tail) to send on `id` and drains as much
    /// as the windows permit. Remaining bytes stay as the stream's
    /// resumption cursor.
    pub(crate) fn send_data(
        &mut self,
        id: StreamId,
        data: Bytes,
        end_stream: bool,
        max_frame_size: usize,
        out: &mut Vec<frame::Data>,
    ) -> Result<bool, Error> {
        {
            let stream = self
                .store
                .get_mut(id)
                .ok_or(Error::User(UserError::InactiveStreamId))?;
            if !stream.state.is_send_streaming() {
                return Err(Error::User(UserError::UnexpectedFrameType));
            }
            debug_assert!(
                stream.pending_send.is_none(),
                "send_data while a send is pending"
            );
            stream.pending_send = Some(PendingSend { data, end_stream });
        }
        self.pop_pending(id, max_frame_size, out)
    }

    /// Drains the stream's pending cursor into DATA frames within the
    /// stream window, the connection window and the max frame size.
    /// Returns true when the cursor completed.
    pub(crate) fn pop_pending(
        &mut self,
        id: StreamId,
        max_frame_size: usize,
        out: &mut Vec<frame::Data>,
    ) -> Result<bool, Error> {
        let conn_flow = &mut self.send_conn_flow;
        let Some(stream) = self.store.get_mut(id) else {
            return Ok(true);
        };
        let Some(mut pending) = stream.pending_send.take() else {
            return Ok(true);
        };

        loop {
            if pending.data.is_empty() {
                // Only the END_STREAM marker remains; an empty DATA frame
                // consumes no window.
                if pending.end_stream {
                    let mut frame = frame::Data::new(id, Bytes::new());
                    frame.set_end_stream(true);
                    stream.state.send_close().map_err(Error::User)?;
                    out.push(frame);
                }
                return Ok(true);
            }

            let allowed = stream
                .send_flow
                .available()
                .min(conn_flow.available())
                .min(max_frame_size as WindowSize) as usize;
            if allowed == 0 {
                trace!("send on {id:?} blocked; stashing {}B", pending.data.len());
                stream.pending_send = Some(pending);
                return Ok(false);
            }

            let take = allowed.min(pending.data.len());
            let chunk = pending.data.split_to(take);
            // Flow-control decrement is atomic with emitting the frame.
            stream.send_flow.dec_window(take as WindowSize);
            conn_flow.dec_window(take as WindowSize);

            let mut frame = frame::Data::new(id, chunk);
            if pending.data.is_empty() && pending.end_stream {
                frame.set_end_stream(true);
                stream.state.send_close().map_err(Error::User)?;
                out.push(frame);
                return Ok(true);
            }
            out.push(frame);
        }
    }

    /// Streams with a pending cursor, for resumption after WINDOW_UPDATE.
    pub(crate) fn pending_stream_ids(&mut self) -> Vec<StreamId> {
        let mut ids = Vec::new();
        self.store.for_each(|stream| {
            if stream.pending_send.is_some() {
                ids.push(stream.id);
            }
        });
        ids
    }

    pub(crate) fn has_pending(&self, id: StreamId) -> bool {
        self.store.get(id).is_some_and(|s| s.pending_send.is_some())
    }

    // ===== receive half =====

    pub(crate) fn recv_headers(&mut self, frame: &frame::Headers) -> Result<RecvHeaders, Error> {
        let id = frame.stream_id();

        if !self.store.contains(id) {
            if self.peer.is_remote_initiated(id) {
                if self.peer == Peer::Client {
                    // The server may only start streams via PUSH_PROMISE,
                    // which reserves them in the store first.
                    proto_err!(conn: "HEADERS on unreserved server stream {id:?}");
                    return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
                }
                if id <= self.max_remote_id {
                    // Reused or decreasing id.
                    proto_err!(conn: "HEADERS on old stream {id:?}");
                    return Err(Error::library_go_away(Reason::STREAM_CLOSED));
                }
                self.store.insert(self.new_stream(id));
                self.max_remote_id = id;
            } else {
                if id > self.max_local_id {
                    proto_err!(conn: "HEADERS on idle local stream {id:?}");
                    return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
                }
                // The stream completed and was reaped.
                proto_err!(conn: "HEADERS on closed stream {id:?}");
                return Err(Error::library_go_away(Reason::STREAM_CLOSED));
            }
        }

        let stream = self
            .store
            .get_mut(id)
            .ok_or_else(|| Error::library_go_away(Reason::PROTOCOL_ERROR))?;

        if stream.state.is_recv_headers() {
            stream.state.recv_open(frame)?;
            Ok(RecvHeaders::Initial)
        } else if stream.state.is_recv_streaming() {
            stream.state.recv_trailers(frame)?;
            Ok(RecvHeaders::Trailers)
        } else {
            stream.state.ensure_recv_open()?;
            proto_err!(stream: "HEADERS on half-closed(remote) stream {id:?}");
            Err(Error::library_reset(id, Reason::STREAM_CLOSED))
        }
    }

    /// Accounts an incoming DATA frame. Returns the number of payload
    /// octets to hand back as WINDOW_UPDATE credit (stream-level credit is
    /// zero when the stream just closed).
    pub(crate) fn recv_data(
        &mut self,
        frame: &frame::Data,
    ) -> Result<DataFlow, Error> {
        let id = frame.stream_id();
        let sz = frame.payload().len() as WindowSize;

        // The connection window counts every DATA payload, even those on
        // dead streams.
        if sz > self.recv_conn_flow.available() {
            proto_err!(conn: "connection flow-control window exceeded");
            return Err(Error::library_go_away(Reason::FLOW_CONTROL_ERROR));
        }
        self.recv_conn_flow.dec_window(sz);

        let Some(stream) = self.store.get_mut(id) else {
            return if self.is_idle(id) {
                proto_err!(conn: "DATA on idle stream {id:?}");
                Err(Error::library_go_away(Reason::PROTOCOL_ERROR))
            } else {
                // Closed and reaped; the peer may not have seen it yet.
                Err(Error::library_reset(id, Reason::STREAM_CLOSED))
            };
        };

        if !stream.state.is_recv_streaming() {
            stream.state.ensure_recv_open()?;
            proto_err!(stream: "DATA on stream {id:?} not open for receiving");
            return Err(Error::library_reset(id, Reason::STREAM_CLOSED));
        }

        if sz > stream.recv_flow.available() {
            proto_err!(stream: "stream flow-control window exceeded on {id:?}");
            return Err(Error::library_reset(id, Reason::FLOW_CONTROL_ERROR));
        }
        stream.recv_flow.dec_window(sz);

        if frame.is_end_stream() {
            stream.state.recv_close()?;
        } else {
            // Replenish the stream window right away; we consume inline.
            stream
                .recv_flow
                .inc_window(sz)
                .map_err(Error::library_go_away)?;
        }
        self.recv_conn_flow
            .inc_window(sz)
            .map_err(Error::library_go_away)?;

        Ok(DataFlow {
            connection_credit: sz,
            stream_credit: if frame.is_end_stream() { 0 } else { sz },
        })
    }

    pub(crate) fn recv_reset(&mut self, frame: &frame::Reset) -> Result<(), Error> {
        let id = frame.stream_id();
        if let Some(stream) = self.store.get_mut(id) {
            stream.state.recv_reset(frame);
            stream.pending_send = None;
            Ok(())
        } else if self.is_idle(id) {
            proto_err!(conn: "RST_STREAM on idle stream {id:?}");
            Err(Error::library_go_away(Reason::PROTOCOL_ERROR))
        } else {
            Ok(())
        }
    }

    pub(crate) fn recv_window_update(&mut self, id: StreamId, sz: WindowSize) -> Result<(), Error> {
        if id.is_zero() {
            self.send_conn_flow
                .inc_window(sz)
                .map_err(Error::library_go_away)
        } else if let Some(stream) = self.store.get_mut(id) {
            stream
                .send_flow
                .inc_window(sz)
                .map_err(|r| Error::library_reset(id, r))
        } else if self.is_idle(id) {
            proto_err!(conn: "WINDOW_UPDATE on idle stream {id:?}");
            Err(Error::library_go_away(Reason::PROTOCOL_ERROR))
        } else {
            // Updates racing a close are expected noise.
            Ok(())
        }
    }

    pub(crate) fn recv_push_promise(&mut self, frame: &frame::PushPromise) -> Result<(), Error> {
        let parent = frame.stream_id();
        let promised = frame.promised_id();

        if self.peer != Peer::Client {
            proto_err!(conn: "PUSH_PROMISE received by server");
            return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
        }
        if !promised.is_server_initiated() || promised <= self.max_remote_id {
            proto_err!(conn: "invalid promised stream id {promised:?}");
            return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
        }
        let parent_open = match self.store.get(parent) {
            Some(stream) => stream.state.ensure_recv_open()?,
            None => false,
        };
        if !parent_open {
            proto_err!(conn: "PUSH_PROMISE on inactive stream {parent:?}");
            return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
        }

        let mut stream = self.new_stream(promised);
        stream.state.reserve_remote()?;
        self.store.insert(stream);
        self.max_remote_id = promised;
        Ok(())
    }

    /// Applies the peer's SETTINGS: a changed INITIAL_WINDOW_SIZE adjusts
    /// every stream's send window by the delta, synchronously.
    pub(crate) fn apply_remote_settings(&mut self, settings: &frame::Settings) {
        if let Some(enabled) = settings.is_push_enabled() {
            self.push_enabled = enabled;
        }
        if let Some(new) = settings.initial_window_size() {
            let delta = i64::from(new) - i64::from(self.send_init_window);
            if delta != 0 {
                trace!("adjusting send windows by {delta}");
                self.store.for_each(|stream| stream.send_flow.adjust(delta));
            }
            self.send_init_window = new;
        }
    }

    /// Applies our own SETTINGS once the peer acknowledged them.
    pub(crate) fn apply_local_settings(&mut self, settings: &frame::Settings) {
        if let Some(new) = settings.initial_window_size() {
            let delta = i64::from(new) - i64::from(self.recv_init_window);
            if delta != 0 {
                self.store.for_each(|stream| stream.recv_flow.adjust(delta));
            }
            self.recv_init_window = new;
        }
    }

    /// Fails every live stream with the connection error.
    pub(crate) fn handle_error(&mut self, err: &Error) {
        self.store.for_each(|stream| stream.state.handle_error(err));
    }

    /// Drops the stream once it is fully closed with nothing left to send.
    pub(crate) fn reap_if_done(&mut self, id: StreamId) {
        let done = self
            .store
            .get(id)
            .is_some_and(|s| s.state.is_closed() && s.pending_send.is_none());
        if done {
            trace!("reaping stream {id:?}");
            self.store.remove(id);
        }
    }

    /// True when `id` was never opened by either side.
    fn is_idle(&self, id: StreamId) -> bool {
        if self.peer.is_remote_initiated(id) {
            id > self.max_remote_id
        } else {
            id > self.max_local_id
        }
    }
}

/// The WINDOW_UPDATE credit owed after consuming a DATA frame.
pub(crate) struct DataFlow {
    pub(crate) connection_credit: WindowSize,
    pub(crate) stream_credit: WindowSize,
}

fn synthetic_headers(id: StreamId, end_stream: bool) -> frame::Headers {
    let flag = if end_stream { 0x4 | 0x1 } else { 0x4 };
    let head = frame::Head::new(frame::Kind::Headers, flag, id);
    match frame::Headers::load(head, bytes::BytesMut::new()) {
        Ok((frame, _)) => frame,
        // An empty payload with no padding cannot fail to load.
        Err(_) => unreachable!("synthetic HEADERS"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ids_are_odd_and_increasing() {
        let mut streams = Streams::new(Peer::Client);
        assert_eq!(streams.open_local(true).unwrap(), StreamId::from(1));
        assert_eq!(streams.open_local(true).unwrap(), StreamId::from(3));

        let mut streams = Streams::new(Peer::Server);
        assert_eq!(streams.reserve_local().unwrap(), StreamId::from(2));
        assert_eq!(streams.reserve_local().unwrap(), StreamId::from(4));
    }

    #[test]
    fn id_space_exhaustion_refuses_new_streams() {
        let mut streams = Streams::new(Peer::Client);
        // Jump to the top of the 31-bit space.
        streams.register_local(StreamId::MAX, true).unwrap();
        assert!(matches!(
            streams.open_local(true),
            Err(UserError::OverflowedStreamId)
        ));
    }

    #[test]
    fn initial_window_delta_applies_to_live_streams() {
        let mut streams = Streams::new(Peer::Client);
        let id = streams.open_local(false).unwrap();

        let mut settings = frame::Settings::default();
        settings.set_initial_window_size(Some(70_000));
        streams.apply_remote_settings(&settings);

        let mut out = Vec::new();
        let done = streams
            .send_data(id, Bytes::from(vec![0u8; 70_000]), false, 1 << 24, &mut out)
            .unwrap();
        // The retroactive delta opened the stream window to 70k; only the
        // 65535-byte connection window holds the send back.
        assert!(!done);
        let sent: usize = out.iter().map(|f| f.payload().len()).sum();
        assert_eq!(sent, 65_535);
    }

    #[test]
    fn disabled_push_refuses_reservation() {
        let mut streams = Streams::new(Peer::Server);
        let mut settings = frame::Settings::default();
        settings.set_enable_push(false);
        streams.apply_remote_settings(&settings);
        assert!(matches!(
            streams.reserve_local(),
            Err(UserError::PeerDisabledServerPush)
        ));
    }
}
