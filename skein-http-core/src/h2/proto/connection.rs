use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use super::streams::{RecvHeaders, Streams};
use super::{Error, GoAway, Peer, PingPong, Settings};
use crate::h2::PREFACE;
use crate::h2::codec::{Codec, UserError};
use crate::h2::frame::{self, Frame, Pseudo, Reason, StreamId};
use crate::headers::OrderedHeaders;

/// What the engine surfaced from the wire.
#[derive(Debug)]
pub enum Event {
    /// The first header block of a stream.
    Headers {
        stream_id: StreamId,
        pseudo: Pseudo,
        fields: OrderedHeaders,
        end_stream: bool,
    },
    /// A trailing header block.
    Trailers {
        stream_id: StreamId,
        fields: OrderedHeaders,
    },
    /// A chunk of body data.
    Data {
        stream_id: StreamId,
        data: Bytes,
        end_stream: bool,
    },
    /// The stream was reset (by either side).
    Reset {
        stream_id: StreamId,
        reason: Reason,
    },
    /// The peer reserved a pushed stream.
    PushPromise {
        stream_id: StreamId,
        promised_id: StreamId,
        pseudo: Pseudo,
        fields: OrderedHeaders,
    },
    /// The peer is tearing the connection down.
    GoAway {
        last_stream_id: StreamId,
        reason: Reason,
    },
    /// A send blocked on flow control has fully drained.
    DataSent { stream_id: StreamId },
    /// The peer answered our PING.
    Pong,
}

/// What one [`Connection::step`] produced.
#[derive(Debug)]
pub(crate) enum Step {
    Event(Event),
    /// Internal progress only (settings applied, pong answered, and so on).
    Progress,
    Eof,
}

/// Outcome of [`Connection::send_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendData {
    /// Everything was written (modulo transport buffering).
    Complete,
    /// Flow control stopped the send; the stream keeps a resumption
    /// cursor and [`Event::DataSent`] fires once WINDOW_UPDATEs drain it.
    NeedWindowUpdate,
}

/// One HTTP/2 connection: codec, settings synchronization, stream store
/// and connection-level frames.
///
/// The engine is single-owner: all mutation happens through `&mut self`,
/// so a connection lives on the task (or thread) that drives it.
#[derive(Debug)]
pub struct Connection<T> {
    codec: Codec<T>,
    peer: Peer,
    streams: Streams,
    settings: Settings,
    go_away: GoAway,
    ping_pong: PingPong,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Client-side connection setup: the 24-byte preface, then the initial
    /// SETTINGS frame.
    pub async fn client_handshake(mut io: T, local: frame::Settings) -> Result<Self, Error> {
        io.write_all(PREFACE).await?;
        Self::finish_handshake(io, local, Peer::Client, bytes::BytesMut::new()).await
    }

    /// Server-side setup: expect the preface, then send our SETTINGS.
    /// `buffered` carries bytes a preceding HTTP/1 exchange over-read.
    pub async fn server_handshake(
        mut io: T,
        local: frame::Settings,
        mut buffered: bytes::BytesMut,
    ) -> Result<Self, Error> {
        while buffered.len() < PREFACE.len() {
            let n = io.read_buf(&mut buffered).await?;
            if n == 0 {
                return Err(Error::from(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed before the preface",
                )));
            }
        }
        let preface = buffered.split_to(PREFACE.len());
        if preface.as_ref() != PREFACE {
            proto_err!(conn: "invalid connection preface");
            return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
        }
        Self::finish_handshake(io, local, Peer::Server, buffered).await
    }

    /// Client half of the h2c upgrade: the HTTP/1 request that carried the
    /// upgrade becomes stream 1 with its send half already closed.
    /// `buffered` carries bytes read past the 101 response.
    pub async fn client_upgrade(
        mut io: T,
        local: frame::Settings,
        buffered: bytes::BytesMut,
    ) -> Result<Self, Error> {
        io.write_all(PREFACE).await?;
        let mut conn = Self::finish_handshake(io, local, Peer::Client, buffered).await?;
        conn.streams
            .register_local(StreamId::from(1), true)
            .map_err(Error::User)?;
        Ok(conn)
    }

    /// Server half of the h2c upgrade: stream 1 starts half-closed
    /// (remote), carrying the request that arrived over HTTP/1.
    pub async fn server_upgrade(
        io: T,
        local: frame::Settings,
        buffered: bytes::BytesMut,
    ) -> Result<Self, Error> {
        let mut conn = Self::server_handshake(io, local, buffered).await?;
        conn.streams.register_remote_upgraded(StreamId::from(1))?;
        Ok(conn)
    }

    async fn finish_handshake(
        io: T,
        local: frame::Settings,
        peer: Peer,
        buffered: bytes::BytesMut,
    ) -> Result<Self, Error> {
        debug_assert!(!local.is_ack());
        let mut codec = Codec::with_buffered(io, buffered);
        codec.buffer(local.clone().into()).map_err(Error::User)?;
        codec.flush().await?;
        trace!("handshake flushed; peer={peer:?}");

        Ok(Self {
            codec,
            peer,
            streams: Streams::new(peer),
            settings: Settings::new(local),
            go_away: GoAway::new(),
            ping_pong: PingPong::new(),
        })
    }

    pub fn peer(&self) -> Peer {
        self.peer
    }

    pub fn is_going_away(&self) -> bool {
        self.go_away.is_going_away()
    }

    /// Live streams (unreaped).
    pub fn active_streams(&self) -> usize {
        self.streams.len()
    }

    /// Whether `id` still has a blocked send cursor.
    pub fn has_pending_data(&self, id: StreamId) -> bool {
        self.streams.has_pending(id)
    }

    // ===== send half =====

    /// Opens a new stream carrying a request header block.
    pub async fn send_request(
        &mut self,
        pseudo: Pseudo,
        fields: OrderedHeaders,
        end_stream: bool,
    ) -> Result<StreamId, Error> {
        if self.go_away.is_going_away() {
            return Err(Error::User(UserError::GoingAway));
        }
        let id = self.streams.open_local(end_stream).map_err(Error::User)?;

        let mut headers = frame::Headers::new(id, pseudo, fields);
        if end_stream {
            headers.set_end_stream();
        }
        self.codec.buffer(headers.into()).map_err(Error::User)?;
        self.codec.flush().await?;
        Ok(id)
    }

    /// Sends a response header block on a peer-initiated stream.
    pub async fn send_response(
        &mut self,
        id: StreamId,
        pseudo: Pseudo,
        fields: OrderedHeaders,
        end_stream: bool,
    ) -> Result<(), Error> {
        self.streams.send_open(id, end_stream).map_err(Error::User)?;
        let mut headers = frame::Headers::new(id, pseudo, fields);
        if end_stream {
            headers.set_end_stream();
        }
        self.codec.buffer(headers.into()).map_err(Error::User)?;
        self.codec.flush().await?;
        self.streams.reap_if_done(id);
        Ok(())
    }

    /// Sends body bytes within the stream and connection windows.
    ///
    /// A send the windows cannot cover returns
    /// [`SendData::NeedWindowUpdate`]; the remainder is kept as the
    /// stream's resumption cursor and drains as WINDOW_UPDATEs arrive in
    /// [`Connection::next_event`].
    pub async fn send_data(
        &mut self,
        id: StreamId,
        data: Bytes,
        end_stream: bool,
    ) -> Result<SendData, Error> {
        let mut frames = Vec::new();
        let done =
            self.streams
                .send_data(id, data, end_stream, self.codec.max_send_frame_size(), &mut frames)?;
        for frame in frames {
            self.codec.buffer(frame.into()).map_err(Error::User)?;
        }
        self.codec.flush().await?;
        if done {
            self.streams.reap_if_done(id);
            Ok(SendData::Complete)
        } else {
            Ok(SendData::NeedWindowUpdate)
        }
    }

    /// Reserves a pushed stream against `parent` (server side). The
    /// response follows later via [`Connection::send_response`] on the
    /// returned id.
    pub async fn send_push_promise(
        &mut self,
        parent: StreamId,
        pseudo: Pseudo,
        fields: OrderedHeaders,
    ) -> Result<StreamId, Error> {
        if self.go_away.is_going_away() {
            return Err(Error::User(UserError::GoingAway));
        }
        let promised_id = self.streams.reserve_local().map_err(Error::User)?;
        let push = frame::PushPromise::new(parent, promised_id, pseudo, fields);
        self.codec.buffer(push.into()).map_err(Error::User)?;
        self.codec.flush().await?;
        Ok(promised_id)
    }

    /// Sends a trailer block, closing the send half.
    pub async fn send_trailers(
        &mut self,
        id: StreamId,
        fields: OrderedHeaders,
    ) -> Result<(), Error> {
        self.streams.send_close(id).map_err(Error::User)?;
        let headers = frame::Headers::trailers(id, fields);
        self.codec.buffer(headers.into()).map_err(Error::User)?;
        self.codec.flush().await?;
        self.streams.reap_if_done(id);
        Ok(())
    }

    /// Aborts one stream.
    pub async fn send_reset(&mut self, id: StreamId, reason: Reason) -> Result<(), Error> {
        self.streams.send_reset(id, reason);
        self.codec
            .buffer(frame::Reset::new(id, reason).into())
            .map_err(Error::User)?;
        self.codec.flush().await?;
        self.streams.reap_if_done(id);
        Ok(())
    }

    /// Sends a PING; the pong surfaces as [`Event::Pong`].
    pub async fn send_ping(&mut self, payload: [u8; 8]) -> Result<(), Error> {
        let ping = self.ping_pong.send_ping(payload).map_err(Error::User)?;
        self.codec.buffer(ping.into()).map_err(Error::User)?;
        self.codec.flush().await?;
        Ok(())
    }

    /// Announces teardown. Streams at or below the peer's last processed
    /// id may still complete; nothing new opens in either direction.
    pub async fn send_go_away(&mut self, reason: Reason) -> Result<(), Error> {
        let last = self.streams.last_remote_id();
        self.go_away.record_sent(last, reason);
        self.codec
            .buffer(frame::GoAway::new(last, reason).into())
            .map_err(Error::User)?;
        self.codec.flush().await?;
        Ok(())
    }

    /// Queues an update to our own SETTINGS. Takes effect once the peer
    /// acknowledges.
    pub async fn send_settings(&mut self, settings: frame::Settings) -> Result<(), Error> {
        self.settings
            .send_settings(settings.clone())
            .map_err(Error::User)?;
        self.codec.buffer(settings.into()).map_err(Error::User)?;
        self.codec.flush().await?;
        Ok(())
    }

    // ===== receive half =====

    /// Drives the connection until something surfaces. `Ok(None)` is a
    /// clean EOF.
    ///
    /// Stream-scoped protocol violations emit RST_STREAM and surface as
    /// [`Event::Reset`]; connection-fatal ones emit GOAWAY and return the
    /// error.
    pub async fn next_event(&mut self) -> Result<Option<Event>, Error> {
        loop {
            match self.step().await? {
                Step::Event(event) => return Ok(Some(event)),
                Step::Progress => {}
                Step::Eof => return Ok(None),
            }
        }
    }

    /// Reads and dispatches exactly one frame.
    pub(crate) async fn step(&mut self) -> Result<Step, Error> {
        let frame = match self.codec.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(Step::Eof),
            Err(err) => return self.handle_read_error(err).await,
        };

        match frame {
            Frame::Settings(settings) => {
                if settings.is_ack() {
                    let local = self.settings.recv_ack()?;
                    self.apply_local_settings(&local);
                    Ok(Step::Progress)
                } else {
                    // The ACK goes out before any further frame is read;
                    // the peer's mirror applies immediately so subsequent
                    // sends conform.
                    self.apply_remote_settings(&settings);
                    self.codec
                        .buffer(frame::Settings::ack().into())
                        .map_err(Error::User)?;
                    self.codec.flush().await?;
                    // A larger INITIAL_WINDOW_SIZE may unblock senders.
                    match self.resume_pending().await? {
                        Some(event) => Ok(Step::Event(event)),
                        None => Ok(Step::Progress),
                    }
                }
            }
            Frame::Ping(ping) => {
                if let Some(pong) = self.ping_pong.recv_ping(&ping) {
                    self.codec.buffer(pong.into()).map_err(Error::User)?;
                    self.codec.flush().await?;
                    Ok(Step::Progress)
                } else {
                    Ok(Step::Event(Event::Pong))
                }
            }
            Frame::Headers(headers) => {
                let stream_id = headers.stream_id();
                let end_stream = headers.is_end_stream();
                match self.streams.recv_headers(&headers) {
                    Ok(RecvHeaders::Initial) => {
                        let (pseudo, fields) = headers.into_parts();
                        self.streams.reap_if_done(stream_id);
                        Ok(Step::Event(Event::Headers {
                            stream_id,
                            pseudo,
                            fields,
                            end_stream,
                        }))
                    }
                    Ok(RecvHeaders::Trailers) => {
                        let (_, fields) = headers.into_parts();
                        self.streams.reap_if_done(stream_id);
                        Ok(Step::Event(Event::Trailers { stream_id, fields }))
                    }
                    Err(err) => self.handle_read_error(err).await,
                }
            }
            Frame::Data(data) => {
                let stream_id = data.stream_id();
                match self.streams.recv_data(&data) {
                    Ok(flow) => {
                        // Hand the consumed octets back as credit.
                        if flow.connection_credit > 0 {
                            self.codec
                                .buffer(
                                    frame::WindowUpdate::new(
                                        StreamId::zero(),
                                        flow.connection_credit,
                                    )
                                    .into(),
                                )
                                .map_err(Error::User)?;
                        }
                        if flow.stream_credit > 0 {
                            self.codec
                                .buffer(
                                    frame::WindowUpdate::new(stream_id, flow.stream_credit)
                                        .into(),
                                )
                                .map_err(Error::User)?;
                        }
                        self.codec.flush().await?;
                        let end_stream = data.is_end_stream();
                        self.streams.reap_if_done(stream_id);
                        Ok(Step::Event(Event::Data {
                            stream_id,
                            data: data.into_payload(),
                            end_stream,
                        }))
                    }
                    Err(err) => self.handle_read_error(err).await,
                }
            }
            Frame::WindowUpdate(update) => {
                let res = self
                    .streams
                    .recv_window_update(update.stream_id(), update.size_increment());
                match res {
                    Ok(()) => match self.resume_pending().await? {
                        Some(event) => Ok(Step::Event(event)),
                        None => Ok(Step::Progress),
                    },
                    Err(err) => self.handle_read_error(err).await,
                }
            }
            Frame::Reset(reset) => {
                let stream_id = reset.stream_id();
                let reason = reset.reason();
                match self.streams.recv_reset(&reset) {
                    Ok(()) => {
                        self.streams.reap_if_done(stream_id);
                        Ok(Step::Event(Event::Reset { stream_id, reason }))
                    }
                    Err(err) => self.handle_read_error(err).await,
                }
            }
            Frame::GoAway(go_away) => {
                self.go_away.record_received(&go_away);
                Ok(Step::Event(Event::GoAway {
                    last_stream_id: go_away.last_stream_id(),
                    reason: go_away.reason(),
                }))
            }
            Frame::PushPromise(push) => {
                let stream_id = push.stream_id();
                let promised_id = push.promised_id();
                match self.streams.recv_push_promise(&push) {
                    Ok(()) => {
                        let (pseudo, fields) = push.into_parts();
                        Ok(Step::Event(Event::PushPromise {
                            stream_id,
                            promised_id,
                            pseudo,
                            fields,
                        }))
                    }
                    Err(err) => self.handle_read_error(err).await,
                }
            }
            Frame::Priority(priority) => {
                // Parsed and validated; the scheduling advice itself is
                // not acted upon.
                trace!("ignoring PRIORITY advice: {priority:?}");
                Ok(Step::Progress)
            }
        }
    }

    /// Stream errors reset the one stream and keep the connection alive;
    /// anything else emits GOAWAY (when locally raised) and propagates.
    async fn handle_read_error(&mut self, err: Error) -> Result<Step, Error> {
        match err {
            Error::Reset(stream_id, reason, _) => {
                debug!("stream error on {stream_id:?}: {reason:?}");
                self.streams.send_reset(stream_id, reason);
                self.codec
                    .buffer(frame::Reset::new(stream_id, reason).into())
                    .map_err(Error::User)?;
                self.codec.flush().await?;
                self.streams.reap_if_done(stream_id);
                Ok(Step::Event(Event::Reset { stream_id, reason }))
            }
            Error::GoAway(debug_data, reason, super::Initiator::Library) => {
                debug!("connection error: {reason:?}");
                let last = self.streams.last_remote_id();
                self.go_away.record_sent(last, reason);
                let frame =
                    frame::GoAway::with_debug_data(last, reason, debug_data.clone());
                // Best effort: the peer may already be gone.
                if self.codec.buffer(frame.into()).is_ok() {
                    let _ = self.codec.flush().await;
                }
                let err = Error::GoAway(debug_data, reason, super::Initiator::Library);
                self.streams.handle_error(&err);
                Err(err)
            }
            err => {
                self.streams.handle_error(&err);
                Err(err)
            }
        }
    }

    /// Drains blocked send cursors after window credit arrived.
    async fn resume_pending(&mut self) -> Result<Option<Event>, Error> {
        for id in self.streams.pending_stream_ids() {
            let mut frames = Vec::new();
            let done = self
                .streams
                .pop_pending(id, self.codec.max_send_frame_size(), &mut frames)?;
            for frame in frames {
                self.codec.buffer(frame.into()).map_err(Error::User)?;
            }
            if done {
                self.codec.flush().await?;
                self.streams.reap_if_done(id);
                return Ok(Some(Event::DataSent { stream_id: id }));
            }
        }
        self.codec.flush().await?;
        Ok(None)
    }

    fn apply_remote_settings(&mut self, settings: &frame::Settings) {
        trace!("applying remote settings: {settings:?}");
        if let Some(val) = settings.max_frame_size() {
            self.codec.set_max_send_frame_size(val as usize);
        }
        if let Some(val) = settings.header_table_size() {
            self.codec.set_send_header_table_size(val as usize);
        }
        self.streams.apply_remote_settings(settings);
    }

    fn apply_local_settings(&mut self, settings: &frame::Settings) {
        trace!("applying local settings: {settings:?}");
        if let Some(val) = settings.max_frame_size() {
            self.codec.set_max_recv_frame_size(val as usize);
        }
        if let Some(val) = settings.header_table_size() {
            self.codec.set_recv_header_table_size(val as usize);
        }
        if let Some(val) = settings.max_header_list_size() {
            self.codec.set_max_recv_header_list_size(val as usize);
        }
        self.streams.apply_local_settings(settings);
    }

    /// Tears the connection down, announcing NO_ERROR when no GOAWAY went
    /// out yet.
    pub async fn close(&mut self) -> Result<(), Error> {
        if self.go_away.sent().is_none() {
            self.send_go_away(Reason::NO_ERROR).await?;
        }
        Ok(())
    }
}
