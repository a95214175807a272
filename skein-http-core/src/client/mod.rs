//! The high-level client: one [`RequestContext`] per logical exchange,
//! one [`Client`] per reusable connection.
//!
//! [`Client::request`] opens (or reuses) the transport, negotiates the
//! protocol version (ALPN over TLS, the h2c upgrade or plain HTTP/1.1
//! over cleartext) and drives the matching codec. The context stays
//! inspectable afterwards: phase, status, headers, body and the error
//! taxonomy all live on it.

use std::collections::VecDeque;
use std::path::PathBuf;

use bytes::{Bytes, BytesMut};
use http::{Method, StatusCode, Uri, Version};
use tracing::{debug, trace};

use skein_net::{Cancel, Conn, IpFamily, Reopen, TlsParams};

use crate::error::{Error, HttpErrorKind};
use crate::h2::proto::{Connection as H2Connection, Event, SendData};
use crate::h2::{frame, h2c};
use crate::headers::OrderedHeaders;
use crate::proto::h1::{self, Decoded, Decoder, Http1Transaction, Parse};
use crate::proto::{BodyLength, MessageHead, RequestLine};
use crate::HttpVersion;

const READ_CHUNK: usize = 16 * 1024;

/// The state of one exchange, totally ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    OpenDirect,
    OpenProxy,
    RequestSending,
    RequestSent,
    ResponseRecving,
    ResponseRecved,
    BodyRecved,
    // Server mirror.
    RequestRecving,
    RequestRecved,
    Closed,
    Error,
}

/// What to put on the request line when the URL carries no usable path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultPath {
    #[default]
    Root,
    Wildcard,
    IndexHtml,
    RobotTxt,
    /// Absolute-form target (also forced by the proxy path).
    AbsoluteUrl,
    /// `host:port`, as CONNECT uses.
    HostPort,
}

/// Scheme assumed when the URL does not name one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultScheme {
    #[default]
    Http,
    Https,
    Ws,
    Wss,
}

impl DefaultScheme {
    fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }
}

/// Per-request behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestFlags(u16);

impl RequestFlags {
    pub const NONE: Self = Self(0);
    /// The URL is already percent-encoded: skip the default encoding pass
    /// and reject it as-is when it still holds illegal characters.
    pub const URL_ENCODED: Self = Self(1 << 0);
    /// Route through the configured proxy endpoint.
    pub const USE_PROXY: Self = Self(1 << 1);
    /// Fall back to HTTP/1.1 when ALPN yields nothing acceptable.
    pub const IGNORE_ALPN_FAILURE: Self = Self(1 << 2);
    /// Accept version-less (HTTP/0.9) peers.
    pub const ALLOW_HTTP09: Self = Self(1 << 3);
    /// Emit caller-supplied header names lowercased instead of in their
    /// original spelling.
    pub const LOWERCASE_HEADERS: Self = Self(1 << 4);
    /// Error on a rejected header instead of skipping it.
    pub const INVALID_HEADER_IS_ERROR: Self = Self(1 << 5);
    /// Stop after the response head; the body stays on the wire.
    pub const NO_READ_BODY: Self = Self(1 << 6);
    /// Emit the codec's own header lines (`host:`, `content-length:`,
    /// ...) in lowercase.
    pub const SMALL_HEADER_CASE: Self = Self(1 << 7);

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

/// Everything about one logical request/response exchange.
#[derive(Debug, Default)]
pub struct RequestContext {
    // ----- request side -----
    method: Method,
    url: String,
    uri: Option<Uri>,
    default_path: DefaultPath,
    default_scheme: DefaultScheme,
    flags: RequestFlags,
    proxy: Option<(String, u16)>,
    headers: OrderedHeaders,
    body: Bytes,
    ip_family: IpFamily,
    http_version: HttpVersion,
    ca_bundle: Option<PathBuf>,
    /// Server-side scratch while a request body streams in.
    body_scratch: BytesMut,

    // ----- response side -----
    phase: Phase,
    status: Option<StatusCode>,
    response_headers: OrderedHeaders,
    response_body: BytesMut,

    // ----- shared -----
    transport_error: Option<String>,
    http_error: Option<HttpErrorKind>,
    resolved_version: Option<Version>,
    wire_version: Option<Version>,
    stream_id: Option<u32>,
    /// Set when the response forbids reusing the connection.
    connection_close: bool,
}

impl RequestContext {
    pub fn new(method: Method, url: impl Into<String>) -> Result<Self, Error> {
        let mut ctx = Self {
            method,
            url: url.into(),
            ..Self::default()
        };
        ctx.reparse_url()?;
        Ok(ctx)
    }

    /// Shorthand for a GET exchange.
    pub fn get(url: impl Into<String>) -> Result<Self, Error> {
        Self::new(Method::GET, url)
    }

    fn reparse_url(&mut self) -> Result<(), Error> {
        let raw = if self.url.contains("://") {
            self.url.clone()
        } else {
            format!("{}://{}", self.default_scheme.as_str(), self.url)
        };
        // Unless the caller vouches for the URL being encoded already, the
        // path and query get a percent-encoding pass first.
        let raw = if self.flags.contains(RequestFlags::URL_ENCODED) {
            raw
        } else {
            encode_target(&raw)
        };
        let uri = Uri::try_from(raw.as_str()).map_err(|_| Error::new_parse(Parse::Uri))?;
        if uri.host().is_none() {
            return Err(Error::new_parse(Parse::Uri));
        }
        self.uri = Some(uri);
        Ok(())
    }

    // ----- builders -----

    pub fn set_http_version(&mut self, version: HttpVersion) -> &mut Self {
        self.http_version = version;
        self
    }

    pub fn set_ip_family(&mut self, family: IpFamily) -> &mut Self {
        self.ip_family = family;
        self
    }

    pub fn set_default_path(&mut self, policy: DefaultPath) -> &mut Self {
        self.default_path = policy;
        self
    }

    pub fn set_default_scheme(&mut self, scheme: DefaultScheme) -> &mut Self {
        self.default_scheme = scheme;
        self
    }

    pub fn set_flags(&mut self, flags: RequestFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    pub fn set_proxy(&mut self, host: impl Into<String>, port: u16) -> &mut Self {
        self.proxy = Some((host.into(), port));
        self.flags.insert(RequestFlags::USE_PROXY);
        self
    }

    pub fn set_ca_bundle(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.ca_bundle = Some(path.into());
        self
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.body = body.into();
        self
    }

    /// Appends a request header; name case is preserved on the HTTP/1
    /// wire.
    pub fn add_header(
        &mut self,
        name: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> Result<&mut Self, Error> {
        self.headers.append(name, value).map_err(Error::new_parse)?;
        Ok(self)
    }

    // ----- inspection -----

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.status.map(|s| s.as_u16())
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn uri(&self) -> Option<&Uri> {
        self.uri.as_ref()
    }

    /// The request path, per the server-side split at the first `?`.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.as_ref().map_or("/", Uri::path)
    }

    /// The query including its leading `?`, when one was present.
    #[must_use]
    pub fn query(&self) -> Option<String> {
        self.uri
            .as_ref()
            .and_then(Uri::query)
            .map(|q| format!("?{q}"))
    }

    #[must_use]
    pub fn request_headers(&self) -> &OrderedHeaders {
        &self.headers
    }

    #[must_use]
    pub fn response_headers(&self) -> &OrderedHeaders {
        &self.response_headers
    }

    #[must_use]
    pub fn response_body(&self) -> &[u8] {
        &self.response_body
    }

    #[must_use]
    pub fn http_error(&self) -> Option<HttpErrorKind> {
        self.http_error
    }

    #[must_use]
    pub fn transport_error(&self) -> Option<&str> {
        self.transport_error.as_deref()
    }

    /// The negotiated version for this exchange.
    #[must_use]
    pub fn resolved_version(&self) -> Option<Version> {
        self.resolved_version
    }

    /// The version the status line claimed (HTTP/1 only).
    #[must_use]
    pub fn wire_version(&self) -> Option<Version> {
        self.wire_version
    }

    /// The HTTP/2 stream the exchange ran on.
    #[must_use]
    pub fn stream_id(&self) -> Option<u32> {
        self.stream_id
    }

    /// Resets the response side so the context can run another exchange.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.status = None;
        self.response_headers = OrderedHeaders::new();
        self.response_body.clear();
        self.transport_error = None;
        self.http_error = None;
        self.resolved_version = None;
        self.wire_version = None;
        self.stream_id = None;
        self.connection_close = false;
    }

    // ----- internals -----

    fn is_secure(&self) -> bool {
        matches!(self.scheme(), "https" | "wss")
    }

    fn scheme(&self) -> &str {
        self.uri
            .as_ref()
            .and_then(Uri::scheme_str)
            .unwrap_or_else(|| self.default_scheme.as_str())
    }

    fn host(&self) -> &str {
        self.uri.as_ref().and_then(Uri::host).unwrap_or_default()
    }

    fn port(&self) -> u16 {
        self.uri
            .as_ref()
            .and_then(Uri::port_u16)
            .unwrap_or_else(|| if self.is_secure() { 443 } else { 80 })
    }

    /// Renders the request-line target per the default-path policy.
    fn request_target(&self) -> String {
        if self.flags.contains(RequestFlags::USE_PROXY) && !self.is_secure() {
            return self.absolute_url();
        }
        let path_and_query = self
            .uri
            .as_ref()
            .and_then(|u| u.path_and_query())
            .map(|pq| pq.as_str())
            .unwrap_or("");
        match self.default_path {
            DefaultPath::Wildcard => "*".to_owned(),
            DefaultPath::AbsoluteUrl => self.absolute_url(),
            DefaultPath::HostPort => format!("{}:{}", self.host(), self.port()),
            DefaultPath::Root => {
                if path_and_query.is_empty() {
                    "/".to_owned()
                } else {
                    path_and_query.to_owned()
                }
            }
            DefaultPath::IndexHtml => default_or(path_and_query, "/index.html"),
            DefaultPath::RobotTxt => default_or(path_and_query, "/robot.txt"),
        }
    }

    fn absolute_url(&self) -> String {
        let pq = self
            .uri
            .as_ref()
            .and_then(|u| u.path_and_query())
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!("{}://{}{}", self.scheme(), self.authority(), pq)
    }

    /// `host[:port]` with the scheme default elided.
    fn authority(&self) -> String {
        let default = if self.is_secure() { 443 } else { 80 };
        if self.port() == default {
            self.host().to_owned()
        } else {
            format!("{}:{}", self.host(), self.port())
        }
    }

    fn fail(&mut self, err: &Error) {
        self.phase = Phase::Error;
        match err.http_kind() {
            Some(kind) => self.http_error = Some(kind),
            None => self.transport_error = Some(err.to_string()),
        }
    }

    /// The request body (caller-set on the client, parsed on the server).
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    // ----- server mirror -----

    pub(crate) fn begin_server_exchange(&mut self) {
        self.reset();
        self.body = Bytes::new();
        self.body_scratch.clear();
        self.headers = OrderedHeaders::new();
        self.phase = Phase::RequestRecving;
    }

    pub(crate) fn fill_server_request(
        &mut self,
        msg: &crate::proto::h1::ParsedMessage<crate::proto::RequestLine>,
    ) {
        self.method = msg.head.subject.0.clone();
        self.url = msg.head.subject.1.to_string();
        self.uri = Some(msg.head.subject.1.clone());
        self.headers = msg.head.headers.clone();
        self.wire_version = Some(msg.head.version);
        self.resolved_version = Some(msg.head.version);
        self.connection_close = !msg.keep_alive;
    }

    pub(crate) fn push_request_body(&mut self, data: &[u8]) {
        self.body_scratch.extend_from_slice(data);
    }

    pub(crate) fn finish_server_request(&mut self) {
        self.body = self.body_scratch.split().freeze();
        self.phase = Phase::RequestRecved;
    }

    pub(crate) fn fail_server(&mut self, err: &Error) {
        self.fail(err);
    }
}

fn default_or(path_and_query: &str, default: &str) -> String {
    if path_and_query.is_empty() || path_and_query == "/" {
        default.to_owned()
    } else {
        path_and_query.to_owned()
    }
}

/// Bytes that may not appear raw in a request target's path or query.
/// `%` stays untouched so sequences that are already encoded survive.
const TARGET_ENCODE_SET: &percent_encoding::AsciiSet = &percent_encoding::CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^');

/// Percent-encodes the path-and-query part of an absolute URL, leaving the
/// scheme and authority alone.
fn encode_target(raw: &str) -> String {
    let Some(scheme_end) = raw.find("://") else {
        return raw.to_owned();
    };
    let authority_start = scheme_end + 3;
    let Some(rel) = raw[authority_start..].find(['/', '?']) else {
        return raw.to_owned();
    };
    let (head, tail) = raw.split_at(authority_start + rel);
    format!(
        "{head}{}",
        percent_encoding::utf8_percent_encode(tail, TARGET_ENCODE_SET)
    )
}

/// A reusable client connection (HTTP/1 keep-alive or one HTTP/2
/// connection multiplexing its requests).
#[derive(Default)]
pub struct Client {
    h1: Option<H1State>,
    h2: Option<H2State>,
}

struct H1State {
    conn: Conn,
    /// Bytes read past the previous response.
    read_buf: BytesMut,
}

struct H2State {
    conn: H2Connection<Conn>,
    /// Reuse identity of the transport the engine took ownership of.
    host: String,
    port: u16,
    secure: bool,
    /// Events read while waiting for something else.
    stashed: VecDeque<Event>,
}

impl Client {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one exchange. On failure the error is also recorded on the
    /// context (phase, HTTP or transport error) so it stays inspectable.
    pub async fn request(
        &mut self,
        ctx: &mut RequestContext,
        cancel: &Cancel,
    ) -> Result<(), Error> {
        match self.request_inner(ctx, cancel).await {
            Ok(()) => Ok(()),
            Err(err) => {
                ctx.fail(&err);
                Err(err)
            }
        }
    }

    async fn request_inner(
        &mut self,
        ctx: &mut RequestContext,
        cancel: &Cancel,
    ) -> Result<(), Error> {
        if !matches!(ctx.phase, Phase::Idle) {
            return Err(Error::new_invalid_phase());
        }
        ctx.reparse_url()?;

        // A live HTTP/2 connection to the same endpoint carries the next
        // request as a new stream, no transport work needed.
        if let Some(h2) = &self.h2 {
            if h2.secure == ctx.is_secure()
                && h2.port == ctx.port()
                && h2.host.eq_ignore_ascii_case(ctx.host())
                && !h2.conn.is_going_away()
            {
                trace!("reusing http/2 connection");
                ctx.resolved_version = Some(Version::HTTP_2);
                ctx.phase = Phase::OpenDirect;
                return self.h2_exchange(ctx, cancel).await;
            }
            self.h2 = None;
        }

        let use_proxy = ctx.flags.contains(RequestFlags::USE_PROXY) && ctx.proxy.is_some();
        let (connect_host, connect_port) = if use_proxy {
            let (host, port) = ctx.proxy.clone().unwrap_or_default();
            (host, port)
        } else {
            (ctx.host().to_owned(), ctx.port())
        };

        let tls = if ctx.is_secure() {
            let mut params = TlsParams::new()
                .with_server_name(ctx.host())
                .with_alpn(alpn_offers(ctx.http_version));
            if let Some(path) = &ctx.ca_bundle {
                params = params.with_ca_bundle(path);
            }
            Some(params)
        } else {
            None
        };

        // Open, or prove the kept-alive connection still points at the
        // right endpoint.
        let conn = match self.h1.take() {
            Some(mut state) => {
                let reopened = state
                    .conn
                    .reopen(
                        &connect_host,
                        connect_port,
                        ctx.ip_family,
                        tls.as_ref(),
                        cancel,
                    )
                    .await?;
                if reopened == Reopen::Reopened {
                    state.read_buf.clear();
                }
                state
            }
            None => H1State {
                conn: skein_net::open(
                    &connect_host,
                    connect_port,
                    ctx.ip_family,
                    tls.as_ref(),
                    cancel,
                )
                .await?,
                read_buf: BytesMut::new(),
            },
        };
        ctx.phase = if use_proxy {
            Phase::OpenProxy
        } else {
            Phase::OpenDirect
        };

        // Resolve the version for this connection.
        let version = if ctx.is_secure() {
            match conn.conn.alpn() {
                Some(proto) if proto == &b"h2"[..] => HttpVersion::Http2,
                Some(proto) if proto == &b"http/1.1"[..] => HttpVersion::Http1,
                other => {
                    debug!("alpn yielded {other:?}");
                    if ctx.flags.contains(RequestFlags::IGNORE_ALPN_FAILURE) {
                        HttpVersion::Http1
                    } else {
                        return Err(Error::new_alpn_failed());
                    }
                }
            }
        } else if ctx.http_version == HttpVersion::Http2 {
            // Cleartext HTTP/2 wants the upgrade dance.
            return self.h2c_exchange(conn, ctx, cancel).await;
        } else {
            HttpVersion::Http1
        };

        match version {
            HttpVersion::Http2 => {
                ctx.resolved_version = Some(Version::HTTP_2);
                let h2_conn = cancel
                    .run(H2Connection::client_handshake(
                        conn.conn,
                        default_client_settings(),
                    ))
                    .await
                    .map_err(Error::from)??;
                self.h2 = Some(H2State {
                    conn: h2_conn,
                    host: ctx.host().to_owned(),
                    port: ctx.port(),
                    secure: ctx.is_secure(),
                    stashed: VecDeque::new(),
                });
                self.h2_exchange(ctx, cancel).await
            }
            _ => {
                ctx.resolved_version = Some(Version::HTTP_11);
                self.h1 = Some(conn);
                self.h1_exchange(ctx, cancel).await
            }
        }
    }

    /// Tears down whatever connection is live.
    pub async fn close(&mut self, cancel: &Cancel) {
        if let Some(mut h1) = self.h1.take() {
            let _ = h1.conn.close(cancel).await;
        }
        if let Some(mut h2) = self.h2.take() {
            let _ = cancel.run(h2.conn.close()).await;
        }
    }

    /// Gives up the HTTP/1 transport (plus any buffered bytes), for
    /// protocol upgrades like WebSocket.
    pub fn hijack(&mut self) -> Option<(Conn, BytesMut)> {
        self.h1.take().map(|state| (state.conn, state.read_buf))
    }

    // ===== HTTP/1 =====

    async fn h1_exchange(
        &mut self,
        ctx: &mut RequestContext,
        cancel: &Cancel,
    ) -> Result<(), Error> {
        let Some(state) = self.h1.as_mut() else {
            return Err(Error::new_invalid_phase());
        };

        let head = MessageHead {
            version: Version::HTTP_11,
            subject: RequestLine(
                ctx.method.clone(),
                ctx.uri.clone().unwrap_or_default(),
            ),
            headers: ctx.headers.clone(),
        };
        let target = ctx.request_target();
        let mut wire = Vec::new();
        let mut encoder = h1::role::Client::encode(
            h1::Encode {
                head: &head,
                body: Some(BodyLength::Known(ctx.body.len() as u64)),
                keep_alive: true,
                target: Some(&target),
                lowercase_headers: ctx.flags.contains(RequestFlags::LOWERCASE_HEADERS),
                small_header_case: ctx.flags.contains(RequestFlags::SMALL_HEADER_CASE),
                invalid_header_is_error: ctx
                    .flags
                    .contains(RequestFlags::INVALID_HEADER_IS_ERROR),
            },
            &mut wire,
        )?;
        encoder.encode(&ctx.body, &mut wire);
        encoder.finish(&mut wire);

        ctx.phase = Phase::RequestSending;
        state.conn.write_all(&wire, cancel).await?;
        ctx.phase = Phase::RequestSent;

        // Read the response head.
        ctx.phase = Phase::ResponseRecving;
        let msg = loop {
            if !state.read_buf.is_empty() {
                if let Some(msg) = h1::role::Client::parse(
                    &mut state.read_buf,
                    h1::ParseContext {
                        req_method: Some(&ctx.method),
                        allow_http09: ctx.flags.contains(RequestFlags::ALLOW_HTTP09),
                    },
                )? {
                    break msg;
                }
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = state.conn.read(&mut chunk, cancel).await?;
            if n == 0 {
                return Err(Error::new_incomplete_body());
            }
            state.read_buf.extend_from_slice(&chunk[..n]);
        };

        ctx.status = Some(msg.head.subject);
        ctx.wire_version = Some(msg.head.version);
        ctx.response_headers = msg.head.headers;
        ctx.connection_close = !msg.keep_alive;
        ctx.phase = Phase::ResponseRecved;

        if ctx.flags.contains(RequestFlags::NO_READ_BODY) || msg.wants_upgrade {
            return Ok(());
        }

        // Read the body through the framing the headers picked.
        let mut decoder = Decoder::new(msg.decode);
        loop {
            match decoder.decode(&mut state.read_buf).map_err(Error::new_parse)? {
                Decoded::Data(data) => ctx.response_body.extend_from_slice(&data),
                Decoded::Complete => break,
                Decoded::NeedMore => {
                    let mut chunk = [0u8; READ_CHUNK];
                    let n = state.conn.read(&mut chunk, cancel).await?;
                    if n == 0 {
                        decoder.end_of_input().map_err(|_| Error::new_incomplete_body())?;
                        break;
                    }
                    state.read_buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
        ctx.phase = Phase::BodyRecved;

        if ctx.connection_close {
            // The peer told us not to reuse this connection.
            if let Some(mut state) = self.h1.take() {
                let _ = state.conn.close(cancel).await;
            }
        }
        Ok(())
    }

    // ===== HTTP/2 over TLS =====

    async fn h2_exchange(
        &mut self,
        ctx: &mut RequestContext,
        cancel: &Cancel,
    ) -> Result<(), Error> {
        let Some(state) = self.h2.as_mut() else {
            return Err(Error::new_invalid_phase());
        };

        let pseudo = frame::Pseudo::request(
            ctx.method.clone(),
            ctx.scheme(),
            &ctx.authority(),
            ctx.uri
                .as_ref()
                .and_then(|u| u.path_and_query())
                .map(|pq| pq.as_str())
                .unwrap_or(""),
        );
        let fields = h2_request_fields(&ctx.headers);
        let end_stream = ctx.body.is_empty();

        ctx.phase = Phase::RequestSending;
        let id = cancel
            .run(state.conn.send_request(pseudo, fields, end_stream))
            .await
            .map_err(Error::from)??;
        ctx.stream_id = Some(id.into());

        if !end_stream {
            let body = ctx.body.clone();
            let sent = cancel
                .run(state.conn.send_data(id, body, true))
                .await
                .map_err(Error::from)??;
            if sent == SendData::NeedWindowUpdate {
                // Wait for the windows to drain the cursor; anything else
                // that surfaces meanwhile is replayed to the reader below.
                loop {
                    let event = cancel
                        .run(state.conn.next_event())
                        .await
                        .map_err(Error::from)??;
                    match event {
                        Some(Event::DataSent { stream_id }) if stream_id == id => break,
                        Some(other) => state.stashed.push_back(other),
                        None => return Err(Error::new_incomplete_body()),
                    }
                }
            }
        }
        ctx.phase = Phase::RequestSent;

        self.h2_read_response(ctx, cancel).await
    }

    async fn h2c_exchange(
        &mut self,
        mut state: H1State,
        ctx: &mut RequestContext,
        cancel: &Cancel,
    ) -> Result<(), Error> {
        let settings = default_client_settings();

        // The upgrade request itself travels as HTTP/1.1.
        let mut upgrade_headers = ctx.headers.clone();
        h2c::apply_upgrade_headers(&mut upgrade_headers, &settings)?;
        let head = MessageHead {
            version: Version::HTTP_11,
            subject: RequestLine(
                ctx.method.clone(),
                ctx.uri.clone().unwrap_or_default(),
            ),
            headers: upgrade_headers,
        };
        let target = ctx.request_target();
        let mut wire = Vec::new();
        let _ = h1::role::Client::encode(
            h1::Encode {
                head: &head,
                body: None,
                keep_alive: true,
                target: Some(&target),
                lowercase_headers: ctx.flags.contains(RequestFlags::LOWERCASE_HEADERS),
                small_header_case: ctx.flags.contains(RequestFlags::SMALL_HEADER_CASE),
                invalid_header_is_error: false,
            },
            &mut wire,
        )?;
        ctx.phase = Phase::RequestSending;
        state.conn.write_all(&wire, cancel).await?;
        ctx.phase = Phase::RequestSent;

        // Expect the 101.
        let msg = loop {
            if !state.read_buf.is_empty() {
                if let Some(msg) = h1::role::Client::parse(
                    &mut state.read_buf,
                    h1::ParseContext {
                        req_method: Some(&ctx.method),
                        allow_http09: false,
                    },
                )? {
                    break msg;
                }
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = state.conn.read(&mut chunk, cancel).await?;
            if n == 0 {
                return Err(Error::new_incomplete_body());
            }
            state.read_buf.extend_from_slice(&chunk[..n]);
        };
        h2c::validate_upgrade_response(msg.head.subject, &msg.head.headers)?;
        debug!("h2c upgrade accepted, switching to HTTP/2");

        // Switch: preface + SETTINGS; the request above is stream 1. Bytes
        // read past the 101 (the server's first frames) seed the codec.
        ctx.resolved_version = Some(Version::HTTP_2);
        let h2_conn = cancel
            .run(H2Connection::client_upgrade(
                state.conn,
                settings,
                state.read_buf,
            ))
            .await
            .map_err(Error::from)??;
        self.h2 = Some(H2State {
            conn: h2_conn,
            host: ctx.host().to_owned(),
            port: ctx.port(),
            secure: false,
            stashed: VecDeque::new(),
        });
        ctx.stream_id = Some(h2c::upgraded_stream_id().into());

        self.h2_read_response(ctx, cancel).await
    }

    /// Reads events until the context's stream has its full response.
    async fn h2_read_response(
        &mut self,
        ctx: &mut RequestContext,
        cancel: &Cancel,
    ) -> Result<(), Error> {
        let Some(state) = self.h2.as_mut() else {
            return Err(Error::new_invalid_phase());
        };
        let id = frame::StreamId::from(ctx.stream_id.unwrap_or_default());

        ctx.phase = Phase::ResponseRecving;
        loop {
            let event = match state.stashed.pop_front() {
                Some(event) => event,
                None => match cancel
                    .run(state.conn.next_event())
                    .await
                    .map_err(Error::from)??
                {
                    Some(event) => event,
                    None => return Err(Error::new_incomplete_body()),
                },
            };

            match event {
                Event::Headers {
                    stream_id,
                    pseudo,
                    fields,
                    end_stream,
                } if stream_id == id => {
                    if pseudo.is_informational() {
                        trace!("skipping informational response");
                        continue;
                    }
                    ctx.status = pseudo.status;
                    ctx.response_headers = fields;
                    ctx.phase = Phase::ResponseRecved;
                    if end_stream || ctx.flags.contains(RequestFlags::NO_READ_BODY) {
                        if end_stream {
                            ctx.phase = Phase::BodyRecved;
                        }
                        return Ok(());
                    }
                }
                Event::Data {
                    stream_id,
                    data,
                    end_stream,
                } if stream_id == id => {
                    ctx.response_body.extend_from_slice(&data);
                    if end_stream {
                        ctx.phase = Phase::BodyRecved;
                        return Ok(());
                    }
                }
                Event::Trailers { stream_id, fields } if stream_id == id => {
                    for (name, value) in fields.iter() {
                        ctx.response_headers
                            .append_original(name.clone(), value.clone());
                    }
                    ctx.phase = Phase::BodyRecved;
                    return Ok(());
                }
                Event::Reset { stream_id, reason } if stream_id == id => {
                    return Err(Error::from(crate::h2::Error::remote_reset(
                        stream_id, reason,
                    )));
                }
                Event::GoAway {
                    last_stream_id,
                    reason,
                } => {
                    if last_stream_id < id {
                        return Err(Error::from(crate::h2::Error::remote_go_away(
                            Bytes::new(),
                            reason,
                        )));
                    }
                    // Our stream survives; keep reading it out.
                }
                other => {
                    trace!("ignoring unrelated event: {other:?}");
                }
            }
        }
    }
}

/// ALPN offers for the requested version, most preferred first.
fn alpn_offers(version: HttpVersion) -> Vec<&'static str> {
    match version {
        HttpVersion::Http1 => vec!["http/1.1"],
        HttpVersion::Http2 => vec!["h2"],
        HttpVersion::Auto => vec!["h2", "http/1.1"],
    }
}

fn default_client_settings() -> frame::Settings {
    frame::Settings::default()
}

/// Filters the caller's headers for HTTP/2: connection-level fields and
/// Host (replaced by `:authority`) must not appear.
fn h2_request_fields(src: &OrderedHeaders) -> OrderedHeaders {
    let mut out = OrderedHeaders::new();
    for (name, value) in src.iter() {
        let canonical = name.name();
        if *canonical == http::header::HOST
            || *canonical == http::header::CONNECTION
            || *canonical == http::header::TRANSFER_ENCODING
            || *canonical == http::header::UPGRADE
            || canonical.as_str() == "keep-alive"
            || canonical.as_str() == "proxy-connection"
        {
            continue;
        }
        out.append_original(name.clone(), value.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_parsing_applies_default_scheme() {
        let ctx = RequestContext::get("example.com/a?b=1").unwrap();
        assert_eq!(ctx.scheme(), "http");
        assert_eq!(ctx.host(), "example.com");
        assert_eq!(ctx.port(), 80);
        assert_eq!(ctx.path(), "/a");
        assert_eq!(ctx.query().as_deref(), Some("?b=1"));
    }

    #[test]
    fn https_defaults_to_443() {
        let ctx = RequestContext::get("https://example.com").unwrap();
        assert!(ctx.is_secure());
        assert_eq!(ctx.port(), 443);
        assert_eq!(ctx.request_target(), "/");
    }

    #[test]
    fn default_path_policies() {
        let mut ctx = RequestContext::get("http://example.com").unwrap();
        assert_eq!(ctx.request_target(), "/");
        ctx.set_default_path(DefaultPath::IndexHtml);
        assert_eq!(ctx.request_target(), "/index.html");
        ctx.set_default_path(DefaultPath::RobotTxt);
        assert_eq!(ctx.request_target(), "/robot.txt");
        ctx.set_default_path(DefaultPath::Wildcard);
        assert_eq!(ctx.request_target(), "*");
        ctx.set_default_path(DefaultPath::HostPort);
        assert_eq!(ctx.request_target(), "example.com:80");
        ctx.set_default_path(DefaultPath::AbsoluteUrl);
        assert_eq!(ctx.request_target(), "http://example.com/");
    }

    #[test]
    fn proxy_forces_absolute_form() {
        let mut ctx = RequestContext::get("http://example.com/x").unwrap();
        ctx.set_proxy("proxy.local", 3128);
        assert_eq!(ctx.request_target(), "http://example.com/x");
        assert_eq!(ctx.phase(), Phase::Idle);
    }

    #[test]
    fn alpn_offers_follow_requested_version() {
        assert_eq!(alpn_offers(HttpVersion::Http1), vec!["http/1.1"]);
        assert_eq!(alpn_offers(HttpVersion::Http2), vec!["h2"]);
        assert_eq!(alpn_offers(HttpVersion::Auto), vec!["h2", "http/1.1"]);
    }

    #[test]
    fn h2_fields_drop_connection_headers() {
        let mut headers = OrderedHeaders::new();
        headers.append("Host", "example.com").unwrap();
        headers.append("Connection", "keep-alive").unwrap();
        headers.append("Accept", "*/*").unwrap();
        let filtered = h2_request_fields(&headers);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.get("accept").is_some());
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(RequestContext::get("http://").is_err());
        assert!(RequestContext::get("\u{0}").is_err());
    }

    #[test]
    fn url_path_and_query_are_percent_encoded_by_default() {
        let ctx = RequestContext::get("http://example.com/a b/c?q=x y").unwrap();
        assert_eq!(ctx.path(), "/a%20b/c");
        assert_eq!(ctx.query().as_deref(), Some("?q=x%20y"));
        assert_eq!(ctx.request_target(), "/a%20b/c?q=x%20y");
    }

    #[test]
    fn already_encoded_sequences_are_not_doubled() {
        let ctx = RequestContext::get("http://example.com/pre%20done").unwrap();
        assert_eq!(ctx.path(), "/pre%20done");
    }

    #[test]
    fn url_encoded_flag_passes_the_url_through() {
        // A pre-encoded URL is taken verbatim...
        let mut ctx = RequestContext::get("http://example.com/pre%2Fdone").unwrap();
        ctx.set_flags(RequestFlags::URL_ENCODED);
        ctx.reparse_url().unwrap();
        assert_eq!(ctx.path(), "/pre%2Fdone");

        // ...and one that still holds raw illegal characters is rejected
        // instead of silently fixed up.
        let mut ctx = RequestContext::get("http://example.com/sp ace").unwrap();
        ctx.set_flags(RequestFlags::URL_ENCODED);
        assert!(ctx.reparse_url().is_err());
    }

    #[test]
    fn host_is_never_percent_encoded() {
        assert_eq!(
            encode_target("http://example.com"),
            "http://example.com"
        );
        assert_eq!(
            encode_target("http://example.com?q=a b"),
            "http://example.com?q=a%20b"
        );
    }
}
