//! The high-level server: accept connections, parse requests into the
//! mirrored [`RequestContext`] phases, respond, and hand connections off
//! to protocol upgrades (WebSocket hijack, h2c).

use bytes::BytesMut;
use http::{Method, StatusCode, Version};
use tracing::{debug, trace};

use skein_net::{Cancel, Conn, IpFamily, Listener};

use crate::client::RequestContext;
use crate::error::Error;
use crate::h2::proto::Connection as H2Connection;
use crate::h2::{frame, h2c};
use crate::headers::OrderedHeaders;
use crate::proto::h1::{self, Decoded, Decoder, Http1Transaction};
use crate::proto::{BodyLength, DecodedLength, MessageHead};

const READ_CHUNK: usize = 16 * 1024;

/// A bound listener producing [`ServerConn`]s.
#[derive(Debug)]
pub struct Server {
    listener: Listener,
}

impl Server {
    /// Binds `port` (dual-stack when the family allows).
    pub fn bind(port: u16, family: IpFamily) -> Result<Self, Error> {
        Ok(Self {
            listener: skein_net::listen::bind(port, family)?,
        })
    }

    #[must_use]
    pub fn local_port(&self) -> u16 {
        self.listener.local_addr().port()
    }

    /// Waits for an incoming connection.
    pub async fn accept(&self, cancel: &Cancel) -> Result<ServerConn, Error> {
        let conn = self.listener.accept(cancel).await?;
        Ok(ServerConn::new(conn))
    }
}

/// One accepted connection, serving HTTP/1 exchanges until it closes or
/// is upgraded.
#[derive(Debug)]
pub struct ServerConn {
    conn: Conn,
    read_buf: BytesMut,
    /// Method of the exchange in flight; HEAD changes response framing.
    req_method: Option<Method>,
    keep_alive: bool,
}

impl ServerConn {
    #[must_use]
    pub fn new(conn: Conn) -> Self {
        Self {
            conn,
            read_buf: BytesMut::new(),
            req_method: None,
            keep_alive: true,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.conn.is_open() && self.keep_alive
    }

    /// Reads and parses one request into `ctx`. `Ok(false)` means the
    /// client closed cleanly between requests.
    pub async fn recv_request(
        &mut self,
        ctx: &mut RequestContext,
        cancel: &Cancel,
        allow_http09: bool,
    ) -> Result<bool, Error> {
        ctx.begin_server_exchange();

        let msg = loop {
            if !self.read_buf.is_empty() {
                match h1::role::Server::parse(
                    &mut self.read_buf,
                    h1::ParseContext {
                        req_method: None,
                        allow_http09,
                    },
                ) {
                    Ok(Some(msg)) => break msg,
                    Ok(None) => {}
                    Err(parse) => {
                        let err = Error::new_parse(parse);
                        ctx.fail_server(&err);
                        return Err(err);
                    }
                }
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = self.conn.read(&mut chunk, cancel).await?;
            if n == 0 {
                if self.read_buf.is_empty() {
                    trace!("client closed between requests");
                    return Ok(false);
                }
                let err = Error::new_incomplete_body();
                ctx.fail_server(&err);
                return Err(err);
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        };

        self.req_method = Some(msg.head.subject.0.clone());
        self.keep_alive = msg.keep_alive;
        ctx.fill_server_request(&msg);

        // Request body, framed per the parsed headers.
        if msg.decode != DecodedLength::ZERO {
            let mut decoder = Decoder::new(msg.decode);
            loop {
                match decoder.decode(&mut self.read_buf).map_err(Error::new_parse)? {
                    Decoded::Data(data) => ctx.push_request_body(&data),
                    Decoded::Complete => break,
                    Decoded::NeedMore => {
                        let mut chunk = [0u8; READ_CHUNK];
                        let n = self.conn.read(&mut chunk, cancel).await?;
                        if n == 0 {
                            let err = Error::new_incomplete_body();
                            ctx.fail_server(&err);
                            return Err(err);
                        }
                        self.read_buf.extend_from_slice(&chunk[..n]);
                    }
                }
            }
        }
        ctx.finish_server_request();
        Ok(true)
    }

    /// Writes a response for the exchange parsed into `ctx`.
    pub async fn send_response(
        &mut self,
        ctx: &RequestContext,
        status: StatusCode,
        headers: &OrderedHeaders,
        body: &[u8],
        cancel: &Cancel,
    ) -> Result<(), Error> {
        let version = match ctx.wire_version() {
            Some(Version::HTTP_09) => Version::HTTP_09,
            Some(Version::HTTP_10) => Version::HTTP_10,
            _ => Version::HTTP_11,
        };
        let head = MessageHead {
            version,
            subject: status,
            headers: headers.clone(),
        };
        let is_head = self.req_method.as_ref() == Some(&Method::HEAD);
        let mut wire = Vec::new();
        let mut encoder = h1::role::Server::encode(
            h1::Encode {
                head: &head,
                body: Some(BodyLength::Known(body.len() as u64)),
                keep_alive: self.keep_alive,
                target: None,
                lowercase_headers: false,
                small_header_case: false,
                invalid_header_is_error: false,
            },
            &mut wire,
        )?;
        if !is_head {
            encoder.encode(body, &mut wire);
            encoder.finish(&mut wire);
        }
        self.conn.write_all(&wire, cancel).await?;
        debug!("response sent: {status}");
        Ok(())
    }

    /// Whether the request parsed into `ctx` asks for the h2c upgrade;
    /// returns the client's initial SETTINGS when it does.
    #[must_use]
    pub fn h2c_settings(ctx: &RequestContext) -> Option<frame::Settings> {
        h2c::upgrade_settings(ctx.request_headers())
    }

    /// Accepts an h2c upgrade: replies 101, switches the transport to
    /// HTTP/2 and returns the engine with the upgraded request as stream
    /// 1, half-closed (remote). The caller responds on that stream.
    pub async fn upgrade_h2c(
        mut self,
        local_settings: frame::Settings,
        cancel: &Cancel,
    ) -> Result<H2Connection<Conn>, Error> {
        let reply = b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: h2c\r\n\r\n";
        self.conn.write_all(reply, cancel).await?;
        let conn = cancel
            .run(H2Connection::server_upgrade(
                self.conn,
                local_settings,
                self.read_buf,
            ))
            .await
            .map_err(Error::from)??;
        Ok(conn)
    }

    /// Takes HTTP/2 over the connection by prior knowledge (the client
    /// sent the preface directly).
    pub async fn into_h2(
        self,
        local_settings: frame::Settings,
        cancel: &Cancel,
    ) -> Result<H2Connection<Conn>, Error> {
        let conn = cancel
            .run(H2Connection::server_handshake(
                self.conn,
                local_settings,
                self.read_buf,
            ))
            .await
            .map_err(Error::from)??;
        Ok(conn)
    }

    /// Sends a 101 with the given extra headers, then yields the raw
    /// transport and any buffered bytes: the WebSocket hijack.
    pub async fn switch_protocols(
        mut self,
        headers: &OrderedHeaders,
        cancel: &Cancel,
    ) -> Result<(Conn, BytesMut), Error> {
        let head = MessageHead {
            version: Version::HTTP_11,
            subject: StatusCode::SWITCHING_PROTOCOLS,
            headers: headers.clone(),
        };
        let mut wire = Vec::new();
        let _ = h1::role::Server::encode(
            h1::Encode {
                head: &head,
                body: None,
                keep_alive: true,
                target: None,
                lowercase_headers: false,
                small_header_case: false,
                invalid_header_is_error: false,
            },
            &mut wire,
        )?;
        self.conn.write_all(&wire, cancel).await?;
        Ok((self.conn, self.read_buf))
    }

    /// Closes the transport.
    pub async fn close(&mut self, cancel: &Cancel) -> Result<(), Error> {
        self.conn.close(cancel).await.map_err(Error::from)
    }
}
