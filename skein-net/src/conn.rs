//! The connection facade.
//!
//! [`Conn`] gives the protocol engines one read/write/close surface over
//! plain TCP and TLS. It also carries the [`Endpoint`] it was opened
//! against, which is what [`Conn::reopen`] compares to decide that an
//! existing connection can be reused as-is.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, trace};

use crate::cancel::{Cancel, CancelReason};
use crate::endpoint::{Endpoint, IpFamily};
use crate::error::Error;
use crate::tls::TlsParams;

/// The transport behind a [`Conn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Tls,
    Closed,
}

/// A point-in-time description of a connection, see [`Conn::stat`].
#[derive(Debug, Clone)]
pub struct ConnStat {
    pub kind: TransportKind,
    pub secure: bool,
    pub streaming: bool,
    pub alpn: Option<Vec<u8>>,
    pub peer: Option<SocketAddr>,
}

/// Outcome of [`Conn::reopen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reopen {
    /// The live connection already points at the requested endpoint.
    Needless,
    /// The connection was closed and re-established.
    Reopened,
}

enum Io {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    Closed,
}

impl std::fmt::Debug for Io {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp(_) => f.write_str("Tcp"),
            Self::Tls(_) => f.write_str("Tls"),
            Self::Closed => f.write_str("Closed"),
        }
    }
}

/// A plain or TLS connection plus its reuse identity.
#[derive(Debug)]
pub struct Conn {
    io: Io,
    endpoint: Endpoint,
    alpn: Option<Vec<u8>>,
    /// Set after a fatal I/O error; suppresses the TLS shutdown on close.
    no_shutdown: bool,
}

/// Resolves `host:port`, connects (optionally through TLS) and returns the
/// established connection.
///
/// Each resolved address of the requested family is attempted in order
/// until one connects or `cancel` fires.
pub async fn open(
    host: &str,
    port: u16,
    family: IpFamily,
    tls: Option<&TlsParams>,
    cancel: &Cancel,
) -> Result<Conn, Error> {
    let addrs = cancel
        .run(tokio::net::lookup_host((host, port)))
        .await?
        .map_err(Error::Resolve)?;
    let addrs: Vec<SocketAddr> = addrs.filter(|a| family.accepts(a)).collect();
    if addrs.is_empty() {
        return Err(Error::Resolve(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no {family:?} address for {host}"),
        )));
    }

    let mut last_err = None;
    let mut connected = None;
    for addr in addrs {
        trace!("connecting to {addr}");
        match cancel.run(TcpStream::connect(addr)).await? {
            Ok(stream) => {
                connected = Some((stream, addr));
                break;
            }
            Err(e) => {
                debug!("connect to {addr} failed: {e}");
                last_err = Some(e);
            }
        }
    }
    let (stream, addr) = match connected {
        Some(ok) => ok,
        None => {
            return Err(Error::Connect(last_err.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::ConnectionRefused, "no address connected")
            })));
        }
    };

    let endpoint = Endpoint::new(host, port, family, addr, tls.is_some());
    match tls {
        None => Ok(Conn {
            io: Io::Tcp(stream),
            endpoint,
            alpn: None,
            no_shutdown: false,
        }),
        Some(params) => {
            let config = params.client_config()?;
            let name = rustls_pki_types::ServerName::try_from(
                params.server_name(host).to_owned(),
            )
            .map_err(|e| Error::Tls(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
            let connector = TlsConnector::from(config);
            let stream = cancel
                .run(connector.connect(name, stream))
                .await?
                .map_err(Error::Tls)?;
            let alpn = stream
                .get_ref()
                .1
                .alpn_protocol()
                .map(<[u8]>::to_vec);
            trace!("tls established; alpn={:?}", alpn.as_deref().map(String::from_utf8_lossy));
            Ok(Conn {
                io: Io::Tls(Box::new(stream)),
                endpoint,
                alpn,
                no_shutdown: false,
            })
        }
    }
}

impl Conn {
    pub(crate) fn from_accepted(stream: TcpStream, peer: SocketAddr, local_port: u16) -> Self {
        Self {
            io: Io::Tcp(stream),
            endpoint: Endpoint::new(peer.ip().to_string(), local_port, IpFamily::Any, peer, false),
            alpn: None,
            no_shutdown: false,
        }
    }

    /// The endpoint this connection was opened against.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The ALPN protocol the peer accepted, if TLS negotiated one.
    #[must_use]
    pub fn alpn(&self) -> Option<&[u8]> {
        self.alpn.as_deref()
    }

    #[must_use]
    pub fn is_secure(&self) -> bool {
        matches!(self.io, Io::Tls(_))
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        !matches!(self.io, Io::Closed)
    }

    #[must_use]
    pub fn stat(&self) -> ConnStat {
        let kind = match self.io {
            Io::Tcp(_) => TransportKind::Tcp,
            Io::Tls(_) => TransportKind::Tls,
            Io::Closed => TransportKind::Closed,
        };
        ConnStat {
            kind,
            secure: matches!(kind, TransportKind::Tls),
            streaming: self.is_open(),
            alpn: self.alpn.clone(),
            peer: self.is_open().then(|| self.endpoint.addr()),
        }
    }

    /// Reuses the live connection when the requested endpoint equals the
    /// current one, otherwise closes and reopens in place.
    pub async fn reopen(
        &mut self,
        host: &str,
        port: u16,
        family: IpFamily,
        tls: Option<&TlsParams>,
        cancel: &Cancel,
    ) -> Result<Reopen, Error> {
        if self.is_open() && self.endpoint.matches(host, port, family, tls.is_some()) {
            trace!("reopen: endpoint unchanged, reusing connection");
            return Ok(Reopen::Needless);
        }
        let fresh = open(host, port, family, tls, cancel).await?;
        let _ = self.close(cancel).await;
        *self = fresh;
        Ok(Reopen::Reopened)
    }

    /// Reads into `buf`, returning the byte count; `Ok(0)` is end of
    /// stream. A TLS close-notify after data (or a truncated close) reads
    /// as EOF.
    pub async fn read(&mut self, buf: &mut [u8], cancel: &Cancel) -> Result<usize, Error> {
        let res = match cancel.run(read_io(&mut self.io, buf)).await {
            Ok(res) => res,
            Err(cancelled) => return Err(cancelled.into()),
        };
        match res {
            Ok(n) => Ok(n),
            // Peers commonly drop the transport without a close-notify;
            // after the response body this is indistinguishable from EOF.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && self.is_secure() => Ok(0),
            Err(e) => {
                self.no_shutdown = true;
                cancel.note(self.io_reason());
                Err(Error::Io(e))
            }
        }
    }

    /// Writes the whole buffer, flushing the transport.
    pub async fn write_all(&mut self, bytes: &[u8], cancel: &Cancel) -> Result<(), Error> {
        let res = match cancel.run(write_io(&mut self.io, bytes)).await {
            Ok(res) => res,
            Err(cancelled) => return Err(cancelled.into()),
        };
        res.map_err(|e| {
            self.no_shutdown = true;
            cancel.note(self.io_reason());
            Error::Io(e)
        })
    }

    /// Closes the connection. On TLS a best-effort bidirectional shutdown
    /// is performed unless a fatal I/O error already poisoned the session.
    pub async fn close(&mut self, cancel: &Cancel) -> Result<(), Error> {
        match std::mem::replace(&mut self.io, Io::Closed) {
            Io::Closed => Ok(()),
            Io::Tcp(mut stream) => {
                let _ = stream.shutdown().await;
                Ok(())
            }
            Io::Tls(mut stream) => {
                if !self.no_shutdown {
                    // Close-notify exchange, bounded by the caller's cancel.
                    let _ = cancel.run(stream.shutdown()).await;
                }
                Ok(())
            }
        }
    }

    fn io_reason(&self) -> CancelReason {
        if self.is_secure() {
            CancelReason::TlsError
        } else {
            CancelReason::OsError
        }
    }
}

async fn read_io(io: &mut Io, buf: &mut [u8]) -> io::Result<usize> {
    match io {
        Io::Tcp(s) => s.read(buf).await,
        Io::Tls(s) => s.read(buf).await,
        Io::Closed => Ok(0),
    }
}

async fn write_io(io: &mut Io, bytes: &[u8]) -> io::Result<()> {
    match io {
        Io::Tcp(s) => {
            s.write_all(bytes).await?;
            s.flush().await
        }
        Io::Tls(s) => {
            s.write_all(bytes).await?;
            s.flush().await
        }
        Io::Closed => Err(io::Error::new(
            io::ErrorKind::NotConnected,
            "connection closed",
        )),
    }
}

impl AsyncRead for Conn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().io {
            Io::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Io::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            Io::Closed => Poll::Ready(Ok(())),
        }
    }
}

impl AsyncWrite for Conn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().io {
            Io::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Io::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            Io::Closed => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection closed",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().io {
            Io::Tcp(s) => Pin::new(s).poll_flush(cx),
            Io::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            Io::Closed => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().io {
            Io::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Io::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            Io::Closed => Poll::Ready(Ok(())),
        }
    }
}
