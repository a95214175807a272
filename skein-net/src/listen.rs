//! Listening sockets.

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tracing::trace;

use crate::cancel::Cancel;
use crate::conn::Conn;
use crate::endpoint::IpFamily;
use crate::error::Error;

const BACKLOG: i32 = 10_240;

/// A bound, listening TCP socket.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local: SocketAddr,
}

/// Binds `port` on the wildcard address of `family`.
///
/// `IpFamily::Any` binds dual-stack (IPV6_V6ONLY off). SO_REUSEADDR is set
/// so restarts don't trip over TIME_WAIT.
pub fn bind(port: u16, family: IpFamily) -> Result<Listener, Error> {
    let (domain, addr): (Domain, SocketAddr) = match family {
        IpFamily::V4 => (Domain::IPV4, SocketAddr::from(([0, 0, 0, 0], port))),
        IpFamily::V6 | IpFamily::Any => (
            Domain::IPV6,
            SocketAddr::from((std::net::Ipv6Addr::UNSPECIFIED, port)),
        ),
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(Error::Io)?;
    socket.set_reuse_address(true).map_err(Error::Io)?;
    if domain == Domain::IPV6 {
        socket
            .set_only_v6(family == IpFamily::V6)
            .map_err(Error::Io)?;
    }
    socket.bind(&addr.into()).map_err(Error::Io)?;
    socket.listen(BACKLOG).map_err(Error::Io)?;
    socket.set_nonblocking(true).map_err(Error::Io)?;

    let std_listener: std::net::TcpListener = socket.into();
    let inner = TcpListener::from_std(std_listener).map_err(Error::Io)?;
    let local = inner.local_addr().map_err(Error::Io)?;
    trace!("listening on {local}");
    Ok(Listener { inner, local })
}

impl Listener {
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Waits for an incoming connection, subject to `cancel`.
    pub async fn accept(&self, cancel: &Cancel) -> Result<Conn, Error> {
        let (stream, peer) = cancel
            .run(self.inner.accept())
            .await?
            .map_err(Error::Io)?;
        trace!("accepted connection from {peer}");
        Ok(Conn::from_accepted(stream, peer, self.local.port()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_accept_roundtrip() {
        let listener = bind(0, IpFamily::V4).unwrap();
        let port = listener.local_addr().port();
        let cancel = Cancel::new();

        let client = tokio::spawn(async move {
            crate::conn::open("127.0.0.1", port, IpFamily::V4, None, &Cancel::new())
                .await
                .unwrap()
        });

        let mut server_side = listener.accept(&cancel).await.unwrap();
        let mut client_side = client.await.unwrap();

        client_side.write_all(b"ping", &cancel).await.unwrap();
        let mut buf = [0u8; 4];
        let n = server_side.read(&mut buf, &cancel).await.unwrap();
        assert_eq!(&buf[..n], b"ping");

        client_side.close(&cancel).await.unwrap();
        let n = server_side.read(&mut buf, &cancel).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn accept_is_cancellable() {
        let listener = bind(0, IpFamily::V4).unwrap();
        let cancel = Cancel::new().with_timeout(std::time::Duration::from_millis(20));
        let err = listener.accept(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
