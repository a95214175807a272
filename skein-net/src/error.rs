use std::fmt;
use std::io;

use crate::cancel::Cancelled;

/// Transport-level error.
#[derive(Debug)]
pub enum Error {
    /// Name resolution failed, or no address of the requested family.
    Resolve(io::Error),
    /// Every resolved address refused the connection.
    Connect(io::Error),
    /// TLS configuration or handshake failure.
    Tls(io::Error),
    /// I/O failure on an established connection.
    Io(io::Error),
    /// The operation's [`crate::Cancel`] handle fired.
    Cancelled(Cancelled),
}

impl Error {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve(e) => write!(f, "address resolution failed: {e}"),
            Self::Connect(e) => write!(f, "connect failed: {e}"),
            Self::Tls(e) => write!(f, "tls failure: {e}"),
            Self::Io(e) => write!(f, "transport i/o failure: {e}"),
            Self::Cancelled(c) => c.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Resolve(e) | Self::Connect(e) | Self::Tls(e) | Self::Io(e) => Some(e),
            Self::Cancelled(c) => Some(c),
        }
    }
}

impl From<Cancelled> for Error {
    fn from(c: Cancelled) -> Self {
        Self::Cancelled(c)
    }
}
