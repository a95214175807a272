use std::fmt;
use std::io;

/// WebSocket protocol failures.
#[derive(Debug)]
pub enum ProtocolError {
    /// Transport failure underneath the codec.
    Io(io::Error),
    /// A reserved opcode was used.
    InvalidOpCode(u8),
    /// RSV1-3 must be zero without a negotiated extension.
    NonZeroReservedBits,
    /// A server received an unmasked client frame.
    UnmaskedClientFrame,
    /// A client received a masked server frame.
    MaskedServerFrame,
    /// A control frame with FIN unset.
    FragmentedControlFrame,
    /// A control frame payload beyond 125 bytes.
    OversizedControlFrame,
    /// A continuation frame with no message in progress.
    UnexpectedContinueFrame,
    /// A fresh data frame while a fragmented message is in progress.
    ExpectedFragment,
    /// The assembled message exceeds the configured bound.
    MessageTooLong { size: usize, max_size: usize },
    /// A text message that is not valid UTF-8.
    InvalidUtf8,
    /// Writing after the close handshake completed.
    SendAfterClosing,
    /// The peer closed the transport without a close frame.
    ResetWithoutClosingHandshake,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "websocket i/o failure: {e}"),
            Self::InvalidOpCode(op) => write!(f, "reserved opcode {op:#x}"),
            Self::NonZeroReservedBits => f.write_str("reserved bits are not zero"),
            Self::UnmaskedClientFrame => f.write_str("client frame without masking"),
            Self::MaskedServerFrame => f.write_str("server frame with masking"),
            Self::FragmentedControlFrame => f.write_str("fragmented control frame"),
            Self::OversizedControlFrame => f.write_str("control frame payload over 125 bytes"),
            Self::UnexpectedContinueFrame => {
                f.write_str("continuation frame without a message in progress")
            }
            Self::ExpectedFragment => {
                f.write_str("new data frame while a fragmented message is in progress")
            }
            Self::MessageTooLong { size, max_size } => {
                write!(f, "message of {size} bytes exceeds the {max_size} byte bound")
            }
            Self::InvalidUtf8 => f.write_str("text message is not valid utf-8"),
            Self::SendAfterClosing => f.write_str("send attempted after closing"),
            Self::ResetWithoutClosingHandshake => {
                f.write_str("connection reset without a closing handshake")
            }
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
