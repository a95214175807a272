use tracing::trace;

use crate::h2::codec::UserError;
use crate::h2::frame::Ping;

/// PING state: pongs for the peer are produced inline; at most one
/// locally-initiated ping may be in flight.
#[derive(Debug, Default)]
pub(crate) struct PingPong {
    pending: Option<[u8; 8]>,
}

impl PingPong {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a locally-initiated ping.
    pub(crate) fn send_ping(&mut self, payload: [u8; 8]) -> Result<Ping, UserError> {
        if self.pending.is_some() {
            return Err(UserError::SendPingWhilePending);
        }
        self.pending = Some(payload);
        Ok(Ping::new(payload))
    }

    /// Handles an incoming PING. Returns the pong to send back, or `None`
    /// when the frame was an ack of our own ping.
    pub(crate) fn recv_ping(&mut self, ping: &Ping) -> Option<Ping> {
        if ping.is_ack() {
            if self.pending.take() == Some(*ping.payload()) {
                trace!("pong received");
            } else {
                trace!("unsolicited PING ack ignored");
            }
            None
        } else {
            Some(Ping::pong(*ping.payload()))
        }
    }
}
