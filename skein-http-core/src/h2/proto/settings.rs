use tracing::{debug, trace};

use crate::h2::codec::UserError;
use crate::h2::frame;

/// Local SETTINGS synchronization.
///
/// Our settings take effect only once the peer acknowledges them; the
/// peer's settings are applied by the connection the moment their ACK is
/// buffered, before any further frame is read.
#[derive(Debug)]
pub(crate) struct Settings {
    local: Local,
}

#[derive(Debug)]
enum Local {
    /// Sent, waiting for the ACK before applying locally.
    WaitingAck(frame::Settings),
    /// In sync with the remote.
    Synced,
}

impl Settings {
    /// The initial local SETTINGS are flushed during the handshake, so the
    /// state starts at waiting-for-ack.
    pub(crate) fn new(local: frame::Settings) -> Self {
        Self {
            local: Local::WaitingAck(local),
        }
    }

    /// Handles a SETTINGS ACK, returning the settings to apply locally.
    pub(crate) fn recv_ack(&mut self) -> Result<frame::Settings, crate::h2::proto::Error> {
        match std::mem::replace(&mut self.local, Local::Synced) {
            Local::WaitingAck(local) => {
                debug!("received settings ACK; applying {local:?}");
                Ok(local)
            }
            Local::Synced => {
                // No SETTINGS of ours await an ACK: peer is broken.
                proto_err!(conn: "received unexpected settings ack");
                Err(crate::h2::proto::Error::library_go_away(
                    frame::Reason::PROTOCOL_ERROR,
                ))
            }
        }
    }

    /// Queues a fresh local SETTINGS frame to send.
    pub(crate) fn send_settings(&mut self, frame: frame::Settings) -> Result<(), UserError> {
        debug_assert!(!frame.is_ack());
        match self.local {
            Local::WaitingAck(..) => {
                trace!("SETTINGS update rejected; previous still unacknowledged");
                Err(UserError::SendSettingsWhilePending)
            }
            Local::Synced => {
                self.local = Local::WaitingAck(frame);
                Ok(())
            }
        }
    }
}
