use tracing::debug;

use crate::h2::frame::{self, Reason, StreamId};

/// GOAWAY bookkeeping for both directions.
///
/// After either side sends or observes a GOAWAY, no new streams may be
/// opened; streams at or below the carried last-id may complete.
#[derive(Debug, Default)]
pub(crate) struct GoAway {
    /// The GOAWAY we sent, if any.
    sent: Option<(StreamId, Reason)>,
    /// The GOAWAY the peer sent, if any.
    received: Option<(StreamId, Reason)>,
}

impl GoAway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_going_away(&self) -> bool {
        self.sent.is_some() || self.received.is_some()
    }

    pub(crate) fn sent(&self) -> Option<(StreamId, Reason)> {
        self.sent
    }

    pub(crate) fn record_sent(&mut self, last_stream_id: StreamId, reason: Reason) {
        debug!("sending GOAWAY; last_stream_id={last_stream_id:?} reason={reason:?}");
        self.sent = Some((last_stream_id, reason));
    }

    pub(crate) fn record_received(&mut self, frame: &frame::GoAway) {
        debug!(
            "received GOAWAY; last_stream_id={:?} reason={:?}",
            frame.last_stream_id(),
            frame.reason()
        );
        self.received = Some((frame.last_stream_id(), frame.reason()));
    }
}
