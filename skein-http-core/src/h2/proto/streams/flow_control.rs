use crate::h2::frame::Reason;
use crate::h2::proto::{MAX_WINDOW_SIZE, WindowSize};

/// One flow-control window.
///
/// The window can legally go negative when the peer shrinks
/// INITIAL_WINDOW_SIZE after data was in flight; sends are gated on
/// [`FlowControl::available`], which floors at zero.
#[derive(Copy, Clone, Debug)]
pub(crate) struct FlowControl {
    window: i64,
}

impl FlowControl {
    pub(crate) fn new(initial: WindowSize) -> Self {
        Self {
            window: i64::from(initial),
        }
    }

    /// The credit that may be consumed right now.
    pub(crate) fn available(&self) -> WindowSize {
        self.window.clamp(0, i64::from(MAX_WINDOW_SIZE)) as WindowSize
    }

    pub(crate) fn window(&self) -> i64 {
        self.window
    }

    /// Applies a WINDOW_UPDATE. Overflowing 2^31 - 1 is a
    /// FLOW_CONTROL_ERROR at the caller's scope.
    pub(crate) fn inc_window(&mut self, sz: WindowSize) -> Result<(), Reason> {
        let next = self.window + i64::from(sz);
        if next > i64::from(MAX_WINDOW_SIZE) {
            return Err(Reason::FLOW_CONTROL_ERROR);
        }
        self.window = next;
        Ok(())
    }

    /// Consumes credit for a sent or received payload. The caller must
    /// have checked [`Self::available`].
    pub(crate) fn dec_window(&mut self, sz: WindowSize) {
        debug_assert!(sz <= self.available(), "window underflow");
        self.window -= i64::from(sz);
    }

    /// Retroactive INITIAL_WINDOW_SIZE adjustment: applied synchronously
    /// when the SETTINGS change lands.
    pub(crate) fn adjust(&mut self, delta: i64) {
        self.window += delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_bounded_by_max_window() {
        let mut flow = FlowControl::new(MAX_WINDOW_SIZE - 10);
        assert!(flow.inc_window(10).is_ok());
        assert_eq!(flow.inc_window(1).unwrap_err(), Reason::FLOW_CONTROL_ERROR);
    }

    #[test]
    fn sender_available_never_exceeds_prior_plus_delta() {
        let mut flow = FlowControl::new(100);
        flow.dec_window(100);
        assert_eq!(flow.available(), 0);
        flow.inc_window(40).unwrap();
        assert_eq!(flow.available(), 40);
    }

    #[test]
    fn negative_window_after_settings_shrink() {
        let mut flow = FlowControl::new(10);
        flow.dec_window(10);
        flow.adjust(-5);
        assert_eq!(flow.window(), -5);
        assert_eq!(flow.available(), 0);
        flow.inc_window(6).unwrap();
        assert_eq!(flow.available(), 1);
    }
}
