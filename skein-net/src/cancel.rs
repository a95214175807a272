//! Composable cancellation.
//!
//! A [`Cancel`] value is a chain of nodes. Each node contributes one
//! cancellation source (a deadline or an interrupt flag) and delegates to
//! its parent first, inheriting the parent's reason when the parent fired.
//! The root handle ([`Cancel::new`]) never cancels by itself, so passing it
//! means "run to completion".
//!
//! Every blocking operation in the stack polls its handle between I/O
//! suspension points via [`Cancel::run`], which races the operation against
//! [`Cancel::cancelled`]. The protocol state is left consistent with having
//! processed only whole frames: a cancelled send keeps its resumption
//! cursor, a cancelled read leaves undelivered bytes in the read buffer.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Why an operation was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CancelReason {
    /// Not cancelled.
    None = 0,
    /// The parent handle fired; see [`Cancelled::deep_reason`].
    Parent = 1,
    /// A non-blocking operation would have blocked.
    Blocking = 2,
    /// The operating system reported an I/O error.
    OsError = 3,
    /// The TLS layer reported an error.
    TlsError = 4,
    /// The deadline passed.
    Timeout = 5,
    /// An [`Interrupter`] was triggered from another thread.
    Interrupt = 6,
    /// Cancelled for an unclassified reason.
    Unknown = 7,
}

impl CancelReason {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Parent,
            2 => Self::Blocking,
            3 => Self::OsError,
            4 => Self::TlsError,
            5 => Self::Timeout,
            6 => Self::Interrupt,
            7 => Self::Unknown,
            _ => Self::None,
        }
    }
}

/// The error returned by a cancelled operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancelled {
    reason: CancelReason,
    deep: CancelReason,
}

impl Cancelled {
    pub(crate) fn new(reason: CancelReason, deep: CancelReason) -> Self {
        Self { reason, deep }
    }

    /// The reason recorded on the handle the operation was given.
    #[must_use]
    pub fn reason(&self) -> CancelReason {
        self.reason
    }

    /// The reason of the node that actually fired, resolving
    /// [`CancelReason::Parent`] links.
    #[must_use]
    pub fn deep_reason(&self) -> CancelReason {
        self.deep
    }
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.deep {
            CancelReason::Timeout => f.write_str("operation timed out"),
            CancelReason::Interrupt => f.write_str("operation interrupted"),
            CancelReason::Blocking => f.write_str("operation would block"),
            CancelReason::OsError => f.write_str("cancelled after os error"),
            CancelReason::TlsError => f.write_str("cancelled after tls error"),
            _ => f.write_str("operation cancelled"),
        }
    }
}

impl std::error::Error for Cancelled {}

#[derive(Debug)]
enum Source {
    /// Never fires on its own; only the parent chain applies.
    Inert,
    Deadline(Instant),
    Interrupt(Arc<AtomicBool>),
}

#[derive(Debug)]
struct Node {
    parent: Option<Arc<Node>>,
    source: Source,
    /// First observed reason, sticky once set.
    reason: AtomicU8,
}

impl Node {
    fn store_reason(&self, reason: CancelReason) {
        let _ = self.reason.compare_exchange(
            CancelReason::None as u8,
            reason as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn reason(&self) -> CancelReason {
        CancelReason::from_u8(self.reason.load(Ordering::Acquire))
    }

    /// Walks the chain, parent first. Returns the deep reason when fired.
    fn check(&self) -> Result<(), CancelReason> {
        if let Some(parent) = &self.parent {
            if let Err(deep) = parent.check() {
                self.store_reason(CancelReason::Parent);
                return Err(deep);
            }
        }
        match &self.source {
            Source::Inert => {}
            Source::Deadline(at) => {
                if Instant::now() >= *at {
                    self.store_reason(CancelReason::Timeout);
                    return Err(CancelReason::Timeout);
                }
            }
            Source::Interrupt(flag) => {
                if flag.load(Ordering::Acquire) {
                    self.store_reason(CancelReason::Interrupt);
                    return Err(CancelReason::Interrupt);
                }
            }
        }
        // A sticky reason (e.g. noted os error) keeps the handle cancelled.
        match self.reason() {
            CancelReason::None => Ok(()),
            reason => Err(reason),
        }
    }

    fn nearest_deadline(&self) -> Option<Instant> {
        let own = match self.source {
            Source::Deadline(at) => Some(at),
            _ => None,
        };
        let up = self.parent.as_deref().and_then(Node::nearest_deadline);
        match (own, up) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn has_interrupt(&self) -> bool {
        matches!(self.source, Source::Interrupt(_))
            || self.parent.as_deref().is_some_and(Node::has_interrupt)
    }
}

/// A cancellation handle.
///
/// Cheap to clone; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct Cancel {
    node: Option<Arc<Node>>,
}

/// Sets the interrupt flag of the [`Cancel`] it was created with.
#[derive(Debug, Clone)]
pub struct Interrupter {
    flag: Arc<AtomicBool>,
}

impl Interrupter {
    /// Cancels the associated handle. May be called from any thread.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

impl Cancel {
    /// A handle that never cancels on its own.
    #[must_use]
    pub fn new() -> Self {
        Self { node: None }
    }

    fn push(&self, source: Source) -> Self {
        Self {
            node: Some(Arc::new(Node {
                parent: self.node.clone(),
                source,
                reason: AtomicU8::new(CancelReason::None as u8),
            })),
        }
    }

    /// A child handle delegating to `self`; cancelling the parent cancels
    /// the child with [`CancelReason::Parent`].
    #[must_use]
    pub fn child(&self) -> Self {
        self.push(Source::Inert)
    }

    /// A child that additionally fires [`CancelReason::Timeout`] once
    /// `timeout` has elapsed from now.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// A child that fires [`CancelReason::Timeout`] at `deadline`.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        self.push(Source::Deadline(deadline))
    }

    /// A child that fires [`CancelReason::Interrupt`] once the returned
    /// [`Interrupter`] is triggered.
    #[must_use]
    pub fn interruptible(&self) -> (Self, Interrupter) {
        let flag = Arc::new(AtomicBool::new(false));
        let cancel = self.push(Source::Interrupt(flag.clone()));
        (cancel, Interrupter { flag })
    }

    /// Polls the chain once.
    pub fn check(&self) -> Result<(), Cancelled> {
        match &self.node {
            None => Ok(()),
            Some(node) => node
                .check()
                .map_err(|deep| Cancelled::new(node.reason(), deep)),
        }
    }

    /// Records an out-of-band cancellation reason (e.g. after an I/O
    /// error), making the handle observe it from now on.
    pub fn note(&self, reason: CancelReason) {
        if let Some(node) = &self.node {
            node.store_reason(reason);
        }
    }

    /// The reason recorded on this handle, [`CancelReason::None`] while the
    /// handle is live.
    #[must_use]
    pub fn reason(&self) -> CancelReason {
        self.node.as_deref().map_or(CancelReason::None, Node::reason)
    }

    /// Resolves once the handle cancels. Pends forever on a handle with no
    /// deadline and no interrupt source.
    pub async fn cancelled(&self) -> Cancelled {
        let Some(node) = &self.node else {
            return std::future::pending().await;
        };
        // Interrupt flags have no waker, so they are sampled on a coarse
        // tick; deadlines sleep exactly until due.
        const INTERRUPT_TICK: Duration = Duration::from_millis(10);
        loop {
            if let Err(deep) = node.check() {
                return Cancelled::new(node.reason(), deep);
            }
            let deadline = node.nearest_deadline();
            let interruptible = node.has_interrupt();
            match (deadline, interruptible) {
                (Some(at), true) => {
                    let tick = Instant::now() + INTERRUPT_TICK;
                    tokio::time::sleep_until(at.min(tick)).await;
                }
                (Some(at), false) => tokio::time::sleep_until(at).await,
                (None, true) => tokio::time::sleep(INTERRUPT_TICK).await,
                (None, false) => return std::future::pending().await,
            }
        }
    }

    /// Races `fut` against cancellation.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Cancelled> {
        if self.node.is_none() {
            return Ok(fut.await);
        }
        self.check()?;
        tokio::pin!(fut);
        tokio::select! {
            biased;
            out = &mut fut => Ok(out),
            cancelled = self.cancelled() => Err(cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_never_cancels() {
        let cancel = Cancel::new();
        assert!(cancel.check().is_ok());
        assert_eq!(cancel.reason(), CancelReason::None);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires() {
        let cancel = Cancel::new().with_timeout(Duration::from_millis(50));
        assert!(cancel.check().is_ok());
        tokio::time::advance(Duration::from_millis(60)).await;
        let err = cancel.check().unwrap_err();
        assert_eq!(err.reason(), CancelReason::Timeout);
        assert_eq!(err.deep_reason(), CancelReason::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn child_inherits_parent_reason() {
        let parent = Cancel::new().with_timeout(Duration::from_millis(10));
        let child = parent.child();
        tokio::time::advance(Duration::from_millis(20)).await;
        let err = child.check().unwrap_err();
        assert_eq!(err.reason(), CancelReason::Parent);
        assert_eq!(err.deep_reason(), CancelReason::Timeout);
    }

    #[tokio::test]
    async fn interrupt_fires() {
        let (cancel, interrupter) = Cancel::new().interruptible();
        assert!(cancel.check().is_ok());
        interrupter.interrupt();
        let err = cancel.check().unwrap_err();
        assert_eq!(err.deep_reason(), CancelReason::Interrupt);
    }

    #[tokio::test(start_paused = true)]
    async fn run_races_the_future() {
        let cancel = Cancel::new().with_timeout(Duration::from_millis(10));
        let res = cancel
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert_eq!(res.unwrap_err().deep_reason(), CancelReason::Timeout);

        let cancel = Cancel::new().with_timeout(Duration::from_secs(5));
        let res = cancel.run(async { 7 }).await;
        assert_eq!(res.unwrap(), 7);
    }

    #[test]
    fn noted_reason_is_sticky() {
        let cancel = Cancel::new().child();
        cancel.note(CancelReason::OsError);
        let err = cancel.check().unwrap_err();
        assert_eq!(err.deep_reason(), CancelReason::OsError);
    }
}
