use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Why a probe phase stopped before its future completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    DeadlineExceeded,
    Canceled,
}

/// Per-call deadline and cancellation signal.
///
/// Each call to `Prober::download` takes its own context, so cancelling one probe
/// leaves every other in-flight probe untouched. Child tokens of a shared parent
/// token let a caller stop a whole campaign at once.
#[derive(Debug, Clone, Default)]
pub struct ProbeContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl ProbeContext {
    /// A context without deadline; only the prober's own timeout applies.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the cancellation token, keeping the deadline.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The earlier of the caller's deadline and `limit`.
    pub fn governing_deadline(&self, limit: Instant) -> Instant {
        match self.deadline {
            Some(deadline) => deadline.min(limit),
            None => limit,
        }
    }

    /// The interrupt that already applies, deadline expiry taking precedence.
    pub fn interrupted(&self, limit: Instant) -> Option<Interrupt> {
        if Instant::now() >= self.governing_deadline(limit) {
            Some(Interrupt::DeadlineExceeded)
        } else if self.cancel.is_cancelled() {
            Some(Interrupt::Canceled)
        } else {
            None
        }
    }

    /// Drive `fut` until it completes, the governing deadline passes or the token is cancelled.
    ///
    /// `fut` is dropped on interruption, which aborts any I/O it owns.
    pub async fn guard<F>(&self, limit: Instant, fut: F) -> Result<F::Output, Interrupt>
    where
        F: Future,
    {
        let deadline = self.governing_deadline(limit);
        tokio::select! {
            biased;
            _ = sleep_until(deadline) => Err(Interrupt::DeadlineExceeded),
            _ = self.cancel.cancelled() => Err(Interrupt::Canceled),
            out = fut => Ok(out),
        }
    }
}
