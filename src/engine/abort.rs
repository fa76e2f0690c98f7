//! Composition of the independent abort conditions of a run.

use crate::error::FailureCause;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Cancelled,
    Superseded,
    Timeout,
}

impl AbortReason {
    pub fn into_cause(self) -> FailureCause {
        match self {
            AbortReason::Cancelled => FailureCause::Aborted {
                cancel_requested: true,
            },
            AbortReason::Timeout => FailureCause::Aborted {
                cancel_requested: false,
            },
            AbortReason::Superseded => FailureCause::Superseded,
        }
    }
}

/// One effective abort signal over caller cancellation, supersession and a deadline.
///
/// Evaluation order is fixed: a caller cancellation always wins, even when the
/// deadline has also elapsed by the time the signal is inspected.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    cancel: CancellationToken,
    supersede: CancellationToken,
    deadline: Instant,
}

impl AbortSignal {
    pub fn new(cancel: CancellationToken, supersede: CancellationToken, timeout: Duration) -> Self {
        Self {
            cancel,
            supersede,
            deadline: Instant::now() + timeout,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Non-blocking inspection used at every checkpoint.
    pub fn check(&self) -> Option<AbortReason> {
        if self.cancel.is_cancelled() {
            Some(AbortReason::Cancelled)
        } else if self.supersede.is_cancelled() {
            Some(AbortReason::Superseded)
        } else if Instant::now() >= self.deadline {
            Some(AbortReason::Timeout)
        } else {
            None
        }
    }

    /// Checkpoint helper: `Err` carries the cause to classify.
    pub fn checkpoint(&self) -> Result<(), FailureCause> {
        match self.check() {
            Some(reason) => Err(reason.into_cause()),
            None => Ok(()),
        }
    }

    /// Resolves once any condition fires.
    pub async fn fired(&self) -> AbortReason {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.supersede.cancelled() => {}
            _ = tokio::time::sleep_until(self.deadline) => {}
        }
        self.check().unwrap_or(AbortReason::Timeout)
    }
}
