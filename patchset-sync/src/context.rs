//! Cancellation and deadlines for a commit.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use patchset_core::StoreError;

/// Carries the cancellation signal and deadline for one commit.
///
/// Cheap to clone; clones observe the same signal.
#[derive(Debug, Clone, Default)]
pub struct CommitContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Cancels every [`CommitContext`] created alongside it.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

impl CommitContext {
    /// Never cancelled, no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            deadline: None,
            cancel: Some(rx),
        };
        (ctx, CancelHandle(tx))
    }

    /// Tightens the deadline to at most `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Tightens the deadline to at most `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The reason this context is done, if it already is.
    pub fn err(&self) -> Option<StoreError> {
        if self.cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Some(StoreError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(StoreError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> StoreError {
        let cancelled = async {
            let Some(rx) = &self.cancel else {
                return std::future::pending::<()>().await;
            };
            let mut rx = rx.clone();
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                // Handle dropped without cancelling: never fires.
                if rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            () = cancelled => StoreError::Cancelled,
            () = expired => StoreError::DeadlineExceeded,
        }
    }
}
