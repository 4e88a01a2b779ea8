use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a guarded fetch was cut short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// The per-request deadline for `url` elapsed.
    Deadline { url: String },
    /// The enclosing batch scope was cancelled.
    Parent,
}

/// Per-fetch scope: cancelled when the parent is, or when the deadline passes.
#[derive(Debug)]
pub struct TimeoutGuard {
    token: CancellationToken,
    deadline: Instant,
    url: String,
}

impl TimeoutGuard {
    pub fn new(parent: &CancellationToken, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            token: parent.child_token(),
            deadline: Instant::now() + timeout,
            url: url.into(),
        }
    }

    /// Token the guarded work must observe.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Drives `work` until it finishes or the scope ends. On expiry the scope
    /// token is cancelled before returning so any detached work sees it too.
    pub async fn run<F: Future>(&self, work: F) -> Result<F::Output, CancelReason> {
        // A scope that is already over never starts its work.
        if self.token.is_cancelled() {
            return Err(CancelReason::Parent);
        }
        tokio::select! {
            biased;
            output = work => Ok(output),
            _ = self.token.cancelled() => Err(CancelReason::Parent),
            _ = tokio::time::sleep_until(self.deadline) => {
                self.token.cancel();
                Err(CancelReason::Deadline { url: self.url.clone() })
            }
        }
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
