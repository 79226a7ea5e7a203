//! Per-call deadline and cancellation token

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::Error;

/// Deadline and cancellation signal threaded through every driver call
///
/// Cloning shares the cancellation token, so cancelling any clone cancels
/// the call. Cancelled or expired calls are never retried by the bridge.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl CallContext {
    /// A context with no deadline that is never cancelled unless asked to
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that expires after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            token: CancellationToken::new(),
        }
    }

    /// Derive a context whose cancellation follows this one but can also be cancelled on its own
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            token: self.token.child_token(),
        }
    }

    /// The absolute deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if any
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Cancel the call
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns true once the call is cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the call is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Cancel this context when the returned guard drops
    pub fn drop_guard(&self) -> tokio_util::sync::DropGuard {
        self.token.clone().drop_guard()
    }

    /// Run `fut` until it completes, the caller cancels, or the deadline passes
    pub async fn run<F, T>(&self, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = self.token.cancelled() => Err(Error::Cancelled),
            _ = deadline => Err(Error::transport("deadline exceeded")),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_passes_through_results() {
        let ctx = CallContext::new();
        let out = ctx.run(async { Ok::<_, Error>(7) }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn test_cancelled_context_short_circuits() {
        let ctx = CallContext::new();
        ctx.cancel();
        let err = ctx
            .run(async { Ok::<_, Error>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_call() {
        let ctx = CallContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = ctx
            .run(std::future::pending::<Result<(), Error>>())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_deadline_is_a_transport_error() {
        let ctx = CallContext::with_timeout(Duration::from_millis(5));
        let err = ctx
            .run(std::future::pending::<Result<(), Error>>())
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_child_follows_parent_cancellation() {
        let parent = CallContext::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());

        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_drop_guard_cancels() {
        let ctx = CallContext::new();
        {
            let _guard = ctx.drop_guard();
        }
        assert!(ctx.is_cancelled());
    }
}
