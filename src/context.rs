use crate::errors::{CyborgError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// Per-call deadline and cancellation, supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    timeout: Option<Duration>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Cancels every [`CallContext`] derived from it.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CallContext {
    /// No deadline, not cancellable.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancel: None,
        }
    }

    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                timeout: None,
                cancel: Some(rx),
            },
            CancelHandle { tx },
        )
    }

    /// Same cancellation, new deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Drive `fut` unless the context is cancelled or its deadline passes
    /// first. The in-flight future is dropped in either case.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(CyborgError::Cancelled);
        }

        let mut cancel = self.cancel.clone();
        let cancelled = async move {
            match cancel.as_mut() {
                Some(rx) => {
                    // A dropped handle can never cancel.
                    let closed = rx.wait_for(|c| *c).await.is_err();
                    if closed {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };
        let deadline = async {
            match self.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = fut => result,
            _ = cancelled => Err(CyborgError::Cancelled),
            _ = deadline => Err(CyborgError::DeadlineExceeded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = CallContext::background();
        let value = ctx.run(async { Ok::<_, CyborgError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let ctx = CallContext::with_timeout(Duration::from_millis(50));
        let err = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, CyborgError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CyborgError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_cancelled_mid_call() {
        let (ctx, handle) = CallContext::cancellable();
        let task = tokio::spawn(async move {
            ctx.run(async {
                std::future::pending::<()>().await;
                Ok::<_, CyborgError>(())
            })
            .await
        });
        tokio::task::yield_now().await;
        handle.cancel();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, CyborgError::Cancelled));
    }

    #[tokio::test]
    async fn test_already_cancelled_short_circuits() {
        let (ctx, handle) = CallContext::cancellable();
        handle.cancel();
        assert!(ctx.is_cancelled());
        let err = ctx
            .run(std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, CyborgError::Cancelled));
    }

    #[tokio::test]
    async fn test_dropped_handle_never_cancels() {
        let (ctx, handle) = CallContext::cancellable();
        drop(handle);
        let value = ctx.run(async { Ok::<_, CyborgError>("done") }).await.unwrap();
        assert_eq!(value, "done");
    }

    #[tokio::test]
    async fn test_clones_share_cancellation() {
        let (ctx, handle) = CallContext::cancellable();
        let copy = ctx.clone().timeout(Duration::from_secs(1));
        handle.cancel();
        assert!(copy.is_cancelled());
        assert_eq!(copy.deadline(), Some(Duration::from_secs(1)));
    }
}
