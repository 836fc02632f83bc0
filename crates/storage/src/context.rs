//! Cancellation context threaded through every operation that may reach the
//! state store.
//!
//! A [`Context`] is cheap to clone and is observed, never mutated, by the
//! code it is handed to. Cancellation is requested through the paired
//! [`CancelHandle`]. Dropping the handle without cancelling leaves the
//! context live forever.

use std::future::Future;

use tokio::sync::watch;

use crate::error::Cancelled;

/// A cancellation token passed by reference into state and stream operations.
#[derive(Debug, Clone)]
pub struct Context {
    cancelled: Option<watch::Receiver<bool>>,
}

/// The cancelling side of a [`Context`] created by [`Context::with_cancel`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl Context {
    /// A context that is never cancelled.
    pub fn background() -> Self {
        Self { cancelled: None }
    }

    /// A cancellable context together with the handle that cancels it.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                cancelled: Some(rx),
            },
            CancelHandle { tx },
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Completes once the context is cancelled. Never completes for a
    /// background context or one whose handle was dropped uncancelled.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.cancelled else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }

    /// Drives `fut` to completion unless the context is cancelled first, in
    /// which case `fut` is dropped and the error type's `From<Cancelled>`
    /// conversion is returned.
    pub async fn run<F, T, E>(&self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<Cancelled>,
    {
        if self.is_cancelled() {
            return Err(Cancelled.into());
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Cancelled.into()),
            result = fut => result,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl CancelHandle {
    /// Cancels the paired context and every clone of it.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::StateError;

    #[tokio::test]
    async fn background_context_runs_to_completion() {
        let ctx = Context::background();
        let out: Result<u32, StateError> = ctx.run(async { Ok(7) }).await;
        assert_eq!(out.unwrap(), 7);
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_aborts_pending_future() {
        let (ctx, handle) = Context::with_cancel();
        let waiter = ctx.clone();
        let task = tokio::spawn(async move {
            waiter
                .run(async {
                    std::future::pending::<()>().await;
                    Ok::<(), StateError>(())
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(StateError::Cancelled)));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_context_skips_future() {
        let (ctx, handle) = Context::with_cancel();
        handle.cancel();
        let mut polled = false;
        let result: Result<(), StateError> = ctx
            .run(async {
                polled = true;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(StateError::Cancelled)));
        assert!(!polled);
    }

    #[tokio::test]
    async fn dropped_handle_does_not_cancel() {
        let (ctx, handle) = Context::with_cancel();
        drop(handle);
        let out: Result<&str, StateError> = ctx.run(async { Ok("done") }).await;
        assert_eq!(out.unwrap(), "done");
        assert!(!ctx.is_cancelled());
    }
}
