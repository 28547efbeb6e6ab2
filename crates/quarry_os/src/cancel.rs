#![forbid(unsafe_code)]

use std::future::{pending, Future};

use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Caller side of a cancellation pair.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Callee side of a cancellation pair. Cheap to clone; [`CancelSignal::never`] never fires.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once the paired handle cancels. A dropped handle never cancels.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return pending().await;
            }
        }
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
}

/// Drives `work` unless `signal` fires first. A signal already raised wins without polling `work`.
pub async fn run_cancellable<F>(signal: &CancelSignal, work: F) -> Result<F::Output, Cancelled>
where
    F: Future,
{
    if signal.is_cancelled() {
        return Err(Cancelled);
    }
    tokio::select! {
        biased;
        _ = signal.cancelled() => Err(Cancelled),
        out = work => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn completes_when_not_cancelled() {
        let (_handle, signal) = cancel_pair();
        assert_eq!(run_cancellable(&signal, async { 7 }).await, Ok(7));
        assert_eq!(
            run_cancellable(&CancelSignal::never(), async { 8 }).await,
            Ok(8)
        );
    }

    #[tokio::test]
    async fn pre_cancelled_signal_skips_work() {
        let (handle, signal) = cancel_pair();
        handle.cancel();
        let mut ran = false;
        let out = run_cancellable(&signal, async {
            ran = true;
        })
        .await;
        assert_eq!(out, Err(Cancelled));
        assert!(!ran);
    }

    #[tokio::test]
    async fn cancel_interrupts_pending_work() {
        let (handle, signal) = cancel_pair();
        let task = tokio::spawn(async move {
            run_cancellable(&signal, tokio::time::sleep(Duration::from_secs(60))).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        assert_eq!(task.await.unwrap(), Err(Cancelled));
    }

    #[tokio::test]
    async fn dropped_handle_never_cancels() {
        let (handle, signal) = cancel_pair();
        drop(handle);
        assert!(!signal.is_cancelled());
        assert_eq!(run_cancellable(&signal, async { 1 }).await, Ok(1));
    }
}
