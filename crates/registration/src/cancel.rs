//! Request-scoped cancellation.
//!
//! The HTTP layer holds a [`CancelGuard`] for as long as the caller is still
//! listening; every task working on that request watches a [`Cancellation`].
//! Dropping the guard cancels, so a dropped handler future or an abandoned
//! stream stops the work it started.

use tokio::sync::watch;

pub fn cancellation() -> (CancelGuard, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelGuard { tx }, Cancellation { rx: Some(rx) })
}

#[derive(Debug)]
pub struct CancelGuard {
    tx: watch::Sender<bool>,
}

impl CancelGuard {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: Option<watch::Receiver<bool>>,
}

impl Cancellation {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once the guard cancels or is dropped.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
