//! One-shot cancellation of an in-flight run.
//!
//! The pipeline checks its [Interrupt] before each step and races it against every
//! sleep, so an interrupted run stops at the next step boundary or poll tick.

use futures::{channel::oneshot, future::Shared, FutureExt};
use std::{future::Future, time::Duration};

/// Triggers the paired [Interrupt]s.
pub struct Interrupter {
    tx: oneshot::Sender<()>,
}

impl Interrupter {
    /// Create an [Interrupter] and the [Interrupt] it resolves.
    pub fn new() -> (Self, Interrupt) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, Interrupt { rx: rx.shared() })
    }

    /// Resolve all associated [Interrupt]s.
    pub fn interrupt(self) {
        let _ = self.tx.send(());
    }
}

/// Observes an [Interrupter].
///
/// Dropping the [Interrupter] without calling [Interrupter::interrupt] leaves the
/// [Interrupt] pending forever.
#[derive(Clone)]
pub struct Interrupt {
    rx: Shared<oneshot::Receiver<()>>,
}

impl Interrupt {
    /// An [Interrupt] that never fires.
    pub fn never() -> Self {
        Interrupter::new().1
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self.rx.clone().now_or_never(), Some(Ok(())))
    }

    /// Resolves once interrupted.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let rx = self.rx.clone();
        async move {
            if rx.await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `duration`.
    ///
    /// Returns `false` if interrupted before the duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.wait() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes() {
        let (_interrupter, interrupt) = Interrupter::new();
        let start = Instant::now();
        assert!(interrupt.sleep(Duration::from_secs(30)).await);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
        assert!(!interrupt.is_interrupted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_cuts_sleep() {
        let (interrupter, interrupt) = Interrupter::new();
        let waiter = interrupt.clone();
        let handle = tokio::spawn(async move { waiter.sleep(Duration::from_secs(3600)).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        interrupter.interrupt();
        assert!(!handle.await.unwrap());
        assert!(interrupt.is_interrupted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_interrupter_never_fires() {
        let (interrupter, interrupt) = Interrupter::new();
        drop(interrupter);
        assert!(interrupt.sleep(Duration::from_secs(5)).await);
        assert!(!interrupt.is_interrupted());
    }

    #[test]
    fn test_never() {
        assert!(!Interrupt::never().is_interrupted());
    }
}
