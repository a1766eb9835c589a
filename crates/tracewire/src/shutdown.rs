//! One-shot shutdown broadcast.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Single-fire stop signal shared by the exporter surface and the uploader
/// loop.
///
/// Any number of clones may wait concurrently. The first [`signal`] call
/// wakes all current waiters; every later waiter observes the fired state
/// immediately. Later [`signal`] calls are no-ops.
///
/// [`signal`]: ShutdownSignal::signal
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<SignalState>,
}

#[derive(Debug, Default)]
struct SignalState {
    fired: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    /// A signal that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal, waking every waiter. Only the first call has an
    /// effect.
    pub fn signal(&self) {
        if !self.inner.fired.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns `true` once the signal has fired.
    pub fn is_signaled(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Waits until the signal fires or `wait` elapses, whichever comes
    /// first, and returns whether it had fired.
    pub async fn wait_timeout(&self, wait: Duration) -> bool {
        if self.is_signaled() {
            return true;
        }
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register interest before re-checking the flag; a signal landing
        // between the check and the await would otherwise be missed.
        notified.as_mut().enable();
        if self.is_signaled() {
            return true;
        }
        tokio::time::timeout(wait, notified).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn times_out_when_never_signaled() {
        let signal = ShutdownSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(20)).await);
        assert!(!signal.is_signaled());
    }

    #[tokio::test]
    async fn returns_immediately_once_fired() {
        let signal = ShutdownSignal::new();
        signal.signal();
        assert!(signal.is_signaled());

        let started = Instant::now();
        assert!(signal.wait_timeout(Duration::from_secs(60)).await);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn wakes_a_parked_waiter() {
        let signal = ShutdownSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait_timeout(Duration::from_secs(60)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.signal();

        let fired = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(fired);
    }

    #[tokio::test]
    async fn second_signal_is_a_no_op() {
        let signal = ShutdownSignal::new();
        signal.signal();
        signal.signal();
        assert!(signal.is_signaled());
        assert!(signal.wait_timeout(Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn clones_share_the_flag() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();
        clone.signal();
        assert!(signal.is_signaled());
    }
}
