//! Cooperative pause and abort signals for a running scan.
//!
//! The scan loop checks `ScanControl` at the top of every iteration. While
//! paused it parks on a `Notify` instead of polling, and wakes when the scan
//! is resumed or aborted.

use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Shared pause/abort flags for one scan run.
#[derive(Debug, Default)]
pub struct ScanControl {
    paused: AtomicBool,
    aborted: AtomicBool,
    notify: Notify,
}

impl ScanControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Clear the pause flag and wake the parked loop.
    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Request the loop to stop. Wakes it if paused. Idempotent.
    pub fn abort(&self) {
        if !self.aborted.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Park while paused. Returns `false` if the scan was aborted.
    pub async fn wait_while_paused(&self) -> bool {
        loop {
            if self.is_aborted() {
                return false;
            }
            if !self.is_paused() {
                return true;
            }

            // Register interest before re-checking so a resume between the
            // check and the await is not lost.
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            if self.is_aborted() || !self.is_paused() {
                continue;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn not_paused_returns_immediately() {
        let control = ScanControl::new();
        assert!(control.wait_while_paused().await);
    }

    #[tokio::test]
    async fn resume_wakes_paused_waiter() {
        let control = Arc::new(ScanControl::new());
        control.pause();

        let waiter = tokio::spawn({
            let control = control.clone();
            async move { control.wait_while_paused().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        control.resume();
        let resumed = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(resumed);
    }

    #[tokio::test]
    async fn abort_wakes_paused_waiter() {
        let control = Arc::new(ScanControl::new());
        control.pause();

        let waiter = tokio::spawn({
            let control = control.clone();
            async move { control.wait_while_paused().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        control.abort();
        let resumed = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(!resumed);
        assert!(control.is_aborted());
    }
}
